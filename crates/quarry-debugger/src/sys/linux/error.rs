use nix::sys::wait::WaitStatus;

/// Low-level OS error of the Linux backend.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Raw OS error.
    #[error("os error: {0}")]
    Os(#[from] nix::Error),

    /// The debuggee stopped with an unexpected wait status.
    #[error("bad child wait status: {0:?}")]
    BadChildWait(WaitStatus),

    /// A memory transfer moved fewer bytes than requested.
    #[error("memory access moved {0} bytes instead of {1}")]
    PartialMemOp(usize, usize),
}

/// Result type of the Linux backend.
pub type Result<T> = core::result::Result<T, Error>;
