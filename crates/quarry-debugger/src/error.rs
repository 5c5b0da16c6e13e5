/// Error reported synchronously by [Debuggee::start](crate::Debuggee::start).
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The child program image could not be executed.
    #[error("failed to spawn debuggee: {0}")]
    Spawn(#[from] std::io::Error),

    /// The tracing relationship could not be established.
    #[error("failed to attach to debuggee: {0}")]
    TraceAttach(#[from] crate::sys::Error),
}

/// Error reported through a [JoinHandle](crate::JoinHandle) when a
/// command fails on the tracer thread.
///
/// The type is `Clone` because a completed handle caches its result and
/// may be joined more than once.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No breakpoint is registered at the given address.
    #[error("no breakpoint at {0:#x}")]
    BreakpointNotFound(u64),

    /// A breakpoint is already registered at the given address.
    #[error("breakpoint already set at {0:#x}")]
    DuplicateBreakpoint(u64),

    /// The given address is not mapped (or not patchable) in the debuggee.
    #[error("address {0:#x} is not accessible in the debuggee")]
    InvalidAddress(u64),

    /// The command requires the debuggee to be stopped.
    #[error("debuggee is not stopped")]
    NotStopped,

    /// The debuggee was torn down while the command was outstanding.
    #[error("debuggee was torn down")]
    TornDown,

    /// The event stream was closed (tracer thread terminated).
    #[error("event stream is closed")]
    StreamClosed,

    /// Low-level OS failure.
    #[error(transparent)]
    Sys(#[from] crate::sys::Error),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
