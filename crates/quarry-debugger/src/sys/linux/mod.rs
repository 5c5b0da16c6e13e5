mod error;
pub mod mem;
mod process;
mod regs;

pub use self::error::{Error, Result};
pub use self::process::{
    detach_process, kill_and_reap, resume_process, single_step, spawn_debuggee, wait_process,
};
pub use self::regs::{get_registers, set_registers};
