use quarry_abi::Registers;

use crate::command::Command;
use crate::error::{Error, SpawnError};
use crate::queue::{Cmd, EventQueue, EventStream, ResumeMode};
use crate::task::JoinHandle;

/// Execution state of a debuggee, as published by its tracer thread.
///
/// Caller threads read a mirror of the state the tracer thread
/// maintains; by the time a reader acts on it, the debuggee may already
/// have moved on. The tracer thread re-checks every command against the
/// authoritative state before executing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DebuggeeState {
    /// The debuggee is being spawned and has not reached its initial
    /// exec stop yet.
    Starting = 0,

    /// The debuggee is executing.
    Running = 1,

    /// The debuggee is stopped and can be inspected.
    Stopped = 2,

    /// The debuggee terminated.
    Exited = 3,

    /// The debuggee was released and runs free of the tracer.
    Detached = 4,
}

impl DebuggeeState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Stopped,
            3 => Self::Exited,
            _ => Self::Detached,
        }
    }
}

/// Handle over a process spawned under tracer control.
///
/// Every operation is submitted to the debuggee's tracer thread and
/// executed there, in submission order; the returned [JoinHandle]
/// resolves once the command ran. The handle is shareable across
/// threads through a reference.
///
/// Dropping the last handle kills the debuggee (unless it already
/// exited or was [detached](Self::detach)) and joins the tracer thread.
pub struct Debuggee {
    queue: EventQueue,
}

impl Debuggee {
    /// Spawns `command` under tracer control.
    ///
    /// Blocks until the child reached its initial exec stop; on success
    /// the debuggee is in the [Stopped](DebuggeeState::Stopped) state,
    /// with its program loaded but not yet executing.
    pub fn start(command: Command) -> Result<Self, SpawnError> {
        EventQueue::start(command).map(|queue| Self { queue })
    }

    /// Returns the OS process id of the debuggee.
    pub fn pid(&self) -> u32 {
        self.queue.pid().as_raw().unsigned_abs()
    }

    /// Returns the last published execution state of the debuggee.
    pub fn state(&self) -> DebuggeeState {
        self.queue.state()
    }

    /// Returns a consumer handle for the debuggee's event stream.
    pub fn events(&self) -> EventStream {
        self.queue.events()
    }

    /// Resumes the debuggee until its next signal stop or breakpoint.
    ///
    /// The handle resolves as soon as execution was resumed; the stop
    /// itself is delivered later, as an event.
    pub fn continue_execution(&self) -> JoinHandle<()> {
        self.queue.submit(|done| Cmd::Resume {
            mode: ResumeMode::UntilStop,
            done,
        })
    }

    /// Resumes the debuggee until its next syscall boundary (entry or
    /// exit, whichever comes first).
    pub fn continue_to_syscall(&self) -> JoinHandle<()> {
        self.queue.submit(|done| Cmd::Resume {
            mode: ResumeMode::UntilSyscall,
            done,
        })
    }

    /// Captures a snapshot of the debuggee's general-purpose registers.
    ///
    /// Fails with [Error::NotStopped] unless the debuggee is stopped.
    /// A running debuggee is rejected at submission time, so the handle
    /// resolves immediately instead of queueing behind the stop.
    pub fn get_registers(&self) -> JoinHandle<Registers> {
        if self.state() != DebuggeeState::Stopped {
            return JoinHandle::ready(Err(Error::NotStopped));
        }

        self.queue.submit(|done| Cmd::GetRegisters { done })
    }

    /// Overwrites the debuggee's general-purpose registers.
    pub fn set_registers(&self, regs: Registers) -> JoinHandle<()> {
        self.queue.submit(|done| Cmd::SetRegisters { regs, done })
    }

    /// Registers a software breakpoint at `addr`.
    ///
    /// A one-shot breakpoint (`is_once`) is removed as part of decoding
    /// its first hit; a persistent one re-arms at the next resume.
    pub fn set_breakpoint(&self, addr: u64, is_once: bool) -> JoinHandle<()> {
        self.queue
            .submit(|done| Cmd::SetBreakpoint { addr, is_once, done })
    }

    /// Removes the breakpoint at `addr`, restoring the original byte.
    pub fn remove_breakpoint(&self, addr: u64) -> JoinHandle<()> {
        self.queue.submit(|done| Cmd::RemoveBreakpoint { addr, done })
    }

    /// Reads `len` bytes of the debuggee's memory at `addr`.
    pub fn read_memory(&self, addr: u64, len: usize) -> JoinHandle<Vec<u8>> {
        self.queue.submit(|done| Cmd::ReadMemory { addr, len, done })
    }

    /// Writes `data` into the debuggee's memory at `addr`.
    pub fn write_memory(&self, addr: u64, data: Vec<u8>) -> JoinHandle<()> {
        self.queue.submit(|done| Cmd::WriteMemory { addr, data, done })
    }

    /// Releases the debuggee from tracer control and lets it run free.
    ///
    /// The debuggee must be stopped; a running one is rejected with
    /// [Error::NotStopped] at submission time (queueing the detach
    /// behind a stop that may never come would block indefinitely).
    /// The check reads the published state mirror, which lags behind a
    /// resume submitted concurrently from another thread: a detach
    /// racing such a resume can still queue behind it and then block
    /// until the next stop. Callers that resume and detach from
    /// different threads must serialize the two themselves.
    /// Registered breakpoints are unpatched first, then the tracer
    /// thread shuts down; commands still queued behind the detach
    /// resolve to [Error::TornDown]. Consumes the handle, so no further
    /// command can be submitted.
    pub fn detach(self) -> crate::Result<()> {
        if self.state() != DebuggeeState::Stopped {
            return Err(Error::NotStopped);
        }

        self.queue.submit(|done| Cmd::Detach { done }).join()
    }
}
