use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, unbounded};
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use quarry_abi::Registers;

use crate::breakpoint::{BreakpointTable, TRAP_OPCODES};
use crate::command::Command;
use crate::debuggee::DebuggeeState;
use crate::error::{Error, Result, SpawnError};
use crate::event::{DebugEvent, ExitStatus};
use crate::sys;
use crate::task::{Completer, JoinHandle, completion_pair};

/// How a debuggee is resumed.
pub(crate) enum ResumeMode {
    /// Run until the next signal stop or breakpoint.
    UntilStop,

    /// Run until the next syscall boundary.
    UntilSyscall,
}

/// Command executed by the tracer thread, in submission order.
pub(crate) enum Cmd {
    Resume {
        mode: ResumeMode,
        done: Completer<()>,
    },
    GetRegisters {
        done: Completer<Registers>,
    },
    SetRegisters {
        regs: Registers,
        done: Completer<()>,
    },
    SetBreakpoint {
        addr: u64,
        is_once: bool,
        done: Completer<()>,
    },
    RemoveBreakpoint {
        addr: u64,
        done: Completer<()>,
    },
    ReadMemory {
        addr: u64,
        len: usize,
        done: Completer<Vec<u8>>,
    },
    WriteMemory {
        addr: u64,
        data: Vec<u8>,
        done: Completer<()>,
    },
    Detach {
        done: Completer<()>,
    },
    Shutdown,
}

/// Consumer handle for the debug-event stream of one debuggee.
///
/// Clonable and shareable across threads; events are pulled in stop
/// order. When several consumers pull concurrently, each event is
/// delivered to exactly one of them.
#[derive(Clone)]
pub struct EventStream {
    rx: Receiver<DebugEvent>,
}

impl EventStream {
    /// Blocks until the next debug event is available.
    ///
    /// Fails with [Error::StreamClosed] once the tracer thread has
    /// terminated and every buffered event was consumed.
    pub fn consume(&self) -> Result<DebugEvent> {
        self.rx.recv().map_err(|_| Error::StreamClosed)
    }

    /// Returns the next debug event, or `None` if none is pending.
    pub fn try_consume(&self) -> Result<Option<DebugEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::StreamClosed),
        }
    }
}

/// Tracer-thread handle: command channel, event stream and published
/// debuggee state.
///
/// Owns the thread; dropping the queue tears the debuggee down and
/// joins the thread exactly once.
pub(crate) struct EventQueue {
    cmd_tx: Sender<Cmd>,
    events: EventStream,
    state: Arc<AtomicU8>,
    pid: Pid,
    thread: Option<thread::JoinHandle<()>>,
}

impl EventQueue {
    /// Spawns the tracer thread, which in turn spawns the debuggee.
    ///
    /// Blocks until the child reached its initial exec stop.
    pub fn start(command: Command) -> core::result::Result<Self, SpawnError> {
        let (cmd_tx, cmd_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (spawn_tx, spawn_rx) = bounded(1);

        let state = Arc::new(AtomicU8::new(DebuggeeState::Starting as u8));
        let thread_state = state.clone();

        let thread = thread::Builder::new()
            .name("quarry-tracer".into())
            .spawn(move || tracer_main(command, cmd_rx, event_tx, spawn_tx, thread_state))
            .map_err(SpawnError::Spawn)?;

        match spawn_rx.recv() {
            Ok(Ok(pid)) => Ok(Self {
                cmd_tx,
                events: EventStream { rx: event_rx },
                state,
                pid,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(SpawnError::Spawn(std::io::Error::other(
                    "tracer thread terminated during spawn",
                )))
            }
        }
    }

    /// Enqueues a command and returns the handle to await it with.
    ///
    /// If the tracer thread is already gone, the handle resolves to
    /// [Error::TornDown] (the dropped completer publishes it).
    pub fn submit<T>(&self, make: impl FnOnce(Completer<T>) -> Cmd) -> JoinHandle<T> {
        let (done, handle) = completion_pair();
        let _ = self.cmd_tx.send(make(done));
        handle
    }

    pub fn state(&self) -> DebuggeeState {
        DebuggeeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn events(&self) -> EventStream {
        self.events.clone()
    }

    pub const fn pid(&self) -> Pid {
        self.pid
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Cmd::Shutdown);

        // unblock a tracer parked in waitpid; harmless if the child is
        // already gone or detached
        if !matches!(
            self.state(),
            DebuggeeState::Exited | DebuggeeState::Detached
        ) {
            let _ = kill(self.pid, Signal::SIGKILL);
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(pid = self.pid.as_raw(), "tracer thread panicked");
            }
        }
    }
}

#[tracing::instrument(name = "TracerThread", skip_all)]
fn tracer_main(
    command: Command,
    cmd_rx: Receiver<Cmd>,
    event_tx: Sender<DebugEvent>,
    spawn_tx: Sender<core::result::Result<Pid, SpawnError>>,
    state: Arc<AtomicU8>,
) {
    // the child must be spawned from this very thread: ptrace ties the
    // tracee to the thread that attached, for its whole lifetime
    let pid = match sys::spawn_debuggee(&command) {
        Ok(pid) => pid,
        Err(e) => {
            let _ = spawn_tx.send(Err(e));
            return;
        }
    };

    state.store(DebuggeeState::Stopped as u8, Ordering::Release);
    let _ = spawn_tx.send(Ok(pid));

    Tracer {
        pid,
        breakpoints: BreakpointTable::new(pid),
        pending_signal: None,
        pending_rearm: None,
        state,
        event_tx,
    }
    .run(cmd_rx);
}

struct Tracer {
    pid: Pid,

    /// Breakpoint table of the debuggee (tracer-thread private).
    breakpoints: BreakpointTable,

    /// Non-trap stop signal to re-inject at the next resume.
    pending_signal: Option<Signal>,

    /// Persistent breakpoint to re-patch at the next resume.
    pending_rearm: Option<u64>,

    /// State mirror read by caller threads.
    state: Arc<AtomicU8>,

    event_tx: Sender<DebugEvent>,
}

impl Tracer {
    fn run(mut self, cmd_rx: Receiver<Cmd>) {
        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                Cmd::Resume { mode, done } => match self.resume(mode) {
                    Ok(true) => {
                        done.fulfill(Ok(()));

                        // deliver the matching event before the next
                        // command runs, even under concurrent submission
                        if !self.wait_and_report() {
                            break;
                        }
                    }
                    Ok(false) => done.fulfill(Ok(())),
                    Err(e) => done.fulfill(Err(e)),
                },
                Cmd::GetRegisters { done } => done.fulfill(self.get_registers()),
                Cmd::SetRegisters { regs, done } => done.fulfill(self.set_registers(&regs)),
                Cmd::SetBreakpoint {
                    addr,
                    is_once,
                    done,
                } => done.fulfill(self.set_breakpoint(addr, is_once)),
                Cmd::RemoveBreakpoint { addr, done } => done.fulfill(self.remove_breakpoint(addr)),
                Cmd::ReadMemory { addr, len, done } => done.fulfill(self.read_memory(addr, len)),
                Cmd::WriteMemory { addr, data, done } => {
                    done.fulfill(self.write_memory(addr, &data));
                }
                Cmd::Detach { done } => {
                    let res = self.detach();
                    let detached = res.is_ok();
                    done.fulfill(res);

                    if detached {
                        // commands still queued resolve to `TornDown`
                        // when their completers are dropped
                        break;
                    }
                }
                Cmd::Shutdown => break,
            }
        }

        self.teardown();
    }

    fn current_state(&self) -> DebuggeeState {
        DebuggeeState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DebuggeeState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn ensure_stopped(&self) -> Result<()> {
        if self.current_state() == DebuggeeState::Stopped {
            Ok(())
        } else {
            Err(Error::NotStopped)
        }
    }

    fn report(&self, event: DebugEvent) {
        tracing::debug!(?event, "debug event");

        if self.event_tx.send(event).is_err() {
            tracing::warn!("debug event dropped: no consumer left");
        }
    }

    /// Resumes the debuggee.
    ///
    /// Returns `Ok(true)` if the debuggee is now running (a stop must be
    /// awaited), `Ok(false)` if it terminated during the re-arm step
    /// (the exit event was already reported).
    fn resume(&mut self, mode: ResumeMode) -> Result<bool> {
        self.ensure_stopped()?;

        // synchronous re-arm: step over the restored instruction, then
        // put the trap byte back before the real resume
        if let Some(addr) = self.pending_rearm.take() {
            sys::single_step(self.pid, None)?;

            match sys::wait_process(self.pid)? {
                WaitStatus::Stopped(_, Signal::SIGTRAP) => self.breakpoints.arm(addr)?,
                status => {
                    if let Some(event) = decode_exit(status) {
                        self.set_state(DebuggeeState::Exited);
                        self.report(event);
                        return Ok(false);
                    }

                    return Err(sys::Error::BadChildWait(status).into());
                }
            }
        }

        sys::resume_process(
            self.pid,
            self.pending_signal.take(),
            matches!(mode, ResumeMode::UntilSyscall),
        )?;

        self.set_state(DebuggeeState::Running);

        Ok(true)
    }

    /// Waits for the next stop and reports it.
    ///
    /// Returns `false` when the debuggee can no longer be awaited. The
    /// tracer then shuts down (killing a still-traced child), so a
    /// consumer blocked on the stream observes it closing instead of
    /// waiting forever for an event that cannot come.
    fn wait_and_report(&mut self) -> bool {
        match self.wait_for_debug_stop() {
            Ok(event) => {
                self.report(event);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "wait for debuggee stop");
                false
            }
        }
    }

    /// Waits for the next raw stop and decodes it into exactly one
    /// debug event.
    fn wait_for_debug_stop(&mut self) -> Result<DebugEvent> {
        let status = sys::wait_process(self.pid)?;

        if let Some(event) = decode_exit(status) {
            self.set_state(DebuggeeState::Exited);
            return Ok(event);
        }

        self.set_state(DebuggeeState::Stopped);

        match status {
            WaitStatus::Stopped(_, Signal::SIGTRAP) => self.decode_trap(),
            WaitStatus::Stopped(_, signal) => {
                // deliver the signal to the debuggee at the next resume
                self.pending_signal = Some(signal);
                Ok(DebugEvent::Stopped {
                    signal: signal as i32,
                })
            }
            WaitStatus::PtraceSyscall(_) => {
                let regs = sys::get_registers(self.pid)?;
                Ok(DebugEvent::Syscall { id: regs.orig_rax })
            }
            status => Err(sys::Error::BadChildWait(status).into()),
        }
    }

    fn decode_trap(&mut self) -> Result<DebugEvent> {
        let mut regs = sys::get_registers(self.pid)?;
        let trap_addr = regs.rip.wrapping_sub(TRAP_OPCODES.len() as u64);

        let Some(record) = self.breakpoints.handle_hit(trap_addr)? else {
            return Ok(DebugEvent::Stopped {
                signal: Signal::SIGTRAP as i32,
            });
        };

        // rewind: the debuggee must re-execute the patched instruction
        regs.rip = record.addr;
        sys::set_registers(self.pid, &regs)?;

        if !record.is_once {
            self.pending_rearm = Some(record.addr);
        }

        Ok(DebugEvent::Breakpoint(record))
    }

    fn get_registers(&self) -> Result<Registers> {
        self.ensure_stopped()?;
        sys::get_registers(self.pid).map_err(Into::into)
    }

    fn set_registers(&self, regs: &Registers) -> Result<()> {
        self.ensure_stopped()?;
        sys::set_registers(self.pid, regs).map_err(Into::into)
    }

    fn set_breakpoint(&mut self, addr: u64, is_once: bool) -> Result<()> {
        self.ensure_stopped()?;
        self.breakpoints.insert(addr, is_once)
    }

    fn remove_breakpoint(&mut self, addr: u64) -> Result<()> {
        self.ensure_stopped()?;
        self.breakpoints.remove(addr)
    }

    fn read_memory(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        self.ensure_stopped()?;

        let mut buf = vec![0u8; len];
        sys::mem::read_process_memory(self.pid, addr, &mut buf)?;

        Ok(buf)
    }

    fn write_memory(&self, addr: u64, data: &[u8]) -> Result<()> {
        self.ensure_stopped()?;
        sys::mem::write_process_memory(self.pid, addr, data).map_err(Into::into)
    }

    fn detach(&mut self) -> Result<()> {
        self.ensure_stopped()?;

        // the freed process must never fetch a trap byte of ours
        self.breakpoints.clear()?;
        self.pending_rearm = None;

        sys::detach_process(self.pid, self.pending_signal.take())?;
        self.set_state(DebuggeeState::Detached);

        Ok(())
    }

    fn teardown(&mut self) {
        if matches!(
            self.current_state(),
            DebuggeeState::Exited | DebuggeeState::Detached
        ) {
            return;
        }

        sys::kill_and_reap(self.pid);
        self.set_state(DebuggeeState::Exited);
    }
}

fn decode_exit(status: WaitStatus) -> Option<DebugEvent> {
    match status {
        WaitStatus::Exited(_, code) => Some(DebugEvent::Exited(ExitStatus::Code(code))),
        WaitStatus::Signaled(_, signal, _) => {
            Some(DebugEvent::Exited(ExitStatus::Signal(signal as i32)))
        }
        _ => None,
    }
}
