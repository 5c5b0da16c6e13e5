//! This crate implements a native process-debugging engine: it spawns a
//! child process under `ptrace` control, intercepts its execution via
//! software breakpoints and stop notifications, and exposes register and
//! memory state to a controller.
//!
//! # Tracer-thread affinity
//!
//! On Linux, every `ptrace` request against a tracee must originate from
//! the thread that established the tracing relationship. The engine
//! therefore runs one dedicated tracer thread per debuggee and models it
//! as an actor: the [Debuggee] handle submits commands over a channel,
//! the tracer thread executes them in submission order, and results come
//! back through [JoinHandle] completion tokens. Raw process stops are
//! decoded by the tracer thread into [DebugEvent]s and delivered on a
//! separate consumer channel (see [EventStream]).
//!
//! ```no_run
//! use quarry_debugger::{Command, DebugEvent, Debuggee};
//!
//! let debuggee = Debuggee::start(Command::new("/usr/bin/factor").arg("42")).unwrap();
//! let events = debuggee.events();
//!
//! debuggee.set_breakpoint(0x40_1000, false).join().unwrap();
//! debuggee.continue_execution().join().unwrap();
//!
//! match events.consume().unwrap() {
//!     DebugEvent::Breakpoint(record) => println!("hit {:#x}", record.addr),
//!     event => println!("{event:?}"),
//! }
//! ```

mod breakpoint;
mod command;
mod debuggee;
mod error;
mod event;
mod queue;
mod sys;
mod task;

pub use quarry_abi::{RawBreakpoint, RawEvent, Registers, SpawnFlags};

pub use self::breakpoint::BreakpointRecord;
pub use self::command::{Command, CommandEnv};
pub use self::debuggee::{Debuggee, DebuggeeState};
pub use self::error::{Error, Result, SpawnError};
pub use self::event::{DebugEvent, ExitStatus};
pub use self::queue::EventStream;
pub use self::task::JoinHandle;
