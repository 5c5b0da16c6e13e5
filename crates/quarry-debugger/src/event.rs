use quarry_abi::RawEvent;

use crate::breakpoint::BreakpointRecord;

/// How the debuggee terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The debuggee exited normally with the given code.
    Code(i32),

    /// The debuggee was terminated by the given signal.
    Signal(i32),
}

/// Event decoded by the tracer thread from a raw debuggee stop.
///
/// Events are immutable snapshots; consumers pull them from an
/// [EventStream](crate::EventStream) in the order the stops occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEvent {
    /// The debuggee stopped on a signal.
    Stopped {
        /// Raw stop code (signal number).
        signal: i32,
    },

    /// The debuggee stopped at a syscall boundary.
    Syscall {
        /// Syscall id (the `orig_rax` value at the boundary).
        id: u64,
    },

    /// The debuggee hit a software breakpoint.
    ///
    /// For a one-shot breakpoint, the record was already removed as
    /// part of decoding: this event is the only time it fires.
    Breakpoint(BreakpointRecord),

    /// The debuggee terminated; no further event follows.
    Exited(ExitStatus),
}

impl DebugEvent {
    /// Converts this event to its C-compatible wire form.
    pub fn to_raw(&self) -> RawEvent {
        match *self {
            Self::Stopped { signal } => RawEvent::stop(signal),
            Self::Syscall { id } => RawEvent::syscall(id),
            Self::Breakpoint(record) => RawEvent::breakpoint(record.to_raw()),
            Self::Exited(ExitStatus::Code(code)) => RawEvent::exited(code),
            Self::Exited(ExitStatus::Signal(signal)) => RawEvent::exited(128 + signal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_match_variants() {
        let ev = DebugEvent::Stopped { signal: 19 }.to_raw();
        assert_eq!(ev.tag(), RawEvent::TAG_STOP);
        assert_eq!(ev.stop_code(), Some(19));

        let ev = DebugEvent::Syscall { id: 60 }.to_raw();
        assert_eq!(ev.tag(), RawEvent::TAG_SYSCALL);
        assert_eq!(ev.syscall_id(), Some(60));

        let record = BreakpointRecord {
            addr: 0x40_1000,
            is_once: false,
            original_byte: 0x55,
        };
        let ev = DebugEvent::Breakpoint(record).to_raw();
        assert_eq!(ev.tag(), RawEvent::TAG_BREAKPOINT);
        assert_eq!(ev.breakpoint_record(), Some(record.to_raw()));

        let ev = DebugEvent::Exited(ExitStatus::Signal(9)).to_raw();
        assert_eq!(ev.tag(), RawEvent::TAG_EXITED);
        assert_eq!(ev.exit_code(), Some(137));
    }
}
