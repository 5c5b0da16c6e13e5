//! This crate provides the fixed-layout, C-compatible types exchanged
//! between the `quarry` debugging engine and out-of-process consumers
//! (e.g., foreign-language binding layers parsing raw snapshots).
//!
//! Field order and width are part of the compatibility contract: any
//! change here is a wire-format break. Layouts are locked by unit tests.
//!
//! The engine itself works with idiomatic Rust types
//! (`quarry_debugger::DebugEvent` and friends) and converts to these
//! records only at the boundary, so a tagged-union arm can never be read
//! with the wrong tag from safe code.

mod flags;

pub use self::flags::SpawnFlags;

/// Snapshot of the general-purpose, segment and flag registers of a
/// stopped x86-64 debuggee.
///
/// Field order matches the kernel's `user_regs_struct` (the order in
/// which `PTRACE_GETREGS` fills them), so a raw snapshot can be handed
/// to external tools byte-for-byte.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Registers {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub orig_rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    pub rsp: u64,
    pub ss: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

/// Wire form of a breakpoint record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBreakpoint {
    /// Virtual address the breakpoint is patched at.
    pub addr: u64,

    /// Whether the breakpoint is removed after its first hit.
    pub is_once: bool,

    /// Instruction byte that was overwritten by the trap opcode.
    pub original_byte: u8,
}

/// Wire form of a debug event: an integer tag plus a payload union
/// sized to the largest variant.
///
/// The payload is only reachable through tag-checked accessors, so the
/// undefined-read hazard of the equivalent C union does not exist on
/// the Rust side.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawEvent {
    tag: i32,
    payload: RawEventPayload,
}

#[repr(C)]
#[derive(Clone, Copy)]
union RawEventPayload {
    stop_code: i32,
    syscall_id: u64,
    breakpoint: RawBreakpoint,
}

impl RawEvent {
    /// Tag of an event caused by a signal stop.
    pub const TAG_STOP: i32 = 0;

    /// Tag of an event caused by a syscall boundary.
    pub const TAG_SYSCALL: i32 = 1;

    /// Tag of an event caused by a breakpoint hit.
    pub const TAG_BREAKPOINT: i32 = 2;

    /// Tag of an event reporting debuggee termination.
    pub const TAG_EXITED: i32 = 3;

    /// Creates a signal-stop event carrying the raw stop code.
    pub const fn stop(stop_code: i32) -> Self {
        Self {
            tag: Self::TAG_STOP,
            payload: RawEventPayload { stop_code },
        }
    }

    /// Creates a syscall-boundary event carrying the syscall id.
    pub const fn syscall(syscall_id: u64) -> Self {
        Self {
            tag: Self::TAG_SYSCALL,
            payload: RawEventPayload { syscall_id },
        }
    }

    /// Creates a breakpoint-hit event carrying the breakpoint record.
    pub const fn breakpoint(breakpoint: RawBreakpoint) -> Self {
        Self {
            tag: Self::TAG_BREAKPOINT,
            payload: RawEventPayload { breakpoint },
        }
    }

    /// Creates a termination event carrying the exit code.
    ///
    /// A debuggee killed by signal `N` is encoded as `128 + N`, the
    /// shell convention.
    pub const fn exited(exit_code: i32) -> Self {
        Self {
            tag: Self::TAG_EXITED,
            payload: RawEventPayload {
                stop_code: exit_code,
            },
        }
    }

    /// Returns the tag of this event.
    pub const fn tag(&self) -> i32 {
        self.tag
    }

    /// Returns the stop code, if this is a signal-stop event.
    pub const fn stop_code(&self) -> Option<i32> {
        if self.tag == Self::TAG_STOP {
            Some(unsafe { self.payload.stop_code })
        } else {
            None
        }
    }

    /// Returns the syscall id, if this is a syscall-boundary event.
    pub const fn syscall_id(&self) -> Option<u64> {
        if self.tag == Self::TAG_SYSCALL {
            Some(unsafe { self.payload.syscall_id })
        } else {
            None
        }
    }

    /// Returns the breakpoint record, if this is a breakpoint-hit event.
    pub const fn breakpoint_record(&self) -> Option<RawBreakpoint> {
        if self.tag == Self::TAG_BREAKPOINT {
            Some(unsafe { self.payload.breakpoint })
        } else {
            None
        }
    }

    /// Returns the exit code, if this is a termination event.
    pub const fn exit_code(&self) -> Option<i32> {
        if self.tag == Self::TAG_EXITED {
            Some(unsafe { self.payload.stop_code })
        } else {
            None
        }
    }
}

impl core::fmt::Debug for RawEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut s = f.debug_struct("RawEvent");
        s.field("tag", &self.tag);

        match self.tag {
            Self::TAG_STOP => s.field("stop_code", &self.stop_code()),
            Self::TAG_SYSCALL => s.field("syscall_id", &self.syscall_id()),
            Self::TAG_BREAKPOINT => s.field("breakpoint", &self.breakpoint_record()),
            Self::TAG_EXITED => s.field("exit_code", &self.exit_code()),
            _ => &mut s,
        }
        .finish()
    }
}
