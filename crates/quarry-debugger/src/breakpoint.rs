use std::collections::HashMap;

use nix::unistd::Pid;

use quarry_abi::RawBreakpoint;

use crate::error::{Error, Result};
use crate::sys;

/// Trap opcode patched over the original instruction byte (x86 `int3`).
pub(crate) const TRAP_OPCODES: [u8; 1] = [0xcc];

/// Snapshot of a breakpoint registered in the debuggee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointRecord {
    /// Virtual address the breakpoint is patched at.
    pub addr: u64,

    /// Whether the breakpoint is removed after its first hit.
    pub is_once: bool,

    /// Instruction byte that was overwritten by the trap opcode.
    pub original_byte: u8,
}

impl BreakpointRecord {
    /// Converts this record to its C-compatible wire form.
    pub fn to_raw(&self) -> RawBreakpoint {
        RawBreakpoint {
            addr: self.addr,
            is_once: self.is_once,
            original_byte: self.original_byte,
        }
    }
}

/// Breakpoint table of one debuggee, owned by its tracer thread.
///
/// A record exists for an address iff the byte there currently holds
/// the trap opcode, with one exception: between a persistent
/// breakpoint's hit and its re-arm at the next resume, the original
/// byte is in place while the record stays in the table (the debuggee
/// must step through its own instruction before the trap goes back in).
pub(crate) struct BreakpointTable {
    bks: HashMap<u64, BreakpointRecord>,
    pid: Pid,
}

impl BreakpointTable {
    pub fn new(pid: Pid) -> Self {
        Self {
            bks: HashMap::new(),
            pid,
        }
    }

    /// Saves the original byte at `addr` and patches in the trap opcode.
    pub fn insert(&mut self, addr: u64, is_once: bool) -> Result<()> {
        if self.bks.contains_key(&addr) {
            return Err(Error::DuplicateBreakpoint(addr));
        }

        let mut original = [0u8; TRAP_OPCODES.len()];
        sys::mem::read_process_memory(self.pid, addr, &mut original)
            .map_err(|_| Error::InvalidAddress(addr))?;

        sys::mem::write_process_memory(self.pid, addr, &TRAP_OPCODES)
            .map_err(|_| Error::InvalidAddress(addr))?;

        self.bks.insert(
            addr,
            BreakpointRecord {
                addr,
                is_once,
                original_byte: original[0],
            },
        );

        tracing::debug!(addr = format_args!("{addr:#x}"), is_once, "breakpoint set");

        Ok(())
    }

    /// Restores the original byte at `addr` and drops the record.
    ///
    /// A failed call (no record) leaves the debuggee's memory untouched.
    pub fn remove(&mut self, addr: u64) -> Result<()> {
        let record = *self
            .bks
            .get(&addr)
            .ok_or(Error::BreakpointNotFound(addr))?;

        sys::mem::write_process_memory(self.pid, addr, &[record.original_byte])?;
        self.bks.remove(&addr);

        tracing::debug!(addr = format_args!("{addr:#x}"), "breakpoint removed");

        Ok(())
    }

    /// Handles a trap at `addr`: restores the original byte and, for a
    /// one-shot breakpoint, drops the record as part of decoding.
    ///
    /// Returns the record snapshot, or `None` if the trap was not ours.
    pub fn handle_hit(&mut self, addr: u64) -> Result<Option<BreakpointRecord>> {
        let Some(record) = self.bks.get(&addr).copied() else {
            return Ok(None);
        };

        sys::mem::write_process_memory(self.pid, addr, &[record.original_byte])?;

        if record.is_once {
            self.bks.remove(&addr);
        }

        tracing::debug!(
            addr = format_args!("{addr:#x}"),
            is_once = record.is_once,
            "breakpoint hit"
        );

        Ok(Some(record))
    }

    /// Re-patches the trap opcode at `addr`, if its record still exists.
    ///
    /// The record may have been removed between the hit and the re-arm;
    /// in that case the original byte stays in place.
    pub fn arm(&mut self, addr: u64) -> Result<()> {
        if self.bks.contains_key(&addr) {
            sys::mem::write_process_memory(self.pid, addr, &TRAP_OPCODES)?;
        }

        Ok(())
    }

    /// Restores every patched byte (used before detaching, so the freed
    /// process never fetches a trap opcode of ours).
    pub fn clear(&mut self) -> Result<()> {
        let mut first_err = None;

        for (addr, record) in self.bks.drain() {
            if let Err(e) =
                sys::mem::write_process_memory(self.pid, addr, &[record.original_byte])
            {
                tracing::error!(error = %e, addr = format_args!("{addr:#x}"), "restore breakpoint");
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), |e| Err(e.into()))
    }
}
