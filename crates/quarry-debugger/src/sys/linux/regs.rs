use nix::libc::user_regs_struct;
use nix::sys::ptrace;
use nix::unistd::Pid;

use quarry_abi::Registers;

/// Captures the register file of the (stopped) debuggee.
pub fn get_registers(pid: Pid) -> crate::sys::Result<Registers> {
    ptrace::getregs(pid)
        .map(from_user_regs)
        .map_err(Into::into)
}

/// Overwrites the register file of the (stopped) debuggee.
pub fn set_registers(pid: Pid, regs: &Registers) -> crate::sys::Result<()> {
    ptrace::setregs(pid, to_user_regs(regs)).map_err(Into::into)
}

fn from_user_regs(regs: user_regs_struct) -> Registers {
    Registers {
        r15: regs.r15,
        r14: regs.r14,
        r13: regs.r13,
        r12: regs.r12,
        rbp: regs.rbp,
        rbx: regs.rbx,
        r11: regs.r11,
        r10: regs.r10,
        r9: regs.r9,
        r8: regs.r8,
        rax: regs.rax,
        rcx: regs.rcx,
        rdx: regs.rdx,
        rsi: regs.rsi,
        rdi: regs.rdi,
        orig_rax: regs.orig_rax,
        rip: regs.rip,
        cs: regs.cs,
        eflags: regs.eflags,
        rsp: regs.rsp,
        ss: regs.ss,
        fs_base: regs.fs_base,
        gs_base: regs.gs_base,
        ds: regs.ds,
        es: regs.es,
        fs: regs.fs,
        gs: regs.gs,
    }
}

fn to_user_regs(regs: &Registers) -> user_regs_struct {
    user_regs_struct {
        r15: regs.r15,
        r14: regs.r14,
        r13: regs.r13,
        r12: regs.r12,
        rbp: regs.rbp,
        rbx: regs.rbx,
        r11: regs.r11,
        r10: regs.r10,
        r9: regs.r9,
        r8: regs.r8,
        rax: regs.rax,
        rcx: regs.rcx,
        rdx: regs.rdx,
        rsi: regs.rsi,
        rdi: regs.rdi,
        orig_rax: regs.orig_rax,
        rip: regs.rip,
        cs: regs.cs,
        eflags: regs.eflags,
        rsp: regs.rsp,
        ss: regs.ss,
        fs_base: regs.fs_base,
        gs_base: regs.gs_base,
        ds: regs.ds,
        es: regs.es,
        fs: regs.fs,
        gs: regs.gs,
    }
}
