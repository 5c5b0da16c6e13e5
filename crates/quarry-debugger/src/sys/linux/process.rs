use std::io;
use std::os::unix::process::CommandExt;

use nix::errno::Errno;
use nix::sys::personality::{self, Persona};
use nix::sys::ptrace;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

use quarry_abi::SpawnFlags;

/// Spawns a new child process in debug-mode and waits for its initial
/// exec stop.
///
/// Must be called from the thread that will issue every subsequent
/// `ptrace` request against the child.
pub fn spawn_debuggee(
    command: &crate::command::Command,
) -> core::result::Result<Pid, crate::SpawnError> {
    let mut cmd = std::process::Command::new(&command.program);
    cmd.args(&command.args);

    if let Some(env) = command.env.captured() {
        cmd.env_clear();
        cmd.envs(env);
    }

    if let Some(ref dir) = command.current_dir {
        cmd.current_dir(dir);
    }

    let disable_aslr = command.flags.contains(SpawnFlags::DISABLE_ASLR);

    // `rust-std` spawns with `fork`+`exec` whenever a `pre_exec` closure
    // is set, so `traceme` runs in the child right before `execve`.
    unsafe {
        cmd.pre_exec(move || {
            if disable_aslr {
                let persona = personality::get().map_err(errno_to_io)?;
                personality::set(persona | Persona::ADDR_NO_RANDOMIZE).map_err(errno_to_io)?;
            }

            ptrace::traceme().map_err(errno_to_io)
        })
    };

    let child = cmd.spawn()?;
    let pid = Pid::from_raw(child.id() as i32);

    if let Err(e) = wait_for_attach(pid) {
        kill_and_reap(pid);
        return Err(e.into());
    }

    tracing::debug!(pid = pid.as_raw(), "debuggee spawned");

    Ok(pid)
}

fn wait_for_attach(pid: Pid) -> crate::sys::Result<()> {
    let status = waitpid(pid, None)?;

    if !matches!(status, WaitStatus::Stopped(_, Signal::SIGTRAP)) {
        return Err(crate::sys::Error::BadChildWait(status));
    }

    ptrace::setoptions(
        pid,
        ptrace::Options::PTRACE_O_TRACESYSGOOD | ptrace::Options::PTRACE_O_EXITKILL,
    )?;

    Ok(())
}

fn errno_to_io(e: Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

/// Blocks until the debuggee changes state.
pub fn wait_process(pid: Pid) -> crate::sys::Result<WaitStatus> {
    waitpid(pid, None).map_err(Into::into)
}

/// Resumes the debuggee, optionally stopping at the next syscall
/// boundary, re-injecting `signal` if one is pending.
pub fn resume_process(
    pid: Pid,
    signal: Option<Signal>,
    stop_at_syscall: bool,
) -> crate::sys::Result<()> {
    if stop_at_syscall {
        ptrace::syscall(pid, signal)?;
    } else {
        ptrace::cont(pid, signal)?;
    }

    Ok(())
}

/// Executes a single instruction of the debuggee.
pub fn single_step(pid: Pid, signal: Option<Signal>) -> crate::sys::Result<()> {
    ptrace::step(pid, signal).map_err(Into::into)
}

/// Detaches from the debuggee, leaving it running.
pub fn detach_process(pid: Pid, signal: Option<Signal>) -> crate::sys::Result<()> {
    ptrace::detach(pid, signal)?;

    tracing::debug!(pid = pid.as_raw(), "debuggee detached");

    Ok(())
}

/// Kills the debuggee (if still alive) and reaps it.
pub fn kill_and_reap(pid: Pid) {
    match kill(pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => (),
        Err(e) => tracing::error!(error = %e, pid = pid.as_raw(), "kill"),
    }

    match waitpid(pid, None) {
        Ok(_) => tracing::debug!(pid = pid.as_raw(), "debuggee killed"),
        Err(Errno::ECHILD) => (),
        Err(e) => tracing::error!(error = %e, pid = pid.as_raw(), "waitpid"),
    }
}
