use nix::errno::Errno;
use nix::libc::{iovec, process_vm_readv};
use nix::sys::ptrace;
use nix::unistd::Pid;

/// Reads memory from the debuggee.
pub fn read_process_memory(pid: Pid, addr: u64, buf: &mut [u8]) -> crate::sys::Result<()> {
    let local_iov = iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };

    let remote_iov = iovec {
        iov_base: addr as *mut _,
        iov_len: buf.len(),
    };

    let len = unsafe {
        Errno::result(process_vm_readv(
            pid.as_raw(),
            &local_iov as *const _,
            1,
            &remote_iov as *const _,
            1,
            0,
        ))
        .inspect_err(
            |e| tracing::error!(error = %e, addr = format_args!("{addr:#x}"), "process_vm_readv"),
        )
        .map(|len| len as usize)?
    };

    if len != buf.len() {
        Err(crate::sys::Error::PartialMemOp(len, buf.len()))
    } else {
        Ok(())
    }
}

/// Writes memory into the debuggee.
///
/// Goes through `PTRACE_POKEDATA` rather than `process_vm_writev`, so
/// that read-only text pages (where breakpoints land) can be patched.
pub fn write_process_memory(pid: Pid, addr: u64, buf: &[u8]) -> crate::sys::Result<()> {
    let mut data_to_write = buf.chunks_exact(size_of::<u64>());

    let mut write_addr = addr;

    for chunk in &mut data_to_write {
        let Ok(data) = chunk.try_into().map(i64::from_le_bytes) else {
            unreachable!("chunk should be 8 bytes long");
        };

        ptrace::write(pid, write_addr as *mut _, data)
            .inspect_err(|e| tracing::error!(error = %e, addr = format_args!("{write_addr:#x}"), "ptrace(PTRACE_POKE_DATA)"))?;

        write_addr += chunk.len() as u64;
    }

    let remainder = data_to_write.remainder();

    if !remainder.is_empty() {
        let mut old_data = ptrace::read(pid, write_addr as *mut _)
            .inspect_err(|e| tracing::error!(error = %e, addr = format_args!("{write_addr:#x}"), "ptrace(PTRACE_PEEK_DATA)"))?
            .to_le_bytes();

        for (old, new) in old_data.iter_mut().zip(remainder) {
            *old = *new;
        }

        let new_data = i64::from_le_bytes(old_data);

        ptrace::write(pid, write_addr as *mut _, new_data)
            .inspect_err(|e| tracing::error!(error = %e, addr = format_args!("{write_addr:#x}"), "ptrace(PTRACE_POKE_DATA)"))?;
    }

    Ok(())
}
