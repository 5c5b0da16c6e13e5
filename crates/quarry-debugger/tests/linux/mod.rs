mod utils;

use std::path::PathBuf;
use std::thread;

use quarry_debugger::{
    Command, DebugEvent, Debuggee, DebuggeeState, Error, ExitStatus, Registers,
};
use test_log::test;

fn base_dir() -> PathBuf {
    "tests/linux".to_owned().into()
}

#[test]
fn initial_stop_is_at_the_entry_point() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("exit7.c"));
    let entry = self::utils::entry_point(&tracee_path);

    let debuggee = Debuggee::start(Command::new(&*tracee_path).disable_aslr()).unwrap();
    assert_eq!(debuggee.state(), DebuggeeState::Stopped);

    let regs = debuggee.get_registers().join().unwrap();
    assert_eq!(regs.rip, entry);
}

#[test]
fn persistent_breakpoint_hits_on_every_pass() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("counter.c"));
    let tick = self::utils::symbol_addr(&tracee_path, "tick");

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();
    let events = debuggee.events();

    debuggee.set_breakpoint(tick, false).join().unwrap();

    let mut hits = 0;
    loop {
        debuggee.continue_execution().join().unwrap();

        match events.consume().unwrap() {
            DebugEvent::Breakpoint(record) => {
                assert_eq!(record.addr, tick);
                assert!(!record.is_once);
                hits += 1;
            }
            DebugEvent::Exited(status) => {
                assert_eq!(status, ExitStatus::Code(3));
                break;
            }
            event => panic!("unexpected event: {event:?}"),
        }
    }

    assert_eq!(hits, 3);
}

#[test]
fn one_shot_breakpoint_fires_exactly_once() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("counter.c"));
    let tick = self::utils::symbol_addr(&tracee_path, "tick");

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();
    let events = debuggee.events();

    debuggee.set_breakpoint(tick, true).join().unwrap();

    let mut hits = 0;
    loop {
        debuggee.continue_execution().join().unwrap();

        match events.consume().unwrap() {
            DebugEvent::Breakpoint(record) => {
                assert_eq!(record.addr, tick);
                assert!(record.is_once);
                hits += 1;

                // decoding the hit already removed the one-shot record
                assert_eq!(
                    debuggee.remove_breakpoint(tick).join(),
                    Err(Error::BreakpointNotFound(tick))
                );
            }
            DebugEvent::Exited(status) => {
                assert_eq!(status, ExitStatus::Code(3));
                break;
            }
            event => panic!("unexpected event: {event:?}"),
        }
    }

    assert_eq!(hits, 1);
}

#[test]
fn register_reads_while_running_are_rejected() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("spin.c"));

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();
    debuggee.continue_execution().join().unwrap();

    // the tracee never stops on its own, so the state stays `Running`
    assert_eq!(debuggee.state(), DebuggeeState::Running);

    let handle = debuggee.get_registers();
    assert!(handle.is_finished());
    assert_eq!(handle.join(), Err(Error::NotStopped));
}

#[test]
fn register_snapshots_are_immutable_and_writable() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("spin.c"));

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();

    let first = debuggee.get_registers().join().unwrap();
    let second = debuggee.get_registers().join().unwrap();
    assert_eq!(first, second);

    let patched = Registers {
        rdi: 0xdead_beef,
        ..first
    };
    debuggee.set_registers(patched).join().unwrap();

    let reread = debuggee.get_registers().join().unwrap();
    assert_eq!(reread.rdi, 0xdead_beef);
    assert_eq!(reread.rip, first.rip);

    // the earlier snapshot is unaffected by the write
    assert_eq!(first.rdi, second.rdi);
}

#[test]
fn removing_an_unknown_breakpoint_leaves_memory_untouched() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("spin.c"));
    let entry = self::utils::entry_point(&tracee_path);

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();

    let before = debuggee.read_memory(entry, 8).join().unwrap();

    assert_eq!(
        debuggee.remove_breakpoint(entry).join(),
        Err(Error::BreakpointNotFound(entry))
    );

    let after = debuggee.read_memory(entry, 8).join().unwrap();
    assert_eq!(before, after);
}

#[test]
fn duplicate_breakpoint_is_rejected() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("spin.c"));
    let entry = self::utils::entry_point(&tracee_path);

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();

    debuggee.set_breakpoint(entry, false).join().unwrap();
    assert_eq!(
        debuggee.set_breakpoint(entry, true).join(),
        Err(Error::DuplicateBreakpoint(entry))
    );
}

#[test]
fn unmapped_breakpoint_address_is_rejected() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("spin.c"));

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();

    assert_eq!(
        debuggee.set_breakpoint(0x10, false).join(),
        Err(Error::InvalidAddress(0x10))
    );
}

#[test]
fn memory_writes_are_read_back() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("spin.c"));
    let entry = self::utils::entry_point(&tracee_path);

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();

    let original = debuggee.read_memory(entry, 4).join().unwrap();
    assert_eq!(original.len(), 4);

    // text pages are patchable even though they are mapped read-only
    debuggee
        .write_memory(entry, vec![0x90; 4])
        .join()
        .unwrap();
    assert_eq!(debuggee.read_memory(entry, 4).join().unwrap(), [0x90; 4]);

    debuggee.write_memory(entry, original.clone()).join().unwrap();
    assert_eq!(debuggee.read_memory(entry, 4).join().unwrap(), original);
}

#[test]
fn syscall_stop_reports_the_syscall_id() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("exit7.c"));

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();
    let events = debuggee.events();

    assert_eq!(events.try_consume(), Ok(None));

    debuggee.continue_to_syscall().join().unwrap();
    assert_eq!(events.consume(), Ok(DebugEvent::Syscall { id: 60 }));

    debuggee.continue_execution().join().unwrap();
    assert_eq!(
        events.consume(),
        Ok(DebugEvent::Exited(ExitStatus::Code(7)))
    );
    assert_eq!(debuggee.state(), DebuggeeState::Exited);
}

#[test]
fn detached_debuggee_runs_free() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("spin.c"));

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();
    let events = debuggee.events();
    let pid = nix::unistd::Pid::from_raw(debuggee.pid() as i32);

    // a breakpoint must be unpatched by the detach
    let entry = self::utils::entry_point(&tracee_path);
    debuggee.set_breakpoint(entry, false).join().unwrap();

    debuggee.detach().unwrap();

    // the tracer thread is gone; its event channel is closed
    assert_eq!(events.consume(), Err(Error::StreamClosed));

    // the freed process is still alive, and no longer ours to trace
    nix::sys::signal::kill(pid, None).expect("freed process alive");
    nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL).expect("kill freed process");
}

#[test]
fn detach_while_running_is_rejected() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("spin.c"));

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();
    debuggee.continue_execution().join().unwrap();

    assert_eq!(debuggee.detach(), Err(Error::NotStopped));
}

#[test]
fn pending_commands_resolve_when_the_debuggee_is_dropped() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("spin.c"));
    let entry = self::utils::entry_point(&tracee_path);

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();
    debuggee.continue_execution().join().unwrap();

    // the tracer thread is parked in waitpid: this command sits queued
    let pending = debuggee.set_breakpoint(entry, false);

    drop(debuggee);

    // the command resolved (to an error) instead of hanging forever
    assert!(pending.join().is_err());
}

#[test]
fn detached_handles_are_fire_and_forget() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("counter.c"));
    let tick = self::utils::symbol_addr(&tracee_path, "tick");

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();
    let events = debuggee.events();

    // nobody joins, the command still executes
    debuggee.set_breakpoint(tick, true).detach();

    debuggee.continue_execution().join().unwrap();
    assert!(matches!(
        events.consume(),
        Ok(DebugEvent::Breakpoint(record)) if record.addr == tick
    ));
}

#[test]
fn concurrent_submissions_preserve_per_thread_order() {
    let tracee_path = self::utils::compile_tracee(&base_dir().join("spin.c"));
    let entry = self::utils::entry_point(&tracee_path);

    let debuggee = Debuggee::start(Command::new(&*tracee_path)).unwrap();
    let addrs: Vec<u64> = (0..8).map(|i| entry + i).collect();

    // each thread pipelines set/remove pairs at its own address before
    // joining either handle; a within-thread reordering would surface
    // as `DuplicateBreakpoint` or `BreakpointNotFound`, a lost
    // completion as a `join` that never returns
    thread::scope(|scope| {
        for &addr in &addrs {
            let debuggee = &debuggee;
            scope.spawn(move || {
                for _ in 0..16 {
                    let set = debuggee.set_breakpoint(addr, false);
                    let remove = debuggee.remove_breakpoint(addr);

                    set.join().unwrap();
                    remove.join().unwrap();
                }
            });
        }
    });
}
