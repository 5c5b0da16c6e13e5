use std::path::Path;
use std::process::Command;

pub fn compile_tracee(src_path: &Path) -> tempfile::TempPath {
    let out_file = tempfile::NamedTempFile::new().expect("tempfile");

    let mut gcc = Command::new("gcc");
    gcc.arg(src_path)
        .arg("-o")
        .arg(out_file.path())
        .arg("-nostdlib")
        .arg("-static")
        .arg("-no-pie")
        .arg("-fno-stack-protector")
        .arg("-g");

    println!("running: {gcc:?}");

    let gcc = gcc.output().expect("gcc");

    if !gcc.status.success() {
        let msg = String::from_utf8_lossy(&gcc.stderr);
        panic!("{msg}");
    }

    out_file.into_temp_path()
}

pub fn entry_point(tracee_path: &Path) -> u64 {
    let bytes = std::fs::read(tracee_path).expect("read tracee");
    goblin::elf::Elf::parse(&bytes).expect("parse tracee").entry
}

pub fn symbol_addr(tracee_path: &Path, name: &str) -> u64 {
    let bytes = std::fs::read(tracee_path).expect("read tracee");
    let elf = goblin::elf::Elf::parse(&bytes).expect("parse tracee");

    elf.syms
        .iter()
        .find(|sym| elf.strtab.get_at(sym.st_name) == Some(name))
        .map(|sym| sym.st_value)
        .unwrap_or_else(|| panic!("symbol not found: {name}"))
}
