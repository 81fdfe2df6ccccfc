use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::constants::FRAME_SIZE;
use crate::machine::HardwareThread;
use crate::memory::Memory;
use crate::mmu;

/// Write a diagnostic snapshot of the process occupying `thread` to
/// `<dir>/<pid>.txt`: the code segment, then the data segment, as
/// address/value lines. Each section stops at the first zero word, so only
/// the populated prefix is rendered.
pub fn dump_process(thread: &mut HardwareThread, mem: &mut Memory, dir: &Path) -> Result<()> {
    let (pid, code_base, data_base) = match &thread.process {
        Some(pcb) => (pcb.pid, pcb.mm.code, pcb.mm.data),
        None => return Ok(()),
    };

    fs::create_dir_all(dir)
        .with_context(|| format!("creating dump directory {}", dir.display()))?;
    let path = dir.join(format!("{}.txt", pid));
    let mut out = Vec::new();

    writeln!(out, ".text:")?;
    write_segment(&mut out, thread, mem, code_base)?;
    writeln!(out)?;
    writeln!(out, ".data:")?;
    write_segment(&mut out, thread, mem, data_base)?;

    fs::write(&path, out).with_context(|| format!("writing dump file {}", path.display()))?;
    Ok(())
}

fn write_segment(
    out: &mut Vec<u8>,
    thread: &mut HardwareThread,
    mem: &mut Memory,
    base: u32,
) -> Result<()> {
    for offset in 0..FRAME_SIZE as u32 {
        let address = base + offset;
        let word = mmu::fetch(thread, mem, address)?;
        if word == 0 {
            break;
        }
        writeln!(out, "x{:06x}: [{:08x}]", address, word)?;
    }
    Ok(())
}
