use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::debug;

use crate::constants::*;
use crate::machine::MachineConfig;
use crate::memory::{Memory, MemoryError};
use crate::process::{MemoryMap, Pcb, Pid};

/// Parsed process image: a code segment and a data segment of 32-bit words.
///
/// Text encoding: `.text <hex byte offset>`, `.data <hex byte offset>`, then
/// whitespace-separated hexadecimal words — code words up to the data
/// offset, data words to end of input. A malformed image rejects that load
/// only; the simulation keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    pub text_offset: u32,
    pub data_offset: u32,
    pub code: Vec<u32>,
    pub data: Vec<u32>,
}

impl ProgramImage {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading program image {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut tokens = content.split_whitespace();

        let text_offset = section_offset(&mut tokens, ".text")?;
        let data_offset = section_offset(&mut tokens, ".data")?;
        if data_offset < text_offset {
            bail!(
                "data offset {:#x} precedes text offset {:#x}",
                data_offset,
                text_offset
            );
        }
        if (data_offset - text_offset) % 4 != 0 {
            bail!("segment boundary {:#x} is not word-aligned", data_offset);
        }

        let code_words = ((data_offset - text_offset) / 4) as usize;
        let mut code = Vec::with_capacity(code_words);
        for _ in 0..code_words {
            let token = tokens
                .next()
                .context("truncated code segment: word stream ended early")?;
            code.push(parse_word(token)?);
        }

        let mut data = Vec::new();
        for token in tokens {
            data.push(parse_word(token)?);
        }

        if code.len() > FRAME_SIZE || data.len() > FRAME_SIZE {
            bail!("segment larger than one frame ({} words)", FRAME_SIZE);
        }

        Ok(ProgramImage {
            text_offset,
            data_offset,
            code,
            data,
        })
    }
}

fn section_offset<'a>(tokens: &mut impl Iterator<Item = &'a str>, name: &str) -> Result<u32> {
    let label = tokens
        .next()
        .with_context(|| format!("missing {} header", name))?;
    if label != name {
        bail!("expected {} header, found '{}'", name, label);
    }
    let token = tokens
        .next()
        .with_context(|| format!("missing {} offset", name))?;
    parse_word(token).with_context(|| format!("bad {} offset", name))
}

fn parse_word(token: &str) -> Result<u32> {
    u32::from_str_radix(token, 16).with_context(|| format!("invalid hexadecimal word '{}'", token))
}

/// Builds processes from parsed images: one kernel frame for the page
/// table, one pre-mapped user frame each for code and data, and a PCB
/// carrying the configured quantum. Pids are monotonic from 1.
pub struct Loader {
    next_pid: Pid,
}

impl Loader {
    pub fn new() -> Self {
        Loader { next_pid: 1 }
    }

    pub fn build_process(
        &mut self,
        image: &ProgramImage,
        config: &MachineConfig,
        mem: &mut Memory,
    ) -> Result<Pcb, MemoryError> {
        let page_table = mem.new_page_table()?;

        let code_frame = match mem.allocate_frame() {
            Ok(frame) => frame,
            Err(err) => {
                mem.deallocate_kernel_frame((page_table >> PAGE_SHIFT) as u8);
                return Err(err);
            }
        };
        let data_frame = match mem.allocate_frame() {
            Ok(frame) => frame,
            Err(err) => {
                mem.deallocate_frame(code_frame);
                mem.deallocate_kernel_frame((page_table >> PAGE_SHIFT) as u8);
                return Err(err);
            }
        };

        // Code occupies page 0, data page 1; both mapped up front so the
        // first instructions never page-fault.
        mem.set_page_table_entry(page_table, 0, code_frame);
        mem.set_page_table_entry(page_table, 1, data_frame);

        let code_base = (code_frame as u32) << PAGE_SHIFT;
        for (i, &word) in image.code.iter().enumerate() {
            mem.write(code_base + i as u32, word);
        }
        let data_base = (data_frame as u32) << PAGE_SHIFT;
        for (i, &word) in image.data.iter().enumerate() {
            mem.write(data_base + i as u32, word);
        }

        let pid = self.next_pid;
        self.next_pid += 1;
        debug!("loader: built pid {} ({} code words, {} data words)",
            pid, image.code.len(), image.data.len());

        Ok(Pcb::new(
            pid,
            config.quantum_ms,
            MemoryMap {
                code: 0,
                data: 1 << PAGE_SHIFT,
                page_table,
            },
        ))
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
