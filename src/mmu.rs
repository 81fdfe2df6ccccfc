use log::debug;

use crate::constants::*;
use crate::machine::HardwareThread;
use crate::memory::{Memory, MemoryError};

/// Decomposed components of a virtual address: high 16 bits select the page,
/// low 16 bits the word within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub raw: u32,
    pub page: u16,
    pub offset: u32,
}

impl VirtualAddress {
    pub fn from_raw(raw: u32) -> Self {
        VirtualAddress {
            raw,
            page: (raw >> PAGE_SHIFT) as u16,
            offset: raw & OFFSET_MASK,
        }
    }
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VA({:#x}) = (page={}, offset={:#x})",
            self.raw, self.page, self.offset
        )
    }
}

/// Translate a virtual address in the context of a hardware thread.
///
/// TLB first; on a miss, walk the page table at the thread's PTBR. An
/// unmapped page is demand-allocated on first touch (no pre-paging), which
/// is the only fallible step: the user pool may be dry.
pub fn translate(
    thread: &mut HardwareThread,
    mem: &mut Memory,
    virtual_address: u32,
) -> Result<u32, MemoryError> {
    let va = VirtualAddress::from_raw(virtual_address);

    if let Some(frame) = thread.tlb.lookup(va.page) {
        return Ok(((frame as u32) << PAGE_SHIFT) | va.offset);
    }

    let entry = mem.page_table_entry(thread.ptbr, va.page);
    let frame = if entry == UNMAPPED {
        let frame = mem.allocate_frame()?;
        mem.set_page_table_entry(thread.ptbr, va.page, frame);
        frame
    } else {
        entry as u8
    };

    thread.tlb.insert(va.page, frame);
    Ok(((frame as u32) << PAGE_SHIFT) | va.offset)
}

/// Read one word through the MMU.
pub fn fetch(
    thread: &mut HardwareThread,
    mem: &mut Memory,
    virtual_address: u32,
) -> Result<u32, MemoryError> {
    let physical = translate(thread, mem, virtual_address)?;
    if let Some(pcb) = &thread.process {
        debug!(
            "mmu: pid {} read va {:#x} -> pa {:#x}",
            pcb.pid, virtual_address, physical
        );
    }
    Ok(mem.read(physical))
}

/// Write one word through the MMU.
pub fn store(
    thread: &mut HardwareThread,
    mem: &mut Memory,
    virtual_address: u32,
    word: u32,
) -> Result<(), MemoryError> {
    let physical = translate(thread, mem, virtual_address)?;
    if let Some(pcb) = &thread.process {
        debug!(
            "mmu: pid {} write va {:#x} -> pa {:#x}",
            pcb.pid, virtual_address, physical
        );
    }
    mem.write(physical, word);
    Ok(())
}

/// Tear down a terminated process's page table: return every mapped user
/// frame to the pool, then the kernel frame holding the table itself. Walks
/// all 65536 entries regardless of how sparse the table is.
pub fn release_page_table(mem: &mut Memory, table_base: u32) {
    for page in 0..PAGE_TABLE_ENTRIES {
        let entry = mem.page_table_entry(table_base, page as u16);
        if entry != UNMAPPED {
            mem.deallocate_frame(entry as u8);
        }
    }
    mem.deallocate_kernel_frame((table_base >> PAGE_SHIFT) as u8);
}
