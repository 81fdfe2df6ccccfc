use crate::constants::REGISTER_COUNT;

pub type Pid = u32;

/// Process lifecycle. There is no blocked state: simulated programs are pure
/// CPU work, and a halting process is destroyed rather than parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    New,
    Ready,
    Running,
}

/// Virtual-memory layout of one process: segment base addresses (in words)
/// plus the kernel-memory base of its page table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap {
    pub code: u32,
    pub data: u32,
    pub page_table: u32,
}

/// Process control block. Owned by exactly one place at a time: the ready
/// queue or a hardware-thread slot. The saved program counter and registers
/// are authoritative only while the process is off-CPU; while it runs, the
/// live copies sit in the hardware thread.
#[derive(Debug)]
pub struct Pcb {
    pub pid: Pid,
    pub state: ProcessState,
    pub quantum_ms: u32,
    pub pc: u32,
    pub registers: [u32; REGISTER_COUNT],
    pub mm: MemoryMap,
}

impl Pcb {
    pub fn new(pid: Pid, quantum_ms: u32, mm: MemoryMap) -> Self {
        Pcb {
            pid,
            state: ProcessState::New,
            quantum_ms,
            pc: mm.code,
            registers: [0; REGISTER_COUNT],
            mm,
        }
    }
}
