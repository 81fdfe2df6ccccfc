use std::path::Path;

use log::{debug, error, warn};

use crate::dump;
use crate::machine::{HardwareThread, Topology};
use crate::memory::{Memory, MemoryError};
use crate::mmu;
use crate::process::Pid;

pub const OP_LOAD: u32 = 0;
pub const OP_STORE: u32 = 1;
pub const OP_ADD: u32 = 2;
pub const OP_HALT: u32 = 15;

/// What happened on one thread during one pulse.
enum Step {
    Ran,
    Halted,
}

/// What happened across the whole topology during one pulse.
#[derive(Debug, Default)]
pub struct PulseOutcome {
    pub executed: usize,
    /// Processes that reached their halt instruction this pulse.
    pub completed: Vec<Pid>,
    /// Processes killed by a demand-paging failure this pulse.
    pub faulted: Vec<Pid>,
}

impl PulseOutcome {
    pub fn any_terminated(&self) -> bool {
        !self.completed.is_empty() || !self.faulted.is_empty()
    }
}

/// Fetch, decode, and execute one instruction on `thread`.
///
/// Instruction word layout: opcode in bits 31..28, register operand in bits
/// 27..24, byte address in bits 23..0 (converted to a word address). The
/// add opcode packs its second and third registers into bits 23..20 and
/// 19..16. An opcode outside the four defined ones executes as a no-op
/// with a diagnostic; the pc still advances and the quantum is still
/// charged.
fn execute_instruction(thread: &mut HardwareThread, mem: &mut Memory) -> Result<Step, MemoryError> {
    let pc = thread.pc;
    thread.pc = thread.pc.wrapping_add(1);
    let instr = mmu::fetch(thread, mem, pc)?;

    let opcode = instr >> 28;
    match opcode {
        OP_LOAD => {
            let reg = ((instr >> 24) & 0xF) as usize;
            let address = (instr & 0xFF_FFFF) / 4;
            thread.registers[reg] = mmu::fetch(thread, mem, address)?;
        }
        OP_STORE => {
            let reg = ((instr >> 24) & 0xF) as usize;
            let address = (instr & 0xFF_FFFF) / 4;
            mmu::store(thread, mem, address, thread.registers[reg])?;
        }
        OP_ADD => {
            let r1 = ((instr >> 24) & 0xF) as usize;
            let r2 = ((instr >> 20) & 0xF) as usize;
            let r3 = ((instr >> 16) & 0xF) as usize;
            thread.registers[r1] = thread.registers[r2].wrapping_add(thread.registers[r3]);
        }
        OP_HALT => return Ok(Step::Halted),
        _ => {
            if let Some(pcb) = &thread.process {
                warn!(
                    "clock: pid {} unknown opcode {:#x} at pc {:#x}, treated as no-op",
                    pcb.pid, opcode, pc
                );
            }
        }
    }
    Ok(Step::Ran)
}

/// Release everything the process on `thread` owns and free the slot.
fn retire_process(thread: &mut HardwareThread, mem: &mut Memory) {
    mmu::release_page_table(mem, thread.ptbr);
    thread.process = None;
    thread.tlb.clear();
    thread.quantum = 0;
}

/// One master pulse: execute a single instruction on every occupied hardware
/// thread in topology order, charging one quantum pulse each. Halting
/// processes are dumped (when a dump directory is configured) and their
/// memory released; a demand-paging failure kills the faulting process but
/// leaves the rest of the machine running.
pub fn run_pulse(
    topology: &mut Topology,
    mem: &mut Memory,
    dump_dir: Option<&Path>,
) -> PulseOutcome {
    let mut outcome = PulseOutcome::default();

    for thread in topology.threads_mut() {
        let Some(pcb) = &thread.process else { continue };
        let pid = pcb.pid;
        debug!("clock: pid {} executing at pc {:#x}", pid, thread.pc);

        match execute_instruction(thread, mem) {
            Ok(Step::Ran) => {
                outcome.executed += 1;
                thread.quantum = thread.quantum.saturating_sub(1);
            }
            Ok(Step::Halted) => {
                outcome.executed += 1;
                debug!("clock: pid {} halted", pid);
                if let Some(dir) = dump_dir {
                    if let Err(err) = dump::dump_process(thread, mem, dir) {
                        error!("clock: dump of pid {} failed: {:#}", pid, err);
                    }
                }
                retire_process(thread, mem);
                outcome.completed.push(pid);
            }
            Err(err) => {
                error!("clock: pid {} killed: {}", pid, err);
                retire_process(thread, mem);
                outcome.faulted.push(pid);
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::machine::MachineConfig;
    use crate::process::{MemoryMap, Pcb};
    use crate::scheduler::{self, ReadyQueue};

    pub fn encode_load(reg: u32, byte_address: u32) -> u32 {
        (OP_LOAD << 28) | (reg << 24) | byte_address
    }

    pub fn encode_store(reg: u32, byte_address: u32) -> u32 {
        (OP_STORE << 28) | (reg << 24) | byte_address
    }

    pub fn encode_add(r1: u32, r2: u32, r3: u32) -> u32 {
        (OP_ADD << 28) | (r1 << 24) | (r2 << 20) | (r3 << 16)
    }

    pub fn encode_halt() -> u32 {
        OP_HALT << 28
    }

    fn config() -> MachineConfig {
        MachineConfig {
            num_cpus: 1,
            cores_per_cpu: 1,
            threads_per_core: 1,
            clock_rate: 1000,
            scheduler_rate: 100,
            generator_rate: 10,
            quantum_ms: 10,
        }
    }

    /// Build a thread running a process whose code segment holds `program`.
    fn loaded_thread(mem: &mut Memory, program: &[u32]) -> HardwareThread {
        let mut thread = HardwareThread::new();
        let table = mem.new_page_table().unwrap();
        thread.ptbr = table;
        for (i, &word) in program.iter().enumerate() {
            mmu::store(&mut thread, mem, i as u32, word).unwrap();
        }
        thread.tlb.clear();
        let pcb = Pcb::new(
            1,
            10,
            MemoryMap {
                code: 0,
                data: 0x10000,
                page_table: table,
            },
        );
        let mut queue = ReadyQueue::new();
        scheduler::assign(&config(), &mut queue, &mut thread, pcb);
        thread
    }

    #[test]
    fn test_load_opcode() {
        let mut mem = Memory::new();
        // Data word at va 0x10000 (byte address 0x40000).
        let mut thread = loaded_thread(&mut mem, &[encode_load(3, 0x4_0000)]);
        mmu::store(&mut thread, &mut mem, 0x10000, 1234).unwrap();

        assert!(matches!(
            execute_instruction(&mut thread, &mut mem),
            Ok(Step::Ran)
        ));
        assert_eq!(thread.registers[3], 1234);
        assert_eq!(thread.pc, 1);
    }

    #[test]
    fn test_store_opcode() {
        let mut mem = Memory::new();
        let mut thread = loaded_thread(&mut mem, &[encode_store(5, 0x4_0004)]);
        thread.registers[5] = 0xAB;

        execute_instruction(&mut thread, &mut mem).unwrap();
        assert_eq!(mmu::fetch(&mut thread, &mut mem, 0x10001).unwrap(), 0xAB);
    }

    #[test]
    fn test_add_opcode_uses_three_distinct_registers() {
        let mut mem = Memory::new();
        let mut thread = loaded_thread(&mut mem, &[encode_add(1, 2, 3)]);
        thread.registers[2] = 40;
        thread.registers[3] = 2;

        execute_instruction(&mut thread, &mut mem).unwrap();
        assert_eq!(thread.registers[1], 42);

        // Addition wraps rather than trapping.
        thread.pc = 0;
        thread.registers[2] = u32::MAX;
        thread.registers[3] = 2;
        execute_instruction(&mut thread, &mut mem).unwrap();
        assert_eq!(thread.registers[1], 1);
    }

    #[test]
    fn test_unknown_opcode_is_a_noop() {
        let mut mem = Memory::new();
        let mut thread = loaded_thread(&mut mem, &[(7 << 28) | 0xBEEF]);
        let registers = thread.registers;

        assert!(matches!(
            execute_instruction(&mut thread, &mut mem),
            Ok(Step::Ran)
        ));
        assert_eq!(thread.registers, registers);
        assert_eq!(thread.pc, 1);
    }

    #[test]
    fn test_halt_releases_process_memory() {
        let mut mem = Memory::new();
        let mut topo = Topology::new(&config());
        let thread = loaded_thread(&mut mem, &[encode_halt()]);
        topo.cpus[0].cores[0].threads[0] = thread;

        let outcome = run_pulse(&mut topo, &mut mem, None);
        assert_eq!(outcome.completed, vec![1]);
        assert!(outcome.faulted.is_empty());

        let thread = topo.threads().next().unwrap();
        assert!(thread.is_idle());
        assert!(thread.tlb.is_empty());
        assert_eq!(mem.free_user_frames(), USER_FRAMES);
        assert_eq!(mem.free_kernel_frames(), KERNEL_FRAMES);
    }

    #[test]
    fn test_pulse_charges_quantum_and_counts_execution() {
        let mut mem = Memory::new();
        let mut topo = Topology::new(&config());
        let thread = loaded_thread(&mut mem, &[encode_add(0, 0, 0), encode_add(0, 0, 0)]);
        let quantum = thread.quantum;
        topo.cpus[0].cores[0].threads[0] = thread;

        let outcome = run_pulse(&mut topo, &mut mem, None);
        assert_eq!(outcome.executed, 1);
        assert!(!outcome.any_terminated());
        let thread = topo.threads().next().unwrap();
        assert_eq!(thread.quantum, quantum - 1);
        assert_eq!(thread.pc, 1);
    }

    #[test]
    fn test_idle_threads_are_skipped() {
        let mut mem = Memory::new();
        let mut topo = Topology::new(&config());
        let outcome = run_pulse(&mut topo, &mut mem, None);
        assert_eq!(outcome.executed, 0);
        assert!(!outcome.any_terminated());
    }

    #[test]
    fn test_paging_failure_kills_only_the_faulting_process() {
        let mut mem = Memory::new();
        let mut topo = Topology::new(&config());
        // Loading from a fresh page demands a frame; drain the pool first.
        let thread = loaded_thread(&mut mem, &[encode_load(0, 0x8_0000)]);
        while mem.allocate_frame().is_ok() {}
        topo.cpus[0].cores[0].threads[0] = thread;

        let outcome = run_pulse(&mut topo, &mut mem, None);
        assert_eq!(outcome.faulted, vec![1]);
        assert!(topo.threads().next().unwrap().is_idle());
    }
}
