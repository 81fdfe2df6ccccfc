use std::fmt;
use std::time::Duration;

use crate::constants::*;
use crate::process::Pcb;
use crate::tlb::Tlb;

/// Configuration rejected at startup. All of these are operator mistakes,
/// not runtime conditions, so they abort before any thread is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    ClockRateOutOfRange(u32),
    ZeroDimension(&'static str),
    ZeroRate(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ClockRateOutOfRange(rate) => write!(
                f,
                "clock rate must be between {}Hz and {}Hz, got {}Hz",
                MIN_CLOCK_RATE, MAX_CLOCK_RATE, rate
            ),
            ConfigError::ZeroDimension(name) => {
                write!(f, "topology dimension '{}' must be at least 1", name)
            }
            ConfigError::ZeroRate(name) => write!(f, "rate '{}' must be at least 1Hz", name),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Machine parameters fixed for the lifetime of a simulation.
#[derive(Debug, Clone, Copy)]
pub struct MachineConfig {
    pub num_cpus: usize,
    pub cores_per_cpu: usize,
    pub threads_per_core: usize,
    /// Master pulse frequency in Hz.
    pub clock_rate: u32,
    /// Periodic schedule-pass frequency in Hz.
    pub scheduler_rate: u32,
    /// Process-generator frequency in Hz.
    pub generator_rate: u32,
    /// Quantum handed to every new process, in milliseconds.
    pub quantum_ms: u32,
}

impl MachineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock_rate < MIN_CLOCK_RATE || self.clock_rate > MAX_CLOCK_RATE {
            return Err(ConfigError::ClockRateOutOfRange(self.clock_rate));
        }
        if self.num_cpus == 0 {
            return Err(ConfigError::ZeroDimension("cpus"));
        }
        if self.cores_per_cpu == 0 {
            return Err(ConfigError::ZeroDimension("cores"));
        }
        if self.threads_per_core == 0 {
            return Err(ConfigError::ZeroDimension("threads"));
        }
        if self.scheduler_rate == 0 {
            return Err(ConfigError::ZeroRate("scheduler"));
        }
        if self.generator_rate == 0 {
            return Err(ConfigError::ZeroRate("generator"));
        }
        Ok(())
    }

    pub fn hardware_thread_count(&self) -> usize {
        self.num_cpus * self.cores_per_cpu * self.threads_per_core
    }

    /// Wall-clock duration of one pulse.
    pub fn pulse_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.clock_rate as u64)
    }

    /// Millisecond quantum expressed in pulses at the configured clock rate.
    pub fn quantum_pulses(&self, quantum_ms: u32) -> u32 {
        (quantum_ms as u64 * self.clock_rate as u64 / 1000) as u32
    }
}

/// One simulated execution lane. The fields other than `process` mirror the
/// live context of whichever process currently occupies the slot; they carry
/// no meaning while the slot is idle.
pub struct HardwareThread {
    pub process: Option<Pcb>,
    pub pc: u32,
    pub registers: [u32; REGISTER_COUNT],
    /// Page-table base register: kernel-memory address of the active table.
    pub ptbr: u32,
    /// Remaining quantum in pulses. Zero means eligible for preemption.
    pub quantum: u32,
    pub tlb: Tlb,
}

impl HardwareThread {
    pub fn new() -> Self {
        HardwareThread {
            process: None,
            pc: 0,
            registers: [0; REGISTER_COUNT],
            ptbr: 0,
            quantum: 0,
            tlb: Tlb::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.process.is_none()
    }
}

impl Default for HardwareThread {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Core {
    pub threads: Vec<HardwareThread>,
}

pub struct Cpu {
    pub cores: Vec<Core>,
}

/// Static CPU → core → hardware-thread grid. Built once from the config;
/// the simulation never hot-plugs lanes.
pub struct Topology {
    pub cpus: Vec<Cpu>,
}

impl Topology {
    pub fn new(config: &MachineConfig) -> Self {
        let cpus = (0..config.num_cpus)
            .map(|_| Cpu {
                cores: (0..config.cores_per_cpu)
                    .map(|_| Core {
                        threads: (0..config.threads_per_core)
                            .map(|_| HardwareThread::new())
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        Topology { cpus }
    }

    /// Hardware threads in topology order: cpu, then core, then thread.
    /// Both scheduler sweeps and the clock's execution sweep rely on this
    /// order being stable.
    pub fn threads_mut(&mut self) -> impl Iterator<Item = &mut HardwareThread> {
        self.cpus
            .iter_mut()
            .flat_map(|cpu| cpu.cores.iter_mut())
            .flat_map(|core| core.threads.iter_mut())
    }

    pub fn threads(&self) -> impl Iterator<Item = &HardwareThread> {
        self.cpus
            .iter()
            .flat_map(|cpu| cpu.cores.iter())
            .flat_map(|core| core.threads.iter())
    }

    pub fn occupied_count(&self) -> usize {
        self.threads().filter(|t| !t.is_idle()).count()
    }

    pub fn all_idle(&self) -> bool {
        self.threads().all(|t| t.is_idle())
    }
}
