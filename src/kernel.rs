use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use log::{error, info};

use crate::clock;
use crate::loader::{Loader, ProgramImage};
use crate::machine::{ConfigError, MachineConfig, Topology};
use crate::memory::Memory;
use crate::process::Pcb;
use crate::scheduler::{self, ReadyQueue};
use crate::sync::{Latch, Signal};
use crate::timer::TimerSet;

/// Counters reported once the simulation stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationReport {
    pub pulses: u64,
    pub completed: u32,
    pub faulted: u32,
    pub rejected: u32,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pulses, {} completed, {} faulted, {} rejected",
            self.pulses, self.completed, self.faulted, self.rejected
        )
    }
}

/// Shared context for the four simulation units (clock, timer, scheduler,
/// loader). Replaces the original design's module-level globals: every
/// shared structure sits behind its own explicit mutex.
///
/// Lock order: `queue` before `topology` before `memory`. Every code path
/// acquiring more than one of them follows that order.
pub struct Kernel {
    config: MachineConfig,
    dump_dir: Option<PathBuf>,
    max_pulses: Option<u64>,

    queue: Mutex<ReadyQueue>,
    topology: Mutex<Topology>,
    memory: Mutex<Memory>,

    /// Clock -> timer, one permit per master pulse.
    pulse: Signal,
    /// Run requests for the scheduler (from the timer and from halts).
    scheduler_run: Signal,
    /// Run requests for the loader (from the timer).
    loader_run: Signal,

    timer_ready: Latch,
    scheduler_ready: Latch,
    loader_ready: Latch,

    shutdown: AtomicBool,
    loader_done: AtomicBool,

    pulses: AtomicU64,
    completed: AtomicU32,
    faulted: AtomicU32,
    rejected: AtomicU32,
}

impl Kernel {
    pub fn new(
        config: MachineConfig,
        dump_dir: Option<PathBuf>,
        max_pulses: Option<u64>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Arc::new(Kernel {
            config,
            dump_dir,
            max_pulses,
            queue: Mutex::new(ReadyQueue::new()),
            topology: Mutex::new(Topology::new(&config)),
            memory: Mutex::new(Memory::new()),
            pulse: Signal::new(),
            scheduler_run: Signal::new(),
            loader_run: Signal::new(),
            timer_ready: Latch::new(),
            scheduler_ready: Latch::new(),
            loader_ready: Latch::new(),
            shutdown: AtomicBool::new(false),
            loader_done: AtomicBool::new(false),
            pulses: AtomicU64::new(0),
            completed: AtomicU32::new(0),
            faulted: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
        }))
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Hand a fully built process to the scheduler and try to place it at
    /// once, without waiting for the next periodic tick.
    pub fn add_new_task(&self, pcb: Pcb) {
        let mut queue = self.queue.lock().unwrap();
        let mut topology = self.topology.lock().unwrap();
        scheduler::add_new_task(&self.config, &mut queue, &mut topology, pcb);
    }

    /// Run the simulation to completion: spawn the four units, wait for
    /// them all to finish, and report.
    pub fn run(self: &Arc<Self>, images: Vec<ProgramImage>) -> Result<SimulationReport> {
        info!(
            "kernel: starting {} cpu(s) x {} core(s) x {} thread(s) at {}Hz",
            self.config.num_cpus,
            self.config.cores_per_cpu,
            self.config.threads_per_core,
            self.config.clock_rate
        );

        let clock_handle = {
            let kernel = Arc::clone(self);
            thread::Builder::new()
                .name("clock".into())
                .spawn(move || kernel.clock_main())
                .context("spawning clock thread")?
        };
        let timer_handle = {
            let kernel = Arc::clone(self);
            thread::Builder::new()
                .name("timer".into())
                .spawn(move || kernel.timer_main())
                .context("spawning timer thread")?
        };
        let scheduler_handle = {
            let kernel = Arc::clone(self);
            thread::Builder::new()
                .name("scheduler".into())
                .spawn(move || kernel.scheduler_main())
                .context("spawning scheduler thread")?
        };
        let loader_handle = {
            let kernel = Arc::clone(self);
            thread::Builder::new()
                .name("loader".into())
                .spawn(move || kernel.loader_main(images))
                .context("spawning loader thread")?
        };

        for handle in [clock_handle, timer_handle, scheduler_handle, loader_handle] {
            if handle.join().is_err() {
                error!("kernel: a simulation thread panicked");
            }
        }

        let report = SimulationReport {
            pulses: self.pulses.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            faulted: self.faulted.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
        };
        info!("kernel: simulation finished: {}", report);
        Ok(report)
    }

    /// Master clock and execution engine. Blocks until the other three
    /// units have initialized, then drives one pulse per interval.
    fn clock_main(&self) {
        self.timer_ready.wait();
        self.scheduler_ready.wait();
        self.loader_ready.wait();
        info!("clock: all units initialized, pulsing begins");

        let interval = self.config.pulse_interval();
        loop {
            self.pulse.notify();

            let outcome = {
                let mut topology = self.topology.lock().unwrap();
                let mut memory = self.memory.lock().unwrap();
                clock::run_pulse(&mut topology, &mut memory, self.dump_dir.as_deref())
            };
            let pulses = self.pulses.fetch_add(1, Ordering::SeqCst) + 1;
            self.completed
                .fetch_add(outcome.completed.len() as u32, Ordering::SeqCst);
            self.faulted
                .fetch_add(outcome.faulted.len() as u32, Ordering::SeqCst);

            // A halt frees a lane; let the scheduler refill it now rather
            // than at the next periodic tick.
            if outcome.any_terminated() {
                self.scheduler_run.notify();
            }

            if let Some(max) = self.max_pulses {
                if pulses >= max {
                    info!("clock: pulse limit {} reached", max);
                    break;
                }
            }
            if self.machine_drained() {
                info!("clock: no work left, stopping");
                break;
            }

            thread::sleep(interval);
        }
        self.initiate_shutdown();
    }

    /// True once no process exists anywhere and none can still arrive.
    fn machine_drained(&self) -> bool {
        if !self.loader_done.load(Ordering::SeqCst) {
            return false;
        }
        let queue = self.queue.lock().unwrap();
        let topology = self.topology.lock().unwrap();
        queue.is_empty() && topology.all_idle()
    }

    fn initiate_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.pulse.notify();
        self.scheduler_run.notify();
        self.loader_run.notify();
    }

    /// Timer multiplexer: derives the scheduler and process-generator
    /// events from the master pulse by pulse counting.
    fn timer_main(self: &Arc<Self>) {
        let mut timers = TimerSet::new(self.config.clock_rate);
        let kernel = Arc::clone(self);
        timers.register(self.config.scheduler_rate, move || {
            kernel.scheduler_run.notify();
        });
        let kernel = Arc::clone(self);
        timers.register(self.config.generator_rate, move || {
            kernel.loader_run.notify();
        });

        self.timer_ready.set();
        loop {
            self.pulse.wait();
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            timers.pulse();
        }
    }

    /// Scheduler unit: one schedule pass per run request.
    fn scheduler_main(&self) {
        self.scheduler_ready.set();
        loop {
            self.scheduler_run.wait();
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let mut queue = self.queue.lock().unwrap();
            let mut topology = self.topology.lock().unwrap();
            scheduler::schedule_pass(&self.config, &mut queue, &mut topology);
        }
    }

    /// Loader unit: builds one process per generator tick until the image
    /// list is exhausted, then reports itself done.
    fn loader_main(&self, images: Vec<ProgramImage>) {
        let mut loader = Loader::new();
        self.loader_ready.set();

        for image in images {
            self.loader_run.wait();
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }

            let built = {
                let mut memory = self.memory.lock().unwrap();
                loader.build_process(&image, &self.config, &mut memory)
            };
            match built {
                Ok(pcb) => self.add_new_task(pcb),
                Err(err) => {
                    error!("loader: load rejected: {}", err);
                    self.rejected.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        info!("loader: image list exhausted");
        self.loader_done.store(true, Ordering::SeqCst);
    }
}
