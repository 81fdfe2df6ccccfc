use std::collections::VecDeque;

use log::debug;

use crate::machine::{HardwareThread, MachineConfig, Topology};
use crate::process::{Pcb, ProcessState};

/// FIFO of processes awaiting a hardware thread. The queue owns its PCBs
/// outright; assignment moves a PCB into a thread slot and preemption moves
/// it back, so a process lives in exactly one place at any instant.
#[derive(Default)]
pub struct ReadyQueue {
    queue: VecDeque<Pcb>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        ReadyQueue {
            queue: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, pcb: Pcb) {
        self.queue.push_back(pcb);
    }

    pub fn dequeue(&mut self) -> Option<Pcb> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pcb> {
        self.queue.iter()
    }
}

/// Save the incumbent's live context back into its PCB and return it to the
/// tail of the ready queue. The TLB is cleared so the next occupant cannot
/// see stale translations.
pub fn expel(thread: &mut HardwareThread, queue: &mut ReadyQueue) {
    let Some(mut pcb) = thread.process.take() else {
        return;
    };
    pcb.pc = thread.pc;
    pcb.registers = thread.registers;
    pcb.state = ProcessState::Ready;
    thread.tlb.clear();
    debug!("scheduler: pid {} preempted", pcb.pid);
    queue.enqueue(pcb);
}

/// Dispatch a process onto a hardware thread, expelling any incumbent first.
/// The quantum budget is converted from milliseconds to pulses here, at the
/// moment of dispatch.
pub fn assign(
    config: &MachineConfig,
    queue: &mut ReadyQueue,
    thread: &mut HardwareThread,
    mut pcb: Pcb,
) {
    if thread.process.is_some() {
        expel(thread, queue);
    }

    thread.pc = pcb.pc;
    thread.registers = pcb.registers;
    thread.ptbr = pcb.mm.page_table;
    thread.quantum = config.quantum_pulses(pcb.quantum_ms);
    pcb.state = ProcessState::Running;
    debug!(
        "scheduler: pid {} dispatched with {} pulse quantum",
        pcb.pid, thread.quantum
    );
    thread.process = Some(pcb);
}

/// One schedule pass over the whole topology.
///
/// Sweep 1 fills idle threads; sweep 2 replaces threads whose quantum has
/// expired, but only while the ready queue still holds work. A thread with
/// an expired quantum and nothing queued keeps running: keeping the lane
/// busy beats strict fairness here. Both sweeps bail out the instant the
/// queue drains.
pub fn schedule_pass(config: &MachineConfig, queue: &mut ReadyQueue, topology: &mut Topology) {
    for thread in topology.threads_mut() {
        if thread.is_idle() {
            let Some(pcb) = queue.dequeue() else { return };
            assign(config, queue, thread, pcb);
        }
    }

    for thread in topology.threads_mut() {
        if queue.is_empty() {
            return;
        }
        if !thread.is_idle() && thread.quantum == 0 {
            let Some(pcb) = queue.dequeue() else { return };
            assign(config, queue, thread, pcb);
        }
    }
}

/// Loader entry point: take ownership of a freshly built process, mark it
/// ready, and try to place it without waiting for the next periodic tick.
pub fn add_new_task(
    config: &MachineConfig,
    queue: &mut ReadyQueue,
    topology: &mut Topology,
    mut pcb: Pcb,
) {
    debug!("scheduler: pid {} enqueued", pcb.pid);
    pcb.state = ProcessState::Ready;
    queue.enqueue(pcb);
    schedule_pass(config, queue, topology);
}
