pub mod clock;
pub mod constants;
pub mod dump;
pub mod kernel;
pub mod loader;
pub mod machine;
pub mod memory;
pub mod mmu;
pub mod process;
pub mod scheduler;
pub mod sync;
pub mod timer;
pub mod tlb;

// Re-export commonly used items for convenience
pub use kernel::{Kernel, SimulationReport};
pub use loader::ProgramImage;
pub use machine::MachineConfig;
