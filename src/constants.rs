pub const PAGE_SHIFT: u32 = 16;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
pub const OFFSET_MASK: u32 = (1 << PAGE_SHIFT) - 1;

pub const FRAME_SIZE: usize = PAGE_SIZE;
pub const USER_FRAMES: usize = 192;
pub const KERNEL_FRAMES: usize = 64;

pub const USER_MEMORY_WORDS: usize = USER_FRAMES * FRAME_SIZE;
pub const KERNEL_MEMORY_WORDS: usize = KERNEL_FRAMES * FRAME_SIZE;

/// Entries in one page table (a 32-bit VA has a 16-bit page number).
/// A table exactly fills one kernel frame.
pub const PAGE_TABLE_ENTRIES: usize = 1 << PAGE_SHIFT;

/// Page-table entry meaning "no frame mapped yet".
pub const UNMAPPED: u32 = u32::MAX;

pub const TLB_SIZE: usize = 32;
pub const REGISTER_COUNT: usize = 16;

pub const MIN_CLOCK_RATE: u32 = 1;
pub const MAX_CLOCK_RATE: u32 = 1_000_000_000;

pub const MAX_TIMERS: usize = 8;
