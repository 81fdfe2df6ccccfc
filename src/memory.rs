use std::fmt;

use crate::constants::*;

/// Errors raised by the frame pools. Exhaustion is recoverable: the caller
/// decides whether to reject a load or tear down the faulting process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    OutOfUserFrames,
    OutOfKernelFrames,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OutOfUserFrames => write!(f, "no free frame in the user pool"),
            MemoryError::OutOfKernelFrames => write!(f, "no free frame in the kernel pool"),
        }
    }
}

impl std::error::Error for MemoryError {}

/// Bitmap over a fixed pool of equally sized frames. First-free scan;
/// no coalescing is needed since frames never split.
pub struct FramePool {
    used: Vec<bool>,
}

impl FramePool {
    pub fn new(frames: usize) -> Self {
        FramePool {
            used: vec![false; frames],
        }
    }

    /// Claim the first free slot. Returns `None` when the pool is exhausted.
    pub fn allocate(&mut self) -> Option<u8> {
        let slot = self.used.iter().position(|&u| !u)?;
        self.used[slot] = true;
        Some(slot as u8)
    }

    /// Return a slot to the pool. The backing storage is zeroed lazily on
    /// the next allocation, not here.
    pub fn deallocate(&mut self, frame: u8) {
        self.used[frame as usize] = false;
    }

    pub fn is_used(&self, frame: u8) -> bool {
        self.used[frame as usize]
    }

    pub fn free_count(&self) -> usize {
        self.used.iter().filter(|&&u| !u).count()
    }

    pub fn capacity(&self) -> usize {
        self.used.len()
    }
}

/// Simulated physical memory: a user region of 192 frames and a disjoint
/// kernel region of 64 frames, each a flat word array. Page tables live in
/// kernel frames; process code and data live in user frames.
pub struct Memory {
    user: Vec<u32>,
    kernel: Vec<u32>,
    user_pool: FramePool,
    kernel_pool: FramePool,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            user: vec![0u32; USER_MEMORY_WORDS],
            kernel: vec![0u32; KERNEL_MEMORY_WORDS],
            user_pool: FramePool::new(USER_FRAMES),
            kernel_pool: FramePool::new(KERNEL_FRAMES),
        }
    }

    /// Claim a user frame, zero-filled.
    pub fn allocate_frame(&mut self) -> Result<u8, MemoryError> {
        let frame = self
            .user_pool
            .allocate()
            .ok_or(MemoryError::OutOfUserFrames)?;
        let base = frame as usize * FRAME_SIZE;
        self.user[base..base + FRAME_SIZE].fill(0);
        Ok(frame)
    }

    /// Claim a kernel frame, zero-filled.
    pub fn allocate_kernel_frame(&mut self) -> Result<u8, MemoryError> {
        let frame = self
            .kernel_pool
            .allocate()
            .ok_or(MemoryError::OutOfKernelFrames)?;
        let base = frame as usize * FRAME_SIZE;
        self.kernel[base..base + FRAME_SIZE].fill(0);
        Ok(frame)
    }

    pub fn deallocate_frame(&mut self, frame: u8) {
        self.user_pool.deallocate(frame);
    }

    pub fn deallocate_kernel_frame(&mut self, frame: u8) {
        self.kernel_pool.deallocate(frame);
    }

    /// Read a word from user physical memory.
    #[inline]
    pub fn read(&self, physical: u32) -> u32 {
        self.user[physical as usize]
    }

    /// Write a word to user physical memory.
    #[inline]
    pub fn write(&mut self, physical: u32, word: u32) {
        self.user[physical as usize] = word;
    }

    #[inline]
    pub fn kernel_read(&self, address: u32) -> u32 {
        self.kernel[address as usize]
    }

    #[inline]
    pub fn kernel_write(&mut self, address: u32, word: u32) {
        self.kernel[address as usize] = word;
    }

    /// Allocate a kernel frame holding a fresh page table with every entry
    /// set to the unmapped sentinel. Returns the table's base address in
    /// kernel memory.
    pub fn new_page_table(&mut self) -> Result<u32, MemoryError> {
        let frame = self.allocate_kernel_frame()?;
        let base = (frame as u32) << PAGE_SHIFT;
        let start = base as usize;
        self.kernel[start..start + PAGE_TABLE_ENTRIES].fill(UNMAPPED);
        Ok(base)
    }

    #[inline]
    pub fn page_table_entry(&self, table_base: u32, page: u16) -> u32 {
        self.kernel[table_base as usize + page as usize]
    }

    #[inline]
    pub fn set_page_table_entry(&mut self, table_base: u32, page: u16, frame: u8) {
        self.kernel[table_base as usize + page as usize] = frame as u32;
    }

    pub fn free_user_frames(&self) -> usize {
        self.user_pool.free_count()
    }

    pub fn free_kernel_frames(&self) -> usize {
        self.kernel_pool.free_count()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_issues_unique_indices() {
        let mut pool = FramePool::new(8);
        let mut issued = Vec::new();
        for _ in 0..8 {
            let frame = pool.allocate().unwrap();
            assert!(!issued.contains(&frame), "frame {} issued twice", frame);
            issued.push(frame);
        }
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn test_pool_free_count_restored_after_full_drain() {
        let mut pool = FramePool::new(16);
        let frames: Vec<u8> = (0..16).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(pool.free_count(), 0);
        for frame in frames {
            pool.deallocate(frame);
        }
        assert_eq!(pool.free_count(), 16);
    }

    #[test]
    fn test_pool_reuses_lowest_free_slot() {
        let mut pool = FramePool::new(4);
        for _ in 0..4 {
            pool.allocate().unwrap();
        }
        pool.deallocate(2);
        pool.deallocate(1);
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn test_allocation_zeroes_frame() {
        let mut mem = Memory::new();
        let frame = mem.allocate_frame().unwrap();
        let base = (frame as u32) << PAGE_SHIFT;
        mem.write(base + 7, 0xDEAD_BEEF);
        mem.deallocate_frame(frame);

        // Deallocation leaves the words in place; the next allocation of the
        // same slot must hand them back zeroed.
        let again = mem.allocate_frame().unwrap();
        assert_eq!(again, frame);
        assert_eq!(mem.read(base + 7), 0);
    }

    #[test]
    fn test_user_pool_exhaustion_is_an_error() {
        let mut mem = Memory::new();
        for _ in 0..USER_FRAMES {
            mem.allocate_frame().unwrap();
        }
        assert_eq!(mem.allocate_frame(), Err(MemoryError::OutOfUserFrames));
        assert_eq!(mem.free_user_frames(), 0);
    }

    #[test]
    fn test_kernel_pool_is_disjoint_from_user_pool() {
        let mut mem = Memory::new();
        for _ in 0..KERNEL_FRAMES {
            mem.allocate_kernel_frame().unwrap();
        }
        assert_eq!(
            mem.allocate_kernel_frame(),
            Err(MemoryError::OutOfKernelFrames)
        );
        // Exhausting the kernel pool must not affect user allocations.
        assert_eq!(mem.free_user_frames(), USER_FRAMES);
        assert!(mem.allocate_frame().is_ok());
    }

    #[test]
    fn test_new_page_table_is_sentinel_filled() {
        let mut mem = Memory::new();
        let base = mem.new_page_table().unwrap();
        assert_eq!(mem.page_table_entry(base, 0), UNMAPPED);
        assert_eq!(mem.page_table_entry(base, u16::MAX), UNMAPPED);

        mem.set_page_table_entry(base, 3, 42);
        assert_eq!(mem.page_table_entry(base, 3), 42);
        assert_eq!(mem.page_table_entry(base, 4), UNMAPPED);
    }
}
