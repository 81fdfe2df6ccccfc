use crate::constants::TLB_SIZE;

/// One cached translation: virtual page number to user frame index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TlbEntry {
    page: u16,
    frame: u8,
}

/// Per-hardware-thread translation cache. Fixed capacity, entries unique by
/// page number, replaced in pure FIFO order (the vector front is always the
/// oldest entry). Must be cleared whenever the thread's assigned process
/// changes, or translations would leak between processes.
#[derive(Debug, Default)]
pub struct Tlb {
    entries: Vec<TlbEntry>,
}

impl Tlb {
    pub fn new() -> Self {
        Tlb {
            entries: Vec::with_capacity(TLB_SIZE),
        }
    }

    /// Linear search, front to back.
    pub fn lookup(&self, page: u16) -> Option<u8> {
        self.entries
            .iter()
            .find(|e| e.page == page)
            .map(|e| e.frame)
    }

    /// Cache a translation. A page already present is updated in place,
    /// keeping its age; a full cache evicts the oldest entry first.
    pub fn insert(&mut self, page: u16, frame: u8) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.page == page) {
            entry.frame = frame;
            return;
        }
        if self.entries.len() == TLB_SIZE {
            self.entries.remove(0);
        }
        self.entries.push(TlbEntry { page, frame });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_hit_and_miss() {
        let mut tlb = Tlb::new();
        tlb.insert(5, 9);
        assert_eq!(tlb.lookup(5), Some(9));
        assert_eq!(tlb.lookup(6), None);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut tlb = Tlb::new();
        for page in 0..100u16 {
            tlb.insert(page, (page % 100) as u8);
            assert!(tlb.len() <= TLB_SIZE);
        }
        assert_eq!(tlb.len(), TLB_SIZE);
    }

    #[test]
    fn test_fifo_evicts_exactly_the_oldest() {
        let mut tlb = Tlb::new();
        for page in 0..TLB_SIZE as u16 {
            tlb.insert(page, page as u8);
        }
        // The 33rd distinct page pushes out page 0 and only page 0.
        tlb.insert(TLB_SIZE as u16, 77);
        assert_eq!(tlb.lookup(0), None);
        for page in 1..=TLB_SIZE as u16 {
            assert!(tlb.lookup(page).is_some(), "page {} was evicted", page);
        }
    }

    #[test]
    fn test_reinsert_keeps_entries_unique() {
        let mut tlb = Tlb::new();
        tlb.insert(7, 1);
        tlb.insert(7, 2);
        assert_eq!(tlb.len(), 1);
        assert_eq!(tlb.lookup(7), Some(2));
    }

    #[test]
    fn test_clear_empties_the_cache() {
        let mut tlb = Tlb::new();
        tlb.insert(1, 1);
        tlb.insert(2, 2);
        tlb.clear();
        assert!(tlb.is_empty());
        assert_eq!(tlb.lookup(1), None);
    }
}
