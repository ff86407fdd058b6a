//! Process-unique menu item identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier of a menu item (separators and submenu items included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u32);

impl ItemId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Monotonic identifier source. Identifiers are never handed out twice.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocates the next identifier. The first call returns `0`.
    pub(crate) fn allocate(&self) -> ItemId {
        ItemId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of identifiers handed out so far.
    #[cfg(test)]
    pub(crate) fn issued(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn first_id_is_zero() {
        let ids = IdAllocator::new();
        assert_eq!(ids.allocate(), ItemId::new(0));
        assert_eq!(ids.allocate(), ItemId::new(1));
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn concurrent_allocation_is_unique() {
        let ids = Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..500).map(|_| ids.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {id} handed out twice");
            }
        }
        assert_eq!(seen.len(), 8 * 500);
    }
}
