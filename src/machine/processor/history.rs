use std::collections::VecDeque;

/// Undo stack of pre-step snapshots.
///
/// With a limit, the stack behaves as a ring buffer: pushing onto a full
/// stack drops the oldest entry.
#[derive(Clone, Debug)]
pub(super) struct History<T> {
    entries: VecDeque<T>,
    limit: Option<usize>,
}

impl<T> History<T> {
    pub(super) fn new(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    pub(super) fn push(&mut self, entry: T) {
        if let Some(limit) = self.limit {
            if limit == 0 {
                return;
            }
            while self.entries.len() >= limit {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(entry);
    }

    /// Removes and returns the most recent entry.
    pub(super) fn pop(&mut self) -> Option<T> {
        self.entries.pop_back()
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}
