use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Bounded store of accepted request bodies. When full, the oldest body is
/// dropped to make room.
#[derive(Debug)]
pub struct Inbox {
    capacity: usize,
    entries: Mutex<VecDeque<Vec<u8>>>,
}

impl Inbox {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, body: Vec<u8>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(body);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// All stored bodies, oldest first, separated by blank lines.
    pub fn dump(&self) -> String {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|body| String::from_utf8_lossy(body))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
