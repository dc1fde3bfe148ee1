use std::collections::VecDeque;
use std::sync::Mutex;

use super::Id;

/// Source of fresh ids for ingested transactions and new accounts.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> Id;
}

#[derive(Debug, Clone, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn new_id(&self) -> Id {
        Id::new()
    }
}

/// Hands out a pre-seeded sequence, then falls back to `{prefix}-{n}`.
#[derive(Debug, Default)]
pub struct FixedIdGenerator {
    ids: Mutex<VecDeque<Id>>,
    issued: Mutex<usize>,
}

impl FixedIdGenerator {
    pub fn new(ids: impl IntoIterator<Item = Id>) -> Self {
        Self {
            ids: Mutex::new(ids.into_iter().collect()),
            issued: Mutex::new(0),
        }
    }
}

impl IdGenerator for FixedIdGenerator {
    fn new_id(&self) -> Id {
        let mut issued = self.issued.lock().expect("id counter lock poisoned");
        *issued += 1;
        self.ids
            .lock()
            .expect("fixed id generator lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Id::from_string(format!("id-{}", *issued)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_generator_drains_seed_then_counts() {
        let ids = FixedIdGenerator::new([Id::from_string("txn-a")]);
        assert_eq!(ids.new_id().as_str(), "txn-a");
        assert_eq!(ids.new_id().as_str(), "id-2");
        assert_eq!(ids.new_id().as_str(), "id-3");
    }
}
