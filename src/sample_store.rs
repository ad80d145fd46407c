use crate::audio_data::ConvertedSample;
use crate::handle::SampleId;
use std::collections::HashMap;

/// Owner of every converted sample, keyed by [`SampleId`].
///
/// Only the control side touches the store. Tracks keep their own shared
/// reference to a buffer, so removing an entry here does not free it while
/// a slot still holds it.
#[derive(Debug)]
pub struct SampleStore {
    samples: HashMap<SampleId, ConvertedSample>,
    next_id: u64,
}

impl SampleStore {
    pub fn new() -> Self {
        Self {
            samples: HashMap::new(),
            next_id: 1,
        }
    }

    /// Stores `sample` under a fresh id.
    pub fn insert(&mut self, sample: ConvertedSample) -> SampleId {
        let id = SampleId(self.next_id);
        self.next_id += 1;
        self.samples.insert(id, sample);
        id
    }

    pub fn get(&self, id: SampleId) -> Option<&ConvertedSample> {
        self.samples.get(&id)
    }

    pub fn remove(&mut self, id: SampleId) -> Option<ConvertedSample> {
        self.samples.remove(&id)
    }

    pub fn contains(&self, id: SampleId) -> bool {
        self.samples.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_never_reused() {
        let mut store = SampleStore::new();
        let a = store.insert(ConvertedSample::new(vec![1], 1));
        let b = store.insert(ConvertedSample::new(vec![2], 1));
        assert_eq!(a.as_raw(), 1);
        assert_eq!(b.as_raw(), 2);

        assert!(store.remove(a).is_some());
        assert!(store.remove(a).is_none());
        let c = store.insert(ConvertedSample::new(vec![3], 1));
        assert_eq!(c.as_raw(), 3);
        assert!(!store.contains(a));
        assert!(store.contains(b));
        assert!(store.contains(c));
        assert_eq!(store.len(), 2);
    }
}
