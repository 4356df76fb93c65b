use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Decides when panes need a busy re-evaluation.
///
/// Any number of chunks between two frames collapse into one evaluation at
/// the next tick, and each pane also gets a single delayed re-check after its
/// most recent chunk.
#[derive(Debug)]
pub struct RecheckScheduler<K> {
    dirty: HashSet<K>,
    deadlines: HashMap<K, Instant>,
    delay: Duration,
}

impl<K: Eq + Hash + Clone> RecheckScheduler<K> {
    pub fn new(delay: Duration) -> Self {
        Self {
            dirty: HashSet::new(),
            deadlines: HashMap::new(),
            delay,
        }
    }

    /// Something happened on `key`: evaluate on the next tick and again after the delay.
    pub fn touch(&mut self, key: K, now: Instant) {
        self.deadlines.insert(key.clone(), now + self.delay);
        self.dirty.insert(key);
    }

    /// Only schedule the delayed re-check, e.g. while a pane still looks busy.
    pub fn defer(&mut self, key: K, now: Instant) {
        self.deadlines.insert(key, now + self.delay);
    }

    pub fn forget(&mut self, key: &K) {
        self.dirty.remove(key);
        self.deadlines.remove(key);
    }

    /// Keys to evaluate now, each at most once.
    pub fn due(&mut self, now: Instant) -> Vec<K> {
        let mut due: HashSet<K> = self.dirty.drain().collect();
        self.deadlines.retain(|key, deadline| {
            if *deadline <= now {
                due.insert(key.clone());
                false
            } else {
                true
            }
        });
        due.into_iter().collect()
    }
}
