//! Eviction Order Module
//!
//! Tracks which key is next in line for eviction when the store is full.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

// == Eviction Policy ==
/// Decides what moves a key to the "newest" end of the eviction queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Only writes move a key; reads never save an entry from eviction.
    #[default]
    Fifo,
    /// Writes and successful reads both move a key.
    Lru,
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "lru" => Ok(Self::Lru),
            other => Err(format!("unknown eviction policy '{}'", other)),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fifo => write!(f, "fifo"),
            Self::Lru => write!(f, "lru"),
        }
    }
}

// == Order Tracker ==
/// Keeps keys in eviction order.
///
/// Keys are stored in a VecDeque where:
/// - Front = newest
/// - Back = next to evict
#[derive(Debug, Default)]
pub struct OrderTracker {
    policy: EvictionPolicy,
    order: VecDeque<String>,
}

impl OrderTracker {
    // == Constructor ==
    /// Creates an empty tracker for the given policy.
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            order: VecDeque::new(),
        }
    }

    /// Returns the policy this tracker follows.
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    // == Record Insert ==
    /// Marks a key as freshly written (moves it to the front).
    pub fn record_insert(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    // == Record Read ==
    /// Notes a successful read. Moves the key only under LRU.
    pub fn record_read(&mut self, key: &str) {
        if self.policy == EvictionPolicy::Lru && self.contains(key) {
            self.record_insert(key);
        }
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    // == Evict Oldest ==
    /// Returns and removes the next eviction candidate.
    pub fn evict_oldest(&mut self) -> Option<String> {
        self.order.pop_back()
    }

    /// Keys from next-to-evict to newest.
    pub fn keys_oldest_first(&self) -> Vec<String> {
        self.order.iter().rev().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }
}
