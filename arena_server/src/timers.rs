//! Deferred one-shot operations.
//!
//! Invulnerability expiry, takeoff locks, and planet removal are scheduled,
//! cancellable timers keyed by entity id. They fire on the simulation task
//! only, polled at tick start, so they can never race the tick. Superseding
//! a key (schedule again) silently cancels the earlier deadline.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use arena_shared::entities::{PlanetId, PlayerId};

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Clear a player's invulnerability flag.
    InvulnerabilityExpiry(PlayerId),
    /// Re-enable takeoff after the post-landing lock.
    TakeoffLock(PlayerId),
    /// Remove a planet whose owner disconnected, after the grace window.
    PlanetRemoval(PlanetId),
}

#[derive(Debug, PartialEq, Eq)]
struct Entry {
    fire_at: i64,
    generation: u64,
    key: TimerKey,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.generation.cmp(&other.generation))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending timers with lazy cancellation: each key carries a
/// generation, and stale heap entries are dropped when popped.
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    generations: HashMap<TimerKey, u64>,
    next_generation: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` to fire at `fire_at`, superseding any earlier
    /// schedule for the same key.
    pub fn schedule(&mut self, key: TimerKey, fire_at: i64) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.generations.insert(key, generation);
        self.heap.push(Reverse(Entry {
            fire_at,
            generation,
            key,
        }));
    }

    /// Cancels any pending schedule for `key`.
    pub fn cancel(&mut self, key: TimerKey) {
        self.generations.remove(&key);
    }

    /// Pops every timer due at `now`, in deadline order.
    pub fn due(&mut self, now: i64) -> Vec<TimerKey> {
        let mut fired = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.fire_at > now {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            // Only the latest generation for a key is live.
            if self.generations.get(&entry.key) == Some(&entry.generation) {
                self.generations.remove(&entry.key);
                fired.push(entry.key);
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_at_deadline_not_before() {
        let mut q = TimerQueue::new();
        let key = TimerKey::TakeoffLock(PlayerId(1));
        q.schedule(key, 1_000);

        assert!(q.due(999).is_empty());
        assert_eq!(q.due(1_000), vec![key]);
        assert!(q.due(2_000).is_empty(), "one-shot must not refire");
    }

    #[test]
    fn reschedule_supersedes_previous_deadline() {
        let mut q = TimerQueue::new();
        let key = TimerKey::InvulnerabilityExpiry(PlayerId(7));
        q.schedule(key, 1_000);
        // A new invulnerability grant replaces the unexpired previous one.
        q.schedule(key, 5_000);

        assert!(q.due(1_000).is_empty(), "stale deadline must not fire");
        assert_eq!(q.due(5_000), vec![key]);
    }

    #[test]
    fn cancel_drops_pending_timer() {
        let mut q = TimerQueue::new();
        let key = TimerKey::PlanetRemoval(PlayerId(3));
        q.schedule(key, 1_000);
        q.cancel(key);
        assert!(q.due(10_000).is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn independent_keys_fire_in_deadline_order() {
        let mut q = TimerQueue::new();
        let a = TimerKey::TakeoffLock(PlayerId(1));
        let b = TimerKey::InvulnerabilityExpiry(PlayerId(1));
        q.schedule(b, 2_000);
        q.schedule(a, 1_000);

        assert_eq!(q.due(3_000), vec![a, b]);
    }
}
