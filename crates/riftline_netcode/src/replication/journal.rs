//! Bounded, replayable record of broadcast game events.

use std::collections::VecDeque;

use riftline_shared::{GameEvent, Tick};

/// Events in broadcast order. Oldest are dropped at capacity.
#[derive(Clone, Debug)]
pub struct EventJournal {
    events: VecDeque<GameEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Appends an event.
    pub fn record(&mut self, event: GameEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Every retained event in broadcast order.
    pub fn replay(&self) -> impl Iterator<Item = &GameEvent> {
        self.events.iter()
    }

    /// Retained events with `from <= tick <= to`, in broadcast order.
    pub fn replay_range(&self, from: Tick, to: Tick) -> impl Iterator<Item = &GameEvent> {
        self.events
            .iter()
            .filter(move |e| (from..=to).contains(&e.tick))
    }

    /// Retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events lost to the capacity limit.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riftline_shared::GameEventType;

    fn event(tick: Tick) -> GameEvent {
        GameEvent::new(GameEventType::ScoreDeposit, tick, 1).with_value(tick as i32)
    }

    #[test]
    fn test_replay_in_order() {
        let mut journal = EventJournal::new(8);
        for tick in [3, 1, 2] {
            journal.record(event(tick));
        }
        let ticks: Vec<_> = journal.replay().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![3, 1, 2]);
    }

    #[test]
    fn test_replay_range_inclusive() {
        let mut journal = EventJournal::new(16);
        for tick in 0..10 {
            journal.record(event(tick));
        }
        let ticks: Vec<_> = journal.replay_range(3, 5).map(|e| e.tick).collect();
        assert_eq!(ticks, vec![3, 4, 5]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut journal = EventJournal::new(4);
        for tick in 0..6 {
            journal.record(event(tick));
        }
        assert_eq!(journal.len(), 4);
        assert_eq!(journal.dropped(), 2);
        assert_eq!(journal.replay().next().map(|e| e.tick), Some(2));
    }
}
