//! Per-note exponential retry backoff.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::NoteId;

const MAX_DOUBLINGS: u32 = 20;

#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    deadlines: HashMap<NoteId, Instant>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            deadlines: HashMap::new(),
        }
    }

    /// `base * 2^(attempts - 1)`, capped at `max`
    pub fn delay_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let doublings = (attempts - 1).min(MAX_DOUBLINGS);
        self.base.saturating_mul(1_u32 << doublings).min(self.max)
    }

    /// Hold the note back after a failed attempt; returns the delay.
    pub fn schedule(&mut self, note_id: NoteId, attempts: u32, now: Instant) -> Duration {
        let delay = self.delay_for(attempts);
        self.deadlines.insert(note_id, now + delay);
        delay
    }

    pub fn clear(&mut self, note_id: &NoteId) {
        self.deadlines.remove(note_id);
    }

    /// Time left before the note may be retried, if it is still held back
    pub fn remaining(&self, note_id: &NoteId, now: Instant) -> Option<Duration> {
        self.deadlines
            .get(note_id)
            .filter(|deadline| **deadline > now)
            .map(|deadline| *deadline - now)
    }

    /// Shortest wait until any held-back note becomes due
    pub fn next_due(&self, now: Instant) -> Option<Duration> {
        self.deadlines
            .values()
            .filter(|deadline| **deadline > now)
            .map(|deadline| *deadline - now)
            .min()
    }
}
