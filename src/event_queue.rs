//! Totally ordered scheduled event delivery (spec §4.1).
//!
//! Grounded on the teacher's `workflow.rs`, which queues `ExecutionTask`s
//! in a `PriorityQueue<ExecutionTask, u8>`. `priority_queue::PriorityQueue`
//! is a max-heap over its priority key, so the key here is `Reverse<(fire
//! time, sequence)>` — popping the largest reversed key yields the
//! smallest `(fire_time, sequence)` pair, giving ascending dispatch order
//! with ties broken FIFO by sequence.

use crate::engine::EventPayload;
use crate::{SimError, SimTime};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;

/// A scheduled event: fire time, insertion sequence (tie-break), and a
/// caller-supplied payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueuedEvent {
    pub fire_time: SimTime,
    pub sequence: u64,
    pub payload: EventPayload,
}

/// Priority queue keyed by `(fire_time, sequence)`, ascending.
pub struct EventQueue {
    queue: PriorityQueue<QueuedEvent, Reverse<(SimTime, u64)>>,
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            next_sequence: 0,
        }
    }

    /// Enqueue a payload to fire at `fire_time`, which must be >= 0 and
    /// expressed relative to the same time origin as every other enqueue.
    /// Negative delays are rejected by construction since `SimTime` is
    /// unsigned; callers computing `now + delta` must clamp `delta` at the
    /// call site before this is reached.
    pub fn schedule(&mut self, fire_time: SimTime, payload: EventPayload) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let key = Reverse((fire_time, sequence));
        self.queue.push(
            QueuedEvent {
                fire_time,
                sequence,
                payload,
            },
            key,
        );
        sequence
    }

    /// Pop the smallest `(fire_time, sequence)` entry, if any.
    pub fn pop(&mut self) -> Option<QueuedEvent> {
        self.queue.pop().map(|(event, _)| event)
    }

    pub fn size(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedule helper used by handlers/generators that compute fire time as
/// `now + delay_ms`; rejects negative delays explicitly even though
/// `SimTime` is unsigned, so call sites that pass a signed delay get a
/// clear error instead of a silent wrap.
pub fn fire_time_from_delay(now: SimTime, delay_ms: i64) -> Result<SimTime, SimError> {
    if delay_ms < 0 {
        return Err(SimError::InvalidInput(format!(
            "negative delay not allowed: {delay_ms}"
        )));
    }
    Ok(now + delay_ms as SimTime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EventPayload;

    fn payload() -> EventPayload {
        EventPayload::Empty
    }

    #[test]
    fn pops_in_fire_time_order() {
        let mut q = EventQueue::new();
        q.schedule(30, payload());
        q.schedule(10, payload());
        q.schedule(20, payload());

        let times: Vec<SimTime> = std::iter::from_fn(|| q.pop()).map(|e| e.fire_time).collect();
        assert_eq!(times, vec![10, 20, 30]);
    }

    #[test]
    fn ties_are_broken_fifo_by_sequence() {
        let mut q = EventQueue::new();
        q.schedule(10, payload());
        q.schedule(10, payload());
        q.schedule(10, payload());

        let sequences: Vec<u64> = std::iter::from_fn(|| q.pop()).map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn empty_queue_reports_size_zero() {
        let q = EventQueue::new();
        assert_eq!(q.size(), 0);
        assert!(q.is_empty());
    }

    #[test]
    fn negative_delay_rejected() {
        assert!(fire_time_from_delay(100, -5).is_err());
        assert_eq!(fire_time_from_delay(100, 5).unwrap(), 105);
    }
}
