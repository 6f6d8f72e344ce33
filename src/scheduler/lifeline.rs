//! Lifeline queue (§3, §4.6): a bounded queue of size 2 holding `Failed`
//! steal requests retained from a worker's children, awaiting work-sharing.

use crate::scheduler::request::{RequestState, StealRequest};

/// Capacity is fixed at 2: at most one retained request per child.
pub const LIFELINE_CAPACITY: usize = 2;

#[derive(Debug, Default)]
pub struct LifelineQueue {
    entries: Vec<StealRequest>,
}

impl LifelineQueue {
    pub fn new() -> LifelineQueue {
        LifelineQueue {
            entries: Vec::with_capacity(LIFELINE_CAPACITY),
        }
    }

    /// Retain a `Failed` request from a child. Panics if the queue is full
    /// or the request is not in `Failed` state — both are protocol
    /// invariant violations (§7), not recoverable conditions.
    pub fn enqueue(&mut self, req: StealRequest) {
        assert!(
            req.state() == RequestState::Failed,
            "only Failed requests may be lifelined"
        );
        assert!(
            self.entries.len() < LIFELINE_CAPACITY,
            "lifeline queue overflow: more than one retained request per child"
        );
        self.entries.push(req);
    }

    /// Pop the oldest retained request, to satisfy it with a task.
    pub fn dequeue(&mut self) -> Option<StealRequest> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub fn head(&self) -> Option<&StealRequest> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::bitfield::Bitfield32;

    fn failed_req(id: u32) -> StealRequest {
        StealRequest::new(0, id, 0, id, Bitfield32::EMPTY, RequestState::Failed, false)
    }

    #[test]
    fn enqueue_dequeue_is_fifo() {
        let mut q = LifelineQueue::new();
        q.enqueue(failed_req(1));
        q.enqueue(failed_req(2));
        assert_eq!(q.dequeue().unwrap().id, 1);
        assert_eq!(q.dequeue().unwrap().id, 2);
        assert!(q.dequeue().is_none());
    }

    #[test]
    #[should_panic(expected = "lifeline queue overflow")]
    fn enqueue_beyond_capacity_panics() {
        let mut q = LifelineQueue::new();
        q.enqueue(failed_req(1));
        q.enqueue(failed_req(2));
        q.enqueue(failed_req(3));
    }

    #[test]
    #[should_panic(expected = "only Failed requests may be lifelined")]
    fn enqueue_non_failed_request_panics() {
        let mut q = LifelineQueue::new();
        let req = StealRequest::new(0, 1, 0, 1, Bitfield32::EMPTY, RequestState::Working, false);
        q.enqueue(req);
    }

    #[test]
    fn head_peeks_without_removing() {
        let mut q = LifelineQueue::new();
        q.enqueue(failed_req(5));
        assert_eq!(q.head().unwrap().id, 5);
        assert_eq!(q.len(), 1);
    }
}
