//! Outbox of mutating requests that failed to reach the network.
//!
//! Replayed in arrival order when the background sync signal fires. The
//! queue is bounded; once full, the oldest request is dropped.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use shelter_core::Request;

pub struct Outbox {
    queue: Mutex<VecDeque<Request>>,
    capacity: usize,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self { queue: Mutex::new(VecDeque::new()), capacity: capacity.max(1) }
    }

    /// Queue a request. Returns the request evicted to make room, if any.
    pub async fn push(&self, request: Request) -> Option<Request> {
        let mut queue = self.queue.lock().await;
        let evicted = if queue.len() >= self.capacity { queue.pop_front() } else { None };
        if let Some(dropped) = &evicted {
            tracing::warn!(method = %dropped.method, url = %dropped.url, "outbox full, dropping oldest request");
        }
        queue.push_back(request);
        evicted
    }

    /// Take every queued request, leaving the outbox empty.
    pub async fn drain(&self) -> Vec<Request> {
        self.queue.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}
