use std::collections::VecDeque;

use bytes::Bytes;
use daisy_protocol::RequestSubject;

/// A request that has been encoded but not yet written.
#[derive(Debug)]
struct Queued<W> {
    subject: RequestSubject,
    payload: Bytes,
    waiter: W,
}

#[derive(Debug)]
struct Pending<W> {
    id: u64,
    subject: RequestSubject,
    waiter: W,
}

/// The request just moved onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// Identifies this dispatch for [`Correlator::expire`].
    pub id: u64,
    pub subject: RequestSubject,
    pub payload: Bytes,
}

/// FIFO backlog plus the single pending slot.
///
/// `W` is whatever the caller needs to settle a request later, typically a
/// reply channel. The correlator never performs I/O itself.
#[derive(Debug)]
pub struct Correlator<W> {
    queue: VecDeque<Queued<W>>,
    pending: Option<Pending<W>>,
    next_id: u64,
}

impl<W> Default for Correlator<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> Correlator<W> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            pending: None,
            next_id: 0,
        }
    }

    /// Append an encoded request to the backlog.
    pub fn enqueue(&mut self, subject: RequestSubject, payload: Bytes, waiter: W) {
        self.queue.push_back(Queued {
            subject,
            payload,
            waiter,
        });
    }

    /// Promote the head of the backlog to pending.
    ///
    /// Returns `None` while a request is already pending or the backlog is
    /// empty; the caller writes the returned payload otherwise.
    pub fn dispatch(&mut self) -> Option<Dispatched> {
        if self.pending.is_some() {
            return None;
        }
        let next = self.queue.pop_front()?;
        self.next_id += 1;
        let dispatched = Dispatched {
            id: self.next_id,
            subject: next.subject,
            payload: next.payload,
        };
        self.pending = Some(Pending {
            id: self.next_id,
            subject: next.subject,
            waiter: next.waiter,
        });
        Some(dispatched)
    }

    /// Subject the next response belongs to, if any.
    pub fn pending_subject(&self) -> Option<RequestSubject> {
        self.pending.as_ref().map(|p| p.subject)
    }

    /// Dispatch id of the pending request, if any.
    pub fn pending_id(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.id)
    }

    /// Take the pending request unconditionally.
    pub fn settle(&mut self) -> Option<(RequestSubject, W)> {
        self.pending.take().map(|p| (p.subject, p.waiter))
    }

    /// Take the pending request if it is still dispatch `id`.
    ///
    /// Used both for timeouts and for responses whose decoding began while
    /// `id` was pending; a later dispatch is left alone.
    pub fn take(&mut self, id: u64) -> Option<(RequestSubject, W)> {
        match &self.pending {
            Some(p) if p.id == id => self.settle(),
            _ => None,
        }
    }

    /// Number of requests waiting behind the pending one.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Remove everything, pending first, then the backlog in order.
    pub fn drain(&mut self) -> Vec<(RequestSubject, W)> {
        let mut out = Vec::with_capacity(self.queue.len() + 1);
        out.extend(self.settle());
        out.extend(self.queue.drain(..).map(|q| (q.subject, q.waiter)));
        out
    }
}
