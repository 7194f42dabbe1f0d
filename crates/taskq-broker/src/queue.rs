use parking_lot::RwLock;
use std::collections::VecDeque;
use taskq_core::Invocation;

/// In-memory FIFO of queued invocations.
///
/// Order is submission order. Invocations held back by a retry back-off
/// are skipped until their `not_before` passes, without losing their place.
pub struct InvocationQueue {
    items: RwLock<VecDeque<Invocation>>,
}

impl InvocationQueue {
    pub fn new() -> Self {
        InvocationQueue {
            items: RwLock::new(VecDeque::new()),
        }
    }

    /// Insert keeping submission order
    pub fn push(&self, invocation: Invocation) {
        let mut items = self.items.write();
        let pos = items
            .iter()
            .rposition(|queued| queued.submitted_at <= invocation.submitted_at)
            .map(|i| i + 1)
            .unwrap_or(0);
        items.insert(pos, invocation);
    }

    /// Pop the oldest invocation that is ready and that `accepts` allows
    pub fn pop_ready<F>(&self, accepts: F) -> Option<Invocation>
    where
        F: Fn(&Invocation) -> bool,
    {
        let mut items = self.items.write();
        let pos = items
            .iter()
            .position(|inv| inv.is_ready() && accepts(inv))?;
        items.remove(pos)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InvocationQueue {
    fn default() -> Self {
        Self::new()
    }
}
