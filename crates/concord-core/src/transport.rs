//! Transport contract and the in-memory bus.
//!
//! The core assumes a message-passing transport beneath it and nothing
//! more. Two invariants bind every implementation:
//!
//! - a node's own broadcast is never delivered back to it;
//! - a point-to-point send to an unknown recipient is dropped silently.
//!
//! [`MemoryHub`] implements the contract for tests and single-process
//! compositions; real deployments plug in their own.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::identity::PeerId;
use crate::wire::Envelope;

/// Message-passing transport owned by one node.
pub trait Transport {
    /// This endpoint's stable identifier.
    fn local_id(&self) -> &PeerId;

    /// Sends to one recipient; silently dropped if the recipient is
    /// unknown.
    fn send(&self, to: &PeerId, envelope: &Envelope);

    /// Delivers to every other endpoint. Never echoes to the sender.
    fn broadcast(&self, envelope: &Envelope);
}

#[derive(Debug, Default)]
struct HubInner {
    queues: HashMap<PeerId, VecDeque<Envelope>>,
}

/// Single-process message bus connecting [`MemoryTransport`] endpoints.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    inner: Rc<RefCell<HubInner>>,
}

impl MemoryHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint for a peer and returns its transport handle.
    #[must_use]
    pub fn endpoint(&self, peer: &PeerId) -> MemoryTransport {
        self.inner
            .borrow_mut()
            .queues
            .entry(peer.clone())
            .or_default();
        MemoryTransport {
            hub: self.inner.clone(),
            id: peer.clone(),
        }
    }

    /// Drains every queued message for a peer, in delivery order.
    #[must_use]
    pub fn drain(&self, peer: &PeerId) -> Vec<Envelope> {
        self.inner
            .borrow_mut()
            .queues
            .get_mut(peer)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Messages currently queued for a peer.
    #[must_use]
    pub fn queued(&self, peer: &PeerId) -> usize {
        self.inner
            .borrow()
            .queues
            .get(peer)
            .map_or(0, VecDeque::len)
    }
}

/// One node's endpoint on a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    hub: Rc<RefCell<HubInner>>,
    id: PeerId,
}

impl Transport for MemoryTransport {
    fn local_id(&self) -> &PeerId {
        &self.id
    }

    fn send(&self, to: &PeerId, envelope: &Envelope) {
        let mut inner = self.hub.borrow_mut();
        if let Some(queue) = inner.queues.get_mut(to) {
            queue.push_back(envelope.clone());
        }
        // Unknown recipient: dropped silently per the contract.
    }

    fn broadcast(&self, envelope: &Envelope) {
        let mut inner = self.hub.borrow_mut();
        for (peer, queue) in &mut inner.queues {
            if peer != &self.id {
                queue.push_back(envelope.clone());
            }
        }
    }
}
