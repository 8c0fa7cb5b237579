//! Shared mesh fixture for scenario tests.
//!
//! Builds a set of nodes over one in-memory hub with a shared manual
//! clock, and pumps queued messages to quiescence between steps.

#![allow(dead_code)]

use concord_core::clock::{Clock, ManualClock};
use concord_core::config::CoreConfig;
use concord_core::identity::{Keypair, PeerId};
use concord_core::node::Node;
use concord_core::transport::{MemoryHub, MemoryTransport};
use concord_core::wire::{Envelope, WireBody};

pub type MeshNode = Node<MemoryTransport, ManualClock>;

pub struct Mesh {
    pub hub: MemoryHub,
    pub clock: ManualClock,
    pub nodes: Vec<MeshNode>,
}

impl Mesh {
    /// Builds `n` nodes over a fresh hub, clock at t=1000 ms.
    pub fn new(n: usize, config: &CoreConfig) -> Self {
        let hub = MemoryHub::new();
        let clock = ManualClock::at(1_000);
        let nodes = (0..n)
            .map(|_| {
                let keypair = Keypair::generate();
                let transport = hub.endpoint(keypair.peer_id());
                Node::new(config.clone(), keypair, transport, clock.clone())
            })
            .collect();
        Self { hub, clock, nodes }
    }

    pub fn id(&self, index: usize) -> PeerId {
        self.nodes[index].peer_id().clone()
    }

    /// Everyone announces, then the mesh settles.
    pub fn join_all(&mut self) {
        for node in &mut self.nodes {
            node.announce();
        }
        self.pump();
    }

    /// Delivers queued messages until nothing moves.
    pub fn pump(&mut self) {
        loop {
            let mut delivered = false;
            for node in &mut self.nodes {
                let id = node.peer_id().clone();
                for envelope in self.hub.drain(&id) {
                    delivered = true;
                    node.handle_envelope(envelope);
                }
            }
            if !delivered {
                break;
            }
        }
    }

    /// Ticks every node once and settles the mesh.
    pub fn tick_all(&mut self) {
        for node in &mut self.nodes {
            node.tick();
        }
        self.pump();
    }

    /// Runs `count` rounds of tick + pump, advancing the clock by
    /// `step_ms` between rounds.
    pub fn run_ticks(&mut self, count: usize, step_ms: u64) {
        for _ in 0..count {
            self.tick_all();
            self.clock.advance(step_ms);
        }
    }

    /// Injects a raw wire message into the mesh from an arbitrary
    /// identity, the way an adversary that ignores its own local gates
    /// would.
    pub fn inject_broadcast(&mut self, from: &Keypair, body: WireBody) {
        let endpoint = self.hub.endpoint(from.peer_id());
        let envelope = Envelope {
            from: from.peer_id().clone(),
            ts: self.clock.now_ms(),
            body,
        };
        use concord_core::transport::Transport;
        endpoint.broadcast(&envelope);
        self.pump();
    }
}
