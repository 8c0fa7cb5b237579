//! # concord-core
//!
//! Reference governance core for a peer-to-peer mesh that has to keep
//! *shared meaning under disagreement*: nodes hold beliefs about
//! application-defined claims, signed signals move those beliefs around,
//! and an explicit governance layer detects conflicts, arbitrates them by
//! reputation-weighted vote, isolates misbehaving peers, and journals
//! every decision in a hash-chained audit log that replays
//! deterministically.
//!
//! This crate is the core only. It assumes a message-passing transport
//! beneath it (see [`transport::Transport`]; an in-memory bus ships for
//! tests and single-process use) and an application above it that supplies
//! claim hashes and consumes decisions. Persistent storage, key
//! distribution, and the operator surface live with the embedder.
//!
//! ## Composition
//!
//! [`node::Node`] wires the subsystems together behind two serialized
//! entry points: `handle_envelope` for messages and `tick` for time.
//! Everything observable comes back out as [`events::CoreEvent`] values.
//!
//! ```rust
//! use concord_core::clock::ManualClock;
//! use concord_core::config::CoreConfig;
//! use concord_core::identity::Keypair;
//! use concord_core::node::Node;
//! use concord_core::signal::Direction;
//! use concord_core::transport::MemoryHub;
//!
//! let hub = MemoryHub::new();
//! let clock = ManualClock::at(1_000);
//! let keypair = Keypair::generate();
//! let transport = hub.endpoint(keypair.peer_id());
//!
//! let mut node = Node::new(CoreConfig::default(), keypair, transport, clock);
//! node.announce();
//! node.publish_claim("claim:deploy-v2-is-safe", Direction::Strengthen, 0.85)
//!     .expect("signal publishes");
//! node.tick();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod admission;
pub mod arbitration;
pub mod audit;
pub mod authority;
pub mod belief;
pub mod canonical;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod crypto;
pub mod drift;
pub mod events;
pub mod identity;
pub mod membership;
pub mod node;
pub mod pattern;
pub mod propagation;
#[cfg(test)]
mod proptests;
pub mod quarantine;
pub mod replay;
pub mod reputation;
pub mod rollback;
pub mod signal;
pub mod transport;
pub mod tstate;
pub mod wire;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::CoreConfig;
    pub use crate::events::CoreEvent;
    pub use crate::identity::{Keypair, PeerId};
    pub use crate::node::Node;
    pub use crate::signal::{Direction, Scope, Signal, SignalBuilder, SignalType, Stance};
    pub use crate::transport::{MemoryHub, MemoryTransport, Transport};
    pub use crate::tstate::TState;
}

pub use config::CoreConfig;
pub use events::CoreEvent;
pub use identity::{Keypair, PeerId};
pub use node::Node;
pub use signal::{Signal, Stance};
