//! # Transitive Reliable Causal Broadcast
//!
//! A per-node broadcast engine that disseminates opaque payloads across a
//! dynamic set of peers so that every correct node eventually delivers every
//! broadcast, each exactly once, in an order consistent with vector-clock
//! causality. On top of delivery, the engine tracks which timestamps are
//! known to the whole membership and exposes that knowledge as a stability
//! filter suitable for garbage collection.
//!
//! The core of the crate is [`Trcb`], a pure state machine: it consumes one
//! event at a time (a local broadcast, a frame from a peer, a membership
//! change or a timer tick) and returns a [`Step`] describing the messages
//! to send, the payloads that were delivered and any peer anomalies
//! observed. The state machine knows nothing about sockets or threads, which
//! keeps it deterministic and directly testable on a simulated network.
//!
//! [`service::TrcbService`] wraps the state machine in a mailbox-driven
//! actor thread with a periodic retransmit timer, speaking to the outside
//! world through the [`service::Transport`] trait and a [`DeliverySink`]
//! supplied by the application.
//!
//! ## Example
//!
//! ```
//! use std::time::Instant;
//!
//! use trcb::{Rejected, Trcb, VClock};
//!
//! let mut sink = |ts: &VClock<&'static str>, payload: &[u8]| -> Result<(), Rejected> {
//!     println!("delivered {:?}: {:?}", ts, payload);
//!     Ok(())
//! };
//! let mut node = Trcb::builder("a").members(vec!["b", "c"]).build();
//! let (ts, step) = node.broadcast(b"hello".to_vec(), Instant::now(), &mut sink);
//! assert_eq!(ts.get(&"a"), 1);
//! // One cast addressed to all peers; the transport layer fans it out.
//! assert_eq!(step.messages.len(), 1);
//! ```

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;

mod fault_log;
mod vclock;

pub mod service;
pub mod trcb;

pub use crate::fault_log::{Fault, FaultLog};
pub use crate::service::{Transport, TrcbHandle, TrcbService};
pub use crate::trcb::{
    decode, encode, Config, Delivery, DeliverySink, Error, FaultKind, Message, Rejected, Result,
    Step, Trcb, TrcbBuilder,
};
pub use crate::vclock::VClock;

/// A peer node's unique identifier.
pub trait NodeIdT: Eq + Ord + Clone + Debug + Hash + Send + Sync {}
impl<N> NodeIdT for N where N: Eq + Ord + Clone + Debug + Hash + Send + Sync {}

/// Message destination: all current peers, a specific peer, or all current
/// peers except a listed few.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target<N> {
    /// The message must be sent to every current peer.
    All,
    /// The message must be sent to the given peer only.
    Node(N),
    /// The message must be sent to every current peer not in the set.
    AllExcept(BTreeSet<N>),
}

impl<N: NodeIdT> Target<N> {
    /// Returns a `TargetedMessage` with this target, and the `message` as
    /// its payload.
    pub fn message<M>(self, message: M) -> TargetedMessage<M, N> {
        TargetedMessage {
            target: self,
            message,
        }
    }

    /// Resolves this destination against a peer set. `Node` targets address
    /// their peer whether or not it is currently a member: acknowledgements
    /// must still reach a sender that has just left the membership.
    pub fn peers<'a>(&'a self, members: &'a BTreeSet<N>) -> Vec<&'a N> {
        match self {
            Target::All => members.iter().collect(),
            Target::Node(id) => vec![id],
            Target::AllExcept(except) => members.difference(except).collect(),
        }
    }
}

/// Message with a designated target.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetedMessage<M, N> {
    /// The node or nodes the message is addressed to.
    pub target: Target<N>,
    /// The message content.
    pub message: M,
}
