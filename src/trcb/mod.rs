//! Transitive reliable causal broadcast.
//!
//! Every node runs one [`Trcb`] instance. A local broadcast assigns the
//! payload a vector-clock timestamp and sends it to every peer as a `Cast`
//! frame. Each receiver acknowledges the immediate hop, relays the cast to
//! everyone except that hop and the origin, and buffers the payload until
//! its timestamp is causally ready, at which point the delivery sink is
//! invoked. Unacknowledged casts are re-sent periodically, so a message
//! survives arbitrary frame loss as long as the network heals eventually.
//!
//! Alongside delivery, the instance records the most recent timestamp it
//! has observed from every origin. The pointwise minimum of those
//! observations over the current membership, the stable version vector,
//! bounds the timestamps that every member is known to have seen, which
//! [`Trcb::stable_filter`] exposes for garbage collection and downstream
//! causal-consistency protocols.

mod builder;
mod error;
mod message;
mod retransmit;
mod stability;
mod trcb;

pub use self::builder::{Config, TrcbBuilder};
pub use self::error::{Error, FaultKind, Rejected, Result};
pub use self::message::{decode, encode, Message};
pub use self::trcb::{Delivery, DeliverySink, Step, Trcb};
