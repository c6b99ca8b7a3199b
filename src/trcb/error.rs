use failure::Fail;

/// An error while encoding or decoding wire frames, or talking to the
/// broadcast actor.
#[derive(Debug, Fail)]
pub enum Error {
    /// An outgoing frame could not be encoded for the transport.
    #[fail(display = "Frame encoding failed: {}", _0)]
    Encode(bincode::Error),
    /// An incoming frame could not be decoded.
    #[fail(display = "Frame decoding failed: {}", _0)]
    Decode(bincode::Error),
    /// The broadcast actor is no longer running.
    #[fail(display = "Broadcast actor has shut down")]
    ActorShutDown,
}

/// A broadcast result.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Represents each reason why a peer's frame could not be applied.
///
/// None of these is fatal; the offending frame is dropped and the fault is
/// reported in the step that observed it.
#[derive(Clone, Copy, Debug, Fail, PartialEq, Eq)]
pub enum FaultKind {
    /// Received an `Ack` for a timestamp with no retransmit entry.
    #[fail(display = "Received an `Ack` for a timestamp with no retransmit entry.")]
    UnknownAck,
    /// Received an `Ack` from a peer that was not awaited for the timestamp.
    #[fail(display = "Received an `Ack` from a peer that was not awaited.")]
    UnexpectedAck,
    /// Received a `Cast` whose timestamp does not count its own origin.
    #[fail(display = "Received a `Cast` whose timestamp does not count its origin.")]
    InvalidCastTimestamp,
}

/// Refusal of a payload by the application's delivery handler. The refused
/// payload stays buffered and the causal cursor does not advance; delivery
/// is retried on a later state change.
#[derive(Clone, Copy, Debug, Fail, PartialEq, Eq)]
#[fail(display = "Delivery handler rejected the payload")]
pub struct Rejected;
