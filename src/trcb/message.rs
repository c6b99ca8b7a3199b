use std::fmt::{self, Debug};

use hex_fmt::HexFmt;
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Error, Result};
use crate::{NodeIdT, VClock};

/// The two kinds of frame exchanged between peers.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub enum Message<N: Ord> {
    /// An application payload in flight: the actor that broadcast it, the
    /// timestamp assigned at broadcast time, and the immediate hop the frame
    /// was sent by.
    Cast {
        origin: N,
        payload: Vec<u8>,
        ts: VClock<N>,
        sender: N,
    },
    /// Acknowledges receipt of the cast with the given timestamp.
    Ack { ts: VClock<N>, sender: N },
}

impl<N: Ord> Message<N> {
    /// The immediate hop this frame was sent by.
    pub fn sender(&self) -> &N {
        match self {
            Message::Cast { sender, .. } | Message::Ack { sender, .. } => sender,
        }
    }

    /// The timestamp the frame refers to.
    pub fn ts(&self) -> &VClock<N> {
        match self {
            Message::Cast { ts, .. } | Message::Ack { ts, .. } => ts,
        }
    }
}

/// Encodes a frame for the transport.
pub fn encode<N>(message: &Message<N>) -> Result<Vec<u8>>
where
    N: NodeIdT + Serialize,
{
    bincode::serialize(message).map_err(Error::Encode)
}

/// Decodes a frame received from the transport.
pub fn decode<N>(frame: &[u8]) -> Result<Message<N>>
where
    N: NodeIdT + DeserializeOwned,
{
    bincode::deserialize(frame).map_err(Error::Decode)
}

// A random generation impl is provided for test cases. `#[cfg(test)]` does
// not cover integration tests.
impl<N> Distribution<Message<N>> for Standard
where
    N: NodeIdT,
    Standard: Distribution<N>,
{
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Message<N> {
        let origin: N = rng.gen();
        let sender: N = rng.gen();
        let mut ts = VClock::new();
        for _ in 0..rng.gen_range(0..3) {
            let id: N = rng.gen();
            ts.increment(&id);
        }
        ts.increment(&origin);

        if rng.gen::<bool>() {
            let mut payload = vec![0; 8];
            rng.fill_bytes(&mut payload);
            Message::Cast {
                origin,
                payload,
                ts,
                sender,
            }
        } else {
            Message::Ack { ts, sender }
        }
    }
}

impl<N: Ord + Debug> Debug for Message<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::Cast {
                origin,
                payload,
                ts,
                sender,
            } => write!(
                f,
                "Cast {{ origin: {:?}, payload: {:0.10}, ts: {:?}, sender: {:?} }}",
                origin,
                HexFmt(payload),
                ts,
                sender
            ),
            Message::Ack { ts, sender } => {
                write!(f, "Ack {{ ts: {:?}, sender: {:?} }}", ts, sender)
            }
        }
    }
}
