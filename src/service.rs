//! The broadcast actor: a mailbox-driven thread owning the state machine.
//!
//! All state mutations serialize through the actor's mailbox, processed one
//! event at a time in FIFO order. The actor consumes a [`Transport`] for
//! outgoing frames and pushes causally ready payloads into the registered
//! [`DeliverySink`]; a `crossbeam_channel::tick` receiver doubles as the
//! retransmit timer. Applications and the peer service talk to the actor
//! through a clonable [`TrcbHandle`].

use std::collections::BTreeSet;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{self as channel, select, Receiver, Sender};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::trcb::{decode, encode, DeliverySink, Error, Message, Result, Step, Trcb, TrcbBuilder};
use crate::{NodeIdT, TargetedMessage, VClock};

/// Point-to-point frame output consumed by the actor.
///
/// Sends are fire-and-forget: a frame may be silently dropped, and the
/// retransmit timer is the recovery mechanism. Implementations must not
/// block beyond a bounded time.
pub trait Transport<N>: Send {
    /// Hands an encoded frame to the peer service for delivery to `peer`.
    fn send(&mut self, peer: &N, frame: &[u8]);
}

/// An event in the actor's mailbox.
enum Event<N: Ord> {
    Broadcast {
        payload: Vec<u8>,
        reply: Sender<VClock<N>>,
    },
    SetHandler(Box<dyn DeliverySink<N> + Send>),
    StableFilter {
        candidates: Vec<VClock<N>>,
        reply: Sender<Vec<VClock<N>>>,
    },
    Message {
        sender: N,
        message: Message<N>,
    },
    Membership(BTreeSet<N>),
    Shutdown,
}

/// Handle to a running broadcast actor. Clonable; all clones feed the same
/// mailbox.
pub struct TrcbHandle<N: Ord> {
    mailbox: Sender<Event<N>>,
}

impl<N: Ord> Clone for TrcbHandle<N> {
    fn clone(&self) -> Self {
        TrcbHandle {
            mailbox: self.mailbox.clone(),
        }
    }
}

impl<N: NodeIdT> TrcbHandle<N> {
    /// Initiates a causally ready broadcast of `payload` and returns the
    /// timestamp the actor assigned to it.
    pub fn broadcast(&self, payload: Vec<u8>) -> Result<VClock<N>> {
        let (reply, response) = channel::bounded(1);
        self.send(Event::Broadcast { payload, reply })?;
        response.recv().map_err(|_| Error::ActorShutDown)
    }

    /// Replaces the delivery handler. Payloads buffered while no handler
    /// was registered (or while the previous handler rejected them) are
    /// re-attempted immediately.
    pub fn set_delivery_handler(&self, sink: Box<dyn DeliverySink<N> + Send>) -> Result<()> {
        self.send(Event::SetHandler(sink))
    }

    /// Returns the subset of `candidates` known to have been observed by
    /// every current member.
    pub fn stable_filter(&self, candidates: Vec<VClock<N>>) -> Result<Vec<VClock<N>>> {
        let (reply, response) = channel::bounded(1);
        self.send(Event::StableFilter { candidates, reply })?;
        response.recv().map_err(|_| Error::ActorShutDown)
    }

    /// Decodes a frame received from the peer service and enqueues it for
    /// the actor. Undecodable frames are reported back to the caller and
    /// never reach the actor.
    pub fn on_frame(&self, frame: &[u8]) -> Result<()>
    where
        N: DeserializeOwned,
    {
        let message: Message<N> = decode(frame)?;
        let sender = message.sender().clone();
        self.send(Event::Message { sender, message })
    }

    /// Announces a membership change. The actor replaces its peer set with
    /// `members` minus itself.
    pub fn on_membership(&self, members: BTreeSet<N>) -> Result<()> {
        self.send(Event::Membership(members))
    }

    /// Stops the actor. Pending mailbox events are abandoned.
    pub fn shutdown(&self) {
        let _ = self.mailbox.send(Event::Shutdown);
    }

    fn send(&self, event: Event<N>) -> Result<()> {
        self.mailbox.send(event).map_err(|_| Error::ActorShutDown)
    }
}

/// Rejects everything: the stand-in sink until the application registers a
/// delivery handler, so early arrivals stay buffered instead of being lost.
struct Unhandled;

impl<N: Ord> DeliverySink<N> for Unhandled {
    fn deliver(
        &mut self,
        _ts: &VClock<N>,
        _payload: &[u8],
    ) -> ::std::result::Result<(), crate::Rejected> {
        Err(crate::Rejected)
    }
}

/// The broadcast actor. Owns the state machine, the delivery sink and the
/// transport; everything else reaches it through the mailbox.
pub struct TrcbService<N: Ord, T> {
    trcb: Trcb<N>,
    sink: Box<dyn DeliverySink<N> + Send>,
    transport: T,
    mailbox: Receiver<Event<N>>,
}

impl<N, T> TrcbService<N, T>
where
    N: NodeIdT + Serialize + 'static,
    T: Transport<N> + 'static,
{
    /// Builds the state machine from `builder` and spawns the actor thread.
    ///
    /// Until a delivery handler is registered through the returned handle,
    /// incoming payloads remain buffered.
    pub fn spawn(builder: TrcbBuilder<N>, transport: T) -> (TrcbHandle<N>, JoinHandle<()>) {
        let (tx, rx) = channel::unbounded();
        let service = TrcbService {
            trcb: builder.build(),
            sink: Box::new(Unhandled),
            transport,
            mailbox: rx,
        };
        let thread = thread::spawn(move || service.run());
        (TrcbHandle { mailbox: tx }, thread)
    }

    fn run(mut self) {
        let mailbox = self.mailbox.clone();
        let ticker = channel::tick(self.trcb.config().check_resend_interval);
        loop {
            select! {
                recv(mailbox) -> event => match event {
                    Ok(Event::Shutdown) | Err(_) => break,
                    Ok(event) => self.handle_event(event),
                },
                recv(ticker) -> _ => {
                    let step = self.trcb.handle_tick(Instant::now());
                    self.dispatch(step);
                }
            }
        }
        debug!("{:?}: broadcast actor stopped", self.trcb.our_id());
    }

    fn handle_event(&mut self, event: Event<N>) {
        match event {
            Event::Broadcast { payload, reply } => {
                let (ts, step) = self.trcb.broadcast(payload, Instant::now(), &mut *self.sink);
                self.dispatch(step);
                let _ = reply.send(ts);
            }
            Event::SetHandler(sink) => {
                self.sink = sink;
                let step = self.trcb.flush(&mut *self.sink);
                self.dispatch(step);
            }
            Event::StableFilter { candidates, reply } => {
                let _ = reply.send(self.trcb.stable_filter(&candidates));
            }
            Event::Message { sender, message } => {
                let step =
                    self.trcb
                        .handle_message(&sender, message, Instant::now(), &mut *self.sink);
                self.dispatch(step);
            }
            Event::Membership(members) => self.trcb.handle_membership(members),
            // Handled by the run loop before dispatching here.
            Event::Shutdown => {}
        }
    }

    /// Executes a step: faults are logged, messages are encoded and handed
    /// to the transport. Outputs already went through the sink.
    fn dispatch(&mut self, step: Step<N>) {
        for fault in step.fault_log {
            warn!(
                "{:?}: faulty frame from {:?}: {}",
                self.trcb.our_id(),
                fault.node_id,
                fault.kind
            );
        }
        for TargetedMessage { target, message } in step.messages {
            let frame = match encode(&message) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!("{:?}: dropping outgoing frame: {}", self.trcb.our_id(), err);
                    continue;
                }
            };
            let peers: Vec<N> = target
                .peers(self.trcb.members())
                .into_iter()
                .cloned()
                .collect();
            for peer in &peers {
                self.transport.send(peer, &frame);
            }
        }
    }
}
