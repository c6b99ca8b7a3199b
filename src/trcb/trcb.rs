use std::collections::BTreeSet;
use std::time::Instant;
use std::{fmt, result};

use hex_fmt::HexFmt;
use log::{debug, warn};

use super::retransmit::{AckOutcome, RetransmitQueue};
use super::stability::TimestampMatrix;
use super::{Config, FaultKind, Message, Rejected, TrcbBuilder};
use crate::fault_log::{Fault, FaultLog};
use crate::vclock::VClock;
use crate::{NodeIdT, Target, TargetedMessage};

/// Receives payloads the engine has decided are causally ready.
///
/// The sink is invoked synchronously from within event handling; a
/// long-running implementation delays all other events, which is the price
/// of serializability.
pub trait DeliverySink<N: Ord> {
    /// Hands a causally ready payload to the application. Returning `Err`
    /// leaves the payload buffered and the causal cursor unchanged; delivery
    /// is retried on a later state change.
    fn deliver(&mut self, ts: &VClock<N>, payload: &[u8]) -> result::Result<(), Rejected>;
}

impl<N: Ord, F> DeliverySink<N> for F
where
    F: FnMut(&VClock<N>, &[u8]) -> result::Result<(), Rejected>,
{
    fn deliver(&mut self, ts: &VClock<N>, payload: &[u8]) -> result::Result<(), Rejected> {
        self(ts, payload)
    }
}

/// A payload accepted by the delivery sink, as recorded in a [`Step`].
#[derive(Clone, PartialEq)]
pub struct Delivery<N: Ord> {
    /// The actor that broadcast the payload.
    pub origin: N,
    /// The timestamp assigned at broadcast time.
    pub ts: VClock<N>,
    /// The opaque application payload.
    pub payload: Vec<u8>,
}

impl<N: Ord + fmt::Debug> fmt::Debug for Delivery<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Delivery {{ origin: {:?}, ts: {:?}, payload: {:0.10} }}",
            self.origin,
            self.ts,
            HexFmt(&self.payload)
        )
    }
}

/// Result of handling one event: messages to send, payloads that were
/// delivered and anomalies observed.
#[must_use = "The step result must be used, or outbound messages are lost."]
#[derive(Debug)]
pub struct Step<N: Ord> {
    /// Payloads accepted by the delivery sink, in delivery order.
    pub output: Vec<Delivery<N>>,
    /// Non-fatal anomalies in the frames that produced this step.
    pub fault_log: FaultLog<N>,
    /// Messages to hand to the transport.
    pub messages: Vec<TargetedMessage<Message<N>, N>>,
}

impl<N: Ord> Default for Step<N> {
    fn default() -> Self {
        Step {
            output: Vec::new(),
            fault_log: FaultLog::new(),
            messages: Vec::new(),
        }
    }
}

impl<N: NodeIdT> Step<N> {
    /// Adds the outputs, faults and messages of `other` to `self`.
    pub fn extend(&mut self, other: Self) {
        self.output.extend(other.output);
        self.fault_log.extend(other.fault_log);
        self.messages.extend(other.messages);
    }

    /// Extends this step with `other` and returns the result.
    pub fn join(mut self, other: Self) -> Self {
        self.extend(other);
        self
    }

    /// Returns `true` if there are no messages, faults or outputs.
    pub fn is_empty(&self) -> bool {
        self.output.is_empty() && self.fault_log.is_empty() && self.messages.is_empty()
    }
}

impl<N: NodeIdT> From<Fault<N>> for Step<N> {
    fn from(fault: Fault<N>) -> Self {
        Step {
            fault_log: fault.into(),
            ..Step::default()
        }
    }
}

impl<N: NodeIdT> From<TargetedMessage<Message<N>, N>> for Step<N> {
    fn from(msg: TargetedMessage<Message<N>, N>) -> Self {
        Step {
            messages: vec![msg],
            ..Step::default()
        }
    }
}

/// A received cast that is not yet causally ready.
#[derive(Clone, Debug)]
struct PendingCast<N: Ord> {
    origin: N,
    ts: VClock<N>,
    payload: Vec<u8>,
}

/// Transitive reliable causal broadcast instance for one node.
///
/// All state lives here and is mutated by exactly one event at a time:
/// [`broadcast`](Trcb::broadcast), [`handle_message`](Trcb::handle_message),
/// [`handle_membership`](Trcb::handle_membership) and
/// [`handle_tick`](Trcb::handle_tick). The caller is responsible for
/// serializing those calls and for moving the returned step's messages to
/// the transport; the service module does both.
#[derive(Debug)]
pub struct Trcb<N: Ord> {
    /// This node's ID.
    our_id: N,
    /// Current peers, excluding ourselves.
    members: BTreeSet<N>,
    /// Tunable parameters.
    config: Config,
    /// Current causal knowledge: pointwise at least every delivered
    /// timestamp.
    vv: VClock<N>,
    /// Received casts whose timestamps are not yet causally ready, in
    /// arrival order.
    pending: Vec<PendingCast<N>>,
    /// Casts sent or forwarded by us that still await acknowledgements.
    retransmit: RetransmitQueue<N>,
    /// Most recent timestamp observed per origin; derives the SVV.
    matrix: TimestampMatrix<N>,
}

impl<N: NodeIdT> Trcb<N> {
    /// Returns a new builder for a node with the given ID.
    pub fn builder(our_id: N) -> TrcbBuilder<N> {
        TrcbBuilder::new(our_id)
    }

    pub(super) fn new(our_id: N, members: BTreeSet<N>, config: Config) -> Self {
        let matrix = TimestampMatrix::new(our_id.clone(), &members);
        let retransmit = RetransmitQueue::new(config.resend_after);
        Trcb {
            our_id,
            members,
            config,
            vv: VClock::new(),
            pending: Vec::new(),
            retransmit,
            matrix,
        }
    }

    /// This node's own ID.
    pub fn our_id(&self) -> &N {
        &self.our_id
    }

    /// The current peer set, excluding this node.
    pub fn members(&self) -> &BTreeSet<N> {
        &self.members
    }

    /// The engine's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The node's current causal knowledge. Pointwise non-decreasing across
    /// events.
    pub fn version_vector(&self) -> &VClock<N> {
        &self.vv
    }

    /// The stable version vector: every timestamp it descends from has been
    /// observed by all current members.
    pub fn stable_version_vector(&self) -> &VClock<N> {
        self.matrix.svv()
    }

    /// The number of buffered casts that are not yet causally ready.
    pub fn buffered_casts(&self) -> usize {
        self.pending.len()
    }

    /// The number of casts still awaiting acknowledgements.
    pub fn unacked_casts(&self) -> usize {
        self.retransmit.len()
    }

    /// Initiates a broadcast of `payload` and returns the assigned
    /// timestamp along with the step to execute.
    ///
    /// The timestamp is this node's next event: the version vector with our
    /// own counter advanced. It is causally ready here by construction, so
    /// when local delivery is configured the sink is invoked directly,
    /// bypassing the buffer.
    pub fn broadcast(
        &mut self,
        payload: Vec<u8>,
        now: Instant,
        sink: &mut dyn DeliverySink<N>,
    ) -> (VClock<N>, Step<N>) {
        let ts = self.vv.incremented(&self.our_id);
        self.vv = ts.clone();
        self.matrix.observe(&self.our_id, &ts);

        let mut step = Step::default();
        if self.config.deliver_locally {
            match sink.deliver(&ts, &payload) {
                Ok(()) => step.output.push(Delivery {
                    origin: self.our_id.clone(),
                    ts: ts.clone(),
                    payload: payload.clone(),
                }),
                // The timestamp is already assigned, so the payload cannot
                // re-enter the causal buffer; peers still receive the cast.
                Err(Rejected) => warn!("{}: local delivery of {:?} rejected", self, ts),
            }
        }

        step.messages.push(Target::All.message(Message::Cast {
            origin: self.our_id.clone(),
            payload: payload.clone(),
            ts: ts.clone(),
            sender: self.our_id.clone(),
        }));
        self.retransmit
            .insert(ts.clone(), self.our_id.clone(), payload, self.members.clone(), now);
        (ts, step)
    }

    /// Handles a frame received from `sender_id`.
    ///
    /// This must be called with every frame we receive from another node.
    /// The receive path never fails; frames that cannot be applied are
    /// dropped, anomalous ones leaving a note in the step's fault log.
    pub fn handle_message(
        &mut self,
        sender_id: &N,
        message: Message<N>,
        now: Instant,
        sink: &mut dyn DeliverySink<N>,
    ) -> Step<N> {
        match message {
            Message::Cast {
                origin,
                payload,
                ts,
                ..
            } => self.handle_cast(sender_id, origin, payload, ts, now, sink),
            Message::Ack { ts, .. } => self.handle_ack(sender_id, &ts),
        }
    }

    /// Replaces the peer set with `new_members`, minus ourselves. Matrix
    /// rows of departed members are dropped so they cannot pin the SVV;
    /// joiners start with an empty row, which holds the SVV down until
    /// their observations catch up. Awaiting sets of retransmit entries are
    /// left untouched.
    pub fn handle_membership(&mut self, new_members: BTreeSet<N>) {
        let mut members = new_members;
        members.remove(&self.our_id);
        let mut scope = members.clone();
        scope.insert(self.our_id.clone());
        self.matrix.update_scope(scope);
        self.members = members;
    }

    /// Runs the periodic resend scan: every cast that has been awaiting
    /// acknowledgements for longer than the configured age is sent again to
    /// the awaited recipients that are currently members. Safe to call
    /// early, late or repeatedly.
    pub fn handle_tick(&mut self, now: Instant) -> Step<N> {
        let mut step = Step::default();
        for (ts, entry) in self.retransmit.due(now) {
            let recipients: BTreeSet<N> =
                entry.awaiting.intersection(&self.members).cloned().collect();
            if recipients.is_empty() {
                continue;
            }
            debug!("{}: resending {:?} to {:?}", self, ts, recipients);
            for peer in recipients {
                step.messages.push(Target::Node(peer).message(Message::Cast {
                    origin: entry.origin.clone(),
                    payload: entry.payload.clone(),
                    ts: ts.clone(),
                    sender: self.our_id.clone(),
                }));
            }
        }
        step
    }

    /// Returns the subset of `candidates` that is stable: timestamps the
    /// stable version vector descends from, meaning every current member
    /// has observed them.
    pub fn stable_filter(&self, candidates: &[VClock<N>]) -> Vec<VClock<N>> {
        candidates
            .iter()
            .filter(|ts| self.matrix.svv().descends(ts))
            .cloned()
            .collect()
    }

    /// Attempts delivery of buffered casts, draining everything that has
    /// become causally ready. Useful after replacing the delivery handler;
    /// receive-path events drain the buffer on their own.
    pub fn flush(&mut self, sink: &mut dyn DeliverySink<N>) -> Step<N> {
        self.drain_pending(sink)
    }

    fn handle_cast(
        &mut self,
        sender_id: &N,
        origin: N,
        payload: Vec<u8>,
        ts: VClock<N>,
        now: Instant,
        sink: &mut dyn DeliverySink<N>,
    ) -> Step<N> {
        // A correct origin counts its own broadcast, so a timestamp without
        // a positive origin component can never become deliverable.
        if ts.get(&origin) == 0 {
            return Fault::new(sender_id.clone(), FaultKind::InvalidCastTimestamp).into();
        }

        // Delivered or already buffered: residue of the flood, drop it.
        if self.vv.descends(&ts) || self.pending.iter().any(|cast| cast.ts == ts) {
            debug!("{}: dropping duplicate cast {:?} from {:?}", self, ts, sender_id);
            return Step::default();
        }

        let mut step = Step::default();

        // Relay to everyone except the hop it arrived from and its origin;
        // both demonstrably have the message already. The duplicate test
        // above absorbs the residual cycles this flood produces.
        let mut informed = BTreeSet::new();
        informed.insert(sender_id.clone());
        informed.insert(origin.clone());
        let relay: BTreeSet<N> = self.members.difference(&informed).cloned().collect();
        step.messages
            .push(Target::AllExcept(informed).message(Message::Cast {
                origin: origin.clone(),
                payload: payload.clone(),
                ts: ts.clone(),
                sender: self.our_id.clone(),
            }));
        step.messages
            .push(Target::Node(sender_id.clone()).message(Message::Ack {
                ts: ts.clone(),
                sender: self.our_id.clone(),
            }));
        self.retransmit
            .insert(ts.clone(), origin.clone(), payload.clone(), relay, now);

        self.matrix.observe(&origin, &ts);
        self.pending.push(PendingCast {
            origin,
            ts,
            payload,
        });
        step.extend(self.drain_pending(sink));
        step
    }

    fn handle_ack(&mut self, sender_id: &N, ts: &VClock<N>) -> Step<N> {
        match self.retransmit.acknowledge(ts, sender_id) {
            AckOutcome::Settled => {
                debug!("{}: cast {:?} fully acknowledged", self, ts);
                Step::default()
            }
            AckOutcome::Outstanding => Step::default(),
            AckOutcome::Unknown => Fault::new(sender_id.clone(), FaultKind::UnknownAck).into(),
            AckOutcome::Unexpected => {
                Fault::new(sender_id.clone(), FaultKind::UnexpectedAck).into()
            }
        }
    }

    /// Delivers buffered casts until a pass admits nothing: after every
    /// successful delivery the buffer is re-scanned from the head, since the
    /// advanced version vector may have made earlier arrivals ready.
    fn drain_pending(&mut self, sink: &mut dyn DeliverySink<N>) -> Step<N> {
        let mut step = Step::default();
        loop {
            let vv = &self.vv;
            let index = match self
                .pending
                .iter()
                .position(|cast| deliverable(vv, &cast.origin, &cast.ts))
            {
                Some(index) => index,
                None => break,
            };
            {
                let cast = &self.pending[index];
                if sink.deliver(&cast.ts, &cast.payload).is_err() {
                    debug!("{}: delivery of {:?} rejected, keeping it buffered", self, cast.ts);
                    break;
                }
            }
            let cast = self.pending.remove(index);
            self.vv.merge_from(&cast.ts);
            debug!("{}: delivered {:?} from {:?}", self, cast.ts, cast.origin);
            step.output.push(Delivery {
                origin: cast.origin,
                ts: cast.ts,
                payload: cast.payload,
            });
        }
        step
    }
}

/// The causal delivery predicate: the timestamp is the origin's next event
/// (`ts[origin] = vv[origin] + 1`) and everything else it depends on has
/// been delivered (`ts[b] <= vv[b]` for all other actors).
fn deliverable<N: NodeIdT>(vv: &VClock<N>, origin: &N, ts: &VClock<N>) -> bool {
    ts.get(origin) == vv.get(origin) + 1
        && ts.iter().all(|(id, &c)| id == origin || c <= vv.get(id))
}

impl<N: NodeIdT> fmt::Display for Trcb<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{:?} Trcb(vv: {:?})", self.our_id, self.vv)
    }
}
