use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use crate::vclock::VClock;
use crate::NodeIdT;

/// A cast awaiting acknowledgement from one or more recipients.
#[derive(Clone, Debug)]
pub struct Entry<N: Ord> {
    /// The actor that originated the cast.
    pub origin: N,
    /// The opaque application payload.
    pub payload: Vec<u8>,
    /// When the cast was last handed to the transport.
    pub last_sent: Instant,
    /// Recipients that have not acknowledged yet.
    pub awaiting: BTreeSet<N>,
}

/// Outcome of applying an `Ack` to the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// The last outstanding recipient acknowledged; the entry was removed.
    Settled,
    /// The acknowledgement was recorded; recipients are still outstanding.
    Outstanding,
    /// No entry is tracked for the timestamp.
    Unknown,
    /// The peer was not among the outstanding recipients.
    Unexpected,
}

/// Tracks unacknowledged casts by timestamp and drives periodic resends.
///
/// An entry is created when a cast is first sent or forwarded and removed
/// when its last recipient acknowledges. The awaiting set is never pruned on
/// membership change: a recipient stays one until it acknowledges, even if
/// it has to return to the network first.
#[derive(Clone, Debug)]
pub struct RetransmitQueue<N: Ord> {
    entries: HashMap<VClock<N>, Entry<N>>,
    resend_after: Duration,
}

impl<N: NodeIdT> RetransmitQueue<N> {
    /// Returns an empty queue that considers entries due for resending once
    /// they are older than `resend_after`.
    pub fn new(resend_after: Duration) -> Self {
        RetransmitQueue {
            entries: HashMap::new(),
            resend_after,
        }
    }

    /// Registers a cast sent to `recipients` at `now`. Nothing is tracked
    /// for an empty recipient set. If an entry already exists under `ts` the
    /// awaiting sets are united and the send time refreshed.
    pub fn insert(
        &mut self,
        ts: VClock<N>,
        origin: N,
        payload: Vec<u8>,
        recipients: BTreeSet<N>,
        now: Instant,
    ) {
        if recipients.is_empty() {
            return;
        }
        let entry = self.entries.entry(ts).or_insert_with(|| Entry {
            origin,
            payload,
            last_sent: now,
            awaiting: BTreeSet::new(),
        });
        entry.awaiting.extend(recipients);
        entry.last_sent = now;
    }

    /// Applies an acknowledgement of `ts` from `sender`.
    pub fn acknowledge(&mut self, ts: &VClock<N>, sender: &N) -> AckOutcome {
        let entry = match self.entries.get_mut(ts) {
            Some(entry) => entry,
            None => return AckOutcome::Unknown,
        };
        if !entry.awaiting.remove(sender) {
            return AckOutcome::Unexpected;
        }
        if entry.awaiting.is_empty() {
            self.entries.remove(ts);
            AckOutcome::Settled
        } else {
            AckOutcome::Outstanding
        }
    }

    /// Returns the entries due for resending at `now` and refreshes their
    /// send times.
    pub fn due(&mut self, now: Instant) -> Vec<(VClock<N>, Entry<N>)> {
        let resend_after = self.resend_after;
        self.entries
            .iter_mut()
            .filter(|(_, entry)| now.duration_since(entry.last_sent) > resend_after)
            .map(|(ts, entry)| {
                entry.last_sent = now;
                (ts.clone(), entry.clone())
            })
            .collect()
    }

    /// Returns `true` if no cast is awaiting acknowledgement.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of casts awaiting acknowledgement.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::{Duration, Instant};

    use super::{AckOutcome, RetransmitQueue};
    use crate::vclock::VClock;

    fn vc(entries: &[(u8, u64)]) -> VClock<u8> {
        entries.iter().cloned().collect()
    }

    fn recipients(ids: &[u8]) -> BTreeSet<u8> {
        ids.iter().cloned().collect()
    }

    #[test]
    fn acks_drain_the_entry() {
        let mut queue = RetransmitQueue::new(Duration::from_secs(10));
        let ts = vc(&[(0, 1)]);
        queue.insert(
            ts.clone(),
            0,
            b"x".to_vec(),
            recipients(&[1, 2]),
            Instant::now(),
        );

        assert_eq!(queue.acknowledge(&ts, &1), AckOutcome::Outstanding);
        assert_eq!(queue.acknowledge(&ts, &1), AckOutcome::Unexpected);
        assert_eq!(queue.acknowledge(&ts, &2), AckOutcome::Settled);
        assert!(queue.is_empty());
        assert_eq!(queue.acknowledge(&ts, &2), AckOutcome::Unknown);
    }

    #[test]
    fn empty_recipient_sets_are_not_tracked() {
        let mut queue: RetransmitQueue<u8> = RetransmitQueue::new(Duration::from_secs(10));
        queue.insert(vc(&[(0, 1)]), 0, b"x".to_vec(), BTreeSet::new(), Instant::now());
        assert!(queue.is_empty());
    }

    #[test]
    fn due_respects_the_age_threshold() {
        let mut queue = RetransmitQueue::new(Duration::from_secs(10));
        let start = Instant::now();
        let ts = vc(&[(0, 1)]);
        queue.insert(ts.clone(), 0, b"x".to_vec(), recipients(&[1]), start);

        assert!(queue.due(start + Duration::from_secs(5)).is_empty());

        let due = queue.due(start + Duration::from_secs(11));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, ts);
        assert_eq!(due[0].1.awaiting, recipients(&[1]));

        // The send time was refreshed, so the entry is not due again yet.
        assert!(queue.due(start + Duration::from_secs(12)).is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn reinserting_unites_the_awaiting_sets() {
        let mut queue = RetransmitQueue::new(Duration::from_secs(10));
        let ts = vc(&[(0, 1), (1, 1)]);
        let now = Instant::now();
        queue.insert(ts.clone(), 0, b"x".to_vec(), recipients(&[2]), now);
        queue.insert(ts.clone(), 1, b"x".to_vec(), recipients(&[3]), now);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.acknowledge(&ts, &2), AckOutcome::Outstanding);
        assert_eq!(queue.acknowledge(&ts, &3), AckOutcome::Settled);
    }
}
