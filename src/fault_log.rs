//! Functionality for logging faulty peer frames encountered while handling
//! broadcast traffic.
//!
//! The receive path never surfaces errors to the application; frames that
//! cannot be applied are dropped. Drops that indicate a peer sent something
//! it should not have are recorded as faults and handed upward in the step
//! that observed them, so embedders can monitor peer health.

use crate::trcb::FaultKind;

/// A structure representing the context of a faulty frame: which peer the
/// frame arrived from (`node_id`) and what was wrong with it (`kind`).
#[derive(Clone, Debug, PartialEq)]
pub struct Fault<N> {
    /// The peer the offending frame arrived from.
    pub node_id: N,
    /// The kind of fault the peer is blamed for.
    pub kind: FaultKind,
}

impl<N> Fault<N> {
    /// Creates a new fault, blaming `node_id` for the `kind`.
    pub fn new(node_id: N, kind: FaultKind) -> Self {
        Fault { node_id, kind }
    }
}

/// A structure used to contain reports of faulty frames.
#[derive(Clone, Debug, PartialEq)]
pub struct FaultLog<N>(pub Vec<Fault<N>>);

impl<N> FaultLog<N> {
    /// Creates an empty `FaultLog`.
    pub fn new() -> Self {
        FaultLog::default()
    }

    /// Creates a new `FaultLog` initialized with a single fault.
    pub fn init(node_id: N, kind: FaultKind) -> Self {
        Fault::new(node_id, kind).into()
    }

    /// Creates a new `Fault` and pushes it onto the fault log.
    pub fn append(&mut self, node_id: N, kind: FaultKind) {
        self.0.push(Fault::new(node_id, kind));
    }

    /// Consumes `new_logs`, appending its faults onto the end of `self`.
    pub fn extend(&mut self, new_logs: FaultLog<N>) {
        self.0.extend(new_logs.0);
    }

    /// Returns `true` if there are no fault entries in the log.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N> Default for FaultLog<N> {
    fn default() -> Self {
        FaultLog(Vec::new())
    }
}

impl<N> From<Fault<N>> for FaultLog<N> {
    fn from(fault: Fault<N>) -> Self {
        FaultLog(vec![fault])
    }
}

impl<N> IntoIterator for FaultLog<N> {
    type Item = Fault<N>;
    type IntoIter = std::vec::IntoIter<Fault<N>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
