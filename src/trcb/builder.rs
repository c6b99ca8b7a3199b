use std::collections::BTreeSet;
use std::time::Duration;

use super::trcb::Trcb;
use crate::NodeIdT;

/// Tunable parameters of the broadcast engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Whether `broadcast` invokes the local delivery handler synchronously.
    pub deliver_locally: bool,
    /// Period of the retransmit scan timer.
    pub check_resend_interval: Duration,
    /// Age after which an unacknowledged cast is sent again.
    pub resend_after: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            deliver_locally: false,
            check_resend_interval: Duration::from_millis(5_000),
            resend_after: Duration::from_millis(10_000),
        }
    }
}

/// A `Trcb` builder, to configure the parameters and create new instances.
pub struct TrcbBuilder<N> {
    our_id: N,
    members: BTreeSet<N>,
    config: Config,
}

impl<N: NodeIdT> TrcbBuilder<N> {
    /// Returns a new builder for a node with the given id and no peers.
    pub fn new(our_id: N) -> Self {
        TrcbBuilder {
            our_id,
            members: BTreeSet::new(),
            config: Config::default(),
        }
    }

    /// Sets the initial peer set. Our own id is filtered out.
    pub fn members<I: IntoIterator<Item = N>>(mut self, members: I) -> Self {
        self.members = members.into_iter().collect();
        self.members.remove(&self.our_id);
        self
    }

    /// Sets whether `broadcast` delivers to the local handler synchronously.
    pub fn deliver_locally(mut self, deliver_locally: bool) -> Self {
        self.config.deliver_locally = deliver_locally;
        self
    }

    /// Sets the period of the retransmit scan timer.
    pub fn check_resend_interval(mut self, period: Duration) -> Self {
        self.config.check_resend_interval = period;
        self
    }

    /// Sets the age after which an unacknowledged cast is sent again.
    pub fn resend_after(mut self, age: Duration) -> Self {
        self.config.resend_after = age;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Creates the broadcast state machine.
    pub fn build(self) -> Trcb<N> {
        Trcb::new(self.our_id, self.members, self.config)
    }
}
