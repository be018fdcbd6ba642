//! Transport adapter.
//!
//! Nodes never talk to each other directly. The transport routes each emitted
//! message along the topology's edges, picks the target instance from the
//! edge's grouping, and acknowledges a delivery only after the node has processed
//! it and every resulting message has been routed. A failed delivery is
//! redelivered a bounded number of times.
//!
//! Two executors share this contract: [`local::LocalCluster`], a deterministic
//! single-threaded queue for tests and replay, and [`runtime::Cluster`], one tokio
//! task per node instance. The runtime writes sinks from their own thread.

pub mod local;
pub mod router;
pub mod runtime;
pub mod sink_worker;

use crate::core::encoding::{decode_message, encode_message};
use crate::core::message::Message;
use crate::error::ProcessError;
use crate::nodes::Delivery;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub use local::{LocalCluster, RunOutcome};
pub use router::{partition, Route, Router};
pub use runtime::{Cluster, ClusterHandle};

#[derive(Debug, Default)]
struct InFlightState {
    count: AtomicUsize,
    idle: Notify,
}

/// Count of deliveries that have been sent but not yet acknowledged.
///
/// Shared by every actor of a cluster. The input is exhausted and the network
/// quiescent exactly when the count is zero.
#[derive(Clone, Debug, Default)]
pub struct InFlight {
    state: Arc<InFlightState>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        self.state.count.fetch_add(n, Ordering::SeqCst);
    }

    /// Acknowledge one delivery.
    pub fn done(&self) {
        if self.state.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.idle.notify_waiters();
        }
    }

    pub fn count(&self) -> usize {
        self.state.count.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.count() == 0
    }

    /// Resolve once no delivery is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

/// A message on its way to one node instance.
#[derive(Clone, Debug)]
pub(crate) enum Payload {
    Value(Message),
    Wire(Vec<u8>),
}

#[derive(Clone, Debug)]
pub(crate) struct Envelope {
    pub route: Route,
    pub payload: Payload,
    pub attempts: u32,
}

impl Envelope {
    pub fn new(route: Route, message: Message, encode: bool) -> Result<Self, ProcessError> {
        let payload = if encode {
            Payload::Wire(encode_message(&message)?)
        } else {
            Payload::Value(message)
        };
        Ok(Self { route, payload, attempts: 0 })
    }

    pub fn delivery(&self) -> Result<Delivery, ProcessError> {
        let message = match &self.payload {
            Payload::Value(message) => message.clone(),
            Payload::Wire(bytes) => decode_message(bytes)?,
        };
        Ok(Delivery::new(self.route.port, message))
    }
}
