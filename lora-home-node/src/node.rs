//! Application side of a node: its identity, the device-specific behaviour and the
//! out-of-cycle transmission request.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::NodeConfig;
use crate::NodeId;

/// Device-specific behaviour plugged into a [NodeRunner](crate::runner::NodeRunner).
///
/// Payloads are compact JSON documents of at most
/// [MAX_PAYLOAD_SIZE](crate::device::frame::MAX_PAYLOAD_SIZE) bytes.
pub trait NodeApplication {
    /// Called once, after the radio is up. `trigger` may be kept to request a transmission
    /// outside of the regular cadence.
    fn setup(&mut self, _trigger: &TransmitTrigger) {}

    /// Called every processing interval. Long work belongs here, not in the payload callbacks.
    fn process(&mut self) {}

    /// Payload of the next message for the gateway.
    fn produce_outgoing_payload(&mut self) -> Vec<u8>;

    /// Payload of a message addressed to this node. Already checked to be a JSON document.
    fn consume_incoming_payload(&mut self, payload: &[u8]);
}

/// Addressing and sequencing state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdentity {
    node_id: NodeId,
    network_id: u16,
    tx_counter: u16,
}

impl NodeIdentity {
    pub fn new(node_id: NodeId, network_id: u16) -> Self {
        NodeIdentity {
            node_id,
            network_id,
            tx_counter: 0,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        NodeIdentity::new(config.node_id, config.network_id)
    }

    /// Resumes from a counter value, e.g. one persisted across deep sleep.
    pub fn with_tx_counter(mut self, tx_counter: u16) -> Self {
        self.tx_counter = tx_counter;
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn network_id(&self) -> u16 {
        self.network_id
    }

    pub fn tx_counter(&self) -> u16 {
        self.tx_counter
    }

    /// Wraps at `u16::MAX`.
    pub fn increment_tx_counter(&mut self) {
        self.tx_counter = self.tx_counter.wrapping_add(1);
    }
}

/// "Transmit now" flag, shareable with other threads or an interrupt handler.
#[derive(Debug, Clone, Default)]
pub struct TransmitTrigger(Arc<AtomicBool>);

impl TransmitTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks for a transmission at the next scheduler tick.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Reads and clears the flag in one step.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}
