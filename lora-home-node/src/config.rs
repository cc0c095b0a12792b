//! Node configuration.
//!
//! Every knob the firmware nodes hard-code is a field here, with the firmware value as default.
use std::time::Duration;

use crate::device::frame::{BROADCAST_NODE_ID, GATEWAY_NODE_ID};
use crate::error::ConfigError;
use crate::NodeId;

pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_MAX_ATTEMPTS: u8 = 3;
pub const DEFAULT_TRANSMISSION_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_PROCESSING_INTERVAL_MS: u64 = 180_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// When the transmit counter advances after a send.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum CounterPolicy {
    /// After every send, acknowledged or not. Deployed gateways expect this.
    #[default]
    Always,
    /// Only once the gateway acknowledged the message.
    OnAcknowledgment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub node_id: NodeId,
    /// Network partition tag, frames of other networks are dropped.
    pub network_id: u16,
    /// Interval between two calls of the application processing.
    pub processing_interval: Duration,
    /// Interval between two sends to the gateway.
    pub transmission_interval: Duration,
    /// Transmissions of one message, first one included.
    pub max_attempts: u8,
    /// Time to wait for the gateway acknowledgment after each transmission.
    pub ack_timeout: Duration,
    /// Idle time between two empty polls while waiting for an acknowledgment.
    pub poll_interval: Duration,
    pub counter_policy: CounterPolicy,
}

impl NodeConfig {
    pub fn new(node_id: NodeId, network_id: u16) -> Self {
        NodeConfig {
            node_id,
            network_id,
            processing_interval: Duration::from_millis(DEFAULT_PROCESSING_INTERVAL_MS),
            transmission_interval: Duration::from_millis(DEFAULT_TRANSMISSION_INTERVAL_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            counter_policy: CounterPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id == GATEWAY_NODE_ID || self.node_id == BROADCAST_NODE_ID {
            return Err(ConfigError::ReservedNodeId(self.node_id));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.ack_timeout.is_zero() {
            return Err(ConfigError::ZeroAckTimeout);
        }
        Ok(())
    }
}
