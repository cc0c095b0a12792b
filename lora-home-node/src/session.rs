//! Node-side reliability: send-and-await-acknowledgment with retries, and receive-filter with
//! automatic acknowledgment.
//!
//! ## Sending
//! A message to the gateway is encoded once with the current transmit counter and the very same
//! bytes are retransmitted until the gateway acknowledges it or the attempt budget is spent:
//!
//! ```text
//! Idle -> Sent -> AckWaiting -> Acked ----------------------> Idle (counter advances)
//!                            -> TimedOut -> Sent (attempts left)
//!                                        -> Idle (budget spent, counter advances per policy)
//! ```
//!
//! ## Receiving
//! [receive_one](ReliableSession::receive_one) never blocks and never fails because of what was
//! heard on air: bad sizes, corrupted frames, foreign networks, other recipients and non-JSON
//! payloads are dropped. Only link (driver) failures are returned as errors.
use log::{debug, info, trace, warn};
use std::time::{Duration, Instant};

use crate::config::{CounterPolicy, NodeConfig};
use crate::device::frame::{
    Frame, FrameError, MessageType, ACK_FRAME_SIZE, BROADCAST_NODE_ID, GATEWAY_NODE_ID,
    MAX_FRAME_SIZE, MIN_FRAME_SIZE,
};
use crate::device::{LinkMode, RadioLink};
use crate::error::{ConfigError, SessionError};
use crate::node::{NodeApplication, NodeIdentity};
use crate::NodeId;

/// Life cycle of an outstanding message.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum SendState {
    Idle,
    Sent,
    AckWaiting,
    Acked,
    TimedOut,
}

/// Result of [send_to_gateway](ReliableSession::send_to_gateway).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SendOutcome {
    Acknowledged { attempts: u8 },
    NotAcknowledged { attempts: u8 },
}

impl SendOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, SendOutcome::Acknowledged { .. })
    }

    /// Number of transmissions performed.
    pub fn attempts(&self) -> u8 {
        match self {
            SendOutcome::Acknowledged { attempts } | SendOutcome::NotAcknowledged { attempts } => {
                *attempts
            }
        }
    }
}

/// Why a received packet was not delivered.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DropReason {
    /// Packet size outside of the frame bounds, drained without parsing.
    BadSize(usize),
    Corrupted(FrameError),
    ForeignNetwork(u16),
    NotAddressedToUs(NodeId),
    /// Payload is not a JSON document. No acknowledgment is sent.
    InvalidPayload,
}

/// Result of [receive_one](ReliableSession::receive_one).
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Reception {
    /// Nothing pending on the link.
    Idle,
    Dropped(DropReason),
    /// Payload handed to the application, `acknowledged` if an ack was sent back first.
    Delivered { acknowledged: bool },
}

/// One message to the gateway, from its first transmission until acknowledged or given up.
struct SendAttempt {
    encoded: Vec<u8>,
    counter: u16,
    attempts: u8,
    state: SendState,
}

impl SendAttempt {
    fn new(encoded: Vec<u8>, counter: u16) -> Self {
        SendAttempt {
            encoded,
            counter,
            attempts: 0,
            state: SendState::Idle,
        }
    }

    fn transition(&mut self, next: SendState) {
        trace!("Message {}: {:?} -> {:?}", self.counter, self.state, next);
        self.state = next;
    }
}

/// Reliability state machine of a node, owning the radio link and the node identity.
///
/// Operations are synchronous: a send blocks up to `max_attempts * ack_timeout` and sends must
/// not overlap.
pub struct ReliableSession<L: RadioLink> {
    link: L,
    identity: NodeIdentity,
    max_attempts: u8,
    ack_timeout: Duration,
    poll_interval_ms: u32,
    counter_policy: CounterPolicy,
}

impl<L: RadioLink> ReliableSession<L> {
    /// Fails if `config` or the identity node id is invalid, see [NodeConfig::validate].
    pub fn new(
        link: L,
        identity: NodeIdentity,
        config: &NodeConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let node_id = identity.node_id();
        if node_id == GATEWAY_NODE_ID || node_id == BROADCAST_NODE_ID {
            return Err(ConfigError::ReservedNodeId(node_id));
        }
        Ok(ReliableSession {
            link,
            identity,
            max_attempts: config.max_attempts,
            ack_timeout: config.ack_timeout,
            poll_interval_ms: u32::try_from(config.poll_interval.as_millis()).unwrap_or(u32::MAX),
            counter_policy: config.counter_policy,
        })
    }

    /// Session for a fresh node, counter starting at 0.
    pub fn from_config(link: L, config: &NodeConfig) -> Result<Self, ConfigError> {
        Self::new(link, NodeIdentity::from_config(config), config)
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Puts the link in receive mode, ready for [receive_one](Self::receive_one).
    pub fn start(&mut self) -> Result<(), SessionError<L::LinkError>> {
        self.link
            .set_mode(LinkMode::Receive)
            .map_err(SessionError::Link)
    }

    /// Sends `payload` to the gateway and waits for its acknowledgment, retransmitting on timeout.
    ///
    /// The frame carries the current transmit counter, which then advances according to the
    /// [CounterPolicy]. An oversized payload fails before anything is transmitted and leaves the
    /// counter untouched, and so does a link failure.
    pub fn send_to_gateway(
        &mut self,
        payload: &[u8],
    ) -> Result<SendOutcome, SessionError<L::LinkError>> {
        let counter = self.identity.tx_counter();
        let frame = Frame::new(
            self.identity.network_id(),
            self.identity.node_id(),
            GATEWAY_NODE_ID,
            MessageType::NodeMsgAckReq,
            counter,
        )
        .with_payload(payload);
        let mut attempt = SendAttempt::new(frame.to_bytes()?, counter);

        let acked = loop {
            attempt.attempts += 1;
            self.transmit(&attempt.encoded)?;
            attempt.transition(SendState::Sent);
            attempt.transition(SendState::AckWaiting);
            if self.await_ack(counter)? {
                attempt.transition(SendState::Acked);
                break true;
            }
            attempt.transition(SendState::TimedOut);
            if attempt.attempts >= self.max_attempts {
                break false;
            }
            debug!(
                "No acknowledgment for message {}, retrying ({}/{})",
                counter,
                attempt.attempts + 1,
                self.max_attempts
            );
        };
        attempt.transition(SendState::Idle);

        if acked || self.counter_policy == CounterPolicy::Always {
            self.identity.increment_tx_counter();
        }
        if acked {
            info!(
                "Message {} acknowledged by the gateway after {} attempt(s)",
                counter, attempt.attempts
            );
            Ok(SendOutcome::Acknowledged {
                attempts: attempt.attempts,
            })
        } else {
            warn!(
                "Message {} not acknowledged after {} attempt(s)",
                counter, attempt.attempts
            );
            Ok(SendOutcome::NotAcknowledged {
                attempts: attempt.attempts,
            })
        }
    }

    /// Handles at most one pending packet, acknowledging and delivering it to `app` if it is for
    /// us.
    pub fn receive_one<A: NodeApplication + ?Sized>(
        &mut self,
        app: &mut A,
    ) -> Result<Reception, SessionError<L::LinkError>> {
        let size = match self.link.poll_incoming().map_err(SessionError::Link)? {
            Some(size) => size,
            None => return Ok(Reception::Idle),
        };
        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&size) {
            self.link.discard(size).map_err(SessionError::Link)?;
            debug!("Packet ignored: bad size ({}B)", size);
            return Ok(Reception::Dropped(DropReason::BadSize(size)));
        }
        let bytes = self.link.read_packet(size).map_err(SessionError::Link)?;
        let frame = match Frame::try_from_bytes(&bytes, true) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("Packet ignored: {}", err);
                return Ok(Reception::Dropped(DropReason::Corrupted(err)));
            }
        };
        if frame.network_id != self.identity.network_id() {
            debug!("Frame ignored: network {:#06x}", frame.network_id);
            return Ok(Reception::Dropped(DropReason::ForeignNetwork(
                frame.network_id,
            )));
        }
        if frame.recipient_id != self.identity.node_id() {
            debug!("Frame ignored: addressed to node {}", frame.recipient_id);
            return Ok(Reception::Dropped(DropReason::NotAddressedToUs(
                frame.recipient_id,
            )));
        }
        if !is_json_document(&frame.payload) {
            debug!("Frame ignored: payload is not a JSON document");
            return Ok(Reception::Dropped(DropReason::InvalidPayload));
        }

        let acknowledged = frame.message_type.requests_ack();
        if acknowledged {
            let ack = Frame::ack(
                self.identity.network_id(),
                self.identity.node_id(),
                frame.emitter_id,
                MessageType::NodeAck,
                frame.counter,
            );
            self.transmit(&ack.to_bytes()?)?;
            debug!("Ack sent for message {} of node {}", frame.counter, frame.emitter_id);
        }
        info!(
            "Message {} from node {} delivered ({}B)",
            frame.counter,
            frame.emitter_id,
            frame.payload.len()
        );
        app.consume_incoming_payload(&frame.payload);
        Ok(Reception::Delivered { acknowledged })
    }

    /// Half-duplex transmission. The link is back in receive mode afterwards, even when the
    /// transmission failed.
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), SessionError<L::LinkError>> {
        let sent = self
            .link
            .set_mode(LinkMode::Transmit)
            .and_then(|()| self.link.transmit(bytes));
        self.link
            .set_mode(LinkMode::Receive)
            .map_err(SessionError::Link)?;
        sent.map_err(SessionError::Link)
    }

    /// Polls for the gateway acknowledgment of message `counter` until `ack_timeout` elapses.
    ///
    /// Anything else heard meanwhile is discarded without restarting the timer.
    fn await_ack(&mut self, counter: u16) -> Result<bool, SessionError<L::LinkError>> {
        self.link
            .set_mode(LinkMode::Receive)
            .map_err(SessionError::Link)?;
        let node_id = self.identity.node_id();
        let start = Instant::now();
        while start.elapsed() < self.ack_timeout {
            match self.link.poll_incoming().map_err(SessionError::Link)? {
                Some(size) if size == ACK_FRAME_SIZE => {
                    let bytes = self.link.read_packet(size).map_err(SessionError::Link)?;
                    match Frame::try_from_bytes(&bytes, true) {
                        Ok(frame) if frame.acknowledges(node_id, counter) => {
                            debug!("Good ack received for message {}", counter);
                            return Ok(true);
                        }
                        Ok(frame) => debug!(
                            "Ack ignored: {:?} from {} to {} for message {}",
                            frame.message_type, frame.emitter_id, frame.recipient_id, frame.counter
                        ),
                        Err(err) => debug!("Bad ack received: {}", err),
                    }
                }
                Some(size) => {
                    self.link.discard(size).map_err(SessionError::Link)?;
                    trace!("Packet of {}B ignored while waiting for an ack", size);
                }
                None => self.link.pause(self.poll_interval_ms),
            }
        }
        Ok(false)
    }
}

/// True if `payload` starts with a complete JSON value. Bytes after it are ignored.
fn is_json_document(payload: &[u8]) -> bool {
    matches!(
        serde_json::Deserializer::from_slice(payload)
            .into_iter::<serde_json::Value>()
            .next(),
        Some(Ok(_))
    )
}
