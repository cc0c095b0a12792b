#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use lora_home_node::device::{LinkMode, RadioLink};
use lora_home_node::{
    Frame, MessageType, NodeApplication, NodeConfig, TransmitTrigger, GATEWAY_NODE_ID,
};

pub const NODE_ID: u8 = 30;
pub const NETWORK_ID: u16 = 0xACDC;
pub const ACK_TIMEOUT_MS: u64 = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLinkError(pub &'static str);

/// Called on every transmission with the bytes and the 1-based transmission count, returns the
/// packets the link hears right after.
pub type Responder = Box<dyn FnMut(&[u8], usize) -> Vec<Vec<u8>>>;

/// In-memory half-duplex link.
pub struct MockLink {
    pub mode: Option<LinkMode>,
    pub modes: Vec<LinkMode>,
    pub sent: Vec<Vec<u8>>,
    pub inbox: VecDeque<Vec<u8>>,
    pub fail_transmit: bool,
    pending: Vec<u8>,
    cursor: usize,
    responder: Option<Responder>,
}

impl MockLink {
    pub fn new() -> Self {
        MockLink {
            mode: None,
            modes: Vec::new(),
            sent: Vec::new(),
            inbox: VecDeque::new(),
            fail_transmit: false,
            pending: Vec::new(),
            cursor: 0,
            responder: None,
        }
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8], usize) -> Vec<Vec<u8>> + 'static,
    {
        let mut link = MockLink::new();
        link.responder = Some(Box::new(responder));
        link
    }

    pub fn push_incoming(&mut self, packet: Vec<u8>) {
        self.inbox.push_back(packet);
    }

    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent
            .iter()
            .map(|bytes| Frame::try_from_bytes(bytes, true).expect("node sent a bad frame"))
            .collect()
    }
}

impl RadioLink for MockLink {
    type LinkError = MockLinkError;

    fn set_mode(&mut self, mode: LinkMode) -> Result<(), Self::LinkError> {
        self.modes.push(mode);
        self.mode = Some(mode);
        Ok(())
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<(), Self::LinkError> {
        if self.mode != Some(LinkMode::Transmit) {
            return Err(MockLinkError("transmit outside of transmit mode"));
        }
        if self.fail_transmit {
            return Err(MockLinkError("radio unplugged"));
        }
        self.sent.push(bytes.to_vec());
        let count = self.sent.len();
        let replies = match self.responder.as_mut() {
            Some(responder) => responder(bytes, count),
            None => Vec::new(),
        };
        self.inbox.extend(replies);
        Ok(())
    }

    fn poll_incoming(&mut self) -> Result<Option<usize>, Self::LinkError> {
        if self.mode != Some(LinkMode::Receive) {
            return Err(MockLinkError("poll outside of receive mode"));
        }
        match self.inbox.pop_front() {
            Some(packet) => {
                self.pending = packet;
                self.cursor = 0;
                Ok(Some(self.pending.len()))
            }
            None => Ok(None),
        }
    }

    fn read_byte(&mut self) -> Result<u8, Self::LinkError> {
        let byte = self
            .pending
            .get(self.cursor)
            .copied()
            .ok_or(MockLinkError("read past the pending packet"))?;
        self.cursor += 1;
        Ok(byte)
    }
}

/// Application recording what it gets, sending a `{"tx":n}` counter like the test node firmware.
#[derive(Default)]
pub struct RecordingApp {
    pub received: Vec<Vec<u8>>,
    pub produced: u32,
    pub processed: u32,
    pub request_on_setup: bool,
    pub outgoing_override: Option<Vec<u8>>,
}

impl NodeApplication for RecordingApp {
    fn setup(&mut self, trigger: &TransmitTrigger) {
        if self.request_on_setup {
            trigger.request();
        }
    }

    fn process(&mut self) {
        self.processed += 1;
    }

    fn produce_outgoing_payload(&mut self) -> Vec<u8> {
        let payload = match &self.outgoing_override {
            Some(payload) => payload.clone(),
            None => format!("{{\"tx\":{}}}", self.produced).into_bytes(),
        };
        self.produced += 1;
        payload
    }

    fn consume_incoming_payload(&mut self, payload: &[u8]) {
        self.received.push(payload.to_vec());
    }
}

pub fn fast_config() -> NodeConfig {
    let mut config = NodeConfig::new(NODE_ID, NETWORK_ID);
    config.ack_timeout = Duration::from_millis(ACK_TIMEOUT_MS);
    config.poll_interval = Duration::from_millis(1);
    config.processing_interval = Duration::from_secs(3600);
    config.transmission_interval = Duration::from_secs(3600);
    config
}

pub fn gateway_ack(counter: u16) -> Vec<u8> {
    Frame::ack(NETWORK_ID, GATEWAY_NODE_ID, NODE_ID, MessageType::GwAck, counter)
        .to_bytes()
        .unwrap()
}

pub fn gateway_message(message_type: MessageType, counter: u16, payload: &[u8]) -> Vec<u8> {
    Frame::new(NETWORK_ID, GATEWAY_NODE_ID, NODE_ID, message_type, counter)
        .with_payload(payload)
        .to_bytes()
        .unwrap()
}

/// Acknowledges the `n`-th transmission (1-based) with the counter it carried.
pub fn ack_on(n: usize) -> impl FnMut(&[u8], usize) -> Vec<Vec<u8>> {
    move |bytes: &[u8], count: usize| {
        if count == n {
            let frame = Frame::try_from_bytes(bytes, true).unwrap();
            vec![gateway_ack(frame.counter)]
        } else {
            Vec::new()
        }
    }
}
