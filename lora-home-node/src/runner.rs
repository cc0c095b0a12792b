//! Cooperative main loop of a node.
//!
//! Each [tick](NodeRunner::tick) runs, in order, the application processing (every processing
//! interval), a send to the gateway (every transmission interval, or at once when the
//! [TransmitTrigger] was requested) and one receive poll.
use log::{info, warn};
use std::time::{Duration, Instant};

use crate::config::NodeConfig;
use crate::device::RadioLink;
use crate::error::SessionError;
use crate::node::{NodeApplication, TransmitTrigger};
use crate::session::{Reception, ReliableSession, SendOutcome};

/// What happened during one [tick](NodeRunner::tick).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub processed: bool,
    /// `None` when no send was due, when the application produced an oversized payload or when
    /// the transmission failed.
    pub sent: Option<SendOutcome>,
    pub reception: Reception,
}

pub struct NodeRunner<L: RadioLink, A: NodeApplication> {
    session: ReliableSession<L>,
    app: A,
    trigger: TransmitTrigger,
    processing_interval: Duration,
    transmission_interval: Duration,
    last_process: Instant,
    last_send: Instant,
}

impl<L: RadioLink, A: NodeApplication> NodeRunner<L, A> {
    pub fn new(session: ReliableSession<L>, app: A, config: &NodeConfig) -> Self {
        let now = Instant::now();
        NodeRunner {
            session,
            app,
            trigger: TransmitTrigger::new(),
            processing_interval: config.processing_interval,
            transmission_interval: config.transmission_interval,
            last_process: now,
            last_send: now,
        }
    }

    /// Handle to request an out-of-cycle transmission.
    pub fn trigger(&self) -> TransmitTrigger {
        self.trigger.clone()
    }

    pub fn session(&self) -> &ReliableSession<L> {
        &self.session
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    /// Starts reception, then lets the application set itself up.
    pub fn setup(&mut self) -> Result<(), SessionError<L::LinkError>> {
        info!(
            "Initializing node {} on network {:#06x}",
            self.session.identity().node_id(),
            self.session.identity().network_id()
        );
        self.session.start()?;
        self.app.setup(&self.trigger);
        Ok(())
    }

    pub fn tick(&mut self) -> Result<TickReport, SessionError<L::LinkError>> {
        let processed = self.last_process.elapsed() > self.processing_interval;
        if processed {
            self.app.process();
            self.last_process = Instant::now();
        }

        let mut sent = None;
        let requested = self.trigger.take();
        if requested || self.last_send.elapsed() > self.transmission_interval {
            let payload = self.app.produce_outgoing_payload();
            match self.session.send_to_gateway(&payload) {
                Ok(outcome) => sent = Some(outcome),
                Err(SessionError::Frame(err)) => warn!("Outgoing payload dropped: {}", err),
                Err(SessionError::Link(err)) => warn!("Transmission failed: {:?}", err),
            }
            self.last_send = Instant::now();
        }

        let reception = self.session.receive_one(&mut self.app)?;
        Ok(TickReport {
            processed,
            sent,
            reception,
        })
    }

    /// Ticks until `stop` returns true. Failing to transmit is logged and the loop goes on, a link
    /// failure while receiving ends it.
    pub fn run_until<F: FnMut() -> bool>(
        &mut self,
        mut stop: F,
    ) -> Result<(), SessionError<L::LinkError>> {
        while !stop() {
            self.tick()?;
        }
        Ok(())
    }

    pub fn into_parts(self) -> (ReliableSession<L>, A) {
        (self.session, self.app)
    }
}
