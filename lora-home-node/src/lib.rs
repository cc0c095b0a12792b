//! LoRa Home node protocol: a lightweight point-to-multipoint messaging protocol between battery
//! powered nodes and a single gateway over a lossy half-duplex LoRa channel.
//!
//! - [device::frame]: wire frame codec, [device::checksum]: its CRC-16.
//! - [session::ReliableSession]: send with acknowledgment and retries, receive with filtering and
//!   automatic acknowledgment.
//! - [runner::NodeRunner]: cooperative loop driving a [node::NodeApplication].
pub mod config;
pub mod device;
pub mod error;
pub mod node;
pub mod runner;
pub mod session;

pub use config::{CounterPolicy, NodeConfig};
pub use device::frame::{Frame, FrameError, MessageType, BROADCAST_NODE_ID, GATEWAY_NODE_ID};
pub use device::{LinkMode, RadioLink};
pub use error::{ConfigError, SessionError};
pub use node::{NodeApplication, NodeIdentity, TransmitTrigger};
pub use runner::{NodeRunner, TickReport};
pub use session::{DropReason, Reception, ReliableSession, SendOutcome};

/// Device address on the network. `0` is the gateway.
pub type NodeId = u8;
