use std::fmt::Debug;

use crate::device::frame::FrameError;
use crate::NodeId;

/// Failure of a [ReliableSession](crate::session::ReliableSession) operation.
///
/// Frames received from the air never end up here, they are dropped and logged.
#[derive(thiserror::Error, Debug)]
pub enum SessionError<E>
where
    E: Debug,
{
    #[error("Bad frame error: {}", .0)]
    Frame(#[from] FrameError),

    #[error("Radio link error: {:?}", .0)]
    Link(E),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Node id {} is reserved (gateway or broadcast).", .0)]
    ReservedNodeId(NodeId),

    #[error("At least one transmission attempt is needed.")]
    NoAttempts,

    #[error("Acknowledgment timeout must not be zero.")]
    ZeroAckTimeout,
}
