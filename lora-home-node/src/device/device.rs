use std::fmt::Debug;
use std::time::Duration;

/// Half-duplex state of the transceiver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkMode {
    Transmit,
    Receive,
}

/// Packet-level access to the radio, as seen by the [ReliableSession](crate::session::ReliableSession).
///
/// Only one of transmit or receive mode is active at a time. Callers switch explicitly around
/// every [transmit](RadioLink::transmit).
pub trait RadioLink {
    type LinkError: Debug;

    fn set_mode(&mut self, mode: LinkMode) -> Result<(), Self::LinkError>;

    /// Sends one packet, returning once it is on air.
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), Self::LinkError>;

    /// Non-blocking check for an incoming packet. Returns its size in bytes.
    ///
    /// A new pending packet replaces whatever was left unread of the previous one.
    fn poll_incoming(&mut self) -> Result<Option<usize>, Self::LinkError>;

    /// Reads the next byte of the pending packet.
    fn read_byte(&mut self) -> Result<u8, Self::LinkError>;

    /// Reads `size` bytes of the pending packet.
    fn read_packet(&mut self, size: usize) -> Result<Vec<u8>, Self::LinkError> {
        let mut bytes = Vec::with_capacity(size);
        for _ in 0..size {
            bytes.push(self.read_byte()?);
        }
        Ok(bytes)
    }

    /// Drops `size` bytes of the pending packet.
    fn discard(&mut self, size: usize) -> Result<(), Self::LinkError> {
        for _ in 0..size {
            self.read_byte()?;
        }
        Ok(())
    }

    /// Idles between two polls.
    fn pause(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms.into()));
    }
}
