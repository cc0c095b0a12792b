use embedded_hal::blocking::delay::DelayMs;
use log::{debug, trace};
use radio::{RadioState, Receive, ReceiveInfo, State, Transmit};
use std::fmt::Debug;
use std::marker::PhantomData;

use super::device::{LinkMode, RadioLink};

/// Largest packet a LoRa transceiver FIFO can hold.
pub const MAX_LORA_PAYLOAD: usize = 255;

/// Radio physical device representation.
///
/// Any driver implementing the `radio` HAL traits and a blocking delay fits, e.g. an SX127x over SPI.
pub trait Radio<E>:
    Transmit<Error = E> + Receive<Error = E> + State<Error = E> + DelayMs<u32>
{
}

impl<E, T> Radio<E> for T
where
    E: Debug,
    T: Transmit<Error = E> + Receive<Error = E> + State<Error = E> + DelayMs<u32>,
{
}

/// Transmission completion polling.
#[derive(Debug, Copy, Clone)]
pub struct TxParams {
    /// Delay between two `check_transmit`, in ms.
    pub check_delay_ms: u32,
    /// Number of checks before giving up on a transmission.
    pub max_checks: usize,
}

impl Default for TxParams {
    fn default() -> Self {
        TxParams {
            check_delay_ms: 10,
            max_checks: 500,
        }
    }
}

/// [RadioLink] implementation for a LoRa radio module.
pub struct LoRaLink<T, E>
where
    T: Radio<E>,
    E: Debug,
{
    radio: T,
    params: TxParams,
    mode: Option<LinkMode>,
    rx_buffer: [u8; MAX_LORA_PAYLOAD + 1],
    rx_len: usize,
    rx_cursor: usize,
    last_rssi: Option<i16>,
    phantom: PhantomData<E>,
}

impl<T, E> LoRaLink<T, E>
where
    T: Radio<E>,
    E: Debug,
{
    pub fn new(radio: T, params: TxParams) -> Self {
        Self {
            radio,
            params,
            mode: None,
            rx_buffer: [0u8; MAX_LORA_PAYLOAD + 1],
            rx_len: 0,
            rx_cursor: 0,
            last_rssi: None,
            phantom: PhantomData,
        }
    }

    /// Current mode, `None` until the first [set_mode](RadioLink::set_mode).
    pub fn mode(&self) -> Option<LinkMode> {
        self.mode
    }

    /// RSSI of the last packet pulled from the radio.
    pub fn last_rssi(&self) -> Option<i16> {
        self.last_rssi
    }

    pub fn radio_mut(&mut self) -> &mut T {
        &mut self.radio
    }

    pub fn into_inner(self) -> T {
        self.radio
    }

    fn clear_rx(&mut self) {
        self.rx_len = 0;
        self.rx_cursor = 0;
    }
}

impl<T, E> RadioLink for LoRaLink<T, E>
where
    T: Radio<E>,
    E: Debug,
{
    type LinkError = RadioError<E>;

    /// Transmit mode puts the transceiver in standby, leaving any reception in progress.
    fn set_mode(&mut self, mode: LinkMode) -> Result<(), Self::LinkError> {
        self.clear_rx();
        match mode {
            LinkMode::Receive => self
                .radio
                .start_receive()
                .map_err(RadioError::InternalRadioError)?,
            LinkMode::Transmit => self
                .radio
                .set_state(<<T as State>::State as RadioState>::idle())
                .map_err(RadioError::InternalRadioError)?,
        }
        self.mode = Some(mode);
        Ok(())
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<(), Self::LinkError> {
        if self.mode != Some(LinkMode::Transmit) {
            return Err(RadioError::WrongMode {
                expected: LinkMode::Transmit,
                current: self.mode,
            });
        }
        if bytes.len() > MAX_LORA_PAYLOAD {
            return Err(RadioError::TooBigFrameError { size: bytes.len() });
        }
        trace!("Transmission on air ({}B)", bytes.len());
        self.radio
            .start_transmit(bytes)
            .map_err(RadioError::InternalRadioError)?;
        for _ in 0..self.params.max_checks {
            if self
                .radio
                .check_transmit()
                .map_err(RadioError::InternalRadioError)?
            {
                return Ok(());
            }
            self.radio.delay_ms(self.params.check_delay_ms);
        }
        Err(RadioError::TransmitTimeout {
            checks: self.params.max_checks,
        })
    }

    fn poll_incoming(&mut self) -> Result<Option<usize>, Self::LinkError> {
        if self.mode != Some(LinkMode::Receive) {
            return Err(RadioError::WrongMode {
                expected: LinkMode::Receive,
                current: self.mode,
            });
        }
        if !self
            .radio
            .check_receive(true)
            .map_err(RadioError::InternalRadioError)?
        {
            return Ok(None);
        }
        self.clear_rx();
        let (size, info) = self
            .radio
            .get_received(&mut self.rx_buffer)
            .map_err(RadioError::InternalRadioError)?;
        let size = size.min(self.rx_buffer.len());
        self.last_rssi = Some(info.rssi());
        if size == 0 {
            debug!("Packet ignored: size 0");
            return Ok(None);
        }
        debug!("Received an incoming LoRa packet ({}B, rssi {})", size, info.rssi());
        self.rx_len = size;
        Ok(Some(size))
    }

    fn read_byte(&mut self) -> Result<u8, Self::LinkError> {
        if self.rx_cursor >= self.rx_len {
            return Err(RadioError::NothingToRead);
        }
        let byte = self.rx_buffer[self.rx_cursor];
        self.rx_cursor += 1;
        Ok(byte)
    }

    fn pause(&mut self, ms: u32) {
        self.radio.delay_ms(ms);
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RadioError<R>
where
    R: Debug,
{
    #[error("Packet is too big to be transmitted (is: {}B, max: {}B)!", .size, MAX_LORA_PAYLOAD)]
    TooBigFrameError { size: usize },

    #[error("Radio is in {:?} mode, {:?} required.", .current, .expected)]
    WrongMode {
        expected: LinkMode,
        current: Option<LinkMode>,
    },

    #[error("No pending byte to read.")]
    NothingToRead,

    #[error("Transmission not completed after {} checks.", .checks)]
    TransmitTimeout { checks: usize },

    #[error("Internal radio error: {:?}", .0)]
    InternalRadioError(R),
}
