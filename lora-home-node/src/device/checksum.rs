//! Frame checksum.
//!
//! Frames are protected by a CRC-16/CCITT-FALSE (polynomial `0x1021`, initial register `0xFFFF`,
//! MSB-first, no reflection, no final XOR), catalogued as `CRC_16_IBM_3740` by the `crc` crate.
use crc::{Crc, CRC_16_IBM_3740};

/// CRC engine shared by every frame encoder/decoder.
pub const FRAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Computes the frame checksum of `data`.
///
/// An empty slice yields `0` and not the `0xFFFF` initial register. Deployed nodes and gateways
/// rely on this, keep it.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    if data.is_empty() {
        return 0;
    }
    FRAME_CRC.checksum(data)
}
