//! Everything needed to exchange frames with the gateway using the physical
//! radio module.

pub mod checksum;
pub mod device;
pub mod frame;
pub mod radio;

pub use device::*;
