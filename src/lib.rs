#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

pub mod datalink;

pub use datalink::{DataLink, DataLinkAddress, DataLinkError, DataLinkType};

#[cfg(feature = "std")]
extern crate std;

#[cfg(not(feature = "std"))]
extern crate alloc;

/// BACnet protocol version octet, sent in every NPDU (ASHRAE 135 §6.2.2).
pub const BACNET_PROTOCOL_VERSION: u8 = 1;
/// Maximum APDU size this stack negotiates.
pub const BACNET_MAX_APDU: usize = 1476;
/// Maximum MPDU size, i.e. `BACNET_MAX_APDU` plus the largest NPDU header.
pub const BACNET_MAX_MPDU: usize = 1497;
