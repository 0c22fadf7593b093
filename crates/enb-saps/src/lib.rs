//! Inter-layer service access points.
//!
//! The scheduler's FAPI-like per-TTI interface toward the physical layer,
//! capability traits toward RLC/PDCP and the core-network signalling layer,
//! and the station's asynchronous event alphabet. Deep polymorphic layer
//! interfaces of the original appear here as narrow traits plus tagged
//! message enums.

pub mod events;
pub mod pdcp;
pub mod phy;
pub mod rlc;
pub mod s1ap;

pub use events::{S1Event, StackEvent, StationCmd};
pub use pdcp::PdcpSap;
pub use phy::{DciDl, DciFormat, DciUl, DlSched, DlSchedData, PrbInterval, RbgMask, UlSched, UlSchedData};
pub use rlc::RlcSap;
pub use s1ap::{S1apSap, S1ReleaseCause};
