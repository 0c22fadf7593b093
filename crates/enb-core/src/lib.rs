//! Core utilities for the eNB stack
//!
//! Fundamental types shared by every layer: the TTI clock, cell parameters,
//! the bit-level PDU buffer, TBS/MCS computation and error kinds.

/// Git version string, set at compile time
pub const GIT_VERSION: &str = git_version::git_version!(fallback = "unknown");
/// Stack version followed by git version string, e.g., "0.2.0-aabbccdd"
pub const STACK_VERSION: &str = const_format::formatcp!("{}-{}", env!("CARGO_PKG_VERSION"), GIT_VERSION);

pub mod bitbuf;
pub mod cell;
pub mod debug;
pub mod error;
pub mod security;
pub mod tbs;
pub mod timer;
pub mod tti;

pub use bitbuf::BitBuf;
pub use cell::{CellParams, CellSet, CyclicPrefix};
pub use error::{AllocErr, MacPduErr, RrcErr, SchedErr};
pub use tti::TtiPoint;

/// 16-bit per-user radio address
pub type Rnti = u16;

/// First C-RNTI handed out to a user during random access
pub const FIRST_CRNTI: Rnti = 0x46;
/// Last usable C-RNTI; values above are reserved RA/P/SI-RNTI space
pub const LAST_CRNTI: Rnti = 0xFFF3;
pub const P_RNTI: Rnti = 0xFFFE;
pub const SI_RNTI: Rnti = 0xFFFF;

/// RA-RNTI for an FDD PRACH received in subframe `sf_idx` (36.321 5.1.4)
pub fn ra_rnti(sf_idx: u32) -> Rnti {
    (1 + sf_idx) as Rnti
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Dl,
    Ul,
}

/// Logical channel id inside a MAC PDU. LCID 0 is SRB0/CCCH,
/// 1 and 2 the signalling bearers, 3 and up data bearers.
pub type Lcid = u8;

pub const LCID_CCCH: Lcid = 0;
pub const LCID_SRB1: Lcid = 1;
pub const LCID_SRB2: Lcid = 2;
pub const LCID_DRB_BASE: Lcid = 3;
pub const MAX_LCID: usize = 11;

/// Logical channel group for uplink buffer status reporting
pub type Lcg = u8;
pub const MAX_LCG: usize = 4;
