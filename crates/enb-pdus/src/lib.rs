//! PDU codecs and message models.
//!
//! `mac` carries the TS 36.321 binary subheader formats used on the air;
//! `rrc` models 36.331 messages as tagged types. RRC messages cross layer
//! boundaries as values; their ASN.1 wire codec is the standard's and lives
//! outside this repository.

pub mod mac;
pub mod rrc;
