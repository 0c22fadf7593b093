//! Stack and cell configuration for the eNB.
//!
//! Deserialized from TOML at startup; handed to every entity as a
//! [`SharedConfig`] at construction. Cell membership is fixed once the
//! [`enb_core::CellSet`] is built.

pub mod stack_config;
pub mod toml_config;

pub use stack_config::{SchedConfig, SharedConfig, StackConfig};
