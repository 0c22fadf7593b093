use std::sync::{Arc, RwLock, RwLockReadGuard};

use enb_core::security::{CipherAlgo, IntegAlgo};
use enb_core::CellSet;

/// Scheduler tuning knobs, applied to every user at admission
#[derive(Debug, Clone)]
pub struct SchedConfig {
    /// PDCCH aggregation level cap, one of 1/2/4/8
    pub max_aggr_level: u8,
    pub max_mcs_dl: u8,
    pub max_mcs_ul: u8,
    /// If set, overrides the CQI-derived MCS
    pub fixed_mcs_dl: Option<u8>,
    pub fixed_mcs_ul: Option<u8>,
    pub ul_64qam: bool,
    /// SR period handed to new users, ms
    pub sr_period: u32,
    /// Periodic CQI period handed to new users, ms
    pub cqi_period: u32,
}

impl Default for SchedConfig {
    fn default() -> Self {
        SchedConfig {
            max_aggr_level: 8,
            max_mcs_dl: 28,
            max_mcs_ul: 20,
            fixed_mcs_dl: None,
            fixed_mcs_ul: None,
            ul_64qam: false,
            sr_period: 20,
            cqi_period: 40,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackConfig {
    pub enb_name: String,
    /// Inactivity release timeout, ms
    pub inactivity_timeout_ms: u32,
    /// Consecutive radio-link failures before release
    pub rlf_threshold: u32,
    /// Ciphering preference, most preferred first
    pub eea_preference: Vec<CipherAlgo>,
    /// Integrity preference, most preferred first. EIA0 entries are ignored.
    pub eia_preference: Vec<IntegAlgo>,
    pub sched: SchedConfig,
    pub cells: CellSet,
    /// Optional verbose logfile path
    pub debug_log: Option<String>,
}

impl StackConfig {
    pub fn with_cells(cells: CellSet) -> StackConfig {
        StackConfig {
            enb_name: "enb01".into(),
            inactivity_timeout_ms: 10_000,
            rlf_threshold: 30,
            eea_preference: vec![CipherAlgo::Eea0, CipherAlgo::Eea2, CipherAlgo::Eea1],
            eia_preference: vec![IntegAlgo::Eia2, IntegAlgo::Eia1],
            sched: SchedConfig::default(),
            cells,
            debug_log: None,
        }
    }
}

/// Cheaply clonable handle on the stack configuration, shared by every
/// entity. Mutation happens only through station commands; readers take
/// the guard for the duration of one operation, never across a TTI.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<StackConfig>>,
}

impl SharedConfig {
    pub fn new(cfg: StackConfig) -> SharedConfig {
        SharedConfig { inner: Arc::new(RwLock::new(cfg)) }
    }

    pub fn config(&self) -> RwLockReadGuard<'_, StackConfig> {
        self.inner.read().expect("config lock poisoned")
    }

    pub fn update<F: FnOnce(&mut StackConfig)>(&self, f: F) {
        let mut guard = self.inner.write().expect("config lock poisoned");
        f(&mut guard);
    }
}

/// Test fixture: one 50-PRB cell, defaults everywhere else
pub fn test_config() -> SharedConfig {
    let cells = CellSet::new(vec![enb_core::cell::test_cell(0, 1)]).unwrap();
    SharedConfig::new(StackConfig::with_cells(cells))
}

/// Test fixture: two cells on the same station (intra-handover setups)
pub fn test_config_two_cells() -> SharedConfig {
    let cells = CellSet::new(vec![enb_core::cell::test_cell(0, 1), enb_core::cell::test_cell(1, 2)]).unwrap();
    SharedConfig::new(StackConfig::with_cells(cells))
}
