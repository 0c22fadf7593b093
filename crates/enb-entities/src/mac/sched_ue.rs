//! Per-user scheduling context: CSI state, MCS/TBS and aggregation-level
//! computation, DCI format selection and the per-carrier activation state
//! machine. One instance per user, owned by the MAC user table.

use enb_core::tbs;
use enb_core::{Rnti, TtiPoint};
use enb_saps::phy::DciFormat;

use super::harq::HarqEntity;
use super::lch::LchManager;

/// Carrier activation state of one user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcState {
    Idle,
    Activating,
    Active,
    Deactivating,
}

/// TTIs a deactivating carrier keeps draining pending HARQ
const DEACT_DRAIN_TTIS: u8 = 8;

/// Scheduler knobs applied to one user
#[derive(Debug, Clone, Copy)]
pub struct UeSchedCfg {
    pub max_aggr_level: u8,
    pub max_mcs_dl: u8,
    pub max_mcs_ul: u8,
    pub fixed_mcs_dl: Option<u8>,
    pub fixed_mcs_ul: Option<u8>,
    pub ul_64qam: bool,
    /// DL HARQ retransmission limit
    pub max_harq_retx: u8,
    /// Transmission mode, 1..=4
    pub tx_mode: u8,
    pub cqi_period: u32,
}

impl Default for UeSchedCfg {
    fn default() -> Self {
        UeSchedCfg {
            max_aggr_level: 8,
            max_mcs_dl: 28,
            max_mcs_ul: 20,
            fixed_mcs_dl: None,
            fixed_mcs_ul: None,
            ul_64qam: false,
            max_harq_retx: 4,
            tx_mode: 1,
            cqi_period: 40,
        }
    }
}

/// One user's state on one carrier
#[derive(Debug, Clone)]
pub struct CcSchedUe {
    pub cc_idx: u32,
    pub harq: HarqEntity,
    pub dl_cqi: u8,
    pub dl_cqi_tti: TtiPoint,
    pub dl_cqi_rx: bool,
    pub ul_cqi: u8,
    pub ul_cqi_tti: TtiPoint,
    pub dl_ri: u8,
    pub dl_ri_tti: TtiPoint,
    pub dl_pmi: u8,
    pub dl_pmi_tti: TtiPoint,
    state: CcState,
    drain_ttis: u8,
}

impl CcSchedUe {
    pub fn new(cc_idx: u32, max_harq_retx: u8, active: bool) -> CcSchedUe {
        CcSchedUe {
            cc_idx,
            harq: HarqEntity::new(max_harq_retx),
            dl_cqi: 1,
            dl_cqi_tti: TtiPoint::default(),
            dl_cqi_rx: false,
            ul_cqi: 1,
            ul_cqi_tti: TtiPoint::default(),
            dl_ri: 0,
            dl_ri_tti: TtiPoint::default(),
            dl_pmi: 0,
            dl_pmi_tti: TtiPoint::default(),
            state: if active { CcState::Active } else { CcState::Idle },
            drain_ttis: 0,
        }
    }

    pub fn state(&self) -> CcState {
        self.state
    }

    pub fn is_schedulable(&self) -> bool {
        matches!(self.state, CcState::Active | CcState::Activating)
    }

    /// idle -> activating, entered when the SCell-activation CE is sent
    pub fn activate(&mut self) {
        if self.state == CcState::Idle {
            self.state = CcState::Activating;
        }
    }

    /// active -> deactivating; pending HARQ drains before idle
    pub fn deactivate(&mut self) {
        if matches!(self.state, CcState::Active | CcState::Activating) {
            self.state = CcState::Deactivating;
            self.drain_ttis = DEACT_DRAIN_TTIS;
        }
    }

    pub fn set_dl_cqi(&mut self, tti: TtiPoint, cqi: u8) {
        self.dl_cqi = cqi;
        self.dl_cqi_tti = tti;
        self.dl_cqi_rx = true;
        // first valid CQI completes activation
        if self.state == CcState::Activating {
            self.state = CcState::Active;
        }
    }

    /// Per-TTI housekeeping; drains the deactivation countdown
    pub fn finish_tti(&mut self) {
        if self.state == CcState::Deactivating {
            if self.drain_ttis > 0 {
                self.drain_ttis -= 1;
            }
            if self.drain_ttis == 0 {
                self.state = CcState::Idle;
                self.harq.reset_all();
                self.dl_cqi_rx = false;
            }
        }
    }
}

/// Running per-user counters surfaced through a metrics snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct UeMetrics {
    pub tx_pkts: u32,
    pub tx_errors: u32,
    pub tx_bytes: u64,
    pub rx_pkts: u32,
    pub rx_errors: u32,
    pub rx_bytes: u64,
    pub nof_tti: u32,
}

#[derive(Debug, Clone)]
pub struct SchedUe {
    pub rnti: Rnti,
    pub cfg: UeSchedCfg,
    pub lch: LchManager,
    pub carriers: Vec<CcSchedUe>,
    pub sr_pending: bool,
    pub power_headroom: i32,
    /// Pending TPC commands (DCI encoding, 1 = hold), consumed on grant
    pub next_tpc_pusch: u8,
    pub next_tpc_pucch: u8,
    pub phy_config_enabled: bool,
    pub current_tti: TtiPoint,
    /// cqi-pmi-ConfigIndex of the allocated periodic CQI resource
    pub cqi_pmi_idx: Option<u32>,
    pub metrics: UeMetrics,
}

impl SchedUe {
    pub fn new(rnti: Rnti, cfg: UeSchedCfg, cc_idxs: &[u32]) -> SchedUe {
        let carriers = cc_idxs
            .iter()
            .enumerate()
            .map(|(i, &cc)| CcSchedUe::new(cc, cfg.max_harq_retx, i == 0))
            .collect();
        SchedUe {
            rnti,
            cfg,
            lch: LchManager::new(),
            carriers,
            sr_pending: false,
            power_headroom: 0,
            next_tpc_pusch: 1,
            next_tpc_pucch: 1,
            phy_config_enabled: false,
            current_tti: TtiPoint::default(),
            cqi_pmi_idx: None,
            metrics: UeMetrics::default(),
        }
    }

    pub fn carrier(&self, cc_idx: u32) -> Option<&CcSchedUe> {
        self.carriers.iter().find(|c| c.cc_idx == cc_idx)
    }

    pub fn carrier_mut(&mut self, cc_idx: u32) -> Option<&mut CcSchedUe> {
        self.carriers.iter_mut().find(|c| c.cc_idx == cc_idx)
    }

    pub fn new_tti(&mut self, tti: TtiPoint) {
        if self.current_tti == tti {
            return;
        }
        self.current_tti = tti;
        self.metrics.nof_tti = self.metrics.nof_tti.wrapping_add(1);
        for cc in self.carriers.iter_mut() {
            cc.finish_tti();
        }
    }

    // --- CSI ---

    pub fn set_dl_cqi(&mut self, tti: TtiPoint, cc_idx: u32, cqi: u8) {
        if let Some(cc) = self.carrier_mut(cc_idx) {
            cc.set_dl_cqi(tti, cqi);
        }
    }

    pub fn set_ul_cqi(&mut self, tti: TtiPoint, cc_idx: u32, cqi: u8) {
        if let Some(cc) = self.carrier_mut(cc_idx) {
            cc.ul_cqi = cqi;
            cc.ul_cqi_tti = tti;
        }
    }

    pub fn set_dl_ri(&mut self, tti: TtiPoint, cc_idx: u32, ri: u8) {
        if let Some(cc) = self.carrier_mut(cc_idx) {
            cc.dl_ri = ri;
            cc.dl_ri_tti = tti;
        }
    }

    pub fn set_dl_pmi(&mut self, tti: TtiPoint, cc_idx: u32, pmi: u8) {
        if let Some(cc) = self.carrier_mut(cc_idx) {
            cc.dl_pmi = pmi;
            cc.dl_pmi_tti = tti;
        }
    }

    // --- MCS/TBS ---

    /// DL MCS cap for this carrier: fixed override, else CQI-derived
    pub fn dl_mcs(&self, cc_idx: u32) -> u8 {
        let cqi = self.carrier(cc_idx).map_or(1, |c| c.dl_cqi);
        let mcs = self.cfg.fixed_mcs_dl.unwrap_or_else(|| tbs::cqi_to_mcs(cqi));
        mcs.min(self.cfg.max_mcs_dl)
    }

    /// UL grant MCS from `ul_cqi`, capped by `max_mcs_ul`; a fixed MCS
    /// overrides
    pub fn ul_mcs(&self, cc_idx: u32) -> u8 {
        let cqi = self.carrier(cc_idx).map_or(1, |c| c.ul_cqi);
        let mcs = self.cfg.fixed_mcs_ul.unwrap_or_else(|| tbs::cqi_to_mcs(cqi));
        mcs.min(self.cfg.max_mcs_ul)
    }

    /// PRBs needed to move `req_bytes` downlink, with the chosen MCS.
    /// `None` if the request does not fit the carrier at all.
    pub fn required_dl_prbs(&self, cc_idx: u32, req_bytes: u32, nof_prb: u32) -> Option<(u32, u8)> {
        let mcs = self.dl_mcs(cc_idx);
        let itbs = tbs::dl_mcs_to_itbs(mcs)?;
        let prbs = tbs::min_prb_for_bytes(itbs, req_bytes, nof_prb)?;
        Some((prbs, mcs))
    }

    pub fn required_ul_prbs(&self, cc_idx: u32, req_bytes: u32, nof_prb: u32) -> Option<(u32, u8)> {
        let mcs = self.ul_mcs(cc_idx);
        let itbs = tbs::ul_mcs_to_itbs(mcs, self.cfg.ul_64qam)?;
        let prbs = tbs::min_prb_for_bytes(itbs, req_bytes, nof_prb)?;
        Some((prbs, mcs))
    }

    /// Minimum PDCCH aggregation level {1,2,4,8} whose capacity carries
    /// `nof_bits` DCI bits at the channel's code rate, capped by config
    pub fn get_aggr_level(&self, cc_idx: u32, nof_bits: u32) -> u8 {
        let cqi = self.carrier(cc_idx).map_or(1, |c| c.dl_cqi);
        let max_rate = max_pdcch_coderate(cqi);
        let mut level = 1u8;
        while level < self.cfg.max_aggr_level {
            // one CCE carries 36 QPSK REs = 72 bits
            let rate = nof_bits as f32 / (72.0 * level as f32);
            if rate <= max_rate {
                break;
            }
            level *= 2;
        }
        level.min(self.cfg.max_aggr_level)
    }

    /// DCI format from antenna configuration and transmission mode
    pub fn dci_format(&self) -> DciFormat {
        if !self.phy_config_enabled {
            return DciFormat::F1A;
        }
        match self.cfg.tx_mode {
            1 | 2 => DciFormat::F1,
            3 => DciFormat::F2A,
            4 => DciFormat::F2,
            other => {
                tracing::warn!("unsupported tx_mode {}, falling back to format 1A", other);
                DciFormat::F1A
            }
        }
    }

    /// True when a CQI should be requested with an uplink grant at `tti`:
    /// the last received CQI is older than the configured period, and the
    /// subframe is not the periodic CQI slot (multiples of the period,
    /// offset by the PMI index) where one arrives anyway.
    pub fn needs_cqi(&self, tti: TtiPoint, cc_idx: u32) -> bool {
        let Some(pmi_idx) = self.cqi_pmi_idx else {
            return false;
        };
        let period = self.cfg.cqi_period;
        if period == 0 {
            return false;
        }
        let Some(cc) = self.carrier(cc_idx) else {
            return false;
        };
        let stale = !cc.dl_cqi_rx || cc.dl_cqi_tti.age(tti) > period as i32;
        let periodic_here = tti.value() % period == pmi_idx % period;
        stale && !periodic_here
    }

    // --- TPC ---

    pub fn tpc_inc(&mut self) {
        self.next_tpc_pusch = 2;
        self.next_tpc_pucch = 2;
    }

    pub fn tpc_dec(&mut self) {
        self.next_tpc_pusch = 0;
        self.next_tpc_pucch = 0;
    }

    /// Hand the pending PUSCH TPC to a DCI and reset to hold
    pub fn consume_tpc_pusch(&mut self) -> u8 {
        std::mem::replace(&mut self.next_tpc_pusch, 1)
    }

    pub fn consume_tpc_pucch(&mut self) -> u8 {
        std::mem::replace(&mut self.next_tpc_pucch, 1)
    }

    /// Total uplink demand visible to the scheduler
    pub fn ul_pending_bytes(&self) -> u32 {
        let bsr = self.lch.ul_pending_bytes();
        if bsr == 0 && self.sr_pending {
            // an SR with an empty BSR still earns a minimal grant
            8
        } else {
            bsr
        }
    }

    /// Total downlink demand: RLC queues plus pending control elements
    pub fn dl_pending_bytes(&self) -> u32 {
        self.lch.dl_pending_bytes() + self.lch.ce_pending_bytes()
    }
}

/// Highest PDCCH code rate a channel with the given CQI sustains
fn max_pdcch_coderate(cqi: u8) -> f32 {
    const RATES: [f32; 16] = [
        0.08, 0.08, 0.1, 0.15, 0.2, 0.25, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.85, 0.9, 0.92, 0.93,
    ];
    RATES[(cqi as usize).min(15)]
}
