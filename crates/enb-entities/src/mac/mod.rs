//! The MAC entity: user table, per-carrier schedulers, PUCCH grids.
//!
//! Lifecycle events (add, remove, C-RNTI update, bearer changes) take the
//! user-table write lock and run on the dispatch thread. The per-TTI
//! scheduler entry points take the read lock plus one carrier mutex; PHY
//! workers calling with distinct TTIs and carriers do not contend.

pub mod harq;
pub mod lch;
pub mod pucch;
pub mod sched;
pub mod sched_ue;
pub mod ue;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use enb_config::SharedConfig;
use enb_core::cell::CellSet;
use enb_core::{Lcid, Rnti, SchedErr, TtiPoint, FIRST_CRNTI, LAST_CRNTI};
use enb_saps::phy::{DlSched, UlSched};
use enb_saps::RlcSap;

use lch::LchConfig;
use pucch::{CqiResource, PucchGrid, SrResource};
use sched::CarrierSched;
use sched_ue::UeSchedCfg;
use ue::{MacUe, UlPduOutcome};

pub struct Mac {
    cfg: SharedConfig,
    cells: CellSet,
    users: RwLock<sched::UserMap>,
    carriers: Vec<Mutex<CarrierSched>>,
    pucch: Vec<Mutex<PucchGrid>>,
    rlc: Arc<dyn RlcSap>,
    next_crnti: Mutex<Rnti>,
}

impl Mac {
    pub fn new(cfg: SharedConfig, rlc: Arc<dyn RlcSap>) -> Mac {
        let cells = cfg.config().cells.clone();
        let carriers = cells.iter().map(|c| Mutex::new(CarrierSched::new(c.clone()))).collect();
        let pucch = cells.iter().map(|c| Mutex::new(PucchGrid::new(c))).collect();
        Mac { cfg, cells, users: RwLock::new(HashMap::new()), carriers, pucch, rlc, next_crnti: Mutex::new(FIRST_CRNTI) }
    }

    pub fn cells(&self) -> &CellSet {
        &self.cells
    }

    fn carrier_pos(&self, cc_idx: u32) -> Option<usize> {
        self.cells.iter().position(|c| c.cc_idx == cc_idx)
    }

    fn ue_sched_cfg(&self) -> UeSchedCfg {
        let cfg = self.cfg.config();
        UeSchedCfg {
            max_aggr_level: cfg.sched.max_aggr_level,
            max_mcs_dl: cfg.sched.max_mcs_dl,
            max_mcs_ul: cfg.sched.max_mcs_ul,
            fixed_mcs_dl: cfg.sched.fixed_mcs_dl,
            fixed_mcs_ul: cfg.sched.fixed_mcs_ul,
            ul_64qam: cfg.sched.ul_64qam,
            max_harq_retx: 4,
            tx_mode: 1,
            cqi_period: cfg.sched.cqi_period,
        }
    }

    // ------------------------------------------------------------------
    // lifecycle (dispatch thread, write lock)
    // ------------------------------------------------------------------

    /// Pick a free C-RNTI. Fails when the space is exhausted.
    fn alloc_crnti(&self, users: &sched::UserMap) -> Option<Rnti> {
        let mut next = self.next_crnti.lock().expect("crnti lock poisoned");
        for _ in 0..(LAST_CRNTI - FIRST_CRNTI) {
            let cand = *next;
            *next = if *next >= LAST_CRNTI { FIRST_CRNTI } else { *next + 1 };
            if !users.contains_key(&cand) {
                return Some(cand);
            }
        }
        None
    }

    /// Allocate a fresh C-RNTI and admit a user under it (handover path)
    pub fn alloc_ue(&self) -> Result<Rnti, SchedErr> {
        let rnti = {
            let users = self.users.read().expect("user table poisoned");
            self.alloc_crnti(&users).ok_or(SchedErr::NoRntiFree)?
        };
        self.ue_add(rnti)?;
        Ok(rnti)
    }

    /// Admit a user with a caller-chosen RNTI
    pub fn ue_add(&self, rnti: Rnti) -> Result<(), SchedErr> {
        let mut users = self.users.write().expect("user table poisoned");
        if users.contains_key(&rnti) {
            return Err(SchedErr::UnknownRnti { rnti });
        }
        let cc_idxs: Vec<u32> = self.cells.iter().map(|c| c.cc_idx).collect();
        let mut ue = MacUe::new(rnti, self.ue_sched_cfg(), &cc_idxs);
        ue.sched.lch.set_cfg(0, LchConfig::srb(0));
        users.insert(rnti, Mutex::new(ue));
        tracing::info!("MAC user added rnti=0x{:x}", rnti);
        Ok(())
    }

    pub fn ue_rem(&self, rnti: Rnti) {
        let mut users = self.users.write().expect("user table poisoned");
        if users.remove(&rnti).is_none() {
            tracing::warn!("ue_rem for unknown rnti=0x{:x}", rnti);
            return;
        }
        self.rlc.rem_user(rnti);
        tracing::info!("MAC user removed rnti=0x{:x}", rnti);
    }

    pub fn ue_exists(&self, rnti: Rnti) -> bool {
        self.users.read().expect("user table poisoned").contains_key(&rnti)
    }

    /// RRC-driven C-RNTI change (handover): scheduling config and bearer
    /// state carry over, HARQ state is flushed.
    pub fn ue_set_crnti(&self, old_rnti: Rnti, new_rnti: Rnti) -> Result<(), SchedErr> {
        let mut users = self.users.write().expect("user table poisoned");
        let ue_lock = users.remove(&old_rnti).ok_or(SchedErr::UnknownRnti { rnti: old_rnti })?;
        let mut ue = ue_lock.into_inner().expect("user lock poisoned");
        ue.sched.rnti = new_rnti;
        for cc in ue.sched.carriers.iter_mut() {
            cc.harq.reset_all();
        }
        ue.sched.lch.clear_ces();
        users.insert(new_rnti, Mutex::new(ue));
        tracing::info!("MAC C-RNTI updated 0x{:x} -> 0x{:x}", old_rnti, new_rnti);
        Ok(())
    }

    /// Contention-resolution C-RNTI CE: the temporary user merges into the
    /// announced permanent one; the temporary identity's UL HARQ migrates.
    pub fn ue_migrate_crnti(&self, temp_rnti: Rnti, perm_rnti: Rnti) -> Result<(), SchedErr> {
        let mut users = self.users.write().expect("user table poisoned");
        if !users.contains_key(&perm_rnti) {
            return Err(SchedErr::UnknownRnti { rnti: perm_rnti });
        }
        let Some(temp_lock) = users.remove(&temp_rnti) else {
            return Err(SchedErr::UnknownRnti { rnti: temp_rnti });
        };
        let temp = temp_lock.into_inner().expect("user lock poisoned");
        let perm = users.get_mut(&perm_rnti).expect("checked above");
        let perm_ue = perm.get_mut().expect("user lock poisoned");
        if let (Some(from), Some(to)) = (temp.sched.carriers.first(), perm_ue.sched.carriers.first_mut()) {
            to.harq.ul = from.harq.ul.clone();
        }
        tracing::info!("UL HARQ migrated 0x{:x} -> 0x{:x}", temp_rnti, perm_rnti);
        Ok(())
    }

    pub fn bearer_ue_cfg(&self, rnti: Rnti, lcid: Lcid, cfg: LchConfig) -> Result<(), SchedErr> {
        self.with_ue(rnti, |ue| ue.sched.lch.set_cfg(lcid, cfg))
    }

    pub fn bearer_ue_rem(&self, rnti: Rnti, lcid: Lcid) -> Result<(), SchedErr> {
        self.with_ue(rnti, |ue| ue.sched.lch.rem(lcid))
    }

    pub fn phy_config_enabled(&self, rnti: Rnti, enabled: bool) -> Result<(), SchedErr> {
        self.with_ue(rnti, |ue| ue.sched.phy_config_enabled = enabled)
    }

    fn with_ue<T>(&self, rnti: Rnti, f: impl FnOnce(&mut MacUe) -> T) -> Result<T, SchedErr> {
        let users = self.users.read().expect("user table poisoned");
        let ue_lock = users.get(&rnti).ok_or(SchedErr::UnknownRnti { rnti })?;
        let mut ue = ue_lock.lock().expect("user lock poisoned");
        Ok(f(&mut ue))
    }

    // ------------------------------------------------------------------
    // PUCCH resources (RRC admission/release path)
    // ------------------------------------------------------------------

    pub fn alloc_sr(&self, period: u32) -> Result<SrResource, enb_core::AllocErr> {
        self.pucch[0].lock().expect("pucch lock poisoned").allocate_sr(period)
    }

    /// Allocate a periodic CQI resource and record the pmi index in the
    /// user's scheduling context for the CQI-needed predicate
    pub fn alloc_cqi(&self, rnti: Rnti, period: u32) -> Result<CqiResource, enb_core::AllocErr> {
        let res = self.pucch[0].lock().expect("pucch lock poisoned").allocate_cqi(period)?;
        if self.with_ue(rnti, |ue| ue.sched.cqi_pmi_idx = Some(res.pmi_idx)).is_err() {
            tracing::warn!("alloc_cqi for unknown rnti=0x{:x}", rnti);
        }
        Ok(res)
    }

    pub fn free_sr(&self, res: &mut SrResource) {
        self.pucch[0].lock().expect("pucch lock poisoned").free_sr(res);
    }

    pub fn free_cqi(&self, res: &mut CqiResource) {
        self.pucch[0].lock().expect("pucch lock poisoned").free_cqi(res);
    }

    // ------------------------------------------------------------------
    // PHY indications (dispatch thread)
    // ------------------------------------------------------------------

    /// Preamble detected: admit a temporary user and queue the RAR.
    /// Returns the temporary C-RNTI.
    pub fn rach_detected(&self, cc_idx: u32, tti: TtiPoint, preamble: u8, time_adv: u16) -> Result<Rnti, SchedErr> {
        let pos = self.carrier_pos(cc_idx).ok_or(SchedErr::UnknownCarrier { cc_idx })?;
        let temp_crnti = {
            let users = self.users.read().expect("user table poisoned");
            self.alloc_crnti(&users).ok_or(SchedErr::NoRntiFree)?
        };
        self.ue_add(temp_crnti)?;
        self.carriers[pos]
            .lock()
            .expect("carrier lock poisoned")
            .push_rach(tti, preamble, time_adv, temp_crnti);
        tracing::info!(
            "rach_detected cc={} tti={} preamble={} ta={} -> temp_crnti=0x{:x}",
            cc_idx,
            tti,
            preamble,
            time_adv,
            temp_crnti
        );
        Ok(temp_crnti)
    }

    pub fn sr_detected(&self, rnti: Rnti) -> Result<(), SchedErr> {
        self.with_ue(rnti, |ue| ue.sched.sr_pending = true)
    }

    pub fn cqi_info(&self, tti: TtiPoint, rnti: Rnti, cc_idx: u32, cqi: u8) -> Result<(), SchedErr> {
        self.with_ue(rnti, |ue| ue.sched.set_dl_cqi(tti, cc_idx, cqi))
    }

    pub fn ri_info(&self, tti: TtiPoint, rnti: Rnti, cc_idx: u32, ri: u8) -> Result<(), SchedErr> {
        self.with_ue(rnti, |ue| ue.sched.set_dl_ri(tti, cc_idx, ri))
    }

    pub fn pmi_info(&self, tti: TtiPoint, rnti: Rnti, cc_idx: u32, pmi: u8) -> Result<(), SchedErr> {
        self.with_ue(rnti, |ue| ue.sched.set_dl_pmi(tti, cc_idx, pmi))
    }

    /// DL HARQ feedback. Returns true when a process exhausted its
    /// retransmissions (radio-link-failure indication for RRC).
    pub fn ack_info(&self, tti_ack: TtiPoint, rnti: Rnti, cc_idx: u32, _tb_idx: u8, ack: bool) -> Result<bool, SchedErr> {
        self.with_ue(rnti, |ue| {
            let Some(cc) = ue.sched.carrier_mut(cc_idx) else {
                return false;
            };
            if cc.harq.set_dl_ack(tti_ack, ack).is_none() {
                tracing::debug!("ack with no matching harq, rnti=0x{:x} tti={}", rnti, tti_ack);
            }
            if ack {
                ue.sched.metrics.tx_pkts += 1;
            } else {
                ue.sched.metrics.tx_pkts += 1;
                ue.sched.metrics.tx_errors += 1;
            }
            ue.sched.carrier_mut(cc_idx).map_or(false, |cc| cc.harq.flush_exhausted_dl())
        })
    }

    /// UL CRC outcome. Returns true on retransmission exhaustion.
    pub fn crc_info(&self, tti_rx: TtiPoint, rnti: Rnti, cc_idx: u32, ok: bool) -> Result<bool, SchedErr> {
        self.with_ue(rnti, |ue| {
            let max_retx = ue.sched.cfg.max_harq_retx;
            let mut exhausted = false;
            if let Some(cc) = ue.sched.carrier_mut(cc_idx) {
                let h = cc.harq.get_ul(tti_rx);
                h.set_crc(ok);
                if !ok && h.n_retx >= max_retx {
                    tracing::info!("ul harq pid={} exhausted for rnti=0x{:x}, flushing", h.pid, rnti);
                    h.reset();
                    exhausted = true;
                }
            }
            ue.sched.metrics.rx_pkts += 1;
            if !ok {
                ue.sched.metrics.rx_errors += 1;
            }
            exhausted
        })
    }

    /// Decoded UL-SCH transport block from the PHY
    pub fn ul_pdu(&self, rnti: Rnti, _cc_idx: u32, payload: &[u8]) -> Result<UlPduOutcome, SchedErr> {
        let users = self.users.read().expect("user table poisoned");
        let ue_lock = users.get(&rnti).ok_or(SchedErr::UnknownRnti { rnti })?;
        let mut ue = ue_lock.lock().expect("user lock poisoned");
        match ue.process_ul_pdu(payload, self.rlc.as_ref()) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // protocol violation: log, discard, keep the user
                tracing::error!("malformed UL PDU from rnti=0x{:x}: {:?}", rnti, e);
                Ok(UlPduOutcome::default())
            }
        }
    }

    // ------------------------------------------------------------------
    // buffer state (packet-data layers)
    // ------------------------------------------------------------------

    pub fn dl_buffer_state(&self, rnti: Rnti, lcid: Lcid, tx_queue: u32, retx_queue: u32) -> Result<(), SchedErr> {
        self.with_ue(rnti, |ue| ue.sched.lch.dl_buffer(lcid, tx_queue, retx_queue))
    }

    pub fn dl_ce_scell_activation(&self, rnti: Rnti, mask: u8) -> Result<(), SchedErr> {
        self.with_ue(rnti, |ue| {
            ue.sched.lch.push_scell_activation(mask);
            for cc in ue.sched.carriers.iter_mut().skip(1) {
                if mask & (1u8 << (cc.cc_idx & 7)) != 0 {
                    cc.activate();
                } else {
                    cc.deactivate();
                }
            }
        })
    }

    pub fn queue_conres_ce(&self, rnti: Rnti) -> Result<(), SchedErr> {
        self.with_ue(rnti, |ue| ue.queue_conres_ce())
    }

    pub fn set_ta(&self, rnti: Rnti, ta: i32) -> Result<u32, SchedErr> {
        self.with_ue(rnti, |ue| ue.set_ta(ta))
    }

    pub fn metrics(&self, rnti: Rnti) -> Result<sched_ue::UeMetrics, SchedErr> {
        self.with_ue(rnti, |ue| ue.sched.metrics)
    }

    // ------------------------------------------------------------------
    // per-TTI FAPI surface (PHY workers, read lock)
    // ------------------------------------------------------------------

    pub fn get_dl_sched(&self, tti_tx: TtiPoint, cc_idx: u32, cfi: u8) -> Result<DlSched, SchedErr> {
        let pos = self.carrier_pos(cc_idx).ok_or(SchedErr::UnknownCarrier { cc_idx })?;
        let users = self.users.read().expect("user table poisoned");
        for ue_lock in users.values() {
            ue_lock.lock().expect("user lock poisoned").sched.new_tti(tti_tx);
        }
        let mut carrier = self.carriers[pos].lock().expect("carrier lock poisoned");
        Ok(carrier.dl_sched(tti_tx, cfi, &users, self.rlc.as_ref()))
    }

    pub fn get_ul_sched(&self, tti_tx: TtiPoint, cc_idx: u32) -> Result<UlSched, SchedErr> {
        let pos = self.carrier_pos(cc_idx).ok_or(SchedErr::UnknownCarrier { cc_idx })?;
        let users = self.users.read().expect("user table poisoned");
        let mut carrier = self.carriers[pos].lock().expect("carrier lock poisoned");
        Ok(carrier.ul_sched(tti_tx, &users))
    }
}
