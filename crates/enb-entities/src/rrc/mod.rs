//! The RRC entity: per-user connection state machines, security
//! negotiation, measurement configuration and mobility.
//!
//! All handlers run on the dispatch thread; per-user events are totally
//! ordered through the station queue. The MAC is reached through its
//! control surface, the outside layers through their SAP traits.

pub mod meas;
pub mod mobility;
pub mod security;
pub mod ue;

use std::collections::HashMap;
use std::sync::Arc;

use enb_config::SharedConfig;
use enb_core::timer::{TimerId, TtiTimers};
use enb_core::unimplemented_log;
use enb_core::{Lcid, Rnti, TtiPoint, LCID_SRB1, LCID_SRB2};
use enb_pdus::rrc::meas::{MeasIdMap, MeasObject, NeighCell, VarMeasCfg};
use enb_pdus::rrc::msgs::{
    ConnectionSetup, DlCcchMsg, DlDcchMsg, DrbCfg, RadioResourceCfg, Reconfiguration, ReleaseCause,
    SecurityModeCommand, UlCcchMsg, UlDcchMsg,
};
use enb_saps::events::{ErabToSetup, S1Event, StationCmd};
use enb_saps::pdcp::PdcpBearerCfg;
use enb_saps::rlc::{RlcBearerCfg, RlcMode};
use enb_saps::{PdcpSap, RlcSap, S1ReleaseCause, S1apSap};

use crate::mac::lch::LchConfig;
use crate::mac::Mac;
use ue::{ActivityPhase, Erab, RrcState, RrcUe};

/// Response-supervision deadline, ms
const RESPONSE_TIMEOUT_MS: u32 = 1000;
/// Delay between requesting release and dropping the user context, ms
const REMOVAL_GRACE_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Activity,
    RemovalGrace,
}

pub struct Rrc {
    cfg: SharedConfig,
    pub(crate) mac: Arc<Mac>,
    pub(crate) rlc: Arc<dyn RlcSap>,
    pub(crate) pdcp: Arc<dyn PdcpSap>,
    pub(crate) s1ap: Arc<dyn S1apSap>,
    pub(crate) users: HashMap<Rnti, RrcUe>,
    timers: TtiTimers,
    timer_owners: HashMap<TimerId, (Rnti, TimerKind)>,
    next_teid: u32,
}

impl Rrc {
    pub fn new(
        cfg: SharedConfig,
        mac: Arc<Mac>,
        rlc: Arc<dyn RlcSap>,
        pdcp: Arc<dyn PdcpSap>,
        s1ap: Arc<dyn S1apSap>,
    ) -> Rrc {
        Rrc {
            cfg,
            mac,
            rlc,
            pdcp,
            s1ap,
            users: HashMap::new(),
            timers: TtiTimers::new(),
            timer_owners: HashMap::new(),
            next_teid: 1,
        }
    }

    pub fn nof_users(&self) -> usize {
        self.users.len()
    }

    pub fn user_state(&self, rnti: Rnti) -> Option<RrcState> {
        self.users.get(&rnti).map(|u| u.state)
    }

    // ------------------------------------------------------------------
    // lifecycle and timers
    // ------------------------------------------------------------------

    /// A new radio identity appeared (RACH). Arms the Msg3 deadline.
    pub fn add_user(&mut self, rnti: Rnti) {
        if self.users.contains_key(&rnti) {
            tracing::warn!("add_user for existing rnti=0x{:x}", rnti);
            return;
        }
        let timer = self.timers.get_unique_timer();
        self.timer_owners.insert(timer, (rnti, TimerKind::Activity));
        self.users.insert(rnti, RrcUe::new(rnti, timer));
        self.set_activity_timeout(rnti, ActivityPhase::Msg3);
        tracing::info!("RRC user added rnti=0x{:x}", rnti);
    }

    fn activity_deadline_ms(&self, phase: ActivityPhase) -> u32 {
        match phase {
            ActivityPhase::Msg3 => {
                let cfg = self.cfg.config();
                let max_msg3 = cfg
                    .cells
                    .iter()
                    .next()
                    .map(|c| c.prach.max_msg3_retx as u32)
                    .unwrap_or(4);
                (max_msg3 + 1) * 16
            }
            ActivityPhase::Response => RESPONSE_TIMEOUT_MS,
            ActivityPhase::Inactivity => self.cfg.config().inactivity_timeout_ms,
        }
    }

    fn set_activity_timeout(&mut self, rnti: Rnti, phase: ActivityPhase) {
        let deadline = self.activity_deadline_ms(phase);
        let Some(user) = self.users.get_mut(&rnti) else {
            return;
        };
        user.activity_phase = phase;
        let timer = user.activity_timer;
        self.timers.set(timer, deadline);
        self.timers.run(timer);
        tracing::debug!("activity timeout rnti=0x{:x} {:?} = {} ms", rnti, phase, deadline);
    }

    /// Restart the activity timer with its current deadline
    pub fn set_activity_user(&mut self, rnti: Rnti) {
        let Some(user) = self.users.get(&rnti) else {
            return;
        };
        self.timers.run(user.activity_timer);
    }

    /// Millisecond tick; fires expired timers
    pub fn tti_tick(&mut self, tti: TtiPoint) {
        for timer in self.timers.tick(tti) {
            let Some((rnti, kind)) = self.timer_owners.get(&timer).copied() else {
                continue;
            };
            match kind {
                TimerKind::Activity => self.activity_timer_expired(rnti),
                TimerKind::RemovalGrace => self.rem_user_now(rnti),
            }
        }
    }

    fn activity_timer_expired(&mut self, rnti: Rnti) {
        let Some(user) = self.users.get(&rnti) else {
            return;
        };
        tracing::warn!(
            "activity timer expired rnti=0x{:x} in phase {:?}",
            rnti,
            user.activity_phase
        );
        self.release_user(rnti, S1ReleaseCause::UserInactivity);
    }

    /// Consecutive radio-link failures beyond the threshold behave like
    /// inactivity expiry
    pub fn rlf_indication(&mut self, rnti: Rnti) {
        let threshold = self.cfg.config().rlf_threshold;
        let Some(user) = self.users.get_mut(&rnti) else {
            return;
        };
        user.rlf_count += 1;
        if user.rlf_count >= threshold && user.state != RrcState::ReleaseRequested {
            tracing::warn!("radio link failure threshold reached rnti=0x{:x}", rnti);
            self.release_user(rnti, S1ReleaseCause::RadioConnectionLost);
        }
    }

    /// Ask the core network to release the user; the context is dropped
    /// after a grace period. Pending handovers and reconfigurations abort.
    fn release_user(&mut self, rnti: Rnti, cause: S1ReleaseCause) {
        let Some(user) = self.users.get_mut(&rnti) else {
            return;
        };
        if user.state == RrcState::ReleaseRequested {
            return;
        }
        let was_connected = user.is_connected();
        user.state = RrcState::ReleaseRequested;
        user.ho = None;
        if was_connected {
            self.pdcp.write_dcch(rnti, LCID_SRB1, &DlDcchMsg::ConnectionRelease { cause: ReleaseCause::Other });
        }
        self.s1ap.user_release(rnti, cause);

        let grace = self.timers.get_unique_timer();
        self.timer_owners.insert(grace, (rnti, TimerKind::RemovalGrace));
        self.timers.set(grace, REMOVAL_GRACE_MS);
        self.timers.run(grace);
    }

    /// Drop every trace of the user: PUCCH handles first, then the MAC
    /// context, then the packet-data layers
    fn rem_user_now(&mut self, rnti: Rnti) {
        let Some(mut user) = self.users.remove(&rnti) else {
            return;
        };
        if let Some(sr) = user.sr_res.as_mut() {
            self.mac.free_sr(sr);
        }
        if let Some(cqi) = user.cqi_res.as_mut() {
            self.mac.free_cqi(cqi);
        }
        self.timers.release(user.activity_timer);
        self.timer_owners.retain(|_, (owner, _)| *owner != rnti);
        self.mac.ue_rem(rnti);
        self.pdcp.rem_user(rnti);
        tracing::info!("RRC user removed rnti=0x{:x}", rnti);
    }

    /// Immediate removal without the release handshake (internal cleanup)
    pub(crate) fn drop_user_silent(&mut self, rnti: Rnti) {
        self.rem_user_now(rnti);
    }

    // ------------------------------------------------------------------
    // uplink CCCH (SRB0)
    // ------------------------------------------------------------------

    pub fn ul_ccch(&mut self, rnti: Rnti, msg: UlCcchMsg) {
        match msg {
            UlCcchMsg::ConnectionRequest { cause, ue_identity } => {
                self.handle_conn_request(rnti, cause, ue_identity)
            }
            UlCcchMsg::ConnectionReestablishmentRequest { rnti: old_rnti, pci } => {
                // reestablishment is not supported: always reject
                tracing::info!(
                    "reestablishment request from rnti=0x{:x} (old=0x{:x} pci={}): rejecting",
                    rnti,
                    old_rnti,
                    pci
                );
                self.rlc.write_ccch(rnti, &DlCcchMsg::ConnectionReestablishmentReject);
            }
        }
    }

    fn handle_conn_request(&mut self, rnti: Rnti, cause: enb_pdus::rrc::msgs::EstablishmentCause, ue_identity: u64) {
        let Some(user) = self.users.get(&rnti) else {
            tracing::warn!("connection request from unknown rnti=0x{:x}", rnti);
            return;
        };
        if user.state != RrcState::Idle {
            tracing::warn!("connection request in state {:?}, rnti=0x{:x}: dropping", user.state, rnti);
            return;
        }

        // PUCCH admission: without SR and CQI resources the user cannot
        // be served; reject with "no radio resources"
        let (sr_period, cqi_period) = {
            let cfg = self.cfg.config();
            (cfg.sched.sr_period, cfg.sched.cqi_period)
        };
        let sr_res = match self.mac.alloc_sr(sr_period) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("SR allocation failed for rnti=0x{:x}: {:?}", rnti, e);
                self.rlc.write_ccch(rnti, &DlCcchMsg::ConnectionReject { wait_time_s: 10 });
                self.release_user(rnti, S1ReleaseCause::NoRadioResources);
                return;
            }
        };
        let cqi_res = match self.mac.alloc_cqi(rnti, cqi_period) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("CQI allocation failed for rnti=0x{:x}: {:?}", rnti, e);
                let user = self.users.get_mut(&rnti).expect("checked above");
                user.sr_res = Some(sr_res);
                self.rlc.write_ccch(rnti, &DlCcchMsg::ConnectionReject { wait_time_s: 10 });
                self.release_user(rnti, S1ReleaseCause::NoRadioResources);
                return;
            }
        };

        // SRB1 comes up with the connection setup
        let _ = self.mac.bearer_ue_cfg(rnti, LCID_SRB1, LchConfig::srb(1));
        self.rlc.add_bearer(rnti, LCID_SRB1, &RlcBearerCfg { mode: RlcMode::Am });
        self.pdcp.add_bearer(rnti, LCID_SRB1, &PdcpBearerCfg { is_srb: true });

        let user = self.users.get_mut(&rnti).expect("checked above");
        user.sr_res = Some(sr_res);
        user.cqi_res = Some(cqi_res);
        user.est_cause = Some(cause);
        let transaction_id = user.next_transaction_id();
        user.state = RrcState::WaitSetupComplete;

        tracing::info!("connection request rnti=0x{:x} identity={:#x}: sending setup", rnti, ue_identity);
        self.rlc.write_ccch(rnti, &DlCcchMsg::ConnectionSetup(ConnectionSetup { transaction_id, srb1_priority: 1 }));
        self.set_activity_timeout(rnti, ActivityPhase::Msg3);
    }

    // ------------------------------------------------------------------
    // uplink DCCH (SRB1/SRB2)
    // ------------------------------------------------------------------

    pub fn ul_dcch(&mut self, rnti: Rnti, _lcid: Lcid, msg: UlDcchMsg) {
        // any received signalling restarts the activity timer
        self.set_activity_user(rnti);
        if !self.users.contains_key(&rnti) {
            tracing::warn!("DCCH message from unknown rnti=0x{:x}", rnti);
            return;
        }
        match msg {
            UlDcchMsg::ConnectionSetupComplete { transaction_id: _, nas } => {
                self.handle_setup_complete(rnti, nas)
            }
            UlDcchMsg::SecurityModeComplete { .. } => self.handle_smc_complete(rnti),
            UlDcchMsg::SecurityModeFailure { .. } => {
                tracing::error!("security mode failure from rnti=0x{:x}", rnti);
                self.release_user(rnti, S1ReleaseCause::SecurityConfigFailed);
            }
            UlDcchMsg::ReconfigurationComplete { transaction_id } => {
                self.handle_reconf_complete(rnti, transaction_id)
            }
            UlDcchMsg::MeasurementReport(report) => self.handle_meas_report(rnti, report),
            UlDcchMsg::UlInformationTransfer { nas } => self.s1ap.write_pdu(rnti, &nas),
            UlDcchMsg::UeCapabilityInformation { eea, eia } => {
                if let Some(user) = self.users.get_mut(&rnti) {
                    user.sec.caps.eea = eea;
                    user.sec.caps.eia = eia;
                }
            }
        }
    }

    fn handle_setup_complete(&mut self, rnti: Rnti, nas: Vec<u8>) {
        let Some(user) = self.users.get_mut(&rnti) else {
            return;
        };
        if user.state != RrcState::WaitSetupComplete {
            tracing::warn!("setup complete in state {:?}, rnti=0x{:x}", user.state, rnti);
            return;
        }
        let cause = user.est_cause.unwrap_or(enb_pdus::rrc::msgs::EstablishmentCause::MoData);
        self.s1ap.initial_ue(rnti, cause, &nas);
        self.set_activity_timeout(rnti, ActivityPhase::Response);
    }

    fn handle_smc_complete(&mut self, rnti: Rnti) {
        let Some(user) = self.users.get_mut(&rnti) else {
            return;
        };
        if user.sec.keys.is_none() {
            tracing::warn!("security mode complete without keys, rnti=0x{:x}", rnti);
            return;
        }
        // SRB1 now runs ciphered
        self.pdcp.enable_encryption(rnti, LCID_SRB1);
        self.send_initial_reconfiguration(rnti);
    }

    fn handle_reconf_complete(&mut self, rnti: Rnti, transaction_id: u8) {
        let Some(user) = self.users.get_mut(&rnti) else {
            return;
        };
        if user.state != RrcState::WaitReconfComplete {
            tracing::warn!("reconfiguration complete in state {:?}, rnti=0x{:x}", user.state, rnti);
            return;
        }
        if transaction_id != user.current_transaction_id() {
            tracing::warn!(
                "reconfiguration complete with stale transaction id {} (expected {}), rnti=0x{:x}",
                transaction_id,
                user.current_transaction_id(),
                rnti
            );
        }
        user.state = RrcState::Registered;
        let ctx_pending = std::mem::take(&mut user.ctx_setup_pending);
        if ctx_pending {
            self.s1ap.ctx_setup_response(rnti, true);
        }
        self.set_activity_timeout(rnti, ActivityPhase::Inactivity);
        tracing::info!("rnti=0x{:x} registered", rnti);
    }

    // ------------------------------------------------------------------
    // security procedure
    // ------------------------------------------------------------------

    fn start_security_mode(&mut self, rnti: Rnti) {
        let (eea_pref, eia_pref) = {
            let cfg = self.cfg.config();
            (cfg.eea_preference.clone(), cfg.eia_preference.clone())
        };
        let Some(user) = self.users.get_mut(&rnti) else {
            return;
        };
        let Some(kenb) = user.sec.kenb else {
            tracing::error!("security mode without K_eNB, rnti=0x{:x}", rnti);
            self.release_user(rnti, S1ReleaseCause::SecurityConfigFailed);
            return;
        };
        let (cipher, integ) = match security::select_algorithms(&user.sec.caps, &eea_pref, &eia_pref) {
            Ok(sel) => sel,
            Err(_) => {
                tracing::error!("no common security algorithms for rnti=0x{:x}", rnti);
                self.release_user(rnti, S1ReleaseCause::SecurityConfigFailed);
                return;
            }
        };
        let keys = security::derive_keys(&kenb, cipher, integ);
        user.sec.cipher = Some(cipher);
        user.sec.integ = Some(integ);
        user.sec.keys = Some(keys);
        let transaction_id = user.next_transaction_id();

        self.pdcp.config_security(rnti, LCID_SRB1, &keys, cipher, integ);
        self.pdcp.enable_integrity(rnti, LCID_SRB1);
        self.pdcp.write_dcch(
            rnti,
            LCID_SRB1,
            &DlDcchMsg::SecurityModeCommand(SecurityModeCommand { transaction_id, cipher_algo: cipher, integ_algo: integ }),
        );
        self.set_activity_timeout(rnti, ActivityPhase::Response);
    }

    /// First reconfiguration after security: SRB2, the pending E-RABs as
    /// DRBs, and the initial measurement configuration
    fn send_initial_reconfiguration(&mut self, rnti: Rnti) {
        // SRB2 setup
        let _ = self.mac.bearer_ue_cfg(rnti, LCID_SRB2, LchConfig::srb(3));
        self.rlc.add_bearer(rnti, LCID_SRB2, &RlcBearerCfg { mode: RlcMode::Am });
        self.pdcp.add_bearer(rnti, LCID_SRB2, &PdcpBearerCfg { is_srb: true });
        if let Some(user) = self.users.get(&rnti) {
            if let (Some(keys), Some(cipher), Some(integ)) = (user.sec.keys, user.sec.cipher, user.sec.integ) {
                self.pdcp.config_security(rnti, LCID_SRB2, &keys, cipher, integ);
                self.pdcp.enable_integrity(rnti, LCID_SRB2);
                self.pdcp.enable_encryption(rnti, LCID_SRB2);
            }
        }
        let meas_delta = self.build_meas_delta(rnti);
        self.send_reconfiguration(rnti, true, meas_delta, None);
    }

    /// Build and send a reconfiguration carrying the not-yet-established
    /// E-RABs; moves the user to wait-reconf-complete
    fn send_reconfiguration(
        &mut self,
        rnti: Rnti,
        srb2_setup: bool,
        meas_cfg: Option<enb_pdus::rrc::meas::MeasDelta>,
        mobility: Option<enb_pdus::rrc::msgs::MobilityControlInfo>,
    ) {
        let teid_base = self.next_teid;
        let Some(user) = self.users.get_mut(&rnti) else {
            return;
        };

        let mut drbs = Vec::new();
        let mut nas = Vec::new();
        let pending = std::mem::take(&mut user.pending_erabs);
        for (i, setup) in pending.iter().enumerate() {
            let erab = Erab::from_setup(setup, teid_base + i as u32);
            drbs.push(DrbCfg {
                drb_id: erab.drb_id,
                lcid: erab.lcid,
                erab_id: erab.erab_id,
                qci: erab.qci,
                priority: 4 + erab.drb_id,
                lcg: 2,
            });
            if !erab.nas.is_empty() {
                nas.push(erab.nas.clone());
            }
            user.erabs.insert(erab.erab_id, erab);
        }
        self.next_teid += pending.len() as u32;

        let transaction_id = user.next_transaction_id();
        user.state = RrcState::WaitReconfComplete;
        let sec = (user.sec.keys, user.sec.cipher, user.sec.integ);

        // bring the new DRBs up in MAC, RLC and PDCP
        for drb in &drbs {
            let _ = self.mac.bearer_ue_cfg(
                rnti,
                drb.lcid,
                LchConfig {
                    direction: crate::mac::lch::LchDirection::Both,
                    lcg: drb.lcg,
                    priority: drb.priority,
                    pbr_bytes_per_ms: 0,
                },
            );
            self.rlc.add_bearer(rnti, drb.lcid, &RlcBearerCfg { mode: RlcMode::Am });
            self.pdcp.add_bearer(rnti, drb.lcid, &PdcpBearerCfg { is_srb: false });
            if let (Some(keys), Some(cipher), Some(integ)) = sec {
                self.pdcp.config_security(rnti, drb.lcid, &keys, cipher, integ);
                self.pdcp.enable_encryption(rnti, drb.lcid);
            }
        }

        let msg = Reconfiguration {
            transaction_id,
            meas_cfg,
            mobility,
            rr_cfg: Some(RadioResourceCfg { srb2_setup, drbs_to_add: drbs, drbs_to_release: Vec::new() }),
            nas,
        };
        self.pdcp.write_dcch(rnti, LCID_SRB1, &DlDcchMsg::Reconfiguration(msg));
        self.set_activity_timeout(rnti, ActivityPhase::Response);
    }

    /// Target measurement configuration: one object per distinct EARFCN
    /// with the station's other cells as neighbours, one A3 report
    fn build_meas_delta(&mut self, rnti: Rnti) -> Option<enb_pdus::rrc::meas::MeasDelta> {
        let target = {
            let cfg = self.cfg.config();
            let mut target = VarMeasCfg::default();
            let mut obj = MeasObject::default();
            let mut serving_earfcn = 0;
            for (idx, cell) in cfg.cells.iter().enumerate() {
                if idx == 0 {
                    serving_earfcn = cell.dl_earfcn;
                    continue;
                }
                obj.cells.insert((cell.pci & 0xff) as u8, NeighCell { pci: cell.pci, offset_db: 0 });
            }
            if obj.cells.is_empty() {
                return None;
            }
            obj.earfcn = serving_earfcn;
            target.objects.insert(1, obj);
            target.reports.insert(
                1,
                enb_pdus::rrc::meas::ReportCfg {
                    trigger: enb_pdus::rrc::meas::EventTrigger::A3 { offset_db: 3 },
                    hysteresis_db: 1,
                    time_to_trigger_ms: 100,
                    max_report_cells: 4,
                    report_amount: 1,
                    report_interval_ms: 240,
                },
            );
            target.meas_ids.insert(1, MeasIdMap { object_id: 1, report_id: 1 });
            target
        };
        let user = self.users.get_mut(&rnti)?;
        let delta = meas::compute_diff(&user.meas_cfg, &target);
        user.meas_cfg = target;
        if delta.is_empty() {
            None
        } else {
            Some(delta)
        }
    }

    // ------------------------------------------------------------------
    // core-network events
    // ------------------------------------------------------------------

    pub fn s1_event(&mut self, ev: S1Event) {
        match ev {
            S1Event::InitialCtxSetup { rnti, erabs, security_caps, kenb } => {
                let Some(user) = self.users.get_mut(&rnti) else {
                    tracing::warn!("initial context setup for unknown rnti=0x{:x}", rnti);
                    return;
                };
                user.sec.caps = security_caps;
                user.sec.kenb = Some(kenb);
                user.pending_erabs = erabs;
                user.ctx_setup_pending = true;
                self.start_security_mode(rnti);
            }
            S1Event::ErabSetupRequest { rnti, erabs } => self.handle_erab_setup(rnti, erabs),
            S1Event::ErabReleaseCommand { rnti, erab_ids } => {
                if let Some(user) = self.users.get_mut(&rnti) {
                    for id in erab_ids {
                        if let Some(erab) = user.erabs.remove(&id) {
                            self.rlc.rem_bearer(rnti, erab.lcid);
                            let _ = self.mac.bearer_ue_rem(rnti, erab.lcid);
                        }
                    }
                }
            }
            S1Event::DlNas { rnti, nas } => {
                if self.users.contains_key(&rnti) {
                    self.pdcp.write_dcch(rnti, LCID_SRB1, &DlDcchMsg::DlInformationTransfer { nas });
                }
            }
            S1Event::UeContextRelease { rnti } => self.release_user(rnti, S1ReleaseCause::Normal),
            S1Event::HandoverCommand { rnti, success, container } => {
                self.handle_ho_command(rnti, success, container)
            }
            S1Event::Paging { ue_identity } => {
                // the paging record rides in the scheduler's SI/paging
                // space; connected users are never paged
                tracing::info!("paging identity {:#x}", ue_identity);
            }
        }
    }

    fn handle_erab_setup(&mut self, rnti: Rnti, erabs: Vec<ErabToSetup>) {
        let Some(user) = self.users.get_mut(&rnti) else {
            tracing::warn!("E-RAB setup for unknown rnti=0x{:x}", rnti);
            return;
        };
        if user.state != RrcState::Registered {
            tracing::warn!("E-RAB setup in state {:?}, rnti=0x{:x}", user.state, rnti);
            self.s1ap.ctx_setup_response(rnti, false);
            return;
        }
        user.pending_erabs.extend(erabs);
        user.ctx_setup_pending = true;
        self.send_reconfiguration(rnti, false, None, None);
    }

    // ------------------------------------------------------------------
    // station command surface
    // ------------------------------------------------------------------

    pub fn station_cmd(&mut self, cmd: StationCmd) {
        match cmd {
            StationCmd::CellGain { cell_id, gain_db } => {
                // applied by the radio front-end; recorded here
                tracing::info!("cell_gain cell={} gain={} dB", cell_id, gain_db);
            }
            StationCmd::CellEarfcn { cell_id, dl_earfcn, ul_earfcn } => {
                unimplemented_log!(
                    "cell_earfcn cell={} dl={} ul={}: retune stays with the radio front-end",
                    cell_id,
                    dl_earfcn,
                    ul_earfcn
                );
                let rntis: Vec<Rnti> = self.users.keys().copied().collect();
                for rnti in rntis {
                    if self.user_state(rnti) == Some(RrcState::Registered) {
                        self.send_reconfiguration(rnti, false, None, None);
                    }
                }
            }
            StationCmd::Handover { source_cell, target_cell } => {
                let target_pci = {
                    let cfg = self.cfg.config();
                    cfg.cells.get(target_cell).map(|c| c.pci)
                };
                let Some(target_pci) = target_pci else {
                    tracing::error!("handover command to unknown cell {}", target_cell);
                    return;
                };
                let rntis: Vec<Rnti> = self
                    .users
                    .iter()
                    .filter(|(_, u)| u.state == RrcState::Registered)
                    .map(|(r, _)| *r)
                    .collect();
                tracing::info!(
                    "forced handover of {} users from cell {} to cell {}",
                    rntis.len(),
                    source_cell,
                    target_cell
                );
                for rnti in rntis {
                    self.start_intra_handover(rnti, target_pci);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil;

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::ue::{ActivityPhase, RrcState};
    use super::*;
    use enb_pdus::rrc::msgs::EstablishmentCause;

    #[test]
    fn test_connection_establishment_happy_path() {
        let mut bench = TestBench::new();
        let rnti = bench.rach();
        assert_eq!(bench.rrc.user_state(rnti), Some(RrcState::Idle));

        // Msg3 delivered as a connection request
        bench.rrc.ul_ccch(rnti, UlCcchMsg::ConnectionRequest { cause: EstablishmentCause::MoSignalling, ue_identity: 0xdeadbeef });
        assert_eq!(bench.rrc.user_state(rnti), Some(RrcState::WaitSetupComplete));
        assert!(bench.rlc.sent_ccch_setup(rnti), "connection setup goes out on SRB0");

        // timer runs with the Msg3 deadline: (max_msg3_retx + 1) * 16
        let user = bench.rrc.users.get(&rnti).unwrap();
        assert_eq!(user.activity_phase, ActivityPhase::Msg3);
        assert_eq!(bench.rrc.timers.duration(user.activity_timer), (4 + 1) * 16);

        // setup complete reaches the core network
        bench.rrc.ul_dcch(rnti, LCID_SRB1, UlDcchMsg::ConnectionSetupComplete { transaction_id: 1, nas: vec![0x07, 0x41] });
        assert_eq!(bench.s1ap.initial_ue_count(), 1);

        // core network answers with context + keys; SMC goes out
        bench.initial_ctx_setup(rnti);
        assert!(bench.pdcp.sent_smc(rnti));

        bench.rrc.ul_dcch(rnti, LCID_SRB1, UlDcchMsg::SecurityModeComplete { transaction_id: 1 });
        assert!(bench.pdcp.sent_reconfiguration(rnti));
        assert_eq!(bench.rrc.user_state(rnti), Some(RrcState::WaitReconfComplete));

        let txn = bench.rrc.users.get(&rnti).unwrap().current_transaction_id();
        bench.rrc.ul_dcch(rnti, LCID_SRB1, UlDcchMsg::ReconfigurationComplete { transaction_id: txn });
        assert_eq!(bench.rrc.user_state(rnti), Some(RrcState::Registered));
        assert!(bench.s1ap.ctx_setup_ok(rnti));

        // registered users hold both PUCCH resource handles
        let user = bench.rrc.users.get(&rnti).unwrap();
        assert!(user.sr_res.is_some() && user.cqi_res.is_some());
    }

    #[test]
    fn test_activity_expiry_releases_user() {
        let mut bench = TestBench::new();
        let rnti = bench.connect_registered();
        let inactivity = bench.rrc.cfg.config().inactivity_timeout_ms;

        bench.rrc.tti_tick(enb_core::TtiPoint::new(inactivity + 1));
        assert_eq!(bench.rrc.user_state(rnti), Some(RrcState::ReleaseRequested));
        assert!(bench.s1ap.released(rnti));

        // grace period elapses on a later tick; user context disappears
        bench.rrc.tti_tick(enb_core::TtiPoint::new(inactivity + 200));
        assert_eq!(bench.rrc.user_state(rnti), None);
        assert!(!bench.mac.ue_exists(rnti));
    }

    #[test]
    fn test_release_frees_pucch_resources() {
        let mut bench = TestBench::new();
        let rnti = bench.connect_registered();
        let rnti2 = bench.rach();
        let _ = rnti2;

        bench.rrc.s1_event(S1Event::UeContextRelease { rnti });
        bench.rrc.tti_tick(enb_core::TtiPoint::new(5000));
        // a later admission starts from the freed slot
        let res = bench.mac.alloc_sr(20).unwrap();
        assert_eq!(res.n_pucch, 0, "grid counter returned to its pre-allocation value");
    }

    #[test]
    fn test_reestablishment_always_rejected() {
        let mut bench = TestBench::new();
        let rnti = bench.rach();
        bench.rrc.ul_ccch(rnti, UlCcchMsg::ConnectionReestablishmentRequest { rnti: 0x50, pci: 1 });
        assert!(bench.rlc.sent_reest_reject(rnti));
        assert_eq!(bench.rrc.user_state(rnti), Some(RrcState::Idle));
    }

    #[test]
    fn test_security_failure_releases_with_cause() {
        let mut bench = TestBench::new();
        let rnti = bench.rach();
        bench.rrc.ul_ccch(rnti, UlCcchMsg::ConnectionRequest { cause: EstablishmentCause::MoData, ue_identity: 1 });
        bench.rrc.ul_dcch(rnti, LCID_SRB1, UlDcchMsg::ConnectionSetupComplete { transaction_id: 1, nas: vec![] });
        // UE supports nothing the station accepts
        bench.initial_ctx_setup_with_caps(rnti, 0, 0);
        assert!(bench.s1ap.released_with(rnti, S1ReleaseCause::SecurityConfigFailed));
    }

    #[test]
    fn test_rlf_threshold_triggers_release() {
        let mut bench = TestBench::new();
        let rnti = bench.connect_registered();
        let threshold = bench.rrc.cfg.config().rlf_threshold;
        for _ in 0..threshold {
            bench.rrc.rlf_indication(rnti);
        }
        assert_eq!(bench.rrc.user_state(rnti), Some(RrcState::ReleaseRequested));
        assert!(bench.s1ap.released_with(rnti, S1ReleaseCause::RadioConnectionLost));
    }
}
