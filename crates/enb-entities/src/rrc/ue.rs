//! Per-user RRC state.

use std::collections::BTreeMap;

use enb_core::security::{CipherAlgo, DerivedKeys, IntegAlgo, SecurityCapabilities};
use enb_core::timer::TimerId;
use enb_core::{Lcid, Rnti};
use enb_pdus::rrc::meas::VarMeasCfg;
use enb_saps::events::ErabToSetup;

use crate::mac::pucch::{CqiResource, SrResource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RrcState {
    Idle,
    WaitSetupComplete,
    WaitReconfComplete,
    Registered,
    ReleaseRequested,
}

/// Which deadline the activity timer currently enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityPhase {
    /// Waiting for Msg3 / the connection request
    Msg3,
    /// Waiting for a response to a downlink message
    Response,
    /// Connected, user-inactivity supervision
    Inactivity,
}

/// An established or pending E-RAB
#[derive(Debug, Clone)]
pub struct Erab {
    pub erab_id: u8,
    pub qci: u8,
    pub transport_addr: Vec<u8>,
    pub teid_out: u32,
    pub teid_in: u32,
    pub nas: Vec<u8>,
    pub drb_id: u8,
    pub lcid: Lcid,
}

impl Erab {
    pub fn from_setup(setup: &ErabToSetup, teid_in: u32) -> Erab {
        let drb_id = setup.erab_id.saturating_sub(4).max(1);
        Erab {
            erab_id: setup.erab_id,
            qci: setup.qci,
            transport_addr: setup.transport_addr.clone(),
            teid_out: setup.teid_out,
            teid_in,
            nas: setup.nas.clone(),
            drb_id,
            lcid: drb_id + 2,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct SecurityCtx {
    pub caps: SecurityCapabilities,
    pub kenb: Option<[u8; 32]>,
    pub cipher: Option<CipherAlgo>,
    pub integ: Option<IntegAlgo>,
    pub keys: Option<DerivedKeys>,
}

/// An in-flight handover for one user
#[derive(Debug, Clone)]
pub enum HoCtx {
    /// Target cell belongs to this station; waiting for the C-RNTI CE
    /// under the new identity
    Intra { target_pci: u16, old_rnti: Rnti },
    /// S1 handover; waiting for the core network's answer
    S1 { target_pci: u16 },
}

pub struct RrcUe {
    pub rnti: Rnti,
    pub state: RrcState,
    pub sec: SecurityCtx,
    /// 2-bit RRC transaction identifier
    transaction_id: u8,
    pub rlf_count: u32,
    pub activity_timer: TimerId,
    pub activity_phase: ActivityPhase,
    pub erabs: BTreeMap<u8, Erab>,
    pub pending_erabs: Vec<ErabToSetup>,
    pub sr_res: Option<SrResource>,
    pub cqi_res: Option<CqiResource>,
    /// Measurement configuration last sent to the user
    pub meas_cfg: VarMeasCfg,
    pub ho: Option<HoCtx>,
    /// Identity this user held before an intra-station handover; a
    /// duplicate C-RNTI CE for the same mapping is ignored through this
    pub prev_rnti: Option<Rnti>,
    /// Initial-context-setup response owed to the core network
    pub ctx_setup_pending: bool,
    /// Establishment cause from the connection request, forwarded with
    /// the first NAS message
    pub est_cause: Option<enb_pdus::rrc::msgs::EstablishmentCause>,
}

impl RrcUe {
    pub fn new(rnti: Rnti, activity_timer: TimerId) -> RrcUe {
        RrcUe {
            rnti,
            state: RrcState::Idle,
            sec: SecurityCtx::default(),
            transaction_id: 0,
            rlf_count: 0,
            activity_timer,
            activity_phase: ActivityPhase::Msg3,
            erabs: BTreeMap::new(),
            pending_erabs: Vec::new(),
            sr_res: None,
            cqi_res: None,
            meas_cfg: VarMeasCfg::default(),
            ho: None,
            prev_rnti: None,
            ctx_setup_pending: false,
            est_cause: None,
        }
    }

    /// Next transaction id for an outgoing message expecting a reply
    pub fn next_transaction_id(&mut self) -> u8 {
        self.transaction_id = (self.transaction_id + 1) % 4;
        self.transaction_id
    }

    pub fn current_transaction_id(&self) -> u8 {
        self.transaction_id
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, RrcState::Registered | RrcState::WaitReconfComplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_wraps_mod_4() {
        let mut ue = RrcUe::new(0x46, 0);
        assert_eq!(ue.next_transaction_id(), 1);
        assert_eq!(ue.next_transaction_id(), 2);
        assert_eq!(ue.next_transaction_id(), 3);
        assert_eq!(ue.next_transaction_id(), 0);
        assert_eq!(ue.next_transaction_id(), 1);
    }

    #[test]
    fn test_erab_to_drb_mapping() {
        let setup = ErabToSetup {
            erab_id: 5,
            qci: 9,
            transport_addr: vec![10, 0, 0, 1],
            teid_out: 0x1234,
            nas: vec![0x27, 0x01],
        };
        let erab = Erab::from_setup(&setup, 7);
        assert_eq!(erab.drb_id, 1);
        assert_eq!(erab.lcid, 3);
        assert_eq!(erab.teid_in, 7);
    }
}
