//! Recording doubles for the outside layers plus a wired-up test bench.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use enb_config::stack_config::{test_config, test_config_two_cells};
use enb_core::security::{CipherAlgo, DerivedKeys, IntegAlgo, SecurityCapabilities};
use enb_core::{Lcid, Rnti, TtiPoint, LCID_SRB1};
use enb_pdus::rrc::meas::NeighCell;
use enb_pdus::rrc::msgs::{
    DlCcchMsg, DlDcchMsg, EstablishmentCause, HandoverPreparationInfo, UlCcchMsg, UlDcchMsg,
};
use enb_saps::events::{ErabToSetup, S1Event};
use enb_saps::pdcp::PdcpBearerCfg;
use enb_saps::rlc::RlcBearerCfg;
use enb_saps::{PdcpSap, RlcSap, S1ReleaseCause, S1apSap};

use crate::mac::Mac;
use crate::rrc::Rrc;

#[derive(Default)]
pub struct RecordingRlc {
    pub ccch: Mutex<Vec<(Rnti, DlCcchMsg)>>,
    pub reest: Mutex<HashSet<Rnti>>,
}

impl RlcSap for RecordingRlc {
    fn add_bearer(&self, _rnti: Rnti, _lcid: Lcid, _cfg: &RlcBearerCfg) {}
    fn rem_bearer(&self, _rnti: Rnti, _lcid: Lcid) {}
    fn read_pdu(&self, _rnti: Rnti, _lcid: Lcid, _max_bytes: usize) -> Vec<u8> {
        Vec::new()
    }
    fn write_pdu(&self, _rnti: Rnti, _lcid: Lcid, _payload: &[u8]) {}
    fn write_ccch(&self, rnti: Rnti, msg: &DlCcchMsg) {
        self.ccch.lock().unwrap().push((rnti, msg.clone()));
    }
    fn reestablish(&self, rnti: Rnti) {
        self.reest.lock().unwrap().insert(rnti);
    }
    fn rem_user(&self, _rnti: Rnti) {}
}

impl RecordingRlc {
    pub fn sent_ccch_setup(&self, rnti: Rnti) -> bool {
        self.ccch
            .lock()
            .unwrap()
            .iter()
            .any(|(r, m)| *r == rnti && matches!(m, DlCcchMsg::ConnectionSetup(_)))
    }

    pub fn sent_reest_reject(&self, rnti: Rnti) -> bool {
        self.ccch
            .lock()
            .unwrap()
            .iter()
            .any(|(r, m)| *r == rnti && matches!(m, DlCcchMsg::ConnectionReestablishmentReject))
    }

    pub fn reestablished(&self, rnti: Rnti) -> bool {
        self.reest.lock().unwrap().contains(&rnti)
    }
}

#[derive(Default)]
pub struct RecordingPdcp {
    pub dcch: Mutex<Vec<(Rnti, Lcid, DlDcchMsg)>>,
    pub reest: Mutex<HashSet<Rnti>>,
}

impl PdcpSap for RecordingPdcp {
    fn add_bearer(&self, _rnti: Rnti, _lcid: Lcid, _cfg: &PdcpBearerCfg) {}
    fn config_security(
        &self,
        _rnti: Rnti,
        _lcid: Lcid,
        _keys: &DerivedKeys,
        _cipher_algo: CipherAlgo,
        _integ_algo: IntegAlgo,
    ) {
    }
    fn enable_integrity(&self, _rnti: Rnti, _lcid: Lcid) {}
    fn enable_encryption(&self, _rnti: Rnti, _lcid: Lcid) {}
    fn write_dcch(&self, rnti: Rnti, lcid: Lcid, msg: &DlDcchMsg) {
        self.dcch.lock().unwrap().push((rnti, lcid, msg.clone()));
    }
    fn reestablish(&self, rnti: Rnti) {
        self.reest.lock().unwrap().insert(rnti);
    }
    fn rem_user(&self, _rnti: Rnti) {}
}

impl RecordingPdcp {
    pub fn sent_smc(&self, rnti: Rnti) -> bool {
        self.dcch
            .lock()
            .unwrap()
            .iter()
            .any(|(r, _, m)| *r == rnti && matches!(m, DlDcchMsg::SecurityModeCommand(_)))
    }

    pub fn sent_reconfiguration(&self, rnti: Rnti) -> bool {
        self.dcch
            .lock()
            .unwrap()
            .iter()
            .any(|(r, _, m)| *r == rnti && matches!(m, DlDcchMsg::Reconfiguration(_)))
    }

    pub fn sent_ho_command(&self, rnti: Rnti) -> bool {
        self.dcch
            .lock()
            .unwrap()
            .iter()
            .any(|(r, _, m)| *r == rnti && matches!(m, DlDcchMsg::HandoverCommand { .. }))
    }

    /// (new_crnti, target_pci) of the last mobility reconfiguration sent
    /// to `rnti`
    pub fn last_mobility(&self, rnti: Rnti) -> Option<(Rnti, u16)> {
        self.dcch.lock().unwrap().iter().rev().find_map(|(r, _, m)| {
            if *r != rnti {
                return None;
            }
            match m {
                DlDcchMsg::Reconfiguration(reconf) => {
                    reconf.mobility.as_ref().map(|mci| (mci.new_crnti, mci.target_pci))
                }
                _ => None,
            }
        })
    }

    pub fn nof_dcch_msgs(&self) -> usize {
        self.dcch.lock().unwrap().len()
    }

    pub fn reestablished(&self, rnti: Rnti) -> bool {
        self.reest.lock().unwrap().contains(&rnti)
    }
}

#[derive(Default)]
pub struct RecordingS1ap {
    pub initial_ues: Mutex<Vec<Rnti>>,
    pub releases: Mutex<Vec<(Rnti, S1ReleaseCause)>>,
    pub ctx_responses: Mutex<Vec<(Rnti, bool)>>,
    pub ho_requests: Mutex<Vec<(Rnti, u16)>>,
}

impl S1apSap for RecordingS1ap {
    fn initial_ue(&self, rnti: Rnti, _cause: EstablishmentCause, _nas: &[u8]) {
        self.initial_ues.lock().unwrap().push(rnti);
    }
    fn write_pdu(&self, _rnti: Rnti, _nas: &[u8]) {}
    fn user_release(&self, rnti: Rnti, cause: S1ReleaseCause) {
        self.releases.lock().unwrap().push((rnti, cause));
    }
    fn ctx_setup_response(&self, rnti: Rnti, success: bool) {
        self.ctx_responses.lock().unwrap().push((rnti, success));
    }
    fn handover_required(&self, rnti: Rnti, target_pci: u16, _container: &HandoverPreparationInfo) {
        self.ho_requests.lock().unwrap().push((rnti, target_pci));
    }
}

impl RecordingS1ap {
    pub fn initial_ue_count(&self) -> usize {
        self.initial_ues.lock().unwrap().len()
    }

    pub fn released(&self, rnti: Rnti) -> bool {
        self.releases.lock().unwrap().iter().any(|(r, _)| *r == rnti)
    }

    pub fn released_with(&self, rnti: Rnti, cause: S1ReleaseCause) -> bool {
        self.releases.lock().unwrap().iter().any(|(r, c)| *r == rnti && *c == cause)
    }

    pub fn ctx_setup_ok(&self, rnti: Rnti) -> bool {
        self.ctx_responses.lock().unwrap().iter().any(|(r, ok)| *r == rnti && *ok)
    }

    pub fn ho_required(&self, rnti: Rnti) -> bool {
        self.ho_requests.lock().unwrap().iter().any(|(r, _)| *r == rnti)
    }
}

pub struct TestBench {
    pub mac: Arc<Mac>,
    pub rrc: Rrc,
    pub rlc: Arc<RecordingRlc>,
    pub pdcp: Arc<RecordingPdcp>,
    pub s1ap: Arc<RecordingS1ap>,
    rach_count: u32,
}

impl TestBench {
    fn build(cfg: enb_config::SharedConfig) -> TestBench {
        enb_core::debug::setup_logging_verbose();
        let rlc = Arc::new(RecordingRlc::default());
        let pdcp = Arc::new(RecordingPdcp::default());
        let s1ap = Arc::new(RecordingS1ap::default());
        let mac = Arc::new(Mac::new(cfg.clone(), rlc.clone()));
        let rrc = Rrc::new(cfg, mac.clone(), rlc.clone(), pdcp.clone(), s1ap.clone());
        TestBench { mac, rrc, rlc, pdcp, s1ap, rach_count: 0 }
    }

    pub fn new() -> TestBench {
        TestBench::build(test_config())
    }

    pub fn two_cells() -> TestBench {
        TestBench::build(test_config_two_cells())
    }

    /// Preamble detection: temporary identity in MAC and RRC
    pub fn rach(&mut self) -> Rnti {
        self.rach_count += 1;
        let tti = TtiPoint::new(100 + self.rach_count);
        let rnti = self
            .mac
            .rach_detected(0, tti, (self.rach_count % 52) as u8, 17)
            .expect("rach admission");
        self.rrc.add_user(rnti);
        rnti
    }

    pub fn initial_ctx_setup(&mut self, rnti: Rnti) {
        self.initial_ctx_setup_with_caps(rnti, 0b011, 0b011)
    }

    pub fn initial_ctx_setup_with_caps(&mut self, rnti: Rnti, eea: u8, eia: u8) {
        self.rrc.s1_event(S1Event::InitialCtxSetup {
            rnti,
            erabs: vec![ErabToSetup {
                erab_id: 5,
                qci: 9,
                transport_addr: vec![10, 0, 0, 1],
                teid_out: 0xcafe,
                nas: vec![0x27, 0x00],
            }],
            security_caps: SecurityCapabilities { eea, eia },
            kenb: [0x11; 32],
        });
    }

    /// Run the whole establishment ladder and land in registered
    pub fn connect_registered(&mut self) -> Rnti {
        let rnti = self.rach();
        self.rrc.ul_ccch(
            rnti,
            UlCcchMsg::ConnectionRequest { cause: EstablishmentCause::MoData, ue_identity: 0x12345 },
        );
        self.rrc.ul_dcch(
            rnti,
            LCID_SRB1,
            UlDcchMsg::ConnectionSetupComplete { transaction_id: 1, nas: vec![0x07, 0x41] },
        );
        self.initial_ctx_setup(rnti);
        let txn = self.rrc.users.get(&rnti).unwrap().current_transaction_id();
        self.rrc.ul_dcch(rnti, LCID_SRB1, UlDcchMsg::SecurityModeComplete { transaction_id: txn });
        let txn = self.rrc.users.get(&rnti).unwrap().current_transaction_id();
        self.rrc.ul_dcch(rnti, LCID_SRB1, UlDcchMsg::ReconfigurationComplete { transaction_id: txn });
        assert_eq!(self.rrc.user_state(rnti), Some(crate::rrc::ue::RrcState::Registered));
        rnti
    }

    /// Registered user whose measurement configuration knows one
    /// off-station neighbour
    pub fn connect_registered_with_neighbour(&mut self, pci: u16) -> Rnti {
        let rnti = self.connect_registered();
        let user = self.rrc.users.get_mut(&rnti).unwrap();
        let obj = user.meas_cfg.objects.entry(1).or_default();
        obj.cells.insert((pci & 0xff) as u8, NeighCell { pci, offset_db: 0 });
        rnti
    }
}
