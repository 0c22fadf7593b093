//! Bring-up implementations of the outside layers.
//!
//! Real deployments attach RLC/PDCP engines and an S1AP transport through
//! the SAP traits; these shims queue, log and loop back enough to drive
//! the stack end to end from the command line.

use std::collections::HashMap;
use std::sync::Mutex;

use enb_core::{Lcid, Rnti};
use enb_pdus::rrc::msgs::{DlCcchMsg, DlDcchMsg};
use enb_saps::pdcp::PdcpBearerCfg;
use enb_saps::rlc::{RlcBearerCfg, RlcSap};
use enb_saps::{PdcpSap, S1ReleaseCause, S1apSap};
use enb_core::security::{CipherAlgo, DerivedKeys, IntegAlgo};
use enb_pdus::rrc::msgs::{EstablishmentCause, HandoverPreparationInfo};

/// Per-bearer byte queues standing in for an RLC engine
#[derive(Default)]
pub struct LoopbackRlc {
    queues: Mutex<HashMap<(Rnti, Lcid), Vec<u8>>>,
}

impl LoopbackRlc {
    /// Test/bring-up entry: enqueue downlink bytes for one bearer
    #[allow(dead_code)]
    pub fn push_dl(&self, rnti: Rnti, lcid: Lcid, data: &[u8]) {
        self.queues.lock().unwrap().entry((rnti, lcid)).or_default().extend_from_slice(data);
    }
}

impl RlcSap for LoopbackRlc {
    fn add_bearer(&self, rnti: Rnti, lcid: Lcid, cfg: &RlcBearerCfg) {
        tracing::debug!("rlc add_bearer rnti=0x{:x} lcid={} mode={:?}", rnti, lcid, cfg.mode);
        self.queues.lock().unwrap().entry((rnti, lcid)).or_default();
    }

    fn rem_bearer(&self, rnti: Rnti, lcid: Lcid) {
        self.queues.lock().unwrap().remove(&(rnti, lcid));
    }

    fn read_pdu(&self, rnti: Rnti, lcid: Lcid, max_bytes: usize) -> Vec<u8> {
        let mut queues = self.queues.lock().unwrap();
        match queues.get_mut(&(rnti, lcid)) {
            Some(q) => {
                let n = q.len().min(max_bytes);
                q.drain(..n).collect()
            }
            None => Vec::new(),
        }
    }

    fn write_pdu(&self, rnti: Rnti, lcid: Lcid, payload: &[u8]) {
        tracing::debug!("rlc <- ul rnti=0x{:x} lcid={} {}B", rnti, lcid, payload.len());
    }

    fn write_ccch(&self, rnti: Rnti, msg: &DlCcchMsg) {
        tracing::info!("-> SRB0 rnti=0x{:x} {:?}", rnti, msg);
    }

    fn reestablish(&self, rnti: Rnti) {
        tracing::info!("rlc reestablish rnti=0x{:x}", rnti);
    }

    fn rem_user(&self, rnti: Rnti) {
        self.queues.lock().unwrap().retain(|(r, _), _| *r != rnti);
    }
}

/// PDCP stand-in: security calls are recorded, messages logged
#[derive(Default)]
pub struct LogPdcp;

impl PdcpSap for LogPdcp {
    fn add_bearer(&self, rnti: Rnti, lcid: Lcid, cfg: &PdcpBearerCfg) {
        tracing::debug!("pdcp add_bearer rnti=0x{:x} lcid={} srb={}", rnti, lcid, cfg.is_srb);
    }

    fn config_security(
        &self,
        rnti: Rnti,
        lcid: Lcid,
        _keys: &DerivedKeys,
        cipher_algo: CipherAlgo,
        integ_algo: IntegAlgo,
    ) {
        tracing::info!("pdcp security rnti=0x{:x} lcid={} {} {}", rnti, lcid, cipher_algo, integ_algo);
    }

    fn enable_integrity(&self, rnti: Rnti, lcid: Lcid) {
        tracing::debug!("pdcp integrity on, rnti=0x{:x} lcid={}", rnti, lcid);
    }

    fn enable_encryption(&self, rnti: Rnti, lcid: Lcid) {
        tracing::debug!("pdcp encryption on, rnti=0x{:x} lcid={}", rnti, lcid);
    }

    fn write_dcch(&self, rnti: Rnti, lcid: Lcid, msg: &DlDcchMsg) {
        tracing::info!("-> SRB{} rnti=0x{:x} {:?}", lcid, rnti, msg);
    }

    fn reestablish(&self, rnti: Rnti) {
        tracing::info!("pdcp reestablish rnti=0x{:x}", rnti);
    }

    fn rem_user(&self, _rnti: Rnti) {}
}

/// Core-network stand-in: logs the S1AP surface
#[derive(Default)]
pub struct LogS1ap;

impl S1apSap for LogS1ap {
    fn initial_ue(&self, rnti: Rnti, cause: EstablishmentCause, nas: &[u8]) {
        tracing::info!("s1 initial_ue rnti=0x{:x} cause={:?} nas={}B", rnti, cause, nas.len());
    }

    fn write_pdu(&self, rnti: Rnti, nas: &[u8]) {
        tracing::info!("s1 ul nas rnti=0x{:x} {}B", rnti, nas.len());
    }

    fn user_release(&self, rnti: Rnti, cause: S1ReleaseCause) {
        tracing::info!("s1 user_release rnti=0x{:x} cause={:?}", rnti, cause);
    }

    fn ctx_setup_response(&self, rnti: Rnti, success: bool) {
        tracing::info!("s1 ctx_setup_response rnti=0x{:x} success={}", rnti, success);
    }

    fn handover_required(&self, rnti: Rnti, target_pci: u16, _container: &HandoverPreparationInfo) {
        tracing::info!("s1 handover_required rnti=0x{:x} target_pci={}", rnti, target_pci);
    }
}
