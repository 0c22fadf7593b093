use enb_core::{Lcid, Rnti};
use enb_pdus::rrc::msgs::DlCcchMsg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlcMode {
    /// Transparent, SRB0 only
    Tm,
    Um,
    Am,
}

#[derive(Debug, Clone, Copy)]
pub struct RlcBearerCfg {
    pub mode: RlcMode,
}

/// The radio-link-control contract the MAC and RRC consume.
///
/// `read_pdu` is called from the PDU assembler on the TTI path and must not
/// block; implementations serve from per-bearer queues sized at admission.
pub trait RlcSap: Send + Sync {
    fn add_bearer(&self, rnti: Rnti, lcid: Lcid, cfg: &RlcBearerCfg);
    fn rem_bearer(&self, rnti: Rnti, lcid: Lcid);

    /// Pull up to `max_bytes` of downlink data for one bearer
    fn read_pdu(&self, rnti: Rnti, lcid: Lcid, max_bytes: usize) -> Vec<u8>;
    /// Deliver one received uplink RLC PDU
    fn write_pdu(&self, rnti: Rnti, lcid: Lcid, payload: &[u8]);

    /// Queue a CCCH message on SRB0 (transparent mode, no PDCP)
    fn write_ccch(&self, rnti: Rnti, msg: &DlCcchMsg);

    fn reestablish(&self, rnti: Rnti);
    fn rem_user(&self, rnti: Rnti);
}
