use enb_core::security::{CipherAlgo, DerivedKeys, IntegAlgo};
use enb_core::{Lcid, Rnti};
use enb_pdus::rrc::msgs::DlDcchMsg;

#[derive(Debug, Clone, Copy)]
pub struct PdcpBearerCfg {
    /// Signalling bearers use the 5-bit SN space and carry MAC-I
    pub is_srb: bool,
}

/// The packet-data-convergence contract the RRC consumes. Ciphering and
/// integrity primitives live behind this boundary.
pub trait PdcpSap: Send + Sync {
    fn add_bearer(&self, rnti: Rnti, lcid: Lcid, cfg: &PdcpBearerCfg);

    fn config_security(
        &self,
        rnti: Rnti,
        lcid: Lcid,
        keys: &DerivedKeys,
        cipher_algo: CipherAlgo,
        integ_algo: IntegAlgo,
    );
    fn enable_integrity(&self, rnti: Rnti, lcid: Lcid);
    fn enable_encryption(&self, rnti: Rnti, lcid: Lcid);

    /// Queue a DCCH message toward the user on SRB1/SRB2
    fn write_dcch(&self, rnti: Rnti, lcid: Lcid, msg: &DlDcchMsg);

    fn reestablish(&self, rnti: Rnti);
    fn rem_user(&self, rnti: Rnti);
}
