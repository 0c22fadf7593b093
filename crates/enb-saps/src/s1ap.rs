use enb_core::Rnti;
use enb_pdus::rrc::msgs::{EstablishmentCause, HandoverPreparationInfo};

/// Release causes surfaced to the core network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S1ReleaseCause {
    UserInactivity,
    RadioConnectionLost,
    SecurityConfigFailed,
    NoRadioResources,
    Normal,
}

/// The signalling-layer contract the RRC drives. Transport (S1AP over
/// SCTP) lives behind this boundary.
pub trait S1apSap: Send + Sync {
    /// First uplink NAS message of a new user
    fn initial_ue(&self, rnti: Rnti, cause: EstablishmentCause, nas: &[u8]);
    /// Subsequent uplink NAS transport
    fn write_pdu(&self, rnti: Rnti, nas: &[u8]);
    /// Ask the core network to release the user
    fn user_release(&self, rnti: Rnti, cause: S1ReleaseCause);
    /// Answer an initial-context-setup or E-RAB-setup procedure
    fn ctx_setup_response(&self, rnti: Rnti, success: bool);
    /// Start an S1 handover toward another station
    fn handover_required(&self, rnti: Rnti, target_pci: u16, container: &HandoverPreparationInfo);
}
