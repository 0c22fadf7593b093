//! RRC message model, shaped after TS 36.331.
//!
//! Messages cross the PDCP boundary as these typed values; the ASN.1 UPER
//! codec that puts them on SRBs is the standard's and lives outside this
//! repository. ASN.1 unions appear here as tagged enums.

use enb_core::security::{CipherAlgo, IntegAlgo};
use enb_core::Rnti;

use super::meas::{MeasDelta, MeasReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishmentCause {
    Emergency,
    HighPriorityAccess,
    MtAccess,
    MoSignalling,
    MoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseCause {
    LoadBalancing,
    Other,
    CsFallbackHighPriority,
}

/// SRB0 downlink (CCCH)
#[derive(Debug, Clone, PartialEq)]
pub enum DlCcchMsg {
    ConnectionSetup(ConnectionSetup),
    ConnectionReject { wait_time_s: u8 },
    ConnectionReestablishmentReject,
}

/// SRB1/SRB2 downlink (DCCH)
#[derive(Debug, Clone, PartialEq)]
pub enum DlDcchMsg {
    SecurityModeCommand(SecurityModeCommand),
    Reconfiguration(Reconfiguration),
    ConnectionRelease { cause: ReleaseCause },
    DlInformationTransfer { nas: Vec<u8> },
    /// Target-station reconfiguration forwarded verbatim during an S1
    /// handover; opaque to the source
    HandoverCommand { container: Vec<u8> },
}

/// SRB0 uplink (CCCH)
#[derive(Debug, Clone, PartialEq)]
pub enum UlCcchMsg {
    ConnectionRequest { cause: EstablishmentCause, ue_identity: u64 },
    ConnectionReestablishmentRequest { rnti: Rnti, pci: u16 },
}

/// SRB1/SRB2 uplink (DCCH)
#[derive(Debug, Clone, PartialEq)]
pub enum UlDcchMsg {
    ConnectionSetupComplete { transaction_id: u8, nas: Vec<u8> },
    SecurityModeComplete { transaction_id: u8 },
    SecurityModeFailure { transaction_id: u8 },
    ReconfigurationComplete { transaction_id: u8 },
    MeasurementReport(MeasReport),
    UlInformationTransfer { nas: Vec<u8> },
    UeCapabilityInformation { eea: u8, eia: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSetup {
    pub transaction_id: u8,
    /// SRB1 dedicated configuration is carried in full by the standard;
    /// only the scheduling-relevant subset is modelled
    pub srb1_priority: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityModeCommand {
    pub transaction_id: u8,
    pub cipher_algo: CipherAlgo,
    pub integ_algo: IntegAlgo,
}

/// Dedicated radio-bearer configuration inside a reconfiguration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrbCfg {
    pub drb_id: u8,
    pub lcid: u8,
    pub erab_id: u8,
    /// QoS class identifier of the mapped E-RAB
    pub qci: u8,
    pub priority: u8,
    pub lcg: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadioResourceCfg {
    pub srb2_setup: bool,
    pub drbs_to_add: Vec<DrbCfg>,
    pub drbs_to_release: Vec<u8>,
}

/// mobilityControlInfo for a handover reconfiguration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobilityControlInfo {
    pub target_pci: u16,
    pub new_crnti: Rnti,
    pub t304_ms: u16,
    pub carrier_freq: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconfiguration {
    pub transaction_id: u8,
    pub meas_cfg: Option<MeasDelta>,
    pub mobility: Option<MobilityControlInfo>,
    pub rr_cfg: Option<RadioResourceCfg>,
    /// Piggybacked NAS PDUs, one per new E-RAB
    pub nas: Vec<Vec<u8>>,
}

/// Inter-station handover preparation container: the source station's view
/// of the user, handed through the core network to the target.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoverPreparationInfo {
    pub ue_identity: u64,
    pub eea: u8,
    pub eia: u8,
    pub drbs: Vec<DrbCfg>,
    pub source_pci: u16,
    pub cipher_algo: CipherAlgo,
    pub integ_algo: IntegAlgo,
}
