use enb_core::security::SecurityCapabilities;
use enb_core::{Lcid, Rnti, TtiPoint};
use enb_pdus::rrc::msgs::{UlCcchMsg, UlDcchMsg};

/// An E-RAB the core network asks the station to set up
#[derive(Debug, Clone)]
pub struct ErabToSetup {
    pub erab_id: u8,
    pub qci: u8,
    pub transport_addr: Vec<u8>,
    pub teid_out: u32,
    pub nas: Vec<u8>,
}

/// Inbound core-network signalling, already lifted off the transport
#[derive(Debug, Clone)]
pub enum S1Event {
    InitialCtxSetup {
        rnti: Rnti,
        erabs: Vec<ErabToSetup>,
        security_caps: SecurityCapabilities,
        kenb: [u8; 32],
    },
    ErabSetupRequest { rnti: Rnti, erabs: Vec<ErabToSetup> },
    ErabReleaseCommand { rnti: Rnti, erab_ids: Vec<u8> },
    DlNas { rnti: Rnti, nas: Vec<u8> },
    UeContextRelease { rnti: Rnti },
    /// Answer to a previous handover-required
    HandoverCommand { rnti: Rnti, success: bool, container: Vec<u8> },
    /// Page an idle user; the scheduler's SI/paging reservation carries it
    Paging { ue_identity: u64 },
}

/// Station command surface, process-wide
#[derive(Debug, Clone)]
pub enum StationCmd {
    CellGain { cell_id: u32, gain_db: f32 },
    /// Triggers a broadcast reconfiguration
    CellEarfcn { cell_id: u32, dl_earfcn: u32, ul_earfcn: u32 },
    /// Force handover of every user on the source cell
    Handover { source_cell: u32, target_cell: u32 },
}

/// The station's asynchronous event alphabet. Every producer (PHY workers,
/// the packet-data layers, the core network, operators) pushes these onto
/// one queue per station; a single consumer drains it under the user-table
/// write lock.
#[derive(Debug, Clone)]
pub enum StackEvent {
    // --- PHY indications ---
    RachDetected { cc_idx: u32, tti: TtiPoint, preamble: u8, time_adv: u16 },
    SrDetected { tti: TtiPoint, rnti: Rnti },
    CrcInfo { tti: TtiPoint, rnti: Rnti, cc_idx: u32, ok: bool },
    AckInfo { tti: TtiPoint, rnti: Rnti, cc_idx: u32, tb_idx: u8, ack: bool },
    CqiInfo { tti: TtiPoint, rnti: Rnti, cc_idx: u32, cqi: u8 },
    RiInfo { tti: TtiPoint, rnti: Rnti, cc_idx: u32, ri: u8 },
    PmiInfo { tti: TtiPoint, rnti: Rnti, cc_idx: u32, pmi: u8 },
    /// A decoded UL-SCH transport block
    UlPdu { tti: TtiPoint, rnti: Rnti, cc_idx: u32, payload: Vec<u8> },

    // --- uplink RRC, delivered through RLC/PDCP ---
    UlCcch { rnti: Rnti, msg: UlCcchMsg },
    UlDcch { rnti: Rnti, lcid: Lcid, msg: UlDcchMsg },

    // --- packet-data layer ---
    DlBufferState { rnti: Rnti, lcid: Lcid, tx_queue: u32, retx_queue: u32 },

    // --- core network ---
    S1(S1Event),

    // --- operator ---
    Cmd(StationCmd),

    /// Millisecond tick driving RRC timers
    TtiTick { tti: TtiPoint },
}
