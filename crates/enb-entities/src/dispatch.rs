//! Station dispatch: one event queue per station, many producers, one
//! consumer.
//!
//! PHY workers, the packet-data layers, the core network and operators
//! all push [`StackEvent`]s; the consumer drains them one at a time, so
//! per-user operations execute serially with respect to each other. The
//! per-TTI scheduler entry points bypass the queue and go straight to the
//! MAC under its shared lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use enb_config::SharedConfig;
use enb_saps::events::StackEvent;
use enb_saps::phy::{DlSched, UlSched};
use enb_saps::{PdcpSap, RlcSap, S1apSap};
use enb_core::{SchedErr, TtiPoint};

use crate::mac::Mac;
use crate::rrc::Rrc;

pub struct Stack {
    mac: Arc<Mac>,
    rrc: Mutex<Rrc>,
    tx: Sender<StackEvent>,
    rx: Receiver<StackEvent>,
}

impl Stack {
    pub fn new(
        cfg: SharedConfig,
        rlc: Arc<dyn RlcSap>,
        pdcp: Arc<dyn PdcpSap>,
        s1ap: Arc<dyn S1apSap>,
    ) -> Stack {
        let mac = Arc::new(Mac::new(cfg.clone(), rlc.clone()));
        let rrc = Rrc::new(cfg, mac.clone(), rlc, pdcp, s1ap);
        let (tx, rx) = unbounded();
        Stack { mac, rrc: Mutex::new(rrc), tx, rx }
    }

    /// Producers clone this to feed the station queue
    pub fn sender(&self) -> Sender<StackEvent> {
        self.tx.clone()
    }

    pub fn push(&self, ev: StackEvent) {
        let _ = self.tx.send(ev);
    }

    pub fn mac(&self) -> &Arc<Mac> {
        &self.mac
    }

    // ------------------------------------------------------------------
    // per-TTI FAPI surface, called directly by PHY workers
    // ------------------------------------------------------------------

    pub fn get_dl_sched(&self, tti_tx: TtiPoint, cc_idx: u32, cfi: u8) -> Result<DlSched, SchedErr> {
        self.mac.get_dl_sched(tti_tx, cc_idx, cfi)
    }

    pub fn get_ul_sched(&self, tti_tx: TtiPoint, cc_idx: u32) -> Result<UlSched, SchedErr> {
        self.mac.get_ul_sched(tti_tx, cc_idx)
    }

    // ------------------------------------------------------------------
    // consumer
    // ------------------------------------------------------------------

    /// Drain everything currently queued. Returns the number of events
    /// handled. Used by tests and by the run loop.
    pub fn process_pending(&self) -> usize {
        let mut rrc = self.rrc.lock().expect("rrc lock poisoned");
        let mut handled = 0;
        while let Ok(ev) = self.rx.try_recv() {
            self.handle(&mut rrc, ev);
            handled += 1;
        }
        handled
    }

    /// Blocking consumer loop until `running` clears
    pub fn run(&self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            match self.rx.recv_timeout(Duration::from_millis(10)) {
                Ok(ev) => {
                    let mut rrc = self.rrc.lock().expect("rrc lock poisoned");
                    self.handle(&mut rrc, ev);
                    while let Ok(more) = self.rx.try_recv() {
                        self.handle(&mut rrc, more);
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn handle(&self, rrc: &mut Rrc, ev: StackEvent) {
        match ev {
            // --- PHY indications ---
            StackEvent::RachDetected { cc_idx, tti, preamble, time_adv } => {
                match self.mac.rach_detected(cc_idx, tti, preamble, time_adv) {
                    Ok(temp_crnti) => rrc.add_user(temp_crnti),
                    Err(e) => tracing::error!("rach admission failed: {:?}", e),
                }
            }
            StackEvent::SrDetected { rnti, .. } => {
                let _ = self.mac.sr_detected(rnti);
            }
            StackEvent::CrcInfo { tti, rnti, cc_idx, ok } => {
                if let Ok(true) = self.mac.crc_info(tti, rnti, cc_idx, ok) {
                    rrc.rlf_indication(rnti);
                }
            }
            StackEvent::AckInfo { tti, rnti, cc_idx, tb_idx, ack } => {
                if let Ok(true) = self.mac.ack_info(tti, rnti, cc_idx, tb_idx, ack) {
                    rrc.rlf_indication(rnti);
                }
            }
            StackEvent::CqiInfo { tti, rnti, cc_idx, cqi } => {
                let _ = self.mac.cqi_info(tti, rnti, cc_idx, cqi);
            }
            StackEvent::RiInfo { tti, rnti, cc_idx, ri } => {
                let _ = self.mac.ri_info(tti, rnti, cc_idx, ri);
            }
            StackEvent::PmiInfo { tti, rnti, cc_idx, pmi } => {
                let _ = self.mac.pmi_info(tti, rnti, cc_idx, pmi);
            }
            StackEvent::UlPdu { rnti, cc_idx, payload, .. } => {
                match self.mac.ul_pdu(rnti, cc_idx, &payload) {
                    Ok(outcome) => {
                        if outcome.activity {
                            rrc.set_activity_user(rnti);
                        }
                        if let Some(announced) = outcome.migrate_to {
                            rrc.handle_crnti_ce(rnti, announced);
                        }
                    }
                    Err(e) => tracing::warn!("UL PDU from unknown user: {:?}", e),
                }
            }

            // --- uplink RRC ---
            StackEvent::UlCcch { rnti, msg } => rrc.ul_ccch(rnti, msg),
            StackEvent::UlDcch { rnti, lcid, msg } => rrc.ul_dcch(rnti, lcid, msg),

            // --- packet-data layers ---
            StackEvent::DlBufferState { rnti, lcid, tx_queue, retx_queue } => {
                let _ = self.mac.dl_buffer_state(rnti, lcid, tx_queue, retx_queue);
            }

            // --- core network / operator ---
            StackEvent::S1(ev) => rrc.s1_event(ev),
            StackEvent::Cmd(cmd) => rrc.station_cmd(cmd),

            StackEvent::TtiTick { tti } => rrc.tti_tick(tti),
        }
    }
}
