//! MAC-level per-user glue: DL transport-block assembly against RLC, UL
//! transport-block demultiplexing, timing-advance command splitting.

use enb_core::{MacPduErr, Rnti};
use enb_pdus::mac::{DlSchBuilder, UlSchElem, UlSchPdu};
use enb_saps::RlcSap;

use super::sched_ue::{SchedUe, UeSchedCfg};

/// What an uplink PDU changed, reported to the dispatch layer
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UlPduOutcome {
    pub bsr_received: bool,
    /// C-RNTI CE observed: the user announces this existing identity
    pub migrate_to: Option<Rnti>,
    /// A data SDU above the RLC-status threshold arrived
    pub activity: bool,
    pub conres_seen: Option<[u8; 6]>,
}

/// Payload bytes below which an UL SDU counts as RLC status traffic only
const ACTIVITY_MIN_BYTES: usize = 64;

/// Synthetic BSR handed to a starving bearer that delivered data without
/// reporting buffer status
const SYNTH_BSR_BYTES: u32 = 256;

pub struct MacUe {
    pub sched: SchedUe,
    /// Contention-resolution identity captured from Msg3
    pub conres_id: Option<[u8; 6]>,
}

impl MacUe {
    pub fn new(rnti: Rnti, cfg: UeSchedCfg, cc_idxs: &[u32]) -> MacUe {
        MacUe { sched: SchedUe::new(rnti, cfg, cc_idxs), conres_id: None }
    }

    pub fn rnti(&self) -> Rnti {
        self.sched.rnti
    }

    /// Split a raw time-advance measurement into 6-bit TA commands, each
    /// covering [-31, 32] steps, and queue them as control elements.
    /// Returns the number of commands queued.
    pub fn set_ta(&mut self, ta: i32) -> u32 {
        let mut left = ta;
        let mut nof_cmd = 0;
        loop {
            let step = left.clamp(-31, 32);
            left -= step;
            let ta_cmd = (step + 31) as u8;
            self.sched.lch.push_ta(ta_cmd);
            nof_cmd += 1;
            tracing::debug!("queued TA cmd: rnti=0x{:x} ta={} step={} cmd={}", self.rnti(), ta, step, ta_cmd);
            // a saturated step in either direction means residue remains
            if (-30..=31).contains(&step) {
                break;
            }
        }
        nof_cmd
    }

    /// Queue the contention-resolution CE from the stored Msg3 identity
    pub fn queue_conres_ce(&mut self) {
        match self.conres_id {
            Some(id) => self.sched.lch.push_conres(id),
            None => tracing::warn!("conres CE requested but no identity stored, rnti=0x{:x}", self.rnti()),
        }
    }

    /// Build one DL-SCH transport block of exactly `grant_bytes`:
    /// pending CEs first, then SDUs pulled from RLC in priority order,
    /// then padding.
    pub fn build_dl_pdu(&mut self, grant_bytes: usize, rlc: &dyn RlcSap) -> Vec<u8> {
        let rnti = self.rnti();
        let mut builder = DlSchBuilder::new(grant_bytes);

        while let Some(ce) = self.sched.lch.peek_ce().copied() {
            let added = match ce {
                super::lch::PendingCe::TaCmd(ta) => builder.add_ta_ce(ta),
                super::lch::PendingCe::ConRes(id) => builder.add_conres_ce(id),
                super::lch::PendingCe::ScellAct(mask) => builder.add_scell_ce(mask),
            };
            match added {
                Ok(()) => {
                    self.sched.lch.pop_ce();
                }
                Err(e) => {
                    // no room: CE emission stops for this TTI
                    tracing::debug!("CE deferred for rnti=0x{:x}: {:?}", rnti, e);
                    break;
                }
            }
        }

        for lcid in self.sched.lch.prioritized_dl_lcids() {
            let min_sdu = if lcid == 0 { 1 } else { 2 };
            loop {
                let space = builder.sdu_space();
                if space < min_sdu {
                    break;
                }
                let queued = self.sched.lch.dl_pending_bytes_lcid(lcid) as usize;
                if queued == 0 {
                    break;
                }
                let req = queued.min(space);
                let sdu = rlc.read_pdu(rnti, lcid, req);
                if sdu.is_empty() {
                    break;
                }
                let drained = sdu.len() < req;
                match builder.add_sdu(lcid, sdu) {
                    Ok(n) => self.sched.lch.dl_scheduled(lcid, n as u32),
                    Err(e) => {
                        tracing::warn!("SDU dropped on build, rnti=0x{:x} lcid={}: {:?}", rnti, lcid, e);
                        break;
                    }
                }
                if drained {
                    break;
                }
            }
        }

        builder.finish()
    }

    /// Demultiplex one received UL-SCH transport block: route SDUs to RLC,
    /// fold control elements into scheduler state.
    pub fn process_ul_pdu(&mut self, payload: &[u8], rlc: &dyn RlcSap) -> Result<UlPduOutcome, MacPduErr> {
        let rnti = self.rnti();
        let pdu = UlSchPdu::parse(payload)?;
        let mut outcome = UlPduOutcome::default();

        // SDUs first; CEs afterwards so a BSR lands on updated queues
        let mut lcid_most_data: u8 = 0;
        let mut most_data: usize = 0;
        for (lcid, data) in pdu.sdus() {
            let mut route = true;
            if *lcid == 0 {
                // a CQI-only uplink decodes as an all-zero CCCH PDU
                if data.iter().all(|b| *b == 0) {
                    tracing::debug!("discarding all-zero lcid=0 PDU, rnti=0x{:x}", rnti);
                    route = false;
                } else if data.len() >= 6 {
                    let mut id = [0u8; 6];
                    for (i, b) in data[..6].iter().enumerate() {
                        id[5 - i] = *b;
                    }
                    self.conres_id = Some(id);
                    outcome.conres_seen = Some(id);
                }
            }
            if route {
                rlc.write_pdu(rnti, *lcid, data);
            }
            if data.len() > ACTIVITY_MIN_BYTES {
                // RLC status traffic alone does not refresh activity
                outcome.activity = true;
            }
            if data.len() > most_data {
                most_data = data.len();
                lcid_most_data = *lcid;
            }
        }

        for elem in &pdu.elems {
            match elem {
                UlSchElem::ShortBsr { lcg, bytes, .. } => {
                    self.sched.lch.ul_bsr(*lcg, *bytes);
                    outcome.bsr_received = true;
                }
                UlSchElem::LongBsr { bytes } => {
                    for (lcg, b) in bytes.iter().enumerate() {
                        self.sched.lch.ul_bsr(lcg as u8, *b);
                    }
                    outcome.bsr_received = true;
                }
                UlSchElem::Phr { ph_db } => {
                    self.sched.power_headroom = *ph_db;
                }
                UlSchElem::Crnti { rnti: old_rnti } => {
                    outcome.migrate_to = Some(*old_rnti);
                }
                UlSchElem::Sdu { .. } | UlSchElem::Padding => {}
            }
        }

        // Data arrived with no room for a BSR: synthesise one so the user
        // is not starved waiting for the next report
        if !outcome.bsr_received && lcid_most_data > 2 {
            self.sched.lch.ul_buffer_add(lcid_most_data, SYNTH_BSR_BYTES);
            tracing::debug!("no BSR in PDU, synthesising {}B for lcid={}", SYNTH_BSR_BYTES, lcid_most_data);
        }

        // Any uplink transmission satisfies an outstanding SR
        self.sched.sr_pending = false;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::lch::LchConfig;
    use enb_core::Lcid;
    use enb_pdus::mac::bsr::bytes_to_bsr_idx;
    use enb_pdus::rrc::msgs::DlCcchMsg;
    use std::sync::Mutex;

    /// Scripted RLC double: canned DL data per bearer, records UL writes
    #[derive(Default)]
    pub struct FakeRlc {
        pub dl_data: Mutex<std::collections::HashMap<Lcid, Vec<u8>>>,
        pub ul_writes: Mutex<Vec<(Rnti, Lcid, Vec<u8>)>>,
    }

    impl RlcSap for FakeRlc {
        fn add_bearer(&self, _rnti: Rnti, _lcid: Lcid, _cfg: &enb_saps::rlc::RlcBearerCfg) {}
        fn rem_bearer(&self, _rnti: Rnti, _lcid: Lcid) {}
        fn read_pdu(&self, _rnti: Rnti, lcid: Lcid, max_bytes: usize) -> Vec<u8> {
            let mut map = self.dl_data.lock().unwrap();
            match map.get_mut(&lcid) {
                Some(q) => {
                    let n = q.len().min(max_bytes);
                    q.drain(..n).collect()
                }
                None => Vec::new(),
            }
        }
        fn write_pdu(&self, rnti: Rnti, lcid: Lcid, payload: &[u8]) {
            self.ul_writes.lock().unwrap().push((rnti, lcid, payload.to_vec()));
        }
        fn write_ccch(&self, _rnti: Rnti, _msg: &DlCcchMsg) {}
        fn reestablish(&self, _rnti: Rnti) {}
        fn rem_user(&self, _rnti: Rnti) {}
    }

    fn test_ue() -> MacUe {
        let mut ue = MacUe::new(0x46, UeSchedCfg::default(), &[0]);
        ue.sched.lch.set_cfg(1, LchConfig::srb(1));
        ue.sched.lch.set_cfg(3, LchConfig { direction: crate::mac::lch::LchDirection::Both, lcg: 2, priority: 6, pbr_bytes_per_ms: 0 });
        ue
    }

    #[test]
    fn test_build_pdu_fills_grant_exactly() {
        let rlc = FakeRlc::default();
        rlc.dl_data.lock().unwrap().insert(3, vec![0xab; 40]);
        let mut ue = test_ue();
        ue.sched.lch.dl_buffer(3, 40, 0);
        ue.set_ta(5);

        let pdu = ue.build_dl_pdu(60, &rlc);
        assert_eq!(pdu.len(), 60, "transport block length equals the grant size");
        // TA CE subheader leads the PDU
        assert_eq!(pdu[0] & 0x1f, 0b11101);
    }

    #[test]
    fn test_ce_does_not_fit_stops_emission() {
        let rlc = FakeRlc::default();
        let mut ue = test_ue();
        ue.conres_id = Some([1, 2, 3, 4, 5, 6]);
        ue.queue_conres_ce();
        ue.set_ta(0);

        // 5 bytes: conres needs 7, stops CE emission entirely this TTI
        let pdu = ue.build_dl_pdu(5, &rlc);
        assert_eq!(pdu.len(), 5);
        assert_eq!(pdu[0] & 0x1f, 0b11111, "only padding made it in");
        assert!(ue.sched.lch.has_pending_ces(), "CEs stay queued for the next TTI");
    }

    #[test]
    fn test_ul_zero_ccch_discarded() {
        let rlc = FakeRlc::default();
        let mut ue = test_ue();
        // lcid 0, all-zero payload
        let outcome = ue.process_ul_pdu(&[0x00, 0, 0, 0, 0, 0, 0], &rlc).unwrap();
        assert!(rlc.ul_writes.lock().unwrap().is_empty());
        assert_eq!(outcome.conres_seen, None);
    }

    #[test]
    fn test_ul_ccch_captures_conres_reversed() {
        let rlc = FakeRlc::default();
        let mut ue = test_ue();
        let outcome = ue.process_ul_pdu(&[0x00, 1, 2, 3, 4, 5, 6], &rlc).unwrap();
        assert_eq!(outcome.conres_seen, Some([6, 5, 4, 3, 2, 1]));
        assert_eq!(ue.conres_id, Some([6, 5, 4, 3, 2, 1]));
        assert_eq!(rlc.ul_writes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_synthetic_bsr_on_unreported_data() {
        let rlc = FakeRlc::default();
        let mut ue = test_ue();
        // 70-byte SDU on lcid 3, no BSR in the PDU
        let mut pdu = vec![0x03];
        pdu.extend(std::iter::repeat(0x55).take(70));
        let outcome = ue.process_ul_pdu(&pdu, &rlc).unwrap();
        assert!(!outcome.bsr_received);
        assert!(outcome.activity, "a 70-byte SDU counts as activity");
        assert_eq!(ue.sched.lch.ul_pending_bytes(), 256);
    }

    #[test]
    fn test_short_bsr_replaces_and_no_synthesis() {
        let rlc = FakeRlc::default();
        let mut ue = test_ue();
        let idx = bytes_to_bsr_idx(500);
        let bsr_body = (2u8 << 6) | idx;
        // ShortBSR + SDU on lcid 3
        let mut pdu = vec![0x3d, 0x03, bsr_body];
        pdu.extend(std::iter::repeat(0x55).take(70));
        let outcome = ue.process_ul_pdu(&pdu, &rlc).unwrap();
        assert!(outcome.bsr_received);
        let pending = ue.sched.lch.ul_pending_bytes();
        assert!(pending >= 500 && pending < 760, "reported BSR, no synthetic add, got {}", pending);
    }

    #[test]
    fn test_crnti_ce_reports_migration() {
        let rlc = FakeRlc::default();
        let mut ue = test_ue();
        // CRNTI CE only: E=0, lcid=0b11011, body 0x4601
        let outcome = ue.process_ul_pdu(&[0x1b, 0x46, 0x01], &rlc).unwrap();
        assert_eq!(outcome.migrate_to, Some(0x4601));
    }

    #[test]
    fn test_ta_split_large_value() {
        let mut ue = test_ue();
        let n = ue.set_ta(40); // 32 + 8
        assert_eq!(n, 2);
        assert_eq!(ue.sched.lch.pop_ce(), Some(crate::mac::lch::PendingCe::TaCmd(63)));
        assert_eq!(ue.sched.lch.pop_ce(), Some(crate::mac::lch::PendingCe::TaCmd(39)));
    }

    #[test]
    fn test_ta_split_large_negative_value() {
        let mut ue = test_ue();
        // -62 walks -31, -31, 0: the saturated step keeps the chain going
        let n = ue.set_ta(-62);
        assert_eq!(n, 3);
        assert_eq!(ue.sched.lch.pop_ce(), Some(crate::mac::lch::PendingCe::TaCmd(0)));
        assert_eq!(ue.sched.lch.pop_ce(), Some(crate::mac::lch::PendingCe::TaCmd(0)));
        assert_eq!(ue.sched.lch.pop_ce(), Some(crate::mac::lch::PendingCe::TaCmd(31)));

        // net applied advance sums to the target
        let mut ue = test_ue();
        let n = ue.set_ta(-45);
        assert_eq!(n, 2);
        let mut sum = 0i32;
        while let Some(crate::mac::lch::PendingCe::TaCmd(cmd)) = ue.sched.lch.pop_ce() {
            sum += cmd as i32 - 31;
        }
        assert_eq!(sum, -45);
    }
}
