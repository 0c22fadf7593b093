//! Per-user, per-carrier HARQ process tables.
//!
//! DL and UL FDD each run eight stop-and-wait processes. A transmission at
//! TTI `n` expects feedback at `n + 4`; a NACKed DL process becomes eligible
//! for retransmission from `n + 8`. The redundancy version walks {0,2,3,1}
//! in transmission order and NDI toggles only on new data.

use enb_core::tti::FDD_HARQ_DELAY_MS;
use enb_core::TtiPoint;
use enb_saps::{PrbInterval, RbgMask};

pub const NOF_HARQ_PROC: usize = 8;
pub const RV_SEQ: [u8; 4] = [0, 2, 3, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    Pending,
    Acked,
    Nacked,
}

#[derive(Debug, Clone)]
pub struct DlHarqProc {
    pub pid: u8,
    active: bool,
    pub tti_tx: TtiPoint,
    pub tbs_bytes: u32,
    pub mcs: u8,
    /// retransmission count; 0 right after a new transmission
    pub n_retx: u8,
    pub ndi: bool,
    pub ack: AckState,
    pub rbg_mask: RbgMask,
    /// Assembled transport block, kept for retransmission
    pub payload: Vec<u8>,
}

impl DlHarqProc {
    fn new(pid: u8) -> DlHarqProc {
        DlHarqProc {
            pid,
            active: false,
            tti_tx: TtiPoint::default(),
            tbs_bytes: 0,
            mcs: 0,
            n_retx: 0,
            ndi: false,
            ack: AckState::Acked,
            rbg_mask: RbgMask::default(),
            payload: Vec::new(),
        }
    }

    /// A process is empty iff acked, retransmissions exhausted, or never used
    pub fn is_empty(&self, max_retx: u8) -> bool {
        !self.active || self.ack == AckState::Acked || self.n_retx > max_retx
    }

    pub fn rv(&self) -> u8 {
        RV_SEQ[self.n_retx as usize % 4]
    }

    /// Occupy the process for new data. NDI toggles here and only here.
    pub fn new_tx(&mut self, tti_tx: TtiPoint, tbs_bytes: u32, mcs: u8, mask: RbgMask, payload: Vec<u8>) {
        self.active = true;
        self.tti_tx = tti_tx;
        self.tbs_bytes = tbs_bytes;
        self.mcs = mcs;
        self.n_retx = 0;
        self.ndi = !self.ndi;
        self.ack = AckState::Pending;
        self.rbg_mask = mask;
        self.payload = payload;
    }

    /// Retransmit the same TB. NDI, MCS and TB size stay fixed.
    pub fn retx(&mut self, tti_tx: TtiPoint, mask: RbgMask) {
        debug_assert!(self.active);
        self.n_retx += 1;
        self.tti_tx = tti_tx;
        self.ack = AckState::Pending;
        self.rbg_mask = mask;
    }

    pub fn set_ack(&mut self, ack: bool) {
        self.ack = if ack { AckState::Acked } else { AckState::Nacked };
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.ack = AckState::Acked;
        self.n_retx = 0;
        self.payload = Vec::new();
    }

    /// Eligible for retransmission at `tti_tx`: NACK received (at
    /// `tti_tx - 4` or earlier), retransmissions left
    fn pending_retx_at(&self, tti_tx: TtiPoint, max_retx: u8) -> bool {
        self.active
            && self.ack == AckState::Nacked
            && self.n_retx < max_retx
            && tti_tx.diff(self.tti_tx) >= 2 * FDD_HARQ_DELAY_MS as i32
    }
}

#[derive(Debug, Clone)]
pub struct UlHarqProc {
    pub pid: u8,
    active: bool,
    pub tti_tx: TtiPoint,
    pub tbs_bytes: u32,
    pub mcs: u8,
    pub n_retx: u8,
    pub ndi: bool,
    pub prb: PrbInterval,
    pub pending_retx: bool,
    pub is_msg3: bool,
}

impl UlHarqProc {
    fn new(pid: u8) -> UlHarqProc {
        UlHarqProc {
            pid,
            active: false,
            tti_tx: TtiPoint::default(),
            tbs_bytes: 0,
            mcs: 0,
            n_retx: 0,
            ndi: false,
            prb: PrbInterval::default(),
            pending_retx: false,
            is_msg3: false,
        }
    }

    pub fn is_empty(&self, max_retx: u8) -> bool {
        !self.active || self.n_retx > max_retx
    }

    pub fn is_idle(&self) -> bool {
        !self.active
    }

    pub fn new_tx(&mut self, tti_tx: TtiPoint, tbs_bytes: u32, mcs: u8, prb: PrbInterval, is_msg3: bool) {
        self.active = true;
        self.tti_tx = tti_tx;
        self.tbs_bytes = tbs_bytes;
        self.mcs = mcs;
        self.n_retx = 0;
        self.ndi = !self.ndi;
        self.prb = prb;
        self.pending_retx = false;
        self.is_msg3 = is_msg3;
    }

    pub fn retx(&mut self, tti_tx: TtiPoint, prb: PrbInterval) {
        debug_assert!(self.active);
        self.n_retx += 1;
        self.tti_tx = tti_tx;
        self.prb = prb;
        self.pending_retx = false;
    }

    /// CRC outcome for the transmission in this process
    pub fn set_crc(&mut self, ok: bool) {
        if ok {
            self.active = false;
            self.pending_retx = false;
        } else {
            self.pending_retx = true;
        }
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.pending_retx = false;
        self.n_retx = 0;
        self.is_msg3 = false;
    }
}

/// The HARQ table of one (user, carrier) pair, both directions
#[derive(Debug, Clone)]
pub struct HarqEntity {
    pub dl: Vec<DlHarqProc>,
    pub ul: Vec<UlHarqProc>,
    pub max_retx: u8,
}

impl HarqEntity {
    pub fn new(max_retx: u8) -> HarqEntity {
        HarqEntity {
            dl: (0..NOF_HARQ_PROC as u8).map(DlHarqProc::new).collect(),
            ul: (0..NOF_HARQ_PROC as u8).map(UlHarqProc::new).collect(),
            max_retx,
        }
    }

    /// The DL process pending retransmission at `tti_tx`, oldest first
    pub fn get_pending_dl_retx(&mut self, tti_tx: TtiPoint) -> Option<&mut DlHarqProc> {
        let max_retx = self.max_retx;
        self.dl
            .iter_mut()
            .filter(|h| h.pending_retx_at(tti_tx, max_retx))
            .max_by_key(|h| h.tti_tx.age(tti_tx))
    }

    /// An empty DL process for a new transmission
    pub fn get_empty_dl(&mut self) -> Option<&mut DlHarqProc> {
        let max_retx = self.max_retx;
        self.dl.iter_mut().find(|h| h.is_empty(max_retx))
    }

    /// UL FDD is synchronous: the process follows from the TTI alone
    pub fn get_ul(&mut self, tti_tx: TtiPoint) -> &mut UlHarqProc {
        &mut self.ul[tti_tx.value() as usize % NOF_HARQ_PROC]
    }

    pub fn get_ul_ref(&self, tti_tx: TtiPoint) -> &UlHarqProc {
        &self.ul[tti_tx.value() as usize % NOF_HARQ_PROC]
    }

    /// Mark HARQ feedback for the DL process that transmitted at
    /// `tti_ack - 4`. Returns the pid, or `None` when nothing matches.
    pub fn set_dl_ack(&mut self, tti_ack: TtiPoint, ack: bool) -> Option<u8> {
        let tti_tx = tti_ack.add(-(FDD_HARQ_DELAY_MS as i32));
        for h in self.dl.iter_mut() {
            if h.active && h.ack == AckState::Pending && h.tti_tx == tti_tx {
                h.set_ack(ack);
                return Some(h.pid);
            }
        }
        None
    }

    /// True if any DL process exhausted its retransmissions; such
    /// processes are flushed and the caller emits an RLF indication.
    pub fn flush_exhausted_dl(&mut self) -> bool {
        let max_retx = self.max_retx;
        let mut exhausted = false;
        for h in self.dl.iter_mut() {
            if h.active && h.ack == AckState::Nacked && h.n_retx >= max_retx {
                tracing::info!("dl harq pid={} exhausted after {} retx, flushing", h.pid, h.n_retx);
                h.reset();
                exhausted = true;
            }
        }
        exhausted
    }

    /// Carrier deactivation drops all in-flight processes
    pub fn reset_all(&mut self) {
        for h in self.dl.iter_mut() {
            h.reset();
        }
        for h in self.ul.iter_mut() {
            h.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(nof: u32, bits: &[u32]) -> RbgMask {
        let mut m = RbgMask::new(nof);
        for b in bits {
            m.set(*b);
        }
        m
    }

    #[test]
    fn test_retx_timing_and_rv_sequence() {
        // Spec scenario: tx at 200, NACK at 204, retx schedulable at 208
        let mut ent = HarqEntity::new(4);
        let m = mask(17, &[0, 1]);
        let tti_tx = TtiPoint::new(200);

        let h = ent.get_empty_dl().unwrap();
        h.new_tx(tti_tx, 57, 9, m, vec![0u8; 57]);
        let pid = h.pid;
        assert!(h.ndi);
        assert_eq!(h.rv(), 0);

        assert_eq!(ent.set_dl_ack(TtiPoint::new(204), false), Some(pid));
        assert!(ent.get_pending_dl_retx(TtiPoint::new(207)).is_none());

        let h = ent.get_pending_dl_retx(TtiPoint::new(208)).expect("retx due");
        assert_eq!(h.pid, pid);
        let prev_ndi = h.ndi;
        let prev_tbs = h.tbs_bytes;
        h.retx(TtiPoint::new(208), m);
        assert_eq!(h.ndi, prev_ndi, "NDI stays stable on retransmission");
        assert_eq!(h.tbs_bytes, prev_tbs, "TB size identical on retransmission");
        assert_eq!(h.rv(), 2);

        // Walk the full redundancy sequence
        ent.set_dl_ack(TtiPoint::new(212), false);
        let h = ent.get_pending_dl_retx(TtiPoint::new(216)).unwrap();
        h.retx(TtiPoint::new(216), m);
        assert_eq!(h.rv(), 3);
        ent.set_dl_ack(TtiPoint::new(220), false);
        let h = ent.get_pending_dl_retx(TtiPoint::new(224)).unwrap();
        h.retx(TtiPoint::new(224), m);
        assert_eq!(h.rv(), 1);
    }

    #[test]
    fn test_ndi_toggles_on_new_data() {
        let mut ent = HarqEntity::new(4);
        let m = mask(17, &[0]);
        let h = ent.get_empty_dl().unwrap();
        h.new_tx(TtiPoint::new(10), 10, 5, m, vec![]);
        let first_ndi = h.ndi;
        let pid = h.pid;
        ent.set_dl_ack(TtiPoint::new(14), true);
        let h = ent.get_empty_dl().unwrap();
        assert_eq!(h.pid, pid, "acked process is reusable");
        h.new_tx(TtiPoint::new(20), 10, 5, m, vec![]);
        assert_ne!(h.ndi, first_ndi);
    }

    #[test]
    fn test_oldest_pending_first() {
        let mut ent = HarqEntity::new(4);
        let m = mask(17, &[0]);
        ent.get_empty_dl().unwrap().new_tx(TtiPoint::new(100), 10, 5, m, vec![]);
        ent.set_dl_ack(TtiPoint::new(104), false);
        ent.get_empty_dl().unwrap().new_tx(TtiPoint::new(102), 10, 5, m, vec![]);
        ent.set_dl_ack(TtiPoint::new(106), false);

        let h = ent.get_pending_dl_retx(TtiPoint::new(120)).unwrap();
        assert_eq!(h.tti_tx, TtiPoint::new(100), "oldest NACKed process wins");
    }

    #[test]
    fn test_max_retx_flush_emits_rlf() {
        let mut ent = HarqEntity::new(1);
        let m = mask(17, &[0]);
        let h = ent.get_empty_dl().unwrap();
        h.new_tx(TtiPoint::new(0), 10, 5, m, vec![]);
        let pid = h.pid as usize;
        ent.set_dl_ack(TtiPoint::new(4), false);
        ent.dl[pid].retx(TtiPoint::new(8), m);
        ent.set_dl_ack(TtiPoint::new(12), false);

        // n_retx == max_retx and NACKed: no more retransmissions
        assert!(ent.get_pending_dl_retx(TtiPoint::new(16)).is_none());
        assert!(ent.flush_exhausted_dl());
        assert!(ent.dl[pid].is_empty(1));
        assert!(!ent.flush_exhausted_dl(), "flush is one-shot");
    }

    #[test]
    fn test_ul_sync_harq() {
        let mut ent = HarqEntity::new(4);
        let tti = TtiPoint::new(13);
        let prb = PrbInterval::new(4, 3);
        ent.get_ul(tti).new_tx(tti, 40, 6, prb, false);
        assert_eq!(ent.get_ul(tti).pid, 5);
        ent.get_ul(tti).set_crc(false);
        assert!(ent.get_ul(tti).pending_retx);
        // Eight TTIs later the same process comes around
        let tti2 = TtiPoint::new(21);
        assert_eq!(ent.get_ul(tti2).pid, 5);
        ent.get_ul(tti2).retx(tti2, prb);
        ent.get_ul(tti2).set_crc(true);
        assert!(ent.get_ul(tti2).is_idle());
    }
}
