//! Per-carrier time/frequency scheduler.
//!
//! Each TTI the physical layer asks for the downlink allocation, then the
//! uplink allocation. Downlink priority: RAR, pending control elements,
//! HARQ retransmissions, then new data under round-robin. Uplink: Msg3,
//! retransmissions, then BSR/SR-driven new grants on contiguous PRBs
//! inside the PUCCH exclusion band. Grants issued at `n` take effect at
//! `n + 4`; Msg3 lands 6 subframes after its RAR.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use enb_core::assert_warn;
use enb_core::cell::CellParams;
use enb_core::{tbs, Rnti, TtiPoint};
use enb_pdus::mac::{RarEntry, RarPdu, RarUlGrant};
use enb_saps::phy::{DciDl, DciFormat, DciUl, DlSched, DlSchedData, PrbInterval, RarSchedData, RbgMask, UlSched, UlSchedData};
use enb_saps::RlcSap;

use super::ue::MacUe;

/// RBGs set aside when SIB/paging occupies the subframe
const SI_RBGS: u32 = 2;
/// Msg3 grant geometry
const MSG3_PRBS: u32 = 2;
const MSG3_MCS: u8 = 2;
/// Subframes between a RAR and its Msg3
const MSG3_DELAY: i32 = 6;
/// CCEs a RAR DCI occupies (common search space, aggregation 4)
const RAR_CCES: u32 = 4;

/// DCI payload sizes in bits, used for aggregation-level selection
fn dci_bits(format: DciFormat) -> u32 {
    match format {
        DciFormat::F0 => 28,
        DciFormat::F1A => 33,
        DciFormat::F1 => 39,
        DciFormat::F2A => 51,
        DciFormat::F2 => 55,
    }
}

#[derive(Debug, Clone)]
struct PendingRar {
    rach_tti: TtiPoint,
    preamble: u8,
    time_adv: u16,
    temp_crnti: Rnti,
}

#[derive(Debug, Clone)]
struct PendingMsg3 {
    rnti: Rnti,
    tti_tx: TtiPoint,
    prb: PrbInterval,
    mcs: u8,
    tbs_bytes: u32,
}

/// Scheduler state of one carrier. Lives behind a mutex in the MAC; the
/// TTI path is the only mutator.
pub struct CarrierSched {
    cell: CellParams,
    pending_rars: VecDeque<PendingRar>,
    pending_msg3: Vec<PendingMsg3>,
    /// Round-robin position over the ascending RNTI list, DL and UL
    rr_cursor_dl: usize,
    rr_cursor_ul: usize,
}

pub type UserMap = HashMap<Rnti, Mutex<MacUe>>;

impl CarrierSched {
    pub fn new(cell: CellParams) -> CarrierSched {
        CarrierSched {
            cell,
            pending_rars: VecDeque::new(),
            pending_msg3: Vec::new(),
            rr_cursor_dl: 0,
            rr_cursor_ul: 0,
        }
    }

    pub fn cell(&self) -> &CellParams {
        &self.cell
    }

    pub fn push_rach(&mut self, tti: TtiPoint, preamble: u8, time_adv: u16, temp_crnti: Rnti) {
        self.pending_rars.push_back(PendingRar { rach_tti: tti, preamble, time_adv, temp_crnti });
    }

    /// Downlink allocation for `tti_tx`. The CFI is an input; the PDCCH
    /// budget follows from it.
    pub fn dl_sched(&mut self, tti_tx: TtiPoint, cfi: u8, users: &UserMap, rlc: &dyn RlcSap) -> DlSched {
        let mut out = DlSched::new(cfi);
        let nof_rbgs = self.cell.nof_rbgs();
        let mut used = RbgMask::new(nof_rbgs);
        let cce_budget = self.cell.nof_cces(cfi);
        let mut cce_used: u32 = 0;

        // (i) system-information / paging reservation
        if self.cell.is_si_subframe(tti_tx.sfn(), tti_tx.sf_idx()) {
            for rbg in 0..SI_RBGS.min(nof_rbgs) {
                used.set(rbg);
            }
            out.si_rbgs = SI_RBGS.min(nof_rbgs);
        }

        // (ii) random-access responses inside their window
        self.sched_rars(tti_tx, &mut used, &mut cce_used, cce_budget, &mut out);

        let mut rntis: Vec<Rnti> = users.keys().copied().collect();
        rntis.sort_unstable();

        // (iii) HARQ retransmissions, oldest NACK first
        let mut retx_cands: Vec<(i32, Rnti)> = Vec::new();
        for &rnti in &rntis {
            let mut ue = users[&rnti].lock().expect("user lock poisoned");
            if let Some(cc) = ue.sched.carrier_mut(self.cell.cc_idx) {
                if !cc.is_schedulable() {
                    continue;
                }
                if let Some(h) = cc.harq.get_pending_dl_retx(tti_tx) {
                    retx_cands.push((h.tti_tx.age(tti_tx), rnti));
                }
            }
        }
        retx_cands.sort_unstable_by_key(|(age, rnti)| (-*age, *rnti));
        for (_, rnti) in retx_cands {
            let mut ue = users[&rnti].lock().expect("user lock poisoned");
            if let Err(e) = self.alloc_dl_retx(tti_tx, &mut ue, &mut used, &mut cce_used, cce_budget, &mut out) {
                tracing::debug!("dl retx deferred rnti=0x{:x}: {:?}", rnti, e);
            }
        }

        // (iv) new data, round-robin; CE-bearing users keep their place in
        // the ring but the demand figure already includes their CEs
        let cands = self.rr_order(&rntis, self.rr_cursor_dl, |ue| {
            ue.sched.carrier(self.cell.cc_idx).map_or(false, |c| c.is_schedulable()) && ue.sched.dl_pending_bytes() > 0
        }, users, tti_tx);
        for (pos, rnti) in cands {
            let mut ue = users[&rnti].lock().expect("user lock poisoned");
            match self.alloc_dl_newtx(tti_tx, &mut ue, &mut used, &mut cce_used, cce_budget, &mut out, rlc) {
                Ok(()) => {
                    self.rr_cursor_dl = (pos + 1) % rntis.len().max(1);
                }
                Err(e) if !e.is_transient() => {
                    tracing::warn!("dl alloc failed rnti=0x{:x}: {:?}", rnti, e);
                }
                Err(e) => {
                    tracing::trace!("dl alloc deferred rnti=0x{:x}: {:?}", rnti, e);
                }
            }
        }

        assert_warn!(
            out.data.iter().map(|d| d.dci.rbg_mask.count()).sum::<u32>()
                + out.rars.iter().map(|r| r.rbg_mask.count()).sum::<u32>()
                + out.si_rbgs
                <= nof_rbgs,
            "allocated RBGs exceed the carrier at {}",
            tti_tx
        );
        out
    }

    fn sched_rars(
        &mut self,
        tti_tx: TtiPoint,
        used: &mut RbgMask,
        cce_used: &mut u32,
        cce_budget: u32,
        out: &mut DlSched,
    ) {
        let win_start = 3;
        let win_len = self.cell.prach.ra_resp_win as i32;
        let nof_prb = self.cell.nof_prb as u32;

        let mut keep = VecDeque::new();
        while let Some(rar) = self.pending_rars.pop_front() {
            let age = rar.rach_tti.age(tti_tx);
            if age < win_start {
                keep.push_back(rar);
                continue;
            }
            if age >= win_start + win_len {
                tracing::warn!(
                    "RAR window expired for preamble={} tti={}, dropping",
                    rar.preamble,
                    rar.rach_tti
                );
                continue;
            }
            if *cce_used + RAR_CCES > cce_budget {
                keep.push_back(rar);
                continue;
            }
            // one RBG carries the 7-byte RAR comfortably
            let mask = RbgMask::grab_free(used, 1);
            if mask.is_empty() {
                keep.push_back(rar);
                continue;
            }

            let msg3_tti = tti_tx.add(MSG3_DELAY);
            let msg3_prb = match self.reserve_msg3_prbs(msg3_tti) {
                Some(prb) => prb,
                None => {
                    keep.push_back(rar);
                    continue;
                }
            };
            let itbs = tbs::ul_mcs_to_itbs(MSG3_MCS, false).unwrap_or(0);
            let msg3_tbs = tbs::tbs_bits(itbs, msg3_prb.len) / 8;
            self.pending_msg3.push(PendingMsg3 {
                rnti: rar.temp_crnti,
                tti_tx: msg3_tti,
                prb: msg3_prb,
                mcs: MSG3_MCS,
                tbs_bytes: msg3_tbs,
            });

            let pdu = RarPdu {
                entries: vec![RarEntry {
                    rapid: rar.preamble,
                    ta_cmd: rar.time_adv.min(0x7ff),
                    grant: RarUlGrant {
                        hopping: false,
                        rb_alloc: msg3_prb.to_riv(nof_prb) as u16,
                        mcs: MSG3_MCS,
                        tpc: 3,
                        ul_delay: false,
                        cqi_request: false,
                    },
                    temp_crnti: rar.temp_crnti,
                }],
            };
            used.union_with(&mask);
            *cce_used += RAR_CCES;
            tracing::info!(
                "RAR at {} for preamble={} temp_crnti=0x{:x}, msg3 at {} prb=({},{})",
                tti_tx,
                rar.preamble,
                rar.temp_crnti,
                msg3_tti,
                msg3_prb.start,
                msg3_prb.len
            );
            out.rars.push(RarSchedData {
                ra_rnti: enb_core::ra_rnti(rar.rach_tti.sf_idx()),
                rbg_mask: mask,
                payload: pdu.to_bytes(),
            });
        }
        self.pending_rars = keep;
    }

    /// A free contiguous Msg3 slot inside the PUSCH region at `msg3_tti`
    fn reserve_msg3_prbs(&self, msg3_tti: TtiPoint) -> Option<PrbInterval> {
        let lo = self.cell.pucch_edge_prbs();
        let hi = self.cell.nof_prb as u32 - self.cell.pucch_edge_prbs();
        let mut start = lo;
        'outer: while start + MSG3_PRBS <= hi {
            let cand = PrbInterval::new(start, MSG3_PRBS);
            for m in self.pending_msg3.iter().filter(|m| m.tti_tx == msg3_tti) {
                if m.prb.overlaps(&cand) {
                    start = m.prb.stop();
                    continue 'outer;
                }
            }
            return Some(cand);
        }
        None
    }

    fn alloc_dl_retx(
        &mut self,
        tti_tx: TtiPoint,
        ue: &mut MacUe,
        used: &mut RbgMask,
        cce_used: &mut u32,
        cce_budget: u32,
        out: &mut DlSched,
    ) -> Result<(), enb_core::SchedErr> {
        use enb_core::SchedErr;
        let cc_idx = self.cell.cc_idx;
        let format = ue.sched.dci_format();
        let aggr = ue.sched.get_aggr_level(cc_idx, dci_bits(format));
        if *cce_used + aggr as u32 > cce_budget {
            return Err(SchedErr::NoCce);
        }
        let tpc_pucch = ue.sched.consume_tpc_pucch();
        let rnti = ue.rnti();
        let cc = ue.sched.carrier_mut(cc_idx).ok_or(SchedErr::UnknownCarrier { cc_idx })?;
        let h = cc.harq.get_pending_dl_retx(tti_tx).ok_or(SchedErr::NoData)?;

        // same RBG count as the initial transmission; the same mask when free
        let mask = if h.rbg_mask.disjoint(used) {
            h.rbg_mask
        } else {
            let m = RbgMask::grab_free(used, h.rbg_mask.count());
            if m.count() < h.rbg_mask.count() {
                return Err(SchedErr::NoSpace);
            }
            m
        };
        h.retx(tti_tx, mask);
        let dci = DciDl {
            format,
            rbg_mask: mask,
            mcs: h.mcs,
            rv: h.rv(),
            ndi: h.ndi,
            harq_pid: h.pid,
            aggr_level: aggr,
            tpc_pucch,
        };
        let data = DlSchedData { rnti, dci, tbs_bytes: h.tbs_bytes, payload: h.payload.clone() };
        used.union_with(&mask);
        *cce_used += aggr as u32;
        out.data.push(data);
        Ok(())
    }

    fn alloc_dl_newtx(
        &mut self,
        tti_tx: TtiPoint,
        ue: &mut MacUe,
        used: &mut RbgMask,
        cce_used: &mut u32,
        cce_budget: u32,
        out: &mut DlSched,
        rlc: &dyn RlcSap,
    ) -> Result<(), enb_core::SchedErr> {
        use enb_core::SchedErr;
        let cc_idx = self.cell.cc_idx;
        let req_bytes = ue.sched.dl_pending_bytes();
        if req_bytes == 0 {
            return Err(SchedErr::NoData);
        }
        let format = ue.sched.dci_format();
        let aggr = ue.sched.get_aggr_level(cc_idx, dci_bits(format));
        if *cce_used + aggr as u32 > cce_budget {
            return Err(SchedErr::NoCce);
        }

        // a process must be free before any SDU is pulled from RLC
        let has_harq = ue
            .sched
            .carrier_mut(cc_idx)
            .map_or(false, |cc| cc.harq.get_empty_dl().is_some());
        if !has_harq {
            return Err(SchedErr::NoHarqProc);
        }

        let nof_prb = self.cell.nof_prb as u32;
        let rbg_size = self.cell.rbg_size();
        let (req_prbs, mcs) = ue
            .sched
            .required_dl_prbs(cc_idx, req_bytes, nof_prb)
            .unwrap_or((nof_prb, ue.sched.dl_mcs(cc_idx)));
        let req_rbgs = (req_prbs + rbg_size - 1) / rbg_size;
        let mask = RbgMask::grab_free(used, req_rbgs);
        if mask.is_empty() {
            return Err(SchedErr::NoSpace);
        }
        // the last RBG may be short on non-multiple bandwidths
        let got_prbs: u32 = (0..mask.nof_rbgs())
            .filter(|r| mask.is_set(*r))
            .map(|r| rbg_size.min(nof_prb - r * rbg_size))
            .sum();
        let itbs = tbs::dl_mcs_to_itbs(mcs).ok_or(SchedErr::NoData)?;
        let tbs_bytes = tbs::tbs_bits(itbs, got_prbs) / 8;
        if tbs_bytes < 3 {
            return Err(SchedErr::NoSpace);
        }

        let tpc_pucch = ue.sched.consume_tpc_pucch();
        let payload = ue.build_dl_pdu(tbs_bytes as usize, rlc);
        let rnti = ue.rnti();
        let cc = ue.sched.carrier_mut(cc_idx).ok_or(SchedErr::UnknownCarrier { cc_idx })?;
        let h = cc.harq.get_empty_dl().ok_or(SchedErr::NoHarqProc)?;
        h.new_tx(tti_tx, tbs_bytes, mcs, mask, payload.clone());
        let dci = DciDl {
            format,
            rbg_mask: mask,
            mcs,
            rv: 0,
            ndi: h.ndi,
            harq_pid: h.pid,
            aggr_level: aggr,
            tpc_pucch,
        };
        used.union_with(&mask);
        *cce_used += aggr as u32;
        tracing::debug!(
            "dl newtx rnti=0x{:x} at {}: {}B on {} rbgs, mcs={}, pid={}",
            rnti,
            tti_tx,
            tbs_bytes,
            mask.count(),
            mcs,
            h.pid
        );
        out.data.push(DlSchedData { rnti, dci, tbs_bytes, payload });
        Ok(())
    }

    /// Uplink allocation for `tti_tx`
    pub fn ul_sched(&mut self, tti_tx: TtiPoint, users: &UserMap) -> UlSched {
        let mut out = UlSched::default();
        let lo = self.cell.pucch_edge_prbs();
        let hi = self.cell.nof_prb as u32 - self.cell.pucch_edge_prbs();
        let mut taken: Vec<PrbInterval> = Vec::new();

        // (i) Msg3 on the PRBs the RAR announced
        let due: Vec<PendingMsg3> = {
            let (due, keep): (Vec<_>, Vec<_>) =
                self.pending_msg3.drain(..).partition(|m| m.tti_tx == tti_tx);
            self.pending_msg3 = keep.into_iter().filter(|m| m.tti_tx.age(tti_tx) <= 0).collect();
            due
        };
        for m in due {
            if let Some(ue_lock) = users.get(&m.rnti) {
                let mut ue = ue_lock.lock().expect("user lock poisoned");
                if let Some(cc) = ue.sched.carrier_mut(self.cell.cc_idx) {
                    cc.harq.get_ul(tti_tx).new_tx(tti_tx, m.tbs_bytes, m.mcs, m.prb, true);
                }
                taken.push(m.prb);
                out.pusch.push(UlSchedData {
                    rnti: m.rnti,
                    dci: DciUl { prb: m.prb, mcs: m.mcs, ndi: true, tpc_pusch: 1, cqi_request: false },
                    tbs_bytes: m.tbs_bytes,
                    harq_pid: (tti_tx.value() % 8) as u8,
                    is_msg3: true,
                    needs_pdcch: false,
                });
            } else {
                tracing::warn!("msg3 due for unknown rnti=0x{:x}", m.rnti);
            }
        }

        let mut rntis: Vec<Rnti> = users.keys().copied().collect();
        rntis.sort_unstable();

        // (ii) HARQ retransmissions: same PRB count as the first attempt
        for &rnti in &rntis {
            let mut ue = users[&rnti].lock().expect("user lock poisoned");
            let max_retx = ue.sched.cfg.max_harq_retx;
            let Some((pending, n_retx)) = ue.sched.carrier(self.cell.cc_idx).map(|cc| {
                let h = cc.harq.get_ul_ref(tti_tx);
                (h.pending_retx, h.n_retx)
            }) else {
                continue;
            };
            if !pending || n_retx >= max_retx {
                // exhausted processes are flushed by the CRC path with the RLF count
                continue;
            }
            let tpc = ue.sched.consume_tpc_pusch();
            let cc = ue.sched.carrier_mut(self.cell.cc_idx).expect("carrier checked above");
            let h = cc.harq.get_ul(tti_tx);
            let same = h.prb;
            let prb = if !taken.iter().any(|t| t.overlaps(&same)) && same.start >= lo && same.stop() <= hi {
                same
            } else {
                match alloc_contig(&taken, lo, hi, same.len) {
                    Some(p) => p,
                    None => {
                        tracing::debug!("ul retx deferred rnti=0x{:x}: no PRBs", rnti);
                        continue;
                    }
                }
            };
            let adaptive = prb != same;
            h.retx(tti_tx, prb);
            taken.push(prb);
            out.pusch.push(UlSchedData {
                rnti,
                dci: DciUl { prb, mcs: h.mcs, ndi: h.ndi, tpc_pusch: tpc, cqi_request: false },
                tbs_bytes: h.tbs_bytes,
                harq_pid: h.pid,
                is_msg3: h.is_msg3,
                needs_pdcch: adaptive,
            });
        }

        // (iii) new transmissions from BSR/PHR state, round-robin
        let cands = self.rr_order(&rntis, self.rr_cursor_ul, |ue| {
            ue.sched.carrier(self.cell.cc_idx).map_or(false, |c| c.is_schedulable())
                && ue.sched.ul_pending_bytes() > 0
                && ue.sched.carrier(self.cell.cc_idx).map_or(false, |c| c.harq.get_ul_ref(tti_tx).is_idle())
        }, users, tti_tx);
        for (pos, rnti) in cands {
            let mut ue = users[&rnti].lock().expect("user lock poisoned");
            let req_bytes = ue.sched.ul_pending_bytes() + 10; // room for headers and a BSR
            let nof_prb = hi - lo;
            // demand beyond the band gets the whole usable width
            let (req_prbs, mcs) = ue
                .sched
                .required_ul_prbs(self.cell.cc_idx, req_bytes, nof_prb)
                .unwrap_or((nof_prb, ue.sched.ul_mcs(self.cell.cc_idx)));
            let Some(prb) = alloc_contig(&taken, lo, hi, req_prbs) else {
                continue;
            };
            let Some(itbs) = tbs::ul_mcs_to_itbs(mcs, ue.sched.cfg.ul_64qam) else {
                continue;
            };
            let tbs_bytes = tbs::tbs_bits(itbs, prb.len) / 8;
            let cqi_request = ue.sched.needs_cqi(tti_tx, self.cell.cc_idx);
            let tpc_pusch = ue.sched.consume_tpc_pusch();
            ue.sched.lch.ul_scheduled(tbs_bytes);
            ue.sched.sr_pending = false;
            let Some(cc) = ue.sched.carrier_mut(self.cell.cc_idx) else {
                continue;
            };
            let h = cc.harq.get_ul(tti_tx);
            h.new_tx(tti_tx, tbs_bytes, mcs, prb, false);
            taken.push(prb);
            self.rr_cursor_ul = (pos + 1) % rntis.len().max(1);
            out.pusch.push(UlSchedData {
                rnti,
                dci: DciUl { prb, mcs, ndi: h.ndi, tpc_pusch, cqi_request },
                tbs_bytes,
                harq_pid: h.pid,
                is_msg3: false,
                needs_pdcch: true,
            });
        }

        assert_warn!(
            out.pusch.iter().map(|g| g.dci.prb.len).sum::<u32>() + 2 * self.cell.pucch_edge_prbs()
                <= self.cell.nof_prb as u32,
            "allocated PRBs plus PUCCH reservation exceed the carrier at {}",
            tti_tx
        );
        out
    }

    /// Candidates in round-robin order starting at `cursor`, filtered by
    /// `eligible`. Ties between equally-distant users (cursor wrap) break
    /// toward the fresher CQI, then the smaller RNTI.
    fn rr_order(
        &self,
        rntis: &[Rnti],
        cursor: usize,
        eligible: impl Fn(&MacUe) -> bool,
        users: &UserMap,
        tti: TtiPoint,
    ) -> Vec<(usize, Rnti)> {
        let n = rntis.len();
        let mut cands: Vec<(usize, i32, Rnti, usize)> = Vec::new();
        for (idx, &rnti) in rntis.iter().enumerate() {
            let ue = users[&rnti].lock().expect("user lock poisoned");
            if !eligible(&ue) {
                continue;
            }
            let distance = (idx + n - cursor % n.max(1)) % n.max(1);
            let cqi_age = ue
                .sched
                .carrier(self.cell.cc_idx)
                .map_or(i32::MAX, |c| if c.dl_cqi_rx { c.dl_cqi_tti.age(tti) } else { i32::MAX });
            cands.push((distance, cqi_age, rnti, idx));
        }
        cands.sort_unstable();
        cands.into_iter().map(|(_, _, rnti, idx)| (idx, rnti)).collect()
    }
}

/// First contiguous gap of `len` PRBs in [lo, hi) clear of `taken`
fn alloc_contig(taken: &[PrbInterval], lo: u32, hi: u32, len: u32) -> Option<PrbInterval> {
    let mut start = lo;
    'outer: while start + len <= hi {
        let cand = PrbInterval::new(start, len);
        for t in taken {
            if t.overlaps(&cand) {
                start = t.stop();
                continue 'outer;
            }
        }
        return Some(cand);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_contig_respects_taken() {
        let taken = vec![PrbInterval::new(5, 3)];
        let got = alloc_contig(&taken, 3, 20, 4).unwrap();
        assert!(!got.overlaps(&taken[0]));
        assert_eq!(got, PrbInterval::new(8, 4));
        // an impossible request fails
        assert!(alloc_contig(&taken, 3, 9, 4).is_none());
    }

    #[test]
    fn test_dci_bits_ordering() {
        assert!(dci_bits(DciFormat::F1A) < dci_bits(DciFormat::F1));
        assert!(dci_bits(DciFormat::F1) < dci_bits(DciFormat::F2A));
        assert!(dci_bits(DciFormat::F2A) < dci_bits(DciFormat::F2));
    }
}
