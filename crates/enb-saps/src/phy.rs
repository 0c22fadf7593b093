//! FAPI-like scheduler interface types, exchanged with the physical layer
//! once per TTI.

use core::fmt;

use enb_core::Rnti;

/// Frequency-domain allocation in resource-block groups, one bit per RBG
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct RbgMask {
    bits: u32,
    nof_rbgs: u32,
}

impl RbgMask {
    pub fn new(nof_rbgs: u32) -> RbgMask {
        assert!(nof_rbgs <= 32);
        RbgMask { bits: 0, nof_rbgs }
    }

    pub fn nof_rbgs(&self) -> u32 {
        self.nof_rbgs
    }

    pub fn set(&mut self, rbg: u32) {
        assert!(rbg < self.nof_rbgs);
        self.bits |= 1 << rbg;
    }

    pub fn is_set(&self, rbg: u32) -> bool {
        self.bits & (1 << rbg) != 0
    }

    pub fn count(&self) -> u32 {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn raw(&self) -> u32 {
        self.bits
    }

    /// True if no RBG is set in both masks
    pub fn disjoint(&self, other: &RbgMask) -> bool {
        self.bits & other.bits == 0
    }

    /// Mark every RBG of `other` as used
    pub fn union_with(&mut self, other: &RbgMask) {
        self.bits |= other.bits;
    }

    /// Greedily grab up to `count` free RBGs with respect to `used`
    pub fn grab_free(used: &RbgMask, count: u32) -> RbgMask {
        let mut out = RbgMask::new(used.nof_rbgs);
        let mut left = count;
        for rbg in 0..used.nof_rbgs {
            if left == 0 {
                break;
            }
            if !used.is_set(rbg) {
                out.set(rbg);
                left -= 1;
            }
        }
        out
    }
}

impl fmt::Debug for RbgMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rbg[")?;
        for rbg in 0..self.nof_rbgs {
            write!(f, "{}", if self.is_set(rbg) { '1' } else { '0' })?;
        }
        write!(f, "]")
    }
}

/// Contiguous uplink PRB allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrbInterval {
    pub start: u32,
    pub len: u32,
}

impl PrbInterval {
    pub fn new(start: u32, len: u32) -> PrbInterval {
        PrbInterval { start, len }
    }

    pub fn stop(&self) -> u32 {
        self.start + self.len
    }

    pub fn overlaps(&self, other: &PrbInterval) -> bool {
        self.start < other.stop() && other.start < self.stop()
    }

    /// Resource-indication value for a type-2 contiguous allocation
    pub fn to_riv(&self, cell_nof_prb: u32) -> u32 {
        if self.len.saturating_sub(1) <= cell_nof_prb / 2 {
            cell_nof_prb * (self.len - 1) + self.start
        } else {
            cell_nof_prb * (cell_nof_prb - self.len + 1) + (cell_nof_prb - 1 - self.start)
        }
    }

    pub fn from_riv(riv: u32, cell_nof_prb: u32) -> PrbInterval {
        let len = riv / cell_nof_prb + 1;
        let start = riv % cell_nof_prb;
        if len <= cell_nof_prb - start {
            PrbInterval { start, len }
        } else {
            PrbInterval { start: cell_nof_prb - 1 - start, len: cell_nof_prb - len + 2 }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DciFormat {
    F0,
    F1,
    F1A,
    F2,
    F2A,
}

/// Downlink assignment payload on PDCCH
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DciDl {
    pub format: DciFormat,
    pub rbg_mask: RbgMask,
    pub mcs: u8,
    pub rv: u8,
    pub ndi: bool,
    pub harq_pid: u8,
    pub aggr_level: u8,
    pub tpc_pucch: u8,
}

/// Uplink grant payload on PDCCH (format 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DciUl {
    pub prb: PrbInterval,
    pub mcs: u8,
    pub ndi: bool,
    pub tpc_pusch: u8,
    pub cqi_request: bool,
}

/// One scheduled DL-SCH transport block with its assembled payload
#[derive(Debug, Clone)]
pub struct DlSchedData {
    pub rnti: Rnti,
    pub dci: DciDl,
    pub tbs_bytes: u32,
    pub payload: Vec<u8>,
}

/// One scheduled random-access response
#[derive(Debug, Clone)]
pub struct RarSchedData {
    pub ra_rnti: Rnti,
    pub rbg_mask: RbgMask,
    pub payload: Vec<u8>,
}

/// Result of one downlink TTI invocation
#[derive(Debug, Clone, Default)]
pub struct DlSched {
    pub cfi: u8,
    pub rars: Vec<RarSchedData>,
    pub data: Vec<DlSchedData>,
    /// RBGs reserved for SIB/paging this subframe
    pub si_rbgs: u32,
}

impl DlSched {
    pub fn new(cfi: u8) -> DlSched {
        DlSched { cfi, ..Default::default() }
    }
}

/// One scheduled PUSCH transmission
#[derive(Debug, Clone, Copy)]
pub struct UlSchedData {
    pub rnti: Rnti,
    pub dci: DciUl,
    pub tbs_bytes: u32,
    pub harq_pid: u8,
    pub is_msg3: bool,
    /// Retransmissions reuse the previous grant without a new DCI
    pub needs_pdcch: bool,
}

/// Result of one uplink TTI invocation
#[derive(Debug, Clone, Default)]
pub struct UlSched {
    pub pusch: Vec<UlSchedData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rbg_mask_grab() {
        let mut used = RbgMask::new(8);
        used.set(0);
        used.set(2);
        let grabbed = RbgMask::grab_free(&used, 3);
        assert_eq!(grabbed.count(), 3);
        assert!(grabbed.is_set(1) && grabbed.is_set(3) && grabbed.is_set(4));
        assert!(grabbed.disjoint(&used));
    }

    #[test]
    fn test_rbg_mask_exhaustion() {
        let mut used = RbgMask::new(4);
        for rbg in 0..4 {
            used.set(rbg);
        }
        assert!(RbgMask::grab_free(&used, 1).is_empty());
    }

    #[test]
    fn test_prb_interval_overlap() {
        let a = PrbInterval::new(0, 5);
        let b = PrbInterval::new(4, 3);
        let c = PrbInterval::new(5, 3);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
