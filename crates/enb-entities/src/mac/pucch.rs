//! PUCCH resource grids for scheduling requests and periodic CQI.
//!
//! Each grid is a (prb_slot x sf_slot) user counter with capacity
//! `12 * (3 | 2) / delta_shift` per slot. Allocation picks the slot with
//! the fewest users among the subframe offsets valid for the period;
//! release decrements the owning counter and is guarded against double
//! frees through the handle.

use enb_core::cell::CellParams;
use enb_core::{AllocErr, CyclicPrefix};

pub const SR_PERIODS: [u32; 5] = [5, 10, 20, 40, 80];
pub const CQI_PERIODS: [u32; 10] = [2, 5, 10, 20, 32, 40, 64, 80, 128, 160];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrResource {
    /// sr-ConfigIndex (I_sr)
    pub i_sr: u32,
    pub n_pucch: u32,
    prb_slot: usize,
    sf_slot: usize,
    released: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CqiResource {
    /// cqi-pmi-ConfigIndex
    pub pmi_idx: u32,
    pub n_pucch: u32,
    prb_slot: usize,
    sf_slot: usize,
    released: bool,
}

#[derive(Debug, Clone)]
struct CounterGrid {
    users: Vec<Vec<u16>>,
    sf_mapping: Vec<u32>,
}

impl CounterGrid {
    fn new(nof_prb_slots: usize, sf_mapping: Vec<u32>) -> CounterGrid {
        CounterGrid { users: vec![vec![0; sf_mapping.len()]; nof_prb_slots], sf_mapping }
    }

    /// Slot with the fewest users whose subframe offset is valid for
    /// `period`; `None` when every valid slot is full
    fn pick(&self, period: u32, max_users: u16) -> Option<(usize, usize)> {
        let mut best: Option<(u16, usize, usize)> = None;
        for (i, row) in self.users.iter().enumerate() {
            for (j, &count) in row.iter().enumerate() {
                if self.sf_mapping[j] >= period {
                    continue;
                }
                if best.map_or(true, |(c, _, _)| count < c) {
                    best = Some((count, i, j));
                }
            }
        }
        best.filter(|&(count, _, _)| count < max_users).map(|(_, i, j)| (i, j))
    }
}

#[derive(Debug, Clone)]
pub struct PucchGrid {
    sr: CounterGrid,
    cqi: CounterGrid,
    max_users: u16,
    ncs_an: u32,
}

impl PucchGrid {
    /// Grid dimensions follow the cell's PUCCH region; the slot capacity
    /// follows from the cyclic prefix and delta-shift.
    pub fn new(cell: &CellParams) -> PucchGrid {
        let cp_symbols = match cell.cp {
            CyclicPrefix::Normal => 3,
            CyclicPrefix::Extended => 2,
        };
        let delta_shift = cell.pucch.delta_shift.max(1) as u16;
        let max_users = 12 * cp_symbols / delta_shift;
        // One PRB slot and one subframe offset per grid by default; larger
        // deployments widen the region through the cell parameters.
        let sr_prb_slots = 1;
        let cqi_prb_slots = cell.pucch.n_rb_cqi.max(1) as usize;
        PucchGrid {
            sr: CounterGrid::new(sr_prb_slots, vec![0]),
            cqi: CounterGrid::new(cqi_prb_slots, vec![0]),
            max_users,
            ncs_an: cell.pucch.ncs_an as u32,
        }
    }

    pub fn max_users(&self) -> u16 {
        self.max_users
    }

    pub fn allocate_sr(&mut self, period: u32) -> Result<SrResource, AllocErr> {
        if !SR_PERIODS.contains(&period) {
            return Err(AllocErr::InvalidPeriod { period });
        }
        let (i, j) = self.sr.pick(period, self.max_users).ok_or(AllocErr::Exhausted)?;
        let i_sr = period - 5 + self.sr.sf_mapping[j];
        let n_pucch = i as u32 * self.max_users as u32 + self.sr.users[i][j] as u32 + self.ncs_an;
        self.sr.users[i][j] += 1;
        tracing::info!("allocated SR slot ({}, {}), I_sr={}, n_pucch={}", i, j, i_sr, n_pucch);
        Ok(SrResource { i_sr, n_pucch, prb_slot: i, sf_slot: j, released: false })
    }

    pub fn allocate_cqi(&mut self, period: u32) -> Result<CqiResource, AllocErr> {
        if !CQI_PERIODS.contains(&period) {
            return Err(AllocErr::InvalidPeriod { period });
        }
        let (i, j) = self.cqi.pick(period, self.max_users).ok_or(AllocErr::Exhausted)?;
        let sf = self.cqi.sf_mapping[j];
        // cqi-pmi-ConfigIndex bands of 36.213 table 7.2.2-1A; the closed
        // forms 318/350/414 cover the 32/64/128 ms periods
        let pmi_idx = match period {
            2 => sf,
            32 => 318 + sf,
            64 => 350 + sf,
            128 => 414 + sf,
            _ => period - 3 + sf,
        };
        let n_pucch = i as u32 * self.max_users as u32 + self.cqi.users[i][j] as u32 + self.ncs_an;
        self.cqi.users[i][j] += 1;
        tracing::info!("allocated CQI slot ({}, {}), pmi_idx={}, n_pucch={}", i, j, pmi_idx, n_pucch);
        Ok(CqiResource { pmi_idx, n_pucch, prb_slot: i, sf_slot: j, released: false })
    }

    /// Idempotent: a handle frees its slot at most once
    pub fn free_sr(&mut self, res: &mut SrResource) {
        if res.released {
            return;
        }
        res.released = true;
        let count = &mut self.sr.users[res.prb_slot][res.sf_slot];
        if *count > 0 {
            *count -= 1;
        } else {
            tracing::warn!("free_sr: no users in slot ({}, {})", res.prb_slot, res.sf_slot);
        }
    }

    pub fn free_cqi(&mut self, res: &mut CqiResource) {
        if res.released {
            return;
        }
        res.released = true;
        let count = &mut self.cqi.users[res.prb_slot][res.sf_slot];
        if *count > 0 {
            *count -= 1;
        } else {
            tracing::warn!("free_cqi: no users in slot ({}, {})", res.prb_slot, res.sf_slot);
        }
    }

    /// Total allocations outstanding, used by release assertions in tests
    pub fn sr_users_total(&self) -> u32 {
        self.sr.users.iter().flatten().map(|&c| c as u32).sum()
    }

    pub fn cqi_users_total(&self) -> u32 {
        self.cqi.users.iter().flatten().map(|&c| c as u32).sum()
    }
}
