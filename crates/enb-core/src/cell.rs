use core::fmt;

/// Allowed downlink/uplink bandwidths in PRBs
pub const VALID_NOF_PRB: [u8; 6] = [6, 15, 25, 50, 75, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclicPrefix {
    Normal,
    Extended,
}

impl CyclicPrefix {
    /// OFDM symbols per subframe
    pub fn nof_symbols(self) -> u32 {
        match self {
            CyclicPrefix::Normal => 14,
            CyclicPrefix::Extended => 12,
        }
    }
}

/// PRACH configuration of one carrier
#[derive(Debug, Clone, Copy)]
pub struct PrachParams {
    pub config_idx: u8,
    pub freq_offset: u8,
    pub nof_preambles: u8,
    /// RAR response window in subframes, counted from preamble + 3
    pub ra_resp_win: u8,
    pub max_msg3_retx: u8,
}

/// PUCCH common configuration of one carrier
#[derive(Debug, Clone, Copy)]
pub struct PucchParams {
    /// delta-PUCCH-shift, 1..=3
    pub delta_shift: u8,
    pub n1_pucch_an: u16,
    pub ncs_an: u8,
    /// PRBs at each band edge reserved for periodic CQI
    pub n_rb_cqi: u8,
}

/// System information scheduling of one carrier
#[derive(Debug, Clone, Copy)]
pub struct SiParams {
    /// SIB1 repetition period in frames (fixed 8 by the standard, kept
    /// configurable for lab setups)
    pub sib1_period_rf: u8,
    /// si-WindowLength in subframes
    pub si_window_sf: u8,
    /// Periodicity of the first scheduling-info entry in frames
    pub si_period_rf: u16,
}

/// Static parameters of one carrier. Immutable once the cell set is built.
#[derive(Debug, Clone)]
pub struct CellParams {
    pub cc_idx: u32,
    pub pci: u16,
    pub dl_earfcn: u32,
    pub ul_earfcn: u32,
    pub nof_prb: u8,
    pub cp: CyclicPrefix,
    pub nof_ports: u8,
    pub prach: PrachParams,
    pub pucch: PucchParams,
    pub si: SiParams,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CellCfgErr {
    InvalidNofPrb { nof_prb: u8 },
    InvalidNofPorts { nof_ports: u8 },
    InvalidDeltaShift { delta_shift: u8 },
    DuplicateCcIdx { cc_idx: u32 },
    DuplicatePci { pci: u16 },
    NoCells,
}

impl CellParams {
    pub fn validate(&self) -> Result<(), CellCfgErr> {
        if !VALID_NOF_PRB.contains(&self.nof_prb) {
            return Err(CellCfgErr::InvalidNofPrb { nof_prb: self.nof_prb });
        }
        if ![1, 2, 4].contains(&self.nof_ports) {
            return Err(CellCfgErr::InvalidNofPorts { nof_ports: self.nof_ports });
        }
        if !(1..=3).contains(&self.pucch.delta_shift) {
            return Err(CellCfgErr::InvalidDeltaShift { delta_shift: self.pucch.delta_shift });
        }
        Ok(())
    }

    /// RBG size P for this bandwidth (36.213 table 7.1.6.1-1)
    pub fn rbg_size(&self) -> u32 {
        match self.nof_prb {
            6 => 1,
            15 | 25 => 2,
            50 => 3,
            _ => 4,
        }
    }

    /// Number of RBGs covering the carrier; the last group may be short
    pub fn nof_rbgs(&self) -> u32 {
        let p = self.rbg_size();
        (self.nof_prb as u32 + p - 1) / p
    }

    /// PRBs reserved at each band edge for PUCCH; PUSCH must stay inside
    pub fn pucch_edge_prbs(&self) -> u32 {
        // n_RB_CQI plus one PRB for SR/HARQ ACK regions
        self.pucch.n_rb_cqi as u32 + 1
    }

    /// PDCCH capacity in CCEs for a given control-region size.
    /// REs in the control region minus PCFICH/PHICH overhead, 36 REs per CCE.
    pub fn nof_cces(&self, cfi: u8) -> u32 {
        let re_total = cfi as u32 * self.nof_prb as u32 * 12;
        let re_pcfich = 16;
        let re_phich = 12 * ((self.nof_prb as u32 + 47) / 48); // Ng = 1/6
        re_total.saturating_sub(re_pcfich + re_phich) / 36
    }

    /// True if SIB/paging space must be reserved in this downlink subframe
    pub fn is_si_subframe(&self, sfn: u32, sf_idx: u32) -> bool {
        // SIB1 in subframe 5 of even frames; SI window at frame period start
        if sf_idx == 5 && sfn % 2 == 0 {
            return true;
        }
        let period = self.si_period_rf_checked();
        sfn % period == 0 && sf_idx < self.si.si_window_sf as u32 % 10
    }

    fn si_period_rf_checked(&self) -> u32 {
        (self.si.si_period_rf as u32).max(1)
    }
}

/// The set of carriers this station serves, keyed by carrier index.
/// Membership is fixed after startup.
#[derive(Debug, Clone)]
pub struct CellSet {
    cells: Vec<CellParams>,
}

impl CellSet {
    pub fn new(mut cells: Vec<CellParams>) -> Result<CellSet, CellCfgErr> {
        if cells.is_empty() {
            return Err(CellCfgErr::NoCells);
        }
        cells.sort_by_key(|c| c.cc_idx);
        for pair in cells.windows(2) {
            if pair[0].cc_idx == pair[1].cc_idx {
                return Err(CellCfgErr::DuplicateCcIdx { cc_idx: pair[0].cc_idx });
            }
        }
        for (i, c) in cells.iter().enumerate() {
            c.validate()?;
            if cells.iter().skip(i + 1).any(|o| o.pci == c.pci) {
                return Err(CellCfgErr::DuplicatePci { pci: c.pci });
            }
        }
        Ok(CellSet { cells })
    }

    pub fn get(&self, cc_idx: u32) -> Option<&CellParams> {
        self.cells.iter().find(|c| c.cc_idx == cc_idx)
    }

    pub fn by_pci(&self, pci: u16) -> Option<&CellParams> {
        self.cells.iter().find(|c| c.pci == pci)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellParams> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl fmt::Display for CellParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cc={} pci={} earfcn={}/{} prb={}",
            self.cc_idx, self.pci, self.dl_earfcn, self.ul_earfcn, self.nof_prb
        )
    }
}

/// Canned 50-PRB FDD cell used by unit tests across the workspace
pub fn test_cell(cc_idx: u32, pci: u16) -> CellParams {
    CellParams {
        cc_idx,
        pci,
        dl_earfcn: 3350,
        ul_earfcn: 21350,
        nof_prb: 50,
        cp: CyclicPrefix::Normal,
        nof_ports: 2,
        prach: PrachParams {
            config_idx: 3,
            freq_offset: 4,
            nof_preambles: 52,
            ra_resp_win: 10,
            max_msg3_retx: 4,
        },
        pucch: PucchParams { delta_shift: 1, n1_pucch_an: 36, ncs_an: 0, n_rb_cqi: 2 },
        si: SiParams { sib1_period_rf: 8, si_window_sf: 5, si_period_rf: 16 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rbg_geometry() {
        let mut cell = test_cell(0, 1);
        assert_eq!(cell.rbg_size(), 3);
        assert_eq!(cell.nof_rbgs(), 17); // 50 PRB, P=3, last group short

        cell.nof_prb = 100;
        assert_eq!(cell.rbg_size(), 4);
        assert_eq!(cell.nof_rbgs(), 25);

        cell.nof_prb = 6;
        assert_eq!(cell.nof_rbgs(), 6);
    }

    #[test]
    fn test_cell_set_rejects_duplicates() {
        let cells = vec![test_cell(0, 1), test_cell(0, 2)];
        assert_eq!(CellSet::new(cells).unwrap_err(), CellCfgErr::DuplicateCcIdx { cc_idx: 0 });

        let cells = vec![test_cell(0, 1), test_cell(1, 1)];
        assert_eq!(CellSet::new(cells).unwrap_err(), CellCfgErr::DuplicatePci { pci: 1 });
    }

    #[test]
    fn test_invalid_prb_count() {
        let mut cell = test_cell(0, 1);
        cell.nof_prb = 42;
        assert_eq!(cell.validate().unwrap_err(), CellCfgErr::InvalidNofPrb { nof_prb: 42 });
    }

    #[test]
    fn test_cce_capacity_grows_with_cfi() {
        let cell = test_cell(0, 1);
        let c1 = cell.nof_cces(1);
        let c2 = cell.nof_cces(2);
        let c3 = cell.nof_cces(3);
        assert!(c1 < c2 && c2 < c3);
        assert!(c3 > 8);
    }
}
