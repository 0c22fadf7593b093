//! Measurement-configuration state (var-meas-cfg) and its delta form.
//!
//! The delta follows TS 36.331 semantics: separate to-add-or-modify and
//! to-remove lists per collection, with cell-level deltas inside each
//! measurement object. Identifiers live in [1, 32] and stay stable
//! across diffs.

use std::collections::BTreeMap;

pub const MIN_MEAS_ID: u8 = 1;
pub const MAX_MEAS_ID: u8 = 32;

/// A neighbour cell inside a measurement object, keyed by cell index
/// (the low octet of the E-UTRAN cell identifier)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighCell {
    pub pci: u16,
    /// cellIndividualOffset, dB
    pub offset_db: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeasObject {
    pub earfcn: u32,
    pub cells: BTreeMap<u8, NeighCell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTrigger {
    /// Serving becomes better than threshold
    A1 { threshold: i16 },
    /// Serving becomes worse than threshold
    A2 { threshold: i16 },
    /// Neighbour becomes offset better than serving
    A3 { offset_db: i8 },
    /// Neighbour becomes better than threshold
    A4 { threshold: i16 },
    /// Serving worse than t1 and neighbour better than t2
    A5 { threshold1: i16, threshold2: i16 },
    /// Neighbour becomes offset better than secondary serving
    A6 { offset_db: i8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCfg {
    pub trigger: EventTrigger,
    pub hysteresis_db: u8,
    pub time_to_trigger_ms: u16,
    pub max_report_cells: u8,
    pub report_amount: u8,
    pub report_interval_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasIdMap {
    pub object_id: u8,
    pub report_id: u8,
}

/// The station- and user-visible measurement configuration state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VarMeasCfg {
    pub objects: BTreeMap<u8, MeasObject>,
    pub reports: BTreeMap<u8, ReportCfg>,
    pub meas_ids: BTreeMap<u8, MeasIdMap>,
}

impl VarMeasCfg {
    /// Lowest free object id in [1, 32]
    pub fn next_object_id(&self) -> Option<u8> {
        (MIN_MEAS_ID..=MAX_MEAS_ID).find(|id| !self.objects.contains_key(id))
    }

    pub fn next_report_id(&self) -> Option<u8> {
        (MIN_MEAS_ID..=MAX_MEAS_ID).find(|id| !self.reports.contains_key(id))
    }

    pub fn next_meas_id(&self) -> Option<u8> {
        (MIN_MEAS_ID..=MAX_MEAS_ID).find(|id| !self.meas_ids.contains_key(id))
    }

    /// Find the measurement object carrying a given PCI
    pub fn find_cell(&self, pci: u16) -> Option<(u8, u8, &NeighCell)> {
        for (obj_id, obj) in &self.objects {
            for (cell_idx, cell) in &obj.cells {
                if cell.pci == pci {
                    return Some((*obj_id, *cell_idx, cell));
                }
            }
        }
        None
    }
}

/// Cell-level delta inside one measurement object
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeasObjectDiff {
    pub id: u8,
    pub earfcn: u32,
    pub cells_add_mod: Vec<(u8, NeighCell)>,
    pub cells_remove: Vec<u8>,
}

/// The minimal set of operations turning one var-meas-cfg into another
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeasDelta {
    pub objects_add_mod: Vec<MeasObjectDiff>,
    pub objects_remove: Vec<u8>,
    pub reports_add_mod: Vec<(u8, ReportCfg)>,
    pub reports_remove: Vec<u8>,
    pub meas_ids_add_mod: Vec<(u8, MeasIdMap)>,
    pub meas_ids_remove: Vec<u8>,
}

impl MeasDelta {
    /// No presence flags set: nothing to signal
    pub fn is_empty(&self) -> bool {
        self.objects_add_mod.is_empty()
            && self.objects_remove.is_empty()
            && self.reports_add_mod.is_empty()
            && self.reports_remove.is_empty()
            && self.meas_ids_add_mod.is_empty()
            && self.meas_ids_remove.is_empty()
    }
}

/// One entry of an uplink measurement report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasResult {
    pub pci: u16,
    pub rsrp: i16,
    pub rsrq: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasReport {
    pub meas_id: u8,
    pub serving_rsrp: i16,
    pub serving_rsrq: i16,
    pub neighbours: Vec<MeasResult>,
}
