//! Measurement-configuration diffing with 36.331 delta semantics.
//!
//! The delta lists what changed between two var-meas-cfg states; applying
//! it to the source yields the target, and diffing equal configurations
//! yields a delta with no presence flags set.

use enb_pdus::rrc::meas::{MeasDelta, MeasObject, MeasObjectDiff, VarMeasCfg};

pub fn compute_diff(src: &VarMeasCfg, tgt: &VarMeasCfg) -> MeasDelta {
    let mut delta = MeasDelta::default();

    // measurement objects: cell-level deltas inside each object
    for (id, tgt_obj) in &tgt.objects {
        match src.objects.get(id) {
            Some(src_obj) if src_obj == tgt_obj => {}
            Some(src_obj) => delta.objects_add_mod.push(diff_object(*id, src_obj, tgt_obj)),
            None => delta.objects_add_mod.push(diff_object(*id, &MeasObject::default(), tgt_obj)),
        }
    }
    for id in src.objects.keys() {
        if !tgt.objects.contains_key(id) {
            delta.objects_remove.push(*id);
        }
    }

    for (id, tgt_rep) in &tgt.reports {
        if src.reports.get(id) != Some(tgt_rep) {
            delta.reports_add_mod.push((*id, *tgt_rep));
        }
    }
    for id in src.reports.keys() {
        if !tgt.reports.contains_key(id) {
            delta.reports_remove.push(*id);
        }
    }

    for (id, tgt_mid) in &tgt.meas_ids {
        if src.meas_ids.get(id) != Some(tgt_mid) {
            delta.meas_ids_add_mod.push((*id, *tgt_mid));
        }
    }
    for id in src.meas_ids.keys() {
        if !tgt.meas_ids.contains_key(id) {
            delta.meas_ids_remove.push(*id);
        }
    }

    delta
}

/// Cells that differ in PCI or offset are re-signalled; cells absent from
/// the target are removed by cell index
fn diff_object(id: u8, src: &MeasObject, tgt: &MeasObject) -> MeasObjectDiff {
    let mut diff = MeasObjectDiff { id, earfcn: tgt.earfcn, ..Default::default() };
    for (cell_idx, tgt_cell) in &tgt.cells {
        if src.cells.get(cell_idx) != Some(tgt_cell) {
            diff.cells_add_mod.push((*cell_idx, *tgt_cell));
        }
    }
    for cell_idx in src.cells.keys() {
        if !tgt.cells.contains_key(cell_idx) {
            diff.cells_remove.push(*cell_idx);
        }
    }
    diff
}

/// Apply a delta to a source configuration
pub fn apply_diff(src: &VarMeasCfg, delta: &MeasDelta) -> VarMeasCfg {
    let mut out = src.clone();

    for obj_diff in &delta.objects_add_mod {
        let obj = out.objects.entry(obj_diff.id).or_default();
        obj.earfcn = obj_diff.earfcn;
        for (cell_idx, cell) in &obj_diff.cells_add_mod {
            obj.cells.insert(*cell_idx, *cell);
        }
        for cell_idx in &obj_diff.cells_remove {
            obj.cells.remove(cell_idx);
        }
    }
    for id in &delta.objects_remove {
        out.objects.remove(id);
    }

    for (id, rep) in &delta.reports_add_mod {
        out.reports.insert(*id, *rep);
    }
    for id in &delta.reports_remove {
        out.reports.remove(id);
    }

    for (id, mid) in &delta.meas_ids_add_mod {
        out.meas_ids.insert(*id, *mid);
    }
    for id in &delta.meas_ids_remove {
        out.meas_ids.remove(id);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use enb_pdus::rrc::meas::{EventTrigger, MeasIdMap, NeighCell, ReportCfg};

    fn report_a3() -> ReportCfg {
        ReportCfg {
            trigger: EventTrigger::A3 { offset_db: 3 },
            hysteresis_db: 1,
            time_to_trigger_ms: 100,
            max_report_cells: 4,
            report_amount: 1,
            report_interval_ms: 240,
        }
    }

    fn sample_cfg() -> VarMeasCfg {
        let mut cfg = VarMeasCfg::default();
        let mut obj = MeasObject { earfcn: 3350, ..Default::default() };
        obj.cells.insert(1, NeighCell { pci: 2, offset_db: 0 });
        obj.cells.insert(2, NeighCell { pci: 7, offset_db: -2 });
        cfg.objects.insert(1, obj);
        cfg.reports.insert(1, report_a3());
        cfg.meas_ids.insert(1, MeasIdMap { object_id: 1, report_id: 1 });
        cfg
    }

    #[test]
    fn test_equal_configs_empty_delta() {
        let cfg = sample_cfg();
        let delta = compute_diff(&cfg, &cfg);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_apply_diff_reaches_target() {
        let src = sample_cfg();
        let mut tgt = sample_cfg();
        // modify a neighbour, remove one, add one, change a report, add a meas id
        tgt.objects.get_mut(&1).unwrap().cells.insert(1, NeighCell { pci: 2, offset_db: 3 });
        tgt.objects.get_mut(&1).unwrap().cells.remove(&2);
        tgt.objects.get_mut(&1).unwrap().cells.insert(5, NeighCell { pci: 9, offset_db: 0 });
        tgt.reports.insert(2, report_a3());
        tgt.meas_ids.insert(2, MeasIdMap { object_id: 1, report_id: 2 });

        let delta = compute_diff(&src, &tgt);
        assert!(!delta.is_empty());
        assert_eq!(apply_diff(&src, &delta), tgt);
    }

    #[test]
    fn test_removals() {
        let src = sample_cfg();
        let mut tgt = sample_cfg();
        tgt.objects.remove(&1);
        tgt.meas_ids.remove(&1);
        let delta = compute_diff(&src, &tgt);
        assert_eq!(delta.objects_remove, vec![1]);
        assert_eq!(delta.meas_ids_remove, vec![1]);
        assert!(delta.objects_add_mod.is_empty());
        assert_eq!(apply_diff(&src, &delta), tgt);
    }

    #[test]
    fn test_diff_from_empty_is_full_add() {
        let src = VarMeasCfg::default();
        let tgt = sample_cfg();
        let delta = compute_diff(&src, &tgt);
        assert_eq!(delta.objects_add_mod.len(), 1);
        assert_eq!(delta.objects_add_mod[0].cells_add_mod.len(), 2);
        assert_eq!(apply_diff(&src, &delta), tgt);
    }

    #[test]
    fn test_id_assignment_lowest_free() {
        let cfg = sample_cfg();
        assert_eq!(cfg.next_object_id(), Some(2));
        assert_eq!(cfg.next_report_id(), Some(2));
        let mut full = VarMeasCfg::default();
        for id in 1..=32 {
            full.objects.insert(id, MeasObject::default());
        }
        assert_eq!(full.next_object_id(), None);
    }

    #[test]
    fn test_earfcn_change_resignals_object() {
        let src = sample_cfg();
        let mut tgt = sample_cfg();
        tgt.objects.get_mut(&1).unwrap().earfcn = 6300;
        let delta = compute_diff(&src, &tgt);
        assert_eq!(delta.objects_add_mod.len(), 1);
        assert_eq!(delta.objects_add_mod[0].earfcn, 6300);
        assert_eq!(apply_diff(&src, &delta), tgt);
    }
}
