pub mod meas;
pub mod msgs;

pub use meas::{MeasDelta, MeasObject, MeasReport, NeighCell, ReportCfg, VarMeasCfg};
pub use msgs::{DlCcchMsg, DlDcchMsg, UlCcchMsg, UlDcchMsg};
