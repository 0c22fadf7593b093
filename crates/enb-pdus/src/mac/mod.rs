pub mod bsr;
pub mod dl_sch;
pub mod lcid;
pub mod rar;
pub mod ul_sch;

pub use dl_sch::DlSchBuilder;
pub use lcid::{DlSchLcid, UlSchLcid};
pub use rar::{RarEntry, RarPdu, RarUlGrant};
pub use ul_sch::{UlSchElem, UlSchPdu};
