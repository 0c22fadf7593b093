use serde::Deserialize;

use enb_core::cell::{CellCfgErr, CellParams, CellSet, CyclicPrefix, PrachParams, PucchParams, SiParams};
use enb_core::security::{CipherAlgo, IntegAlgo};

use crate::stack_config::{SchedConfig, SharedConfig, StackConfig};

#[derive(Debug)]
pub enum ConfigErr {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Cell(CellCfgErr),
    InvalidAlgo(String),
}

impl std::fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigErr::Io(e) => write!(f, "io: {}", e),
            ConfigErr::Parse(e) => write!(f, "toml: {}", e),
            ConfigErr::Cell(e) => write!(f, "cell config: {:?}", e),
            ConfigErr::InvalidAlgo(s) => write!(f, "unknown security algorithm: {}", s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TomlRoot {
    enb: TomlEnb,
    #[serde(default)]
    sched: TomlSched,
    #[serde(rename = "cell")]
    cells: Vec<TomlCell>,
}

#[derive(Debug, Deserialize)]
struct TomlEnb {
    name: String,
    #[serde(default = "default_inactivity")]
    inactivity_timeout_ms: u32,
    #[serde(default = "default_rlf_threshold")]
    rlf_threshold: u32,
    #[serde(default = "default_eea_pref")]
    eea_preference: Vec<String>,
    #[serde(default = "default_eia_pref")]
    eia_preference: Vec<String>,
    debug_log: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TomlSched {
    max_aggr_level: Option<u8>,
    max_mcs_dl: Option<u8>,
    max_mcs_ul: Option<u8>,
    fixed_mcs_dl: Option<u8>,
    fixed_mcs_ul: Option<u8>,
    ul_64qam: Option<bool>,
    sr_period: Option<u32>,
    cqi_period: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TomlCell {
    cc_idx: u32,
    pci: u16,
    dl_earfcn: u32,
    ul_earfcn: u32,
    nof_prb: u8,
    #[serde(default)]
    extended_cp: bool,
    #[serde(default = "default_ports")]
    nof_ports: u8,
    // PRACH
    #[serde(default = "default_prach_cfg_idx")]
    prach_config_idx: u8,
    #[serde(default = "default_prach_freq_offset")]
    prach_freq_offset: u8,
    #[serde(default = "default_nof_preambles")]
    nof_preambles: u8,
    #[serde(default = "default_ra_resp_win")]
    ra_resp_win: u8,
    #[serde(default = "default_max_msg3_retx")]
    max_msg3_retx: u8,
    // PUCCH
    #[serde(default = "default_delta_shift")]
    delta_pucch_shift: u8,
    #[serde(default = "default_n1_pucch_an")]
    n1_pucch_an: u16,
    #[serde(default)]
    ncs_an: u8,
    #[serde(default = "default_n_rb_cqi")]
    n_rb_cqi: u8,
    // SI
    #[serde(default = "default_sib1_period")]
    sib1_period_rf: u8,
    #[serde(default = "default_si_window")]
    si_window_sf: u8,
    #[serde(default = "default_si_period")]
    si_period_rf: u16,
}

fn default_inactivity() -> u32 {
    10_000
}
fn default_rlf_threshold() -> u32 {
    30
}
fn default_eea_pref() -> Vec<String> {
    vec!["eea0".into(), "eea2".into(), "eea1".into()]
}
fn default_eia_pref() -> Vec<String> {
    vec!["eia2".into(), "eia1".into()]
}
fn default_ports() -> u8 {
    2
}
fn default_prach_cfg_idx() -> u8 {
    3
}
fn default_prach_freq_offset() -> u8 {
    4
}
fn default_nof_preambles() -> u8 {
    52
}
fn default_ra_resp_win() -> u8 {
    10
}
fn default_max_msg3_retx() -> u8 {
    4
}
fn default_delta_shift() -> u8 {
    1
}
fn default_n1_pucch_an() -> u16 {
    36
}
fn default_n_rb_cqi() -> u8 {
    2
}
fn default_sib1_period() -> u8 {
    8
}
fn default_si_window() -> u8 {
    5
}
fn default_si_period() -> u16 {
    16
}

fn parse_eea(name: &str) -> Result<CipherAlgo, ConfigErr> {
    match name.to_ascii_lowercase().as_str() {
        "eea0" => Ok(CipherAlgo::Eea0),
        "eea1" => Ok(CipherAlgo::Eea1),
        "eea2" => Ok(CipherAlgo::Eea2),
        "eea3" => Ok(CipherAlgo::Eea3),
        other => Err(ConfigErr::InvalidAlgo(other.into())),
    }
}

fn parse_eia(name: &str) -> Result<IntegAlgo, ConfigErr> {
    match name.to_ascii_lowercase().as_str() {
        "eia1" => Ok(IntegAlgo::Eia1),
        "eia2" => Ok(IntegAlgo::Eia2),
        "eia3" => Ok(IntegAlgo::Eia3),
        other => Err(ConfigErr::InvalidAlgo(other.into())),
    }
}

impl TomlCell {
    fn into_params(self) -> CellParams {
        CellParams {
            cc_idx: self.cc_idx,
            pci: self.pci,
            dl_earfcn: self.dl_earfcn,
            ul_earfcn: self.ul_earfcn,
            nof_prb: self.nof_prb,
            cp: if self.extended_cp { CyclicPrefix::Extended } else { CyclicPrefix::Normal },
            nof_ports: self.nof_ports,
            prach: PrachParams {
                config_idx: self.prach_config_idx,
                freq_offset: self.prach_freq_offset,
                nof_preambles: self.nof_preambles,
                ra_resp_win: self.ra_resp_win,
                max_msg3_retx: self.max_msg3_retx,
            },
            pucch: PucchParams {
                delta_shift: self.delta_pucch_shift,
                n1_pucch_an: self.n1_pucch_an,
                ncs_an: self.ncs_an,
                n_rb_cqi: self.n_rb_cqi,
            },
            si: SiParams {
                sib1_period_rf: self.sib1_period_rf,
                si_window_sf: self.si_window_sf,
                si_period_rf: self.si_period_rf,
            },
        }
    }
}

pub fn from_str(raw: &str) -> Result<SharedConfig, ConfigErr> {
    let root: TomlRoot = toml::from_str(raw).map_err(ConfigErr::Parse)?;

    let cells = CellSet::new(root.cells.into_iter().map(TomlCell::into_params).collect())
        .map_err(ConfigErr::Cell)?;

    let mut eea = Vec::new();
    for name in &root.enb.eea_preference {
        eea.push(parse_eea(name)?);
    }
    let mut eia = Vec::new();
    for name in &root.enb.eia_preference {
        eia.push(parse_eia(name)?);
    }

    let defaults = SchedConfig::default();
    let sched = SchedConfig {
        max_aggr_level: root.sched.max_aggr_level.unwrap_or(defaults.max_aggr_level),
        max_mcs_dl: root.sched.max_mcs_dl.unwrap_or(defaults.max_mcs_dl),
        max_mcs_ul: root.sched.max_mcs_ul.unwrap_or(defaults.max_mcs_ul),
        fixed_mcs_dl: root.sched.fixed_mcs_dl,
        fixed_mcs_ul: root.sched.fixed_mcs_ul,
        ul_64qam: root.sched.ul_64qam.unwrap_or(defaults.ul_64qam),
        sr_period: root.sched.sr_period.unwrap_or(defaults.sr_period),
        cqi_period: root.sched.cqi_period.unwrap_or(defaults.cqi_period),
    };

    Ok(SharedConfig::new(StackConfig {
        enb_name: root.enb.name,
        inactivity_timeout_ms: root.enb.inactivity_timeout_ms,
        rlf_threshold: root.enb.rlf_threshold,
        eea_preference: eea,
        eia_preference: eia,
        sched,
        cells,
        debug_log: root.enb.debug_log,
    }))
}

pub fn from_file(path: &str) -> Result<SharedConfig, ConfigErr> {
    let raw = std::fs::read_to_string(path).map_err(ConfigErr::Io)?;
    from_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [enb]
        name = "testbench"

        [[cell]]
        cc_idx = 0
        pci = 1
        dl_earfcn = 3350
        ul_earfcn = 21350
        nof_prb = 50

        [[cell]]
        cc_idx = 1
        pci = 2
        dl_earfcn = 3350
        ul_earfcn = 21350
        nof_prb = 50
    "#;

    #[test]
    fn test_minimal_config() {
        let shared = from_str(MINIMAL).expect("parse failed");
        let cfg = shared.config();
        assert_eq!(cfg.enb_name, "testbench");
        assert_eq!(cfg.cells.len(), 2);
        assert_eq!(cfg.cells.get(1).unwrap().pci, 2);
        assert_eq!(cfg.inactivity_timeout_ms, 10_000);
        assert_eq!(cfg.sched.max_aggr_level, 8);
    }

    #[test]
    fn test_invalid_prb_rejected() {
        let bad = MINIMAL.replace("nof_prb = 50", "nof_prb = 42");
        assert!(matches!(from_str(&bad), Err(ConfigErr::Cell(_))));
    }

    #[test]
    fn test_algo_parsing() {
        let raw = MINIMAL.replace(
            "name = \"testbench\"",
            "name = \"testbench\"\neea_preference = [\"eea2\", \"eea0\"]",
        );
        let shared = from_str(&raw).unwrap();
        assert_eq!(shared.config().eea_preference, vec![CipherAlgo::Eea2, CipherAlgo::Eea0]);
    }
}
