use enb_core::MacPduErr;

/// LCID values in a DL-SCH subheader (36.321 table 6.2.1-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlSchLcid {
    /// CCCH or a data bearer, 0..=10
    Sdu(u8),
    ScellActivation,
    ConResId,
    TaCmd,
    DrxCmd,
    Padding,
}

impl DlSchLcid {
    pub fn into_raw(self) -> u8 {
        match self {
            DlSchLcid::Sdu(lcid) => lcid,
            DlSchLcid::ScellActivation => 0b11011,
            DlSchLcid::ConResId => 0b11100,
            DlSchLcid::TaCmd => 0b11101,
            DlSchLcid::DrxCmd => 0b11110,
            DlSchLcid::Padding => 0b11111,
        }
    }

    pub fn from_raw(raw: u8) -> Result<DlSchLcid, MacPduErr> {
        match raw {
            0..=10 => Ok(DlSchLcid::Sdu(raw)),
            0b11011 => Ok(DlSchLcid::ScellActivation),
            0b11100 => Ok(DlSchLcid::ConResId),
            0b11101 => Ok(DlSchLcid::TaCmd),
            0b11110 => Ok(DlSchLcid::DrxCmd),
            0b11111 => Ok(DlSchLcid::Padding),
            other => Err(MacPduErr::InvalidLcid { lcid: other }),
        }
    }

    /// Payload size of a fixed-size control element; `None` for SDUs
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            DlSchLcid::ScellActivation => Some(1),
            DlSchLcid::ConResId => Some(6),
            DlSchLcid::TaCmd => Some(1),
            DlSchLcid::DrxCmd | DlSchLcid::Padding => Some(0),
            DlSchLcid::Sdu(_) => None,
        }
    }
}

/// LCID values in a UL-SCH subheader (36.321 table 6.2.1-2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UlSchLcid {
    Sdu(u8),
    Phr,
    Crnti,
    TruncBsr,
    ShortBsr,
    LongBsr,
    Padding,
}

impl UlSchLcid {
    pub fn into_raw(self) -> u8 {
        match self {
            UlSchLcid::Sdu(lcid) => lcid,
            UlSchLcid::Phr => 0b11010,
            UlSchLcid::Crnti => 0b11011,
            UlSchLcid::TruncBsr => 0b11100,
            UlSchLcid::ShortBsr => 0b11101,
            UlSchLcid::LongBsr => 0b11110,
            UlSchLcid::Padding => 0b11111,
        }
    }

    pub fn from_raw(raw: u8) -> Result<UlSchLcid, MacPduErr> {
        match raw {
            0..=10 => Ok(UlSchLcid::Sdu(raw)),
            0b11010 => Ok(UlSchLcid::Phr),
            0b11011 => Ok(UlSchLcid::Crnti),
            0b11100 => Ok(UlSchLcid::TruncBsr),
            0b11101 => Ok(UlSchLcid::ShortBsr),
            0b11110 => Ok(UlSchLcid::LongBsr),
            0b11111 => Ok(UlSchLcid::Padding),
            other => Err(MacPduErr::InvalidLcid { lcid: other }),
        }
    }

    pub fn fixed_len(self) -> Option<usize> {
        match self {
            UlSchLcid::Phr => Some(1),
            UlSchLcid::Crnti => Some(2),
            UlSchLcid::TruncBsr | UlSchLcid::ShortBsr => Some(1),
            UlSchLcid::LongBsr => Some(3),
            UlSchLcid::Padding => Some(0),
            UlSchLcid::Sdu(_) => None,
        }
    }
}
