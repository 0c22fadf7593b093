use core::fmt;

/// EPS ciphering algorithms, in 36.331 signalling order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgo {
    Eea0,
    Eea1,
    Eea2,
    Eea3,
}

/// EPS integrity algorithms. EIA0 exists on the wire but is never
/// selected for signalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegAlgo {
    Eia0,
    Eia1,
    Eia2,
    Eia3,
}

impl CipherAlgo {
    /// Algorithm identity as carried in the security-algorithm-config IE
    pub fn id(self) -> u8 {
        match self {
            CipherAlgo::Eea0 => 0,
            CipherAlgo::Eea1 => 1,
            CipherAlgo::Eea2 => 2,
            CipherAlgo::Eea3 => 3,
        }
    }
}

impl IntegAlgo {
    pub fn id(self) -> u8 {
        match self {
            IntegAlgo::Eia0 => 0,
            IntegAlgo::Eia1 => 1,
            IntegAlgo::Eia2 => 2,
            IntegAlgo::Eia3 => 3,
        }
    }
}

/// UE security capabilities, one bit per non-null algorithm.
/// Bit 0 = EEA1/EIA1, bit 1 = EEA2/EIA2, bit 2 = EEA3/EIA3
/// (the S1AP encoding; EEA0 support is implicit and never signalled).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityCapabilities {
    pub eea: u8,
    pub eia: u8,
}

impl SecurityCapabilities {
    pub fn supports_cipher(&self, algo: CipherAlgo) -> bool {
        match algo {
            CipherAlgo::Eea0 => true,
            _ => self.eea & (1 << (algo.id() - 1)) != 0,
        }
    }

    pub fn supports_integ(&self, algo: IntegAlgo) -> bool {
        match algo {
            IntegAlgo::Eia0 => false,
            _ => self.eia & (1 << (algo.id() - 1)) != 0,
        }
    }
}

pub const KEY_LEN: usize = 32;

/// Keys derived from K_eNB for one user, handed to PDCP
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DerivedKeys {
    pub k_rrc_enc: [u8; KEY_LEN],
    pub k_rrc_int: [u8; KEY_LEN],
    pub k_up_enc: [u8; KEY_LEN],
    pub k_up_int: [u8; KEY_LEN],
}

impl fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // key material stays out of logs
        write!(f, "DerivedKeys {{ .. }}")
    }
}

impl fmt::Display for CipherAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EEA{}", self.id())
    }
}

impl fmt::Display for IntegAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EIA{}", self.id())
    }
}
