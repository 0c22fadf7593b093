//! MCS / transport-block-size computation.
//!
//! TBS is derived from a per-I_TBS spectral-efficiency curve quantized to
//! whole bytes over a reference 120 data REs per PRB, rather than the
//! verbatim 36.213 tables. The curve is strictly monotone in both I_TBS and
//! PRB count, which is what the scheduler's ascending-PRB search relies on.

/// Reference data REs per PRB pair used by the TBS curve
const REF_RE_PER_PRB: u32 = 120;

/// Bits per RE for each I_TBS 0..=26, Q10 fixed point
const ITBS_EFF_Q10: [u32; 27] = [
    154, 193, 238, 308, 379, 474, 553, 650, 754, 852, 948, 1063, 1189, 1341, 1516, 1658, 1764,
    1944, 2155, 2363, 2574, 2786, 2995, 3213, 3458, 3724, 4013,
];

pub const MAX_ITBS: u8 = 26;
pub const MAX_MCS: u8 = 28;

/// Modulation order for a downlink MCS (36.213 table 7.1.7.1-1)
pub fn dl_modulation_order(mcs: u8) -> u8 {
    match mcs {
        0..=9 => 2,
        10..=16 => 4,
        _ => 6,
    }
}

/// I_TBS for a downlink MCS; `None` for the reserved indices 29..=31
pub fn dl_mcs_to_itbs(mcs: u8) -> Option<u8> {
    match mcs {
        0..=9 => Some(mcs),
        10..=16 => Some(mcs - 1),
        17..=28 => Some(mcs - 2),
        _ => None,
    }
}

/// I_TBS for an uplink MCS (36.213 table 8.6.1-1). Without 64QAM
/// capability the usable range ends at 20.
pub fn ul_mcs_to_itbs(mcs: u8, ul_64qam: bool) -> Option<u8> {
    match mcs {
        0..=10 => Some(mcs),
        11..=20 => Some(mcs - 1),
        21..=28 if ul_64qam => Some(mcs - 2),
        _ => None,
    }
}

pub fn ul_modulation_order(mcs: u8, ul_64qam: bool) -> u8 {
    match mcs {
        0..=10 => 2,
        11..=20 => 4,
        _ => {
            if ul_64qam {
                6
            } else {
                4
            }
        }
    }
}

/// Transport block size in bits for `nof_prb` PRBs at `itbs`.
/// Byte-aligned, never below 16 bits for a non-empty allocation.
pub fn tbs_bits(itbs: u8, nof_prb: u32) -> u32 {
    if nof_prb == 0 {
        return 0;
    }
    let itbs = itbs.min(MAX_ITBS) as usize;
    let re = REF_RE_PER_PRB * nof_prb;
    let bits = (re as u64 * ITBS_EFF_Q10[itbs] as u64) >> 10;
    let bytes = (bits / 8).max(2);
    (bytes * 8) as u32
}

/// Smallest PRB count in `1..=max_prb` whose TBS at `itbs` carries
/// `req_bytes`; `None` if even `max_prb` PRBs do not suffice.
pub fn min_prb_for_bytes(itbs: u8, req_bytes: u32, max_prb: u32) -> Option<u32> {
    let req_bits = req_bytes * 8;
    (1..=max_prb).find(|&n| tbs_bits(itbs, n) >= req_bits)
}

/// Map a wideband CQI 1..=15 onto the highest MCS the channel supports.
/// Piecewise-linear, matching the usual conservative eNB mapping.
pub fn cqi_to_mcs(cqi: u8) -> u8 {
    const CQI_TO_MCS: [u8; 16] = [0, 0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28];
    CQI_TO_MCS[(cqi as usize).min(15)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotone_in_prb_and_itbs() {
        for itbs in 0..=MAX_ITBS {
            for prb in 1..100u32 {
                assert!(tbs_bits(itbs, prb + 1) > tbs_bits(itbs, prb));
            }
        }
        for itbs in 0..MAX_ITBS {
            assert!(tbs_bits(itbs + 1, 50) > tbs_bits(itbs, 50));
        }
    }

    #[test]
    fn test_byte_aligned_and_min_size() {
        for itbs in 0..=MAX_ITBS {
            for prb in 1..=100u32 {
                let tbs = tbs_bits(itbs, prb);
                assert_eq!(tbs % 8, 0);
                assert!(tbs >= 16);
            }
        }
    }

    #[test]
    fn test_min_prb_search() {
        let prb = min_prb_for_bytes(9, 100, 50).unwrap();
        assert!(tbs_bits(9, prb) >= 800);
        if prb > 1 {
            assert!(tbs_bits(9, prb - 1) < 800);
        }
        // An impossible request fails rather than over-allocating
        assert_eq!(min_prb_for_bytes(0, 100_000, 100), None);
    }

    #[test]
    fn test_mcs_mappings() {
        assert_eq!(dl_mcs_to_itbs(0), Some(0));
        assert_eq!(dl_mcs_to_itbs(10), Some(9));
        assert_eq!(dl_mcs_to_itbs(28), Some(26));
        assert_eq!(dl_mcs_to_itbs(29), None);
        assert_eq!(ul_mcs_to_itbs(20, false), Some(19));
        assert_eq!(ul_mcs_to_itbs(24, false), None);
        assert_eq!(ul_mcs_to_itbs(24, true), Some(22));
        assert_eq!(dl_modulation_order(9), 2);
        assert_eq!(dl_modulation_order(16), 4);
        assert_eq!(dl_modulation_order(17), 6);
    }
}
