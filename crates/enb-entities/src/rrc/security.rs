//! AS security negotiation and key derivation.
//!
//! Algorithm selection intersects the user's reported capability bitmask
//! with the station's configured preference order. EIA0 is never selected
//! for signalling. Key derivation follows the 33.401 KDF: HMAC-SHA-256
//! over FC || P0 || L0 || P1 || L1.

use hmac::{Hmac, Mac as _};
use sha2::Sha256;

use enb_core::security::{CipherAlgo, DerivedKeys, IntegAlgo, SecurityCapabilities, KEY_LEN};
use enb_core::RrcErr;

type HmacSha256 = Hmac<Sha256>;

const FC_ALGO_KEY_DERIVATION: u8 = 0x15;

/// Algorithm type distinguishers of 33.401 A.7
const ALGO_DIST_RRC_ENC: u8 = 0x03;
const ALGO_DIST_RRC_INT: u8 = 0x04;
const ALGO_DIST_UP_ENC: u8 = 0x05;
const ALGO_DIST_UP_INT: u8 = 0x06;

/// Pick ciphering and integrity algorithms from the preference lists.
/// Returns `SecurityConfigFailed` when no integrity algorithm matches;
/// EEA0 is always available as the ciphering fallback of last resort.
pub fn select_algorithms(
    caps: &SecurityCapabilities,
    eea_pref: &[CipherAlgo],
    eia_pref: &[IntegAlgo],
) -> Result<(CipherAlgo, IntegAlgo), RrcErr> {
    let cipher = eea_pref
        .iter()
        .copied()
        .find(|algo| caps.supports_cipher(*algo))
        .ok_or(RrcErr::SecurityConfigFailed)?;

    let integ = eia_pref
        .iter()
        .copied()
        .filter(|algo| *algo != IntegAlgo::Eia0)
        .find(|algo| caps.supports_integ(*algo))
        .ok_or(RrcErr::SecurityConfigFailed)?;

    tracing::info!("selected security algorithms {} / {}", cipher, integ);
    Ok((cipher, integ))
}

fn kdf(key: &[u8; KEY_LEN], algo_dist: u8, algo_id: u8) -> [u8; KEY_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    let msg = [FC_ALGO_KEY_DERIVATION, algo_dist, 0x00, 0x01, algo_id, 0x00, 0x01];
    mac.update(&msg);
    let out = mac.finalize().into_bytes();
    let mut derived = [0u8; KEY_LEN];
    derived.copy_from_slice(&out);
    derived
}

/// Derive the RRC and user-plane keys from K_eNB
pub fn derive_keys(kenb: &[u8; KEY_LEN], cipher: CipherAlgo, integ: IntegAlgo) -> DerivedKeys {
    DerivedKeys {
        k_rrc_enc: kdf(kenb, ALGO_DIST_RRC_ENC, cipher.id()),
        k_rrc_int: kdf(kenb, ALGO_DIST_RRC_INT, integ.id()),
        k_up_enc: kdf(kenb, ALGO_DIST_UP_ENC, cipher.id()),
        k_up_int: kdf(kenb, ALGO_DIST_UP_INT, integ.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_follows_preference_order() {
        // UE supports EEA1+EEA2 and EIA1+EIA2
        let caps = SecurityCapabilities { eea: 0b011, eia: 0b011 };
        let eea_pref = [CipherAlgo::Eea2, CipherAlgo::Eea1, CipherAlgo::Eea0];
        let eia_pref = [IntegAlgo::Eia2, IntegAlgo::Eia1];
        let (c, i) = select_algorithms(&caps, &eea_pref, &eia_pref).unwrap();
        assert_eq!(c, CipherAlgo::Eea2);
        assert_eq!(i, IntegAlgo::Eia2);
    }

    #[test]
    fn test_eea0_always_selectable() {
        let caps = SecurityCapabilities { eea: 0, eia: 0b001 };
        let (c, _) = select_algorithms(&caps, &[CipherAlgo::Eea2, CipherAlgo::Eea0], &[IntegAlgo::Eia1]).unwrap();
        assert_eq!(c, CipherAlgo::Eea0);
    }

    #[test]
    fn test_no_integrity_match_fails() {
        let caps = SecurityCapabilities { eea: 0b111, eia: 0b100 }; // only EIA3
        let err = select_algorithms(&caps, &[CipherAlgo::Eea0], &[IntegAlgo::Eia2, IntegAlgo::Eia1]).unwrap_err();
        assert_eq!(err, RrcErr::SecurityConfigFailed);
    }

    #[test]
    fn test_eia0_never_selected() {
        let caps = SecurityCapabilities { eea: 0b111, eia: 0 };
        let err = select_algorithms(&caps, &[CipherAlgo::Eea0], &[IntegAlgo::Eia0]).unwrap_err();
        assert_eq!(err, RrcErr::SecurityConfigFailed);
    }

    #[test]
    fn test_derived_keys_differ_per_purpose() {
        let kenb = [0x42u8; 32];
        let keys = derive_keys(&kenb, CipherAlgo::Eea2, IntegAlgo::Eia2);
        assert_ne!(keys.k_rrc_enc, keys.k_rrc_int);
        assert_ne!(keys.k_rrc_enc, keys.k_up_enc);
        assert_ne!(keys.k_rrc_int, keys.k_up_int);
        // deterministic
        let again = derive_keys(&kenb, CipherAlgo::Eea2, IntegAlgo::Eia2);
        assert_eq!(keys.k_rrc_enc, again.k_rrc_enc);
    }
}
