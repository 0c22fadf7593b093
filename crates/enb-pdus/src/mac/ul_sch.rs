use enb_core::{BitBuf, MacPduErr};

use super::bsr::bsr_idx_to_bytes;
use super::lcid::UlSchLcid;

/// One element of a parsed UL-SCH transport block, in PDU order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UlSchElem {
    Sdu { lcid: u8, data: Vec<u8> },
    /// Short or truncated BSR: one logical-channel group
    ShortBsr { lcg: u8, bytes: u32, truncated: bool },
    /// Long BSR: all four groups
    LongBsr { bytes: [u32; 4] },
    /// Power headroom, dB
    Phr { ph_db: i32 },
    /// The user announces an existing C-RNTI (contention resolution)
    Crnti { rnti: u16 },
    Padding,
}

/// A parsed UL-SCH MAC PDU (36.321 6.1.2)
#[derive(Debug)]
pub struct UlSchPdu {
    pub elems: Vec<UlSchElem>,
}

struct Subheader {
    lcid: UlSchLcid,
    /// Explicit L field; `None` means "takes the remainder"
    len: Option<usize>,
}

impl UlSchPdu {
    pub fn parse(payload: &[u8]) -> Result<UlSchPdu, MacPduErr> {
        let mut buf = BitBuf::from_bytes(payload);
        let mut subheaders = Vec::new();

        // Subheader chain ends at the first E=0
        loop {
            let _r = buf.read_bits(2, "reserved")?;
            let ext = buf.read_bits(1, "ext")? == 1;
            let raw_lcid = buf.read_bits(5, "lcid")? as u8;
            let lcid = UlSchLcid::from_raw(raw_lcid)?;

            let len = match lcid.fixed_len() {
                Some(fixed) => Some(fixed),
                None => {
                    if ext {
                        let f = buf.read_bits(1, "f")?;
                        let l = if f == 0 { buf.read_bits(7, "l")? } else { buf.read_bits(15, "l")? };
                        Some(l as usize)
                    } else {
                        // final SDU subheader: implicit length
                        None
                    }
                }
            };
            subheaders.push(Subheader { lcid, len });
            if !ext {
                break;
            }
        }

        // Payload region starts byte-aligned right after the subheaders
        let header_bytes = (buf.pos() + 7) / 8;
        let mut offset = header_bytes;
        let explicit: usize = subheaders.iter().filter_map(|s| s.len).sum();
        if header_bytes + explicit > payload.len() {
            return Err(MacPduErr::LengthMismatch {
                expected: header_bytes + explicit,
                found: payload.len(),
            });
        }

        let mut elems = Vec::with_capacity(subheaders.len());
        for (i, sh) in subheaders.iter().enumerate() {
            let len = match sh.len {
                Some(l) => l,
                None => {
                    // remainder, minus explicit lengths of what follows
                    let after: usize = subheaders[i + 1..].iter().filter_map(|s| s.len).sum();
                    payload.len() - offset - after
                }
            };
            let body = &payload[offset..offset + len];
            offset += len;
            elems.push(decode_elem(sh.lcid, body)?);
        }

        Ok(UlSchPdu { elems })
    }

    /// SDUs in PDU order
    pub fn sdus(&self) -> impl Iterator<Item = (&u8, &Vec<u8>)> {
        self.elems.iter().filter_map(|e| match e {
            UlSchElem::Sdu { lcid, data } => Some((lcid, data)),
            _ => None,
        })
    }

    pub fn has_bsr(&self) -> bool {
        self.elems
            .iter()
            .any(|e| matches!(e, UlSchElem::ShortBsr { .. } | UlSchElem::LongBsr { .. }))
    }
}

fn decode_elem(lcid: UlSchLcid, body: &[u8]) -> Result<UlSchElem, MacPduErr> {
    let ce_err = |lcid: UlSchLcid, body: &[u8]| MacPduErr::InvalidCeSize {
        lcid: lcid.into_raw(),
        size: body.len(),
    };
    match lcid {
        UlSchLcid::Sdu(l) => Ok(UlSchElem::Sdu { lcid: l, data: body.to_vec() }),
        UlSchLcid::Padding => Ok(UlSchElem::Padding),
        UlSchLcid::Phr => {
            if body.len() != 1 {
                return Err(ce_err(lcid, body));
            }
            // 6-bit index, [-23, 40] dB
            Ok(UlSchElem::Phr { ph_db: (body[0] & 0x3f) as i32 - 23 })
        }
        UlSchLcid::Crnti => {
            if body.len() != 2 {
                return Err(ce_err(lcid, body));
            }
            Ok(UlSchElem::Crnti { rnti: u16::from_be_bytes([body[0], body[1]]) })
        }
        UlSchLcid::ShortBsr | UlSchLcid::TruncBsr => {
            if body.len() != 1 {
                return Err(ce_err(lcid, body));
            }
            let lcg = body[0] >> 6;
            let idx = body[0] & 0x3f;
            Ok(UlSchElem::ShortBsr {
                lcg,
                bytes: bsr_idx_to_bytes(idx),
                truncated: lcid == UlSchLcid::TruncBsr,
            })
        }
        UlSchLcid::LongBsr => {
            if body.len() != 3 {
                return Err(ce_err(lcid, body));
            }
            // four 6-bit indices packed into 24 bits
            let raw = ((body[0] as u32) << 16) | ((body[1] as u32) << 8) | body[2] as u32;
            let mut bytes = [0u32; 4];
            for (i, b) in bytes.iter_mut().enumerate() {
                let idx = ((raw >> (18 - 6 * i)) & 0x3f) as u8;
                *b = bsr_idx_to_bytes(idx);
            }
            Ok(UlSchElem::LongBsr { bytes })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::bsr::bytes_to_bsr_idx;

    #[test]
    fn test_single_sdu_implicit_length() {
        // One subheader, E=0, lcid=3; remainder is the SDU
        let pdu = UlSchPdu::parse(&[0x03, 0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(pdu.elems, vec![UlSchElem::Sdu { lcid: 3, data: vec![0xde, 0xad, 0xbe, 0xef] }]);
        assert!(!pdu.has_bsr());
    }

    #[test]
    fn test_short_bsr_and_sdu() {
        // subh1: E=1 ShortBSR (0x3d), subh2: E=0 lcid=3
        // BSR body: lcg=2, idx for ~100 bytes
        let idx = bytes_to_bsr_idx(100);
        let bsr_body = (2u8 << 6) | idx;
        let pdu = UlSchPdu::parse(&[0x3d, 0x03, bsr_body, 0x01, 0x02]).unwrap();
        assert_eq!(pdu.elems.len(), 2);
        match &pdu.elems[0] {
            UlSchElem::ShortBsr { lcg, bytes, truncated } => {
                assert_eq!(*lcg, 2);
                assert!(*bytes >= 100);
                assert!(!truncated);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(pdu.elems[1], UlSchElem::Sdu { lcid: 3, data: vec![0x01, 0x02] });
        assert!(pdu.has_bsr());
    }

    #[test]
    fn test_long_bsr() {
        // E=0 LongBSR only: 0x1e + 3 bytes of packed indices
        let raw: u32 = (1 << 18) | (5 << 12) | (10 << 6) | 63;
        let body = [(raw >> 16) as u8, (raw >> 8) as u8, raw as u8];
        let pdu = UlSchPdu::parse(&[0x1e, body[0], body[1], body[2]]).unwrap();
        match &pdu.elems[0] {
            UlSchElem::LongBsr { bytes } => {
                assert_eq!(bytes[0], bsr_idx_to_bytes(1));
                assert_eq!(bytes[1], bsr_idx_to_bytes(5));
                assert_eq!(bytes[2], bsr_idx_to_bytes(10));
                assert!(bytes[3] > 150_000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_crnti_and_phr() {
        // E=1 CRNTI (0x3b), E=0 PHR (0x1a); bodies: rnti 0x4601, phr idx 30
        let pdu = UlSchPdu::parse(&[0x3b, 0x1a, 0x46, 0x01, 30]).unwrap();
        assert_eq!(pdu.elems[0], UlSchElem::Crnti { rnti: 0x4601 });
        assert_eq!(pdu.elems[1], UlSchElem::Phr { ph_db: 7 });
    }

    #[test]
    fn test_truncated_pdu_rejected() {
        // Subheader promises 4 bytes, only 2 present
        let err = UlSchPdu::parse(&[0x23, 0x04, 0xaa, 0xbb]).unwrap_err();
        assert!(matches!(err, MacPduErr::LengthMismatch { .. } | MacPduErr::BufferEnded { .. }));
    }

    #[test]
    fn test_unknown_lcid_rejected() {
        // lcid 0b10101 = 21 is reserved
        let err = UlSchPdu::parse(&[0x15, 0x00]).unwrap_err();
        assert_eq!(err, MacPduErr::InvalidLcid { lcid: 21 });
    }
}
