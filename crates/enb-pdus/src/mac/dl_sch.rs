use enb_core::{BitBuf, MacPduErr};

use super::lcid::DlSchLcid;

#[derive(Debug)]
enum DlElem {
    TaCmd(u8),
    ConRes([u8; 6]),
    ScellAct(u8),
    Sdu { lcid: u8, data: Vec<u8> },
}

impl DlElem {
    fn lcid(&self) -> DlSchLcid {
        match self {
            DlElem::TaCmd(_) => DlSchLcid::TaCmd,
            DlElem::ConRes(_) => DlSchLcid::ConResId,
            DlElem::ScellAct(_) => DlSchLcid::ScellActivation,
            DlElem::Sdu { lcid, .. } => DlSchLcid::Sdu(*lcid),
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            DlElem::TaCmd(_) | DlElem::ScellAct(_) => 1,
            DlElem::ConRes(_) => 6,
            DlElem::Sdu { data, .. } => data.len(),
        }
    }

    /// Subheader bytes, length field included for SDUs
    fn header_len(&self) -> usize {
        match self {
            DlElem::Sdu { data, .. } => {
                if data.len() < 128 {
                    2
                } else {
                    3
                }
            }
            _ => 1,
        }
    }
}

/// Builds one DL-SCH transport block: subheaders first, control elements
/// before SDUs, padded to exactly the grant size (36.321 6.1.2).
///
/// Space checks are pessimistic by the one or two bytes of the final
/// subheader's length field, which the finished layout may omit.
pub struct DlSchBuilder {
    grant_size: usize,
    elems: Vec<DlElem>,
}

impl DlSchBuilder {
    pub fn new(grant_size: usize) -> DlSchBuilder {
        DlSchBuilder { grant_size, elems: Vec::new() }
    }

    pub fn grant_size(&self) -> usize {
        self.grant_size
    }

    fn used(&self) -> usize {
        self.elems.iter().map(|e| e.header_len() + e.payload_len()).sum()
    }

    pub fn space_remaining(&self) -> usize {
        self.grant_size.saturating_sub(self.used())
    }

    /// Payload bytes available to one more SDU subheader
    pub fn sdu_space(&self) -> usize {
        self.space_remaining().saturating_sub(3)
    }

    fn add_checked(&mut self, elem: DlElem) -> Result<(), MacPduErr> {
        let needed = elem.header_len() + elem.payload_len();
        let available = self.space_remaining();
        if needed > available {
            return Err(MacPduErr::NoSpace { needed, available });
        }
        // Control elements must precede SDUs in the PDU
        let pos = if matches!(elem, DlElem::Sdu { .. }) {
            self.elems.len()
        } else {
            self.elems.iter().position(|e| matches!(e, DlElem::Sdu { .. })).unwrap_or(self.elems.len())
        };
        self.elems.insert(pos, elem);
        Ok(())
    }

    pub fn add_ta_ce(&mut self, ta_cmd: u8) -> Result<(), MacPduErr> {
        self.add_checked(DlElem::TaCmd(ta_cmd & 0x3f))
    }

    pub fn add_conres_ce(&mut self, id: [u8; 6]) -> Result<(), MacPduErr> {
        self.add_checked(DlElem::ConRes(id))
    }

    pub fn add_scell_ce(&mut self, mask: u8) -> Result<(), MacPduErr> {
        self.add_checked(DlElem::ScellAct(mask))
    }

    pub fn add_sdu(&mut self, lcid: u8, data: Vec<u8>) -> Result<usize, MacPduErr> {
        if lcid > 10 {
            return Err(MacPduErr::InvalidLcid { lcid });
        }
        let len = data.len();
        self.add_checked(DlElem::Sdu { lcid, data })?;
        Ok(len)
    }

    /// Lay out the finished transport block, exactly `grant_size` bytes.
    pub fn finish(self) -> Vec<u8> {
        let used = self.used();
        assert!(used <= self.grant_size, "builder overran grant: {} > {}", used, self.grant_size);
        let rem = self.grant_size - used;

        // The final subheader never carries a length field. Small gaps close
        // with one or two padding subheaders at the beginning; anything
        // larger takes a trailing padding subheader that absorbs the rest
        // (and keeps every SDU's length field, since none is final then).
        let final_l_bytes = match self.elems.last() {
            Some(e @ DlElem::Sdu { .. }) => e.header_len() - 1,
            _ => 0,
        };
        let (leading_pad, trailing_pad) = if rem == 0 {
            (final_l_bytes, None)
        } else if rem + final_l_bytes <= 2 {
            (rem + final_l_bytes, None)
        } else {
            (0, Some(rem - 1))
        };

        let mut buf = BitBuf::new(self.grant_size * 8);
        let n_elems = self.elems.len();
        let has_trailing = trailing_pad.is_some();

        for i in 0..leading_pad {
            // Leading padding subheader; only ever final when the PDU is pure padding
            let is_last = n_elems == 0 && !has_trailing && i == leading_pad - 1;
            write_subheader(&mut buf, DlSchLcid::Padding, !is_last, None);
        }
        for (i, elem) in self.elems.iter().enumerate() {
            let is_final = i == n_elems - 1 && !has_trailing;
            let l_field = match elem {
                DlElem::Sdu { data, .. } if !is_final => Some(data.len()),
                _ => None,
            };
            write_subheader(&mut buf, elem.lcid(), !is_final, l_field);
        }
        if has_trailing {
            write_subheader(&mut buf, DlSchLcid::Padding, false, None);
        }

        for elem in &self.elems {
            match elem {
                DlElem::TaCmd(ta) => buf.write_bytes(&[*ta]),
                DlElem::ScellAct(mask) => buf.write_bytes(&[*mask]),
                DlElem::ConRes(id) => buf.write_bytes(id),
                DlElem::Sdu { data, .. } => buf.write_bytes(data),
            }
        }
        if let Some(pad) = trailing_pad {
            buf.write_bytes(&vec![0u8; pad]);
        }

        assert_eq!(buf.pos(), self.grant_size * 8, "PDU layout must fill the grant exactly");
        buf.into_bytes()
    }
}

fn write_subheader(buf: &mut BitBuf, lcid: DlSchLcid, ext: bool, l_field: Option<usize>) {
    buf.write_bits(0, 2); // R R
    buf.write_bits(ext as u64, 1);
    buf.write_bits(lcid.into_raw() as u64, 5);
    if let Some(len) = l_field {
        if len < 128 {
            buf.write_bits(0, 1); // F = 7-bit length
            buf.write_bits(len as u64, 7);
        } else {
            buf.write_bits(1, 1);
            buf.write_bits(len as u64, 15);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ce_sdu_trailing_padding_layout() {
        let mut builder = DlSchBuilder::new(16);
        builder.add_sdu(1, vec![0xaa; 5]).unwrap();
        // Added after the SDU but must still be emitted first
        builder.add_ta_ce(5).unwrap();
        let pdu = builder.finish();
        assert_eq!(pdu.len(), 16);
        assert_eq!(
            pdu,
            vec![
                0x3d, // TA subheader, E=1
                0x21, 0x05, // SDU lcid=1, E=1, L=5
                0x1f, // padding subheader, E=0, last
                0x05, // TA command
                0xaa, 0xaa, 0xaa, 0xaa, 0xaa, // SDU
                0, 0, 0, 0, 0, 0, // padding
            ]
        );
    }

    #[test]
    fn test_exact_fit_drops_length_field() {
        // grant 8: subheader(1) + L(1) + 6 payload bytes fits exactly with L;
        // the layout drops L and absorbs the byte with a leading pad subheader
        let mut builder = DlSchBuilder::new(8);
        builder.add_sdu(2, vec![0x11; 6]).unwrap();
        let pdu = builder.finish();
        assert_eq!(pdu.len(), 8);
        assert_eq!(pdu[0], 0x3f); // leading padding, E=1
        assert_eq!(pdu[1], 0x02); // SDU lcid=2, E=0, no L
        assert_eq!(&pdu[2..], &[0x11; 6]);
    }

    #[test]
    fn test_conres_only() {
        let mut builder = DlSchBuilder::new(10);
        builder.add_conres_ce([1, 2, 3, 4, 5, 6]).unwrap();
        let pdu = builder.finish();
        assert_eq!(pdu.len(), 10);
        // conres subheader E=1, padding subheader last, 6-byte identity, 2 pad
        assert_eq!(pdu[0], 0x3c);
        assert_eq!(pdu[1], 0x1f);
        assert_eq!(&pdu[2..8], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_no_space_is_reported() {
        let mut builder = DlSchBuilder::new(4);
        let err = builder.add_conres_ce([0; 6]).unwrap_err();
        assert_eq!(err, MacPduErr::NoSpace { needed: 7, available: 4 });
        // the builder stays usable
        builder.add_ta_ce(0).unwrap();
        assert_eq!(builder.finish().len(), 4);
    }

    #[test]
    fn test_pure_padding_pdu() {
        let pdu = DlSchBuilder::new(3).finish();
        assert_eq!(pdu, vec![0x1f, 0, 0]);
        let pdu = DlSchBuilder::new(1).finish();
        assert_eq!(pdu, vec![0x1f]);
        let pdu = DlSchBuilder::new(2).finish();
        assert_eq!(pdu, vec![0x3f, 0x1f]);
    }
}
