use enb_core::{BitBuf, MacPduErr, Rnti};

/// The 20-bit UL grant carried in a random-access response (36.213 6.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RarUlGrant {
    pub hopping: bool,
    /// Fixed-size resource block assignment, 10 bits
    pub rb_alloc: u16,
    pub mcs: u8,
    pub tpc: u8,
    pub ul_delay: bool,
    pub cqi_request: bool,
}

impl RarUlGrant {
    fn write(&self, buf: &mut BitBuf) {
        buf.write_bits(self.hopping as u64, 1);
        buf.write_bits(self.rb_alloc as u64, 10);
        buf.write_bits(self.mcs as u64, 4);
        buf.write_bits(self.tpc as u64, 3);
        buf.write_bits(self.ul_delay as u64, 1);
        buf.write_bits(self.cqi_request as u64, 1);
    }

    fn read(buf: &mut BitBuf) -> Result<RarUlGrant, MacPduErr> {
        Ok(RarUlGrant {
            hopping: buf.read_bits(1, "hopping")? == 1,
            rb_alloc: buf.read_bits(10, "rb_alloc")? as u16,
            mcs: buf.read_bits(4, "mcs")? as u8,
            tpc: buf.read_bits(3, "tpc")? as u8,
            ul_delay: buf.read_bits(1, "ul_delay")? == 1,
            cqi_request: buf.read_bits(1, "cqi_request")? == 1,
        })
    }
}

/// One random-access response: answers one detected preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RarEntry {
    pub rapid: u8,
    /// 11-bit initial timing-advance command
    pub ta_cmd: u16,
    pub grant: RarUlGrant,
    pub temp_crnti: Rnti,
}

/// A RAR MAC PDU: E/T/RAPID subheaders followed by fixed 6-byte bodies
/// (36.321 6.1.5). Backoff subheaders are not generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarPdu {
    pub entries: Vec<RarEntry>,
}

impl RarPdu {
    pub const ENTRY_LEN: usize = 7;

    pub fn new() -> RarPdu {
        RarPdu { entries: Vec::new() }
    }

    pub fn len_bytes(&self) -> usize {
        self.entries.len() * Self::ENTRY_LEN
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        assert!(!self.entries.is_empty(), "empty RAR PDU");
        let mut buf = BitBuf::new(self.len_bytes() * 8);
        for (i, e) in self.entries.iter().enumerate() {
            let last = i == self.entries.len() - 1;
            buf.write_bits(!last as u64, 1); // E
            buf.write_bits(1, 1); // T = RAPID
            buf.write_bits(e.rapid as u64, 6);
        }
        for e in &self.entries {
            buf.write_bits(0, 1); // R
            buf.write_bits(e.ta_cmd as u64, 11);
            e.grant.write(&mut buf);
            buf.write_bits(e.temp_crnti as u64, 16);
        }
        buf.into_bytes()
    }

    pub fn parse(payload: &[u8]) -> Result<RarPdu, MacPduErr> {
        let mut buf = BitBuf::from_bytes(payload);
        let mut rapids = Vec::new();
        loop {
            let ext = buf.read_bits(1, "ext")? == 1;
            let t = buf.read_bits(1, "type")?;
            let body = buf.read_bits(6, "rapid_or_bi")? as u8;
            if t == 1 {
                rapids.push(body);
            }
            if !ext {
                break;
            }
        }
        let mut entries = Vec::with_capacity(rapids.len());
        for rapid in rapids {
            let _r = buf.read_bits(1, "r")?;
            let ta_cmd = buf.read_bits(11, "ta_cmd")? as u16;
            let grant = RarUlGrant::read(&mut buf)?;
            let temp_crnti = buf.read_bits(16, "temp_crnti")? as Rnti;
            entries.push(RarEntry { rapid, ta_cmd, grant, temp_crnti });
        }
        Ok(RarPdu { entries })
    }
}

impl Default for RarPdu {
    fn default() -> Self {
        RarPdu::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rapid: u8, crnti: Rnti) -> RarEntry {
        RarEntry {
            rapid,
            ta_cmd: 17,
            grant: RarUlGrant {
                hopping: false,
                rb_alloc: 12,
                mcs: 4,
                tpc: 3,
                ul_delay: false,
                cqi_request: false,
            },
            temp_crnti: crnti,
        }
    }

    #[test]
    fn test_single_entry_roundtrip() {
        let mut pdu = RarPdu::new();
        pdu.entries.push(entry(5, 0x46));
        let bytes = pdu.to_bytes();
        assert_eq!(bytes.len(), RarPdu::ENTRY_LEN);
        // subheader: E=0 T=1 RAPID=5
        assert_eq!(bytes[0], 0b01_000101);
        let parsed = RarPdu::parse(&bytes).unwrap();
        assert_eq!(parsed, pdu);
    }

    #[test]
    fn test_multi_entry_roundtrip() {
        let mut pdu = RarPdu::new();
        pdu.entries.push(entry(5, 0x46));
        pdu.entries.push(entry(23, 0x47));
        let bytes = pdu.to_bytes();
        assert_eq!(bytes.len(), 14);
        assert_eq!(bytes[0] >> 7, 1); // first subheader has E=1
        let parsed = RarPdu::parse(&bytes).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.entries[1].temp_crnti, 0x47);
    }
}
