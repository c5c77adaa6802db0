//! ISO/IEC 7816-4 command/response APDU types and the status-word taxonomy.

/// A parsed command APDU (short form: no chaining, no secure messaging).
#[derive(Debug, Clone)]
pub struct Capdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    pub le: usize,
}

impl Capdu {
    /// Parses a raw CAPDU buffer. Supports the simple case: header, optional
    /// Lc + data, optional Le. No extended-length encoding.
    pub fn parse(buf: &[u8]) -> Option<Capdu> {
        if buf.len() < 4 {
            return None;
        }
        let cla = buf[0];
        let ins = buf[1];
        let p1 = buf[2];
        let p2 = buf[3];

        if buf.len() == 4 {
            return Some(Capdu { cla, ins, p1, p2, data: Vec::new(), le: 0 });
        }

        let lc = buf[4] as usize;
        if buf.len() == 5 {
            // Case 2: Le only, no data.
            return Some(Capdu { cla, ins, p1, p2, data: Vec::new(), le: if lc == 0 { 256 } else { lc } });
        }

        if buf.len() < 5 + lc {
            return None;
        }
        let data = buf[5..5 + lc].to_vec();
        let le = if buf.len() > 5 + lc {
            let l = buf[5 + lc] as usize;
            if l == 0 { 256 } else { l }
        } else {
            0
        };

        Some(Capdu { cla, ins, p1, p2, data, le })
    }
}

/// A response APDU: status word plus optional body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rapdu {
    pub sw1: u8,
    pub sw2: u8,
    pub data: Vec<u8>,
}

impl Rapdu {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        out.push(self.sw1);
        out.push(self.sw2);
        out
    }
}

pub fn command_completed(data: Vec<u8>) -> Rapdu {
    Rapdu { sw1: 0x90, sw2: 0x00, data }
}

pub fn command_not_allowed() -> Rapdu {
    Rapdu { sw1: 0x6f, sw2: 0x00, data: Vec::new() }
}

pub fn file_not_found() -> Rapdu {
    Rapdu { sw1: 0x6a, sw2: 0x82, data: Vec::new() }
}

pub fn card_key_not_supported() -> Rapdu {
    Rapdu { sw1: 0x63, sw2: 0x82, data: Vec::new() }
}

pub fn wrong_data() -> Rapdu {
    Rapdu { sw1: 0x6a, sw2: 0x80, data: Vec::new() }
}

pub fn referenced_data_not_found() -> Rapdu {
    Rapdu { sw1: 0x6a, sw2: 0x88, data: Vec::new() }
}

pub fn security_condition_not_satisfied() -> Rapdu {
    Rapdu { sw1: 0x69, sw2: 0x82, data: Vec::new() }
}

pub fn unrecoverable_error() -> Rapdu {
    Rapdu { sw1: 0x91, sw2: 0xa1, data: Vec::new() }
}

/// `retries` is the number of verification attempts remaining (0-15).
pub fn verify_fail(retries: u8) -> Rapdu {
    Rapdu { sw1: 0x63, sw2: 0xc0 | (retries & 0x0f), data: Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_only() {
        let c = Capdu::parse(&[0x00, 0xa4, 0x04, 0x00]).unwrap();
        assert_eq!((c.cla, c.ins, c.p1, c.p2), (0x00, 0xa4, 0x04, 0x00));
        assert!(c.data.is_empty());
    }

    #[test]
    fn parses_data_and_le() {
        let c = Capdu::parse(&[0x00, 0x20, 0x00, 0x81, 0x06, b's', b'e', b'c', b'r', b'e', b't']).unwrap();
        assert_eq!(c.data, b"secret");
    }

    #[test]
    fn verify_fail_encodes_retries() {
        let r = verify_fail(3);
        assert_eq!(r.to_bytes(), vec![0x63, 0xc3]);
    }

    #[test]
    fn command_completed_appends_body() {
        let r = command_completed(vec![1, 2, 3]);
        assert_eq!(r.to_bytes(), vec![1, 2, 3, 0x90, 0x00]);
    }
}
