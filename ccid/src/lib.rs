//! USB CCID bulk message framing: decodes PC_to_RDR messages, dispatches to
//! the card (or answers directly for status/parameter queries), and encodes
//! the RDR_to_PC reply.

pub mod card_icc;
pub mod message;

use thiserror::Error;

use message::*;

#[derive(Debug, Error)]
pub enum CcidError {
    #[error("CCID message too short")]
    Truncated,
    #[error("unsupported CCID message type: {0:#x}")]
    Unsupported(u8),
}

/// The reader's view of the smartcard: an ATR, a wake signal, and a raw APDU
/// exchange. `Card::command` lives one layer below this trait; a concrete
/// implementor owns the `Card` (and, in the firmware binary, the CPU
/// frequency scope guard that `wake` drives).
pub trait Icc {
    fn atr(&self) -> Vec<u8>;
    /// Called for every inbound message except GET_SLOT_STATUS.
    fn wake(&mut self);
    /// Runs one raw CAPDU through the card and returns the raw RAPDU bytes
    /// (body followed by SW1 SW2).
    fn raw_command(&mut self, capdu: &[u8]) -> Vec<u8>;
}

/// Decodes one inbound CCID message and returns the encoded reply.
pub fn rx(icc: &mut dyn Icc, buf: &[u8]) -> Result<Vec<u8>, CcidError> {
    let header = Header::parse(buf).ok_or(CcidError::Truncated)?;

    if header.message_type != GET_SLOT_STATUS {
        icc.wake();
    }

    match header.message_type {
        ICC_POWER_ON => Ok(data_block(header.slot, header.seq, 0, 0, 0, &icc.atr())),
        ICC_POWER_OFF => Ok(slot_status(header.slot, header.seq, ICC_PRESENT_AND_ACTIVE, 0, 0)),
        GET_SLOT_STATUS => Ok(slot_status(header.slot, header.seq, ICC_PRESENT_AND_ACTIVE, 0, 0)),
        XFR_BLOCK => {
            let level = xfr_level_parameter(buf);
            if level != 0 {
                return Ok(data_block(header.slot, header.seq, FAILED, BAD_LEVEL_PARAMETER, 0, &[]));
            }
            let capdu = abdata(buf, header.length);
            let rapdu = icc.raw_command(capdu);
            Ok(data_block(header.slot, header.seq, 0, 0, 0, &rapdu))
        }
        GET_PARAMETERS | RESET_PARAMETERS | SET_PARAMETERS => {
            // Indicate use of T=1; no real parameter negotiation is modeled.
            Ok(parameters(header.slot, header.seq, ICC_PRESENT_AND_ACTIVE, 0, 0x01))
        }
        other => Err(CcidError::Unsupported(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockIcc {
        wakes: u32,
        atr: Vec<u8>,
        last_capdu: Vec<u8>,
    }

    impl Icc for MockIcc {
        fn atr(&self) -> Vec<u8> {
            self.atr.clone()
        }
        fn wake(&mut self) {
            self.wakes += 1;
        }
        fn raw_command(&mut self, capdu: &[u8]) -> Vec<u8> {
            self.last_capdu = capdu.to_vec();
            vec![0x90, 0x00]
        }
    }

    fn mock() -> MockIcc {
        MockIcc { wakes: 0, atr: vec![0x3b, 0xda, 0x11], last_capdu: Vec::new() }
    }

    fn header(message_type: u8, slot: u8, seq: u8, length: u32, extra: [u8; 3]) -> Vec<u8> {
        let mut buf = vec![message_type];
        buf.extend_from_slice(&length.to_le_bytes());
        buf.push(slot);
        buf.push(seq);
        buf.extend_from_slice(&extra);
        buf
    }

    #[test]
    fn power_on_returns_atr_and_wakes() {
        let mut icc = mock();
        let msg = header(ICC_POWER_ON, 0x00, 0x01, 0, [0, 0, 0]);
        let reply = rx(&mut icc, &msg).unwrap();
        assert_eq!(reply[0], DATA_BLOCK);
        assert_eq!(&reply[13..], icc.atr.as_slice());
        assert_eq!(icc.wakes, 1);
    }

    #[test]
    fn get_slot_status_does_not_wake() {
        let mut icc = mock();
        let msg = header(GET_SLOT_STATUS, 0x00, 0x02, 0, [0, 0, 0]);
        let reply = rx(&mut icc, &msg).unwrap();
        assert_eq!(reply[0], SLOT_STATUS);
        assert_eq!(icc.wakes, 0);
    }

    #[test]
    fn xfr_block_passes_apdu_through_and_wraps_reply() {
        let mut icc = mock();
        let mut msg = header(XFR_BLOCK, 0x00, 0x03, 4, [0, 0, 0]);
        msg.extend_from_slice(&[0x00, 0xa4, 0x04, 0x00]);
        let reply = rx(&mut icc, &msg).unwrap();
        assert_eq!(reply[0], DATA_BLOCK);
        assert_eq!(&reply[13..], &[0x90, 0x00]);
        assert_eq!(icc.last_capdu, vec![0x00, 0xa4, 0x04, 0x00]);
        assert_eq!(icc.wakes, 1);
    }

    #[test]
    fn xfr_block_with_nonzero_level_parameter_fails() {
        let mut icc = mock();
        let msg = header(XFR_BLOCK, 0x00, 0x04, 0, [0, 0x01, 0x00]);
        let reply = rx(&mut icc, &msg).unwrap();
        assert_eq!(reply[0], DATA_BLOCK);
        assert_eq!(reply[10], FAILED);
        assert_eq!(reply[11], BAD_LEVEL_PARAMETER);
    }

    #[test]
    fn get_parameters_reports_t1() {
        let mut icc = mock();
        let msg = header(GET_PARAMETERS, 0x00, 0x05, 0, [0, 0, 0]);
        let reply = rx(&mut icc, &msg).unwrap();
        assert_eq!(reply[0], PARAMETERS);
        assert_eq!(reply[12], 0x01);
    }

    #[test]
    fn unsupported_message_type_rejected() {
        let mut icc = mock();
        let msg = header(0xff, 0x00, 0x00, 0, [0, 0, 0]);
        assert!(matches!(rx(&mut icc, &msg), Err(CcidError::Unsupported(0xff))));
    }

    #[test]
    fn truncated_message_rejected() {
        let mut icc = mock();
        assert!(matches!(rx(&mut icc, &[0x62, 0x00]), Err(CcidError::Truncated)));
    }
}
