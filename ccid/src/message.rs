//! CCID Rev1.1 message type constants and header (de)serialization.
//!
//! Every message, inbound or outbound, begins with a fixed 10-byte header:
//! `MessageType(1) Length(4, little-endian) Slot(1) Seq(1)` followed by three
//! message-specific bytes. `Length` counts the abData bytes that follow the
//! header on inbound XFR_BLOCK, and the reply payload bytes on outbound
//! DataBlock.

pub const ICC_POWER_ON: u8 = 0x62;
pub const ICC_POWER_OFF: u8 = 0x63;
pub const GET_SLOT_STATUS: u8 = 0x65;
pub const XFR_BLOCK: u8 = 0x6f;
pub const GET_PARAMETERS: u8 = 0x6c;
pub const RESET_PARAMETERS: u8 = 0x6d;
pub const SET_PARAMETERS: u8 = 0x61;

pub const DATA_BLOCK: u8 = 0x80;
pub const SLOT_STATUS: u8 = 0x81;
pub const PARAMETERS: u8 = 0x82;

pub const ICC_PRESENT_AND_ACTIVE: u8 = 0;
pub const FAILED: u8 = 1 << 6;
pub const BAD_LEVEL_PARAMETER: u8 = 8;

pub const HEADER_LEN: usize = 10;

/// The fixed 10-byte prefix common to every inbound message.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub message_type: u8,
    pub length: u32,
    pub slot: u8,
    pub seq: u8,
}

impl Header {
    pub fn parse(buf: &[u8]) -> Option<Header> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        Some(Header {
            message_type: buf[0],
            length: u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
            slot: buf[5],
            seq: buf[6],
        })
    }
}

/// The level parameter of an XFR_BLOCK header (bytes 7..10): BWI(1) + LevelParameter(2, LE).
pub fn xfr_level_parameter(buf: &[u8]) -> u16 {
    if buf.len() < HEADER_LEN {
        return 0;
    }
    u16::from_le_bytes([buf[8], buf[9]])
}

/// Extracts the abData tail: `length` bytes after the 10-byte header.
pub fn abdata(buf: &[u8], length: u32) -> &[u8] {
    let length = length as usize;
    if buf.len() < HEADER_LEN {
        return &[];
    }
    let body = &buf[HEADER_LEN..];
    &body[..length.min(body.len())]
}

fn header_bytes(message_type: u8, length: u32, slot: u8, seq: u8) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[0] = message_type;
    out[1..5].copy_from_slice(&length.to_le_bytes());
    out[5] = slot;
    out[6] = seq;
    out
}

/// RDR_to_PC_DataBlock (p49, 6.2.1): header plus `Status Error ChainParameter`, then `payload`.
pub fn data_block(slot: u8, seq: u8, status: u8, error: u8, chain_parameter: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = header_bytes(DATA_BLOCK, payload.len() as u32, slot, seq).to_vec();
    out.push(status);
    out.push(error);
    out.push(chain_parameter);
    out.extend_from_slice(payload);
    out
}

/// RDR_to_PC_SlotStatus (p50, 6.2.2): header plus `Status Error ClockStatus`, no payload.
pub fn slot_status(slot: u8, seq: u8, status: u8, error: u8, clock_status: u8) -> Vec<u8> {
    let mut out = header_bytes(SLOT_STATUS, 0, slot, seq).to_vec();
    out.push(status);
    out.push(error);
    out.push(clock_status);
    out
}

/// RDR_to_PC_Parameters (p51, 6.2.3): header plus `Status Error ProtocolNum`, no payload.
pub fn parameters(slot: u8, seq: u8, status: u8, error: u8, protocol_num: u8) -> Vec<u8> {
    let mut out = header_bytes(PARAMETERS, 0, slot, seq).to_vec();
    out.push(status);
    out.push(error);
    out.push(protocol_num);
    out
}
