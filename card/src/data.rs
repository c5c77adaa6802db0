//! ATR, AID and GET DATA Data Object construction.

use sequoia_openpgp::crypto::mpi;

use crate::loader::Subkey;

pub const RID: [u8; 6] = [0xd2, 0x76, 0x00, 0x01, 0x24, 0x01];

pub const DO_APPLICATION_IDENTIFIER: u32 = 0x4f;
pub const DO_LOGIN_DATA: u32 = 0x5e;
pub const DO_URL: u32 = 0x5f50;
pub const DO_HISTORICAL_BYTES: u32 = 0x5f52;
pub const DO_CARDHOLDER_RELATED_DATA: u32 = 0x65;
pub const DO_APPLICATION_RELATED_DATA: u32 = 0x6e;
pub const DO_SECURITY_SUPPORT_TEMPLATE: u32 = 0x7a;
pub const DO_EXTENDED_LENGTH_INFORMATION: u32 = 0x7f66;
pub const DO_PW_STATUS_BYTES: u32 = 0xc4;
pub const DO_KEY_INFORMATION: u32 = 0xde;
pub const DO_ALGORITHM_INFORMATION: u32 = 0xfa;

pub const DO_NAME: u32 = 0x5b;
pub const DO_LANGUAGE: u32 = 0x5f2d;
pub const DO_SEX: u32 = 0x5f35;
pub const DO_DIGITAL_SIGNATURE_COUNTER: u32 = 0x93;

pub const DO_PUB_KEY: u32 = 0x7f49;
pub const DO_RSA_MOD: u32 = 0x81;
pub const DO_RSA_EXP: u32 = 0x82;
pub const DO_EXT_PUB_KEY: u32 = 0x86;
pub const DO_CIPHER: u32 = 0xa6;

pub const DO_DISCRETIONARY_DATA_OBJECTS: u32 = 0x73;
pub const DO_EXTENDED_CAPABILITIES: u32 = 0xc0;
pub const DO_ALGORITHM_ATTRIBUTES_SIG: u32 = 0xc1;
pub const DO_ALGORITHM_ATTRIBUTES_DEC: u32 = 0xc2;
pub const DO_ALGORITHM_ATTRIBUTES_AUT: u32 = 0xc3;

pub const KEY_NOT_PRESENT: u8 = 0x00;
pub const KEY_IMPORTED: u8 = 0x02;

pub const PW1_MAX_LENGTH: u8 = 127;
pub const RC_MAX_LENGTH: u8 = 127;
pub const PW3_MAX_LENGTH: u8 = 127;

pub const RSA_KEY_SIZE: u16 = 4096;
pub const RSA_EXPONENT_SIZE: u16 = 32;
pub const IMPORT_FORMAT_STANDARD: u8 = 0x00;

/// Extended Capabilities (tag 0xC0): GET CHALLENGE and PSO:DEC/ENC with AES
/// supported, no Secure Messaging, no PIN block format 2, no MSE for Dec/Aut.
pub const EXTENDED_CAPABILITIES: [u8; 10] =
    [0x42, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00];

/// Assembles the 16-byte Application Identifier: RID || version || manufacturer || serial || RFU.
pub fn aid(serial: [u8; 4]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..6].copy_from_slice(&RID);
    out[6..8].copy_from_slice(&[0x03, 0x04]);
    out[8..10].copy_from_slice(&[0xf5, 0xec]);
    out[10..14].copy_from_slice(&serial);
    out[14..16].copy_from_slice(&[0x00, 0x00]);
    out
}

/// Historical bytes: ISO/IEC 7816-4 compact-TLV category 0 followed by a
/// card-capabilities compact-TLV object and a 3-byte status indicator.
pub fn historical_bytes() -> [u8; 9] {
    [0x00, 0x73, 0x00, 0x00, 0x00, 0x00, 0x00, 0x90, 0x00]
}

/// Answer To Reset: a fixed TS/T0/TA/TB/TC/TD prefix, the historical bytes,
/// and a trailing XOR checksum (TCK) over every byte after TS.
pub fn atr() -> Vec<u8> {
    const PREFIX: [u8; 10] = [0x3b, 0xda, 0x11, 0xff, 0x81, 0xb1, 0xfe, 0x55, 0x1f, 0x03];
    let hist = historical_bytes();

    let mut out = Vec::with_capacity(PREFIX.len() + hist.len() + 1);
    out.extend_from_slice(&PREFIX);
    out.extend_from_slice(&hist);

    let tck = out[1..].iter().fold(0u8, |acc, b| acc ^ b);
    out.push(tck);
    out
}

/// PW Status Bytes (tag 0xC4): 7 octets summarizing PW1/PW3 policy and the
/// current error counters.
pub fn pw_status_bytes(pw1_cds_multi: u8, err_pw1: u8, err_rc: u8, err_pw3: u8) -> [u8; 7] {
    [
        pw1_cds_multi,
        (PW1_MAX_LENGTH << 1) & 0xfe,
        RC_MAX_LENGTH,
        PW3_MAX_LENGTH,
        err_pw1,
        err_rc,
        err_pw3,
    ]
}

use crate::tlv::tlv;

/// Cardholder-related data (tag 0x65) GET DATA response *value*: the nested
/// Name/Language/Sex TLVs, without an outer 0x65 wrapper (0x65 is itself a
/// constructed DO; GET DATA returns its content, not a re-wrapped copy).
pub fn cardholder_related_data(name: &str, language: &str, sex: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend(tlv(DO_NAME, name.as_bytes()));
    body.extend(tlv(DO_LANGUAGE, language.as_bytes()));
    body.extend(tlv(DO_SEX, sex.as_bytes()));
    body
}

/// Application-related data (tag 0x6E) GET DATA response value: AID,
/// historical bytes, extended length information, discretionary data objects.
#[allow(clippy::too_many_arguments)]
pub fn application_related_data(
    serial: [u8; 4],
    sig: Option<&Subkey>,
    dec: Option<&Subkey>,
    aut: Option<&Subkey>,
    pw1_cds_multi: u8,
    err_pw1: u8,
    err_rc: u8,
    err_pw3: u8,
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend(tlv(DO_APPLICATION_IDENTIFIER, &aid(serial)));
    body.extend(tlv(DO_HISTORICAL_BYTES, &historical_bytes()));
    body.extend(tlv(DO_EXTENDED_LENGTH_INFORMATION, &[0xff, 0xff, 0xff, 0xff]));
    body.extend(tlv(
        DO_DISCRETIONARY_DATA_OBJECTS,
        &discretionary_data(sig, dec, aut, pw1_cds_multi, err_pw1, err_rc, err_pw3),
    ));
    body
}

/// Algorithm Attributes (tag 0xC1/0xC2/0xC3 content, also reused verbatim
/// inside Algorithm Information): RSA modulus/exponent size, or algorithm id
/// plus curve OID and import format for ECDSA/ECDH subkeys. A missing subkey
/// reports the card's default generation parameters (4096-bit RSA).
pub fn algorithm_attributes(subkey: Option<&Subkey>) -> Vec<u8> {
    let Some(subkey) = subkey else {
        let mut v = Vec::with_capacity(6);
        v.push(0x01);
        v.extend_from_slice(&RSA_KEY_SIZE.to_be_bytes());
        v.extend_from_slice(&RSA_EXPONENT_SIZE.to_be_bytes());
        v.push(IMPORT_FORMAT_STANDARD);
        return v;
    };

    match &subkey.public {
        mpi::PublicKey::RSA { e, n } => {
            let mut v = Vec::with_capacity(6);
            v.push(0x01);
            v.extend_from_slice(&(n.value().len() as u16 * 8).to_be_bytes());
            v.extend_from_slice(&(e.value().len() as u16 * 8).to_be_bytes());
            v.push(IMPORT_FORMAT_STANDARD);
            v
        }
        mpi::PublicKey::ECDSA { curve, .. } | mpi::PublicKey::ECDH { curve, .. } => {
            let mut v = Vec::new();
            v.push(u8::from(subkey.pk_algo));
            v.extend_from_slice(curve.oid());
            v.push(IMPORT_FORMAT_STANDARD);
            v
        }
        _ => Vec::new(),
    }
}

/// Discretionary Data Objects (tag 0x73): Extended Capabilities, the three
/// Algorithm Attributes DOs, and PW Status Bytes, nested inside Application
/// Related Data.
#[allow(clippy::too_many_arguments)]
pub fn discretionary_data(
    sig: Option<&Subkey>,
    dec: Option<&Subkey>,
    aut: Option<&Subkey>,
    pw1_cds_multi: u8,
    err_pw1: u8,
    err_rc: u8,
    err_pw3: u8,
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend(tlv(DO_EXTENDED_CAPABILITIES, &EXTENDED_CAPABILITIES));
    body.extend(tlv(DO_ALGORITHM_ATTRIBUTES_SIG, &algorithm_attributes(sig)));
    body.extend(tlv(DO_ALGORITHM_ATTRIBUTES_DEC, &algorithm_attributes(dec)));
    body.extend(tlv(DO_ALGORITHM_ATTRIBUTES_AUT, &algorithm_attributes(aut)));
    body.extend(tlv(
        DO_PW_STATUS_BYTES,
        &pw_status_bytes(pw1_cds_multi, err_pw1, err_rc, err_pw3),
    ));
    body
}

/// Algorithm Information (tag 0xFA) GET DATA response value: the three
/// Algorithm Attributes DOs for the imported Sig/Dec/Aut subkeys. Since this
/// card never changes algorithm attributes, it reports exactly what was
/// imported.
pub fn algorithm_information(sig: Option<&Subkey>, dec: Option<&Subkey>, aut: Option<&Subkey>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend(tlv(DO_ALGORITHM_ATTRIBUTES_SIG, &algorithm_attributes(sig)));
    body.extend(tlv(DO_ALGORITHM_ATTRIBUTES_DEC, &algorithm_attributes(dec)));
    body.extend(tlv(DO_ALGORITHM_ATTRIBUTES_AUT, &algorithm_attributes(aut)));
    body
}

/// Extended length information (tag 0x7F66) GET DATA response value.
pub fn extended_length_information() -> Vec<u8> {
    vec![0xff, 0xff, 0xff, 0xff]
}

/// Security support template (tag 0x7A) GET DATA response value: the nested
/// digital signature counter TLV.
pub fn security_support_template(ds_counter: u32) -> Vec<u8> {
    let counter_bytes = ds_counter.to_be_bytes();
    tlv(DO_DIGITAL_SIGNATURE_COUNTER, &counter_bytes[1..])
}

/// Key information (tag 0xDE): three (role, status) pairs, role = 1/2/3 for
/// Sig/Dec/Aut, status = imported or not present.
pub fn key_information(sig_present: bool, dec_present: bool, aut_present: bool) -> [u8; 6] {
    [
        0x01, if sig_present { KEY_IMPORTED } else { KEY_NOT_PRESENT },
        0x02, if dec_present { KEY_IMPORTED } else { KEY_NOT_PRESENT },
        0x03, if aut_present { KEY_IMPORTED } else { KEY_NOT_PRESENT },
    ]
}
