//! GENERATE ASYMMETRIC KEY PAIR (INS 0x47).
//!
//! On-card key generation is out of scope (see SPEC_FULL §1 Non-goals: no
//! PW3/admin, no key personalization). P1 = 0x80 ("generate a new key pair")
//! is therefore always rejected; only P1 = 0x81 ("read the public key
//! template of an existing key") is implemented. The command data field
//! carries the Control Reference Template tag (B6/B8/A4 00) selecting Sig,
//! Dec or Aut.

use sequoia_openpgp::crypto::mpi;

use crate::apdu::{command_completed, command_not_allowed, referenced_data_not_found, wrong_data, Rapdu};
use crate::card::Card;
use crate::data::{DO_EXT_PUB_KEY, DO_PUB_KEY, DO_RSA_EXP, DO_RSA_MOD};
use crate::loader::{Role, Subkey};
use crate::tlv::tlv;

const GENERATE_NEW: u8 = 0x80;
const READ_TEMPLATE: u8 = 0x81;

const CRT_SIG: u8 = 0xb6;
const CRT_DEC: u8 = 0xb8;
const CRT_AUT: u8 = 0xa4;

fn role_for_crt(tag: u8) -> Option<Role> {
    match tag {
        CRT_SIG => Some(Role::Sig),
        CRT_DEC => Some(Role::Dec),
        CRT_AUT => Some(Role::Aut),
        _ => None,
    }
}

pub fn generate(card: &mut Card, p1: u8, _p2: u8, data: &[u8]) -> Rapdu {
    let Some(role) = role_for_crt(data.first().copied().unwrap_or(0)) else {
        return wrong_data();
    };

    match p1 {
        GENERATE_NEW => command_not_allowed(),
        READ_TEMPLATE => {
            let Some(subkey) = card.subkey_mut(role) else {
                return referenced_data_not_found();
            };
            match public_key_template(subkey) {
                Some(body) => command_completed(body),
                None => command_not_allowed(),
            }
        }
        _ => wrong_data(),
    }
}

/// Builds the DO_PUB_KEY (0x7F49) public key template: RSA modulus+exponent,
/// or an EC point for ECDSA/ECDH keys.
fn public_key_template(subkey: &Subkey) -> Option<Vec<u8>> {
    let inner = match &subkey.public {
        mpi::PublicKey::RSA { e, n } => {
            let mut body = Vec::new();
            body.extend(tlv(DO_RSA_MOD, n.value()));
            body.extend(tlv(DO_RSA_EXP, e.value()));
            body
        }
        mpi::PublicKey::ECDSA { q, .. } | mpi::PublicKey::ECDH { q, .. } => tlv(DO_EXT_PUB_KEY, q.value()),
        _ => return None,
    };
    Some(tlv(DO_PUB_KEY, &inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardConfig;
    use keywrap::SoftwareMaster;

    const TEST_KEY: &str = include_str!("../tests/data/test-key.asc");

    fn test_card() -> Card {
        Card::new(
            CardConfig {
                serial: [0, 1, 2, 3],
                name: "Test".into(),
                language: "en".into(),
                sex: "9".into(),
                url: String::new(),
                login_data: String::new(),
                armored_key: TEST_KEY.as_bytes().to_vec(),
                snvs: false,
            },
            Box::new(SoftwareMaster::default()),
        )
        .unwrap()
    }

    #[test]
    fn reads_rsa_template_for_sig() {
        let mut card = test_card();
        let r = generate(&mut card, READ_TEMPLATE, 0x00, &[0xb6, 0x00]);
        assert_eq!((r.sw1, r.sw2), (0x90, 0x00));
        assert_eq!(r.data[0], 0x7f);
        assert_eq!(r.data[1], 0x49);
    }

    #[test]
    fn generate_new_key_pair_not_allowed() {
        let mut card = test_card();
        let r = generate(&mut card, GENERATE_NEW, 0x00, &[0xb6, 0x00]);
        assert_eq!((r.sw1, r.sw2), (0x6f, 0x00));
    }

    #[test]
    fn unknown_crt_rejected() {
        let mut card = test_card();
        let r = generate(&mut card, READ_TEMPLATE, 0x00, &[0xaa, 0x00]);
        assert_eq!((r.sw1, r.sw2), (0x6a, 0x80));
    }
}
