//! Symmetric PSO:ENCIPHER / PSO:DECIPHER path (AES padding indicator 0x02).
//!
//! Unlike the RSA/ECDSA paths in [`crate::crypto`], this does not touch any
//! OpenPGP key material: it runs the payload through AES-256-CBC keyed by a
//! device-bound key derived from the card's RID, with an all-zero IV and no
//! padding. The fixed IV is deliberate (PSO:DEC must invert PSO:ENC without
//! exchanging one), see DESIGN.md.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use cbc::{Decryptor, Encryptor};

use crate::apdu::{command_completed, command_not_allowed, wrong_data, Rapdu};
use crate::card::Card;
use crate::data::RID;

const ZERO_IV: [u8; 16] = [0u8; 16];

pub fn encipher(card: &mut Card, data: &[u8]) -> Rapdu {
    aes_cbc(card, data, false)
}

pub fn decipher(card: &mut Card, data: &[u8]) -> Rapdu {
    aes_cbc(card, data, true)
}

fn aes_cbc(card: &mut Card, data: &[u8], decrypt: bool) -> Rapdu {
    let key = match card.master.derive_key(&RID, &ZERO_IV) {
        Ok(k) => k,
        Err(_) => return command_not_allowed(),
    };

    if !data.len().is_multiple_of(16) {
        return wrong_data();
    }

    let mut buf = data.to_vec();
    if decrypt {
        match Decryptor::<Aes256>::new((&key).into(), (&ZERO_IV).into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
        {
            Ok(pt) => command_completed(pt.to_vec()),
            Err(_) => wrong_data(),
        }
    } else {
        let len = buf.len();
        match Encryptor::<Aes256>::new((&key).into(), (&ZERO_IV).into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        {
            Ok(ct) => command_completed(ct.to_vec()),
            Err(_) => wrong_data(),
        }
    }
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
    fn round_trips_through_device_key() {
        let mut card = test_card();
        let plaintext = vec![0x42u8; 32];
        let enc = encipher(&mut card, &plaintext);
        assert_eq!((enc.sw1, enc.sw2), (0x90, 0x00));
        assert_eq!(enc.data.len(), plaintext.len());
        let dec = decipher(&mut card, &enc.data);
        assert_eq!((dec.sw1, dec.sw2), (0x90, 0x00));
        assert_eq!(dec.data, plaintext);
    }

    #[test]
    fn non_block_aligned_length_rejected() {
        let mut card = test_card();
        let r = encipher(&mut card, &[1u8; 20]);
        assert_eq!((r.sw1, r.sw2), (0x6a, 0x80));
    }

    #[test]
    fn short_plaintext_rejected() {
        let mut card = test_card();
        let r = encipher(&mut card, &[1, 2, 3]);
        assert_eq!((r.sw1, r.sw2), (0x6a, 0x80));
    }

    #[test]
    fn tampered_ciphertext_still_decrypts_block_aligned_garbage() {
        // AES-CBC with no MAC cannot detect tampering; corruption of one
        // ciphertext block only garbles the corresponding plaintext block.
        let mut card = test_card();
        let plaintext = vec![0x42u8; 32];
        let mut enc = encipher(&mut card, &plaintext);
        let last = enc.data.len() - 1;
        enc.data[last] ^= 0x01;
        let dec = decipher(&mut card, &enc.data);
        assert_eq!((dec.sw1, dec.sw2), (0x90, 0x00));
        assert_ne!(dec.data, plaintext);
    }

    #[test]
    fn same_plaintext_same_ciphertext_with_fixed_iv() {
        let mut card = test_card();
        let plaintext = vec![0x07u8; 16];
        let a = encipher(&mut card, &plaintext);
        let b = encipher(&mut card, &plaintext);
        assert_eq!(a.data, b.data);
    }
}
