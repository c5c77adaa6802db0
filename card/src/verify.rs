//! VERIFY (INS 0x20): gates Sig/Dec subkeys behind their OpenPGP passphrase.
//!
//! Unlike most smartcards, PW1 here *is* the private subkey passphrase:
//! verification status is simply "is this subkey currently decrypted".

use sequoia_openpgp::crypto::Password;

use crate::apdu::{command_completed, command_not_allowed, verify_fail, Rapdu};
use crate::card::Card;
use crate::loader::Role;

pub const PW_VERIFY: u8 = 0x00;
pub const PW_LOCK: u8 = 0xff;

/// PW1 is valid for exactly one PSO:CDS before Sig is automatically re-locked.
pub const PW1_CDS_MULTI: u8 = 0x00;

pub const PW1_CDS: u8 = 0x81;
pub const PW1: u8 = 0x82;
pub const PW3: u8 = 0x83;

pub const DEFAULT_PW1_ERROR_COUNTER: u8 = 3;

fn role_for(p2: u8) -> Option<Role> {
    match p2 {
        PW1_CDS => Some(Role::Sig),
        PW1 => Some(Role::Dec),
        _ => None,
    }
}

pub fn verify(card: &mut Card, p1: u8, p2: u8, passphrase: &[u8]) -> Rapdu {
    if p2 == PW3 {
        // PW3 (admin) is not supported: card personalization is out of scope.
        return command_not_allowed();
    }

    let role = match role_for(p2) {
        Some(r) => r,
        None => return command_not_allowed(),
    };

    let err_pw1 = card.err_pw1;

    enum Outcome {
        Unlocked,
        StillLocked(u8),
        Blocked,
        NotAttempted,
    }

    let outcome = {
        let subkey = match card.subkey_mut(role) {
            Some(s) => s,
            None => return command_not_allowed(),
        };

        match p1 {
            PW_VERIFY => {
                if passphrase.is_empty() {
                    if !subkey.is_locked() {
                        Outcome::NotAttempted
                    } else {
                        Outcome::StillLocked(err_pw1)
                    }
                } else if !subkey.is_locked() {
                    // Deliberate deviation: if already unlocked, succeed
                    // without re-verifying, so `unlock` over SSH never needs
                    // to resend a real passphrase once the card is open.
                    Outcome::NotAttempted
                } else if err_pw1 == 0 {
                    Outcome::Blocked
                } else {
                    let pw = Password::from(passphrase.to_vec());
                    match subkey.current.decrypt_in_place(subkey.pk_algo, &pw) {
                        Ok(()) => Outcome::Unlocked,
                        Err(_) => Outcome::StillLocked(err_pw1.saturating_sub(1)),
                    }
                }
            }
            PW_LOCK => {
                if !subkey.is_locked() {
                    subkey.restore();
                }
                Outcome::NotAttempted
            }
            _ => return command_not_allowed(),
        }
    };

    let rapdu = match outcome {
        Outcome::Unlocked => {
            card.err_pw1 = DEFAULT_PW1_ERROR_COUNTER;
            command_completed(Vec::new())
        }
        Outcome::StillLocked(remaining) => {
            card.err_pw1 = remaining;
            verify_fail(remaining)
        }
        Outcome::Blocked => verify_fail(0),
        Outcome::NotAttempted => command_completed(Vec::new()),
    };

    card.signal_verification_status();
    rapdu
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{Card, CardConfig};
    use keywrap::SoftwareMaster;

    const TEST_KEY: &str = include_str!("../tests/data/test-key.asc");

    fn test_card() -> Card {
        Card::new(CardConfig {
            serial: [0, 1, 2, 3],
            name: "Test".into(),
            language: "en".into(),
            sex: "9".into(),
            url: String::new(),
            login_data: String::new(),
            armored_key: TEST_KEY.as_bytes().to_vec(),
            snvs: false,
        }, Box::new(SoftwareMaster::default()))
        .unwrap()
    }

    #[test]
    fn verify_empty_reports_blocked_status() {
        let mut card = test_card();
        let r = verify(&mut card, PW_VERIFY, PW1_CDS, &[]);
        assert_eq!(r.sw1, 0x63);
        assert_eq!(r.sw2, 0xc0 | DEFAULT_PW1_ERROR_COUNTER);
    }

    #[test]
    fn wrong_passphrase_decrements_counter() {
        let mut card = test_card();
        let r = verify(&mut card, PW_VERIFY, PW1_CDS, b"wrong");
        assert_eq!(r.sw2, 0xc0 | 2);
        let r = verify(&mut card, PW_VERIFY, PW1_CDS, b"wrong");
        assert_eq!(r.sw2, 0xc0 | 1);
    }

    #[test]
    fn correct_passphrase_unlocks_and_resets_counter() {
        let mut card = test_card();
        verify(&mut card, PW_VERIFY, PW1_CDS, b"wrong");
        let r = verify(&mut card, PW_VERIFY, PW1_CDS, b"secret1");
        assert_eq!((r.sw1, r.sw2), (0x90, 0x00));
        assert_eq!(card.err_pw1, DEFAULT_PW1_ERROR_COUNTER);
        assert!(!card.subkey_mut(Role::Sig).unwrap().is_locked());
    }

    #[test]
    fn blocked_after_three_failures() {
        let mut card = test_card();
        for _ in 0..3 {
            verify(&mut card, PW_VERIFY, PW1_CDS, b"wrong");
        }
        assert_eq!(card.err_pw1, 0);
        let r = verify(&mut card, PW_VERIFY, PW1_CDS, b"secret1");
        assert_eq!((r.sw1, r.sw2), (0x63, 0xc0));
    }

    #[test]
    fn already_unlocked_accepts_any_passphrase() {
        let mut card = test_card();
        verify(&mut card, PW_VERIFY, PW1_CDS, b"secret1");
        let r = verify(&mut card, PW_VERIFY, PW1_CDS, b"whatever");
        assert_eq!((r.sw1, r.sw2), (0x90, 0x00));
    }

    #[test]
    fn lock_then_status_shows_blocked_again() {
        let mut card = test_card();
        verify(&mut card, PW_VERIFY, PW1_CDS, b"secret1");
        verify(&mut card, PW_LOCK, PW1_CDS, &[]);
        let r = verify(&mut card, PW_VERIFY, PW1_CDS, &[]);
        assert_eq!((r.sw1, r.sw2), (0x63, 0xc0 | DEFAULT_PW1_ERROR_COUNTER));
    }

    #[test]
    fn lock_already_locked_is_idempotent() {
        let mut card = test_card();
        let r = verify(&mut card, PW_LOCK, PW1_CDS, &[]);
        assert_eq!((r.sw1, r.sw2), (0x90, 0x00));
    }

    #[test]
    fn pw3_not_allowed() {
        let mut card = test_card();
        let r = verify(&mut card, PW_VERIFY, PW3, &[]);
        assert_eq!((r.sw1, r.sw2), (0x6f, 0x00));
    }
}
