//! The Card: holds the loaded identity and PW/session state, and dispatches
//! incoming command APDUs to the handler for each instruction.

use rand_core::OsRng;

use crate::apdu::{
    command_completed, command_not_allowed, file_not_found, referenced_data_not_found, wrong_data, Capdu, Rapdu,
};
use crate::crypto;
use crate::data;
use crate::errors::CardError;
use crate::generate;
use crate::loader::{self, Identity, Role};
use crate::verify::{self, DEFAULT_PW1_ERROR_COUNTER, PW1_CDS_MULTI};

const DEFAULT_RC_ERROR_COUNTER: u8 = 3;
const DEFAULT_PW3_ERROR_COUNTER: u8 = 3;

/// Everything needed to bring up one [`Card`]: the bundled, passphrase
/// protected OpenPGP identity plus the card's non-secret personalization
/// fields (loaded from TOML at firmware start, see SPEC_FULL §10.4).
#[derive(Clone, serde::Deserialize)]
pub struct CardConfig {
    pub serial: [u8; 4],
    pub name: String,
    pub language: String,
    pub sex: String,
    pub url: String,
    pub login_data: String,
    #[serde(with = "serde_bytes_as_string")]
    pub armored_key: Vec<u8>,
    /// Whether the device-bound master key is backed by real hardware
    /// (SNVS) rather than [`keywrap::SoftwareMaster`]. Informational only:
    /// the concrete `Master` is always supplied separately to `Card::new`.
    pub snvs: bool,
}

mod serde_bytes_as_string {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        Ok(String::deserialize(d)?.into_bytes())
    }
}

pub struct Card {
    pub(crate) serial: [u8; 4],
    pub(crate) name: String,
    pub(crate) language: String,
    pub(crate) sex: String,
    pub(crate) url: String,
    pub(crate) login_data: String,
    pub(crate) identity: Identity,
    pub(crate) err_pw1: u8,
    pub(crate) err_rc: u8,
    pub(crate) err_pw3: u8,
    pub(crate) ds_counter: u32,
    pub(crate) selected: bool,
    pub(crate) master: Box<dyn keywrap::Master + Send + Sync>,
    pub(crate) rng: OsRng,
}

impl Card {
    pub fn new(config: CardConfig, master: Box<dyn keywrap::Master + Send + Sync>) -> Result<Card, CardError> {
        let identity = loader::load(&config.armored_key)?;
        tracing::info!(snvs = config.snvs, "card identity loaded");

        Ok(Card {
            serial: config.serial,
            name: config.name,
            language: config.language,
            sex: config.sex,
            url: config.url,
            login_data: config.login_data,
            identity,
            err_pw1: DEFAULT_PW1_ERROR_COUNTER,
            err_rc: DEFAULT_RC_ERROR_COUNTER,
            err_pw3: DEFAULT_PW3_ERROR_COUNTER,
            ds_counter: 0,
            selected: false,
            master,
            rng: OsRng,
        })
    }

    pub fn serial(&self) -> [u8; 4] {
        self.serial
    }

    pub(crate) fn subkey_mut(&mut self, role: Role) -> Option<&mut loader::Subkey> {
        match role {
            Role::Sig => self.identity.sig.as_mut(),
            Role::Dec => self.identity.dec.as_mut(),
            Role::Aut => self.identity.aut.as_mut(),
        }
    }

    fn subkey(&self, role: Role) -> Option<&loader::Subkey> {
        match role {
            Role::Sig => self.identity.sig.as_ref(),
            Role::Dec => self.identity.dec.as_ref(),
            Role::Aut => self.identity.aut.as_ref(),
        }
    }

    /// Card key fingerprints and lock status in textual form, for the
    /// management console's `status` command.
    pub fn status(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "---------------------------------------------------- OpenPGP smartcard ----");
        let _ = writeln!(out, "Serial number ..........: {:02X?}", self.serial);
        let _ = writeln!(out, "Digital signature count.: {}", self.ds_counter);
        let _ = writeln!(out, "Primary certificate ....: {}", self.identity.cert.fingerprint());

        for (label, role) in [
            ("Signature subkey", Role::Sig),
            ("Decryption subkey", Role::Dec),
            ("Authentication subkey", Role::Aut),
        ] {
            match self.subkey(role) {
                Some(s) => {
                    let _ = writeln!(out, "{label} .......: {} (locked: {})", s.fingerprint, s.is_locked());
                }
                None => {
                    let _ = writeln!(out, "{label} .......: missing");
                }
            }
        }

        out
    }

    pub(crate) fn signal_verification_status(&mut self) {
        tracing::debug!(
            sig_locked = self.identity.sig.as_ref().map(|s| s.is_locked()),
            dec_locked = self.identity.dec.as_ref().map(|s| s.is_locked()),
            aut_locked = self.identity.aut.as_ref().map(|s| s.is_locked()),
            "verification status changed",
        );
    }

    /// Dispatches one command APDU. A non-ISO class byte is rejected before
    /// touching any state, including PW/session state.
    pub fn command(&mut self, capdu: &Capdu) -> Rapdu {
        if capdu.cla != 0x00 {
            return command_not_allowed();
        }

        match capdu.ins {
            0xa4 => self.select(capdu),
            0xca => self.get_data(capdu),
            0x20 => verify::verify(self, capdu.p1, capdu.p2, &capdu.data),
            0x2a => self.pso(capdu),
            0x47 => generate::generate(self, capdu.p1, capdu.p2, &capdu.data),
            0x84 => crypto::get_challenge(self, if capdu.le == 0 { 8 } else { capdu.le }),
            0xda | 0xdb => command_not_allowed(), // PUT DATA: personalization is out of scope.
            _ => command_not_allowed(),
        }
    }

    fn select(&mut self, capdu: &Capdu) -> Rapdu {
        // Any SELECT, successful or not, deselects the application and
        // re-locks all three subkeys.
        if let Some(s) = self.identity.sig.as_mut() {
            s.restore();
        }
        if let Some(s) = self.identity.dec.as_mut() {
            s.restore();
        }
        if let Some(s) = self.identity.aut.as_mut() {
            s.restore();
        }
        self.selected = false;
        self.signal_verification_status();

        let full_aid = data::aid(self.serial);
        if capdu.data.is_empty() || !full_aid.starts_with(capdu.data.as_slice()) {
            return file_not_found();
        }

        self.selected = true;
        command_completed(Vec::new())
    }

    fn get_data(&mut self, capdu: &Capdu) -> Rapdu {
        if !self.selected {
            return command_not_allowed();
        }

        let tag = u16::from_be_bytes([capdu.p1, capdu.p2]) as u32;
        match tag {
            data::DO_APPLICATION_IDENTIFIER => command_completed(data::aid(self.serial).to_vec()),
            data::DO_HISTORICAL_BYTES => command_completed(data::historical_bytes().to_vec()),
            data::DO_LOGIN_DATA => command_completed(self.login_data.as_bytes().to_vec()),
            data::DO_URL => command_completed(self.url.as_bytes().to_vec()),
            data::DO_CARDHOLDER_RELATED_DATA => {
                command_completed(data::cardholder_related_data(&self.name, &self.language, &self.sex))
            }
            data::DO_APPLICATION_RELATED_DATA => command_completed(data::application_related_data(
                self.serial,
                self.identity.sig.as_ref(),
                self.identity.dec.as_ref(),
                self.identity.aut.as_ref(),
                PW1_CDS_MULTI,
                self.err_pw1,
                self.err_rc,
                self.err_pw3,
            )),
            data::DO_EXTENDED_LENGTH_INFORMATION => command_completed(data::extended_length_information()),
            data::DO_SECURITY_SUPPORT_TEMPLATE => {
                command_completed(data::security_support_template(self.ds_counter))
            }
            data::DO_PW_STATUS_BYTES => command_completed(
                data::pw_status_bytes(PW1_CDS_MULTI, self.err_pw1, self.err_rc, self.err_pw3).to_vec(),
            ),
            data::DO_KEY_INFORMATION => command_completed(
                data::key_information(
                    self.identity.sig.is_some(),
                    self.identity.dec.is_some(),
                    self.identity.aut.is_some(),
                )
                .to_vec(),
            ),
            data::DO_ALGORITHM_INFORMATION => command_completed(data::algorithm_information(
                self.identity.sig.as_ref(),
                self.identity.dec.as_ref(),
                self.identity.aut.as_ref(),
            )),
            _ => referenced_data_not_found(),
        }
    }

    fn pso(&mut self, capdu: &Capdu) -> Rapdu {
        match (capdu.p1, capdu.p2) {
            (0x9e, 0x9a) => crypto::compute_digital_signature(self, &capdu.data),
            (0x80, 0x86) => crypto::decipher(self, &capdu.data),
            (0x86, 0x80) => crypto::encipher(self, &capdu.data),
            _ => wrong_data(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn select_full_aid_succeeds() {
        let mut card = test_card();
        let aid = data::aid(card.serial).to_vec();
        let capdu = Capdu { cla: 0x00, ins: 0xa4, p1: 0x04, p2: 0x00, data: aid, le: 0 };
        let r = card.command(&capdu);
        assert_eq!((r.sw1, r.sw2), (0x90, 0x00));
        assert!(card.selected);
    }

    #[test]
    fn select_wrong_aid_fails_and_stays_deselected() {
        let mut card = test_card();
        let capdu = Capdu { cla: 0x00, ins: 0xa4, p1: 0x04, p2: 0x00, data: vec![0xde, 0xad], le: 0 };
        let r = card.command(&capdu);
        assert_eq!((r.sw1, r.sw2), (0x6a, 0x82));
        assert!(!card.selected);
    }

    #[test]
    fn non_iso_class_rejected_without_mutation() {
        let mut card = test_card();
        let capdu = Capdu { cla: 0x80, ins: 0xa4, p1: 0x04, p2: 0x00, data: Vec::new(), le: 0 };
        let r = card.command(&capdu);
        assert_eq!((r.sw1, r.sw2), (0x6f, 0x00));
        assert!(!card.selected);
    }

    #[test]
    fn get_data_requires_selection() {
        let mut card = test_card();
        let capdu = Capdu { cla: 0x00, ins: 0xca, p1: 0x00, p2: 0x4f, data: Vec::new(), le: 0 };
        let r = card.command(&capdu);
        assert_eq!((r.sw1, r.sw2), (0x6f, 0x00));
    }

    #[test]
    fn get_data_returns_aid_after_select() {
        let mut card = test_card();
        let aid = data::aid(card.serial).to_vec();
        card.command(&Capdu { cla: 0x00, ins: 0xa4, p1: 0x04, p2: 0x00, data: aid.clone(), le: 0 });
        let r = card.command(&Capdu { cla: 0x00, ins: 0xca, p1: 0x00, p2: 0x4f, data: Vec::new(), le: 0 });
        assert_eq!((r.sw1, r.sw2), (0x90, 0x00));
        assert_eq!(r.data, aid);
    }

    #[test]
    fn get_data_algorithm_information_lists_all_three_roles() {
        let mut card = test_card();
        let aid = data::aid(card.serial).to_vec();
        card.command(&Capdu { cla: 0x00, ins: 0xa4, p1: 0x04, p2: 0x00, data: aid, le: 0 });
        let r = card.command(&Capdu { cla: 0x00, ins: 0xca, p1: 0x00, p2: 0xfa, data: Vec::new(), le: 0 });
        assert_eq!((r.sw1, r.sw2), (0x90, 0x00));
        assert_eq!(
            r.data,
            data::algorithm_information(
                card.identity.sig.as_ref(),
                card.identity.dec.as_ref(),
                card.identity.aut.as_ref(),
            )
        );
        assert!(!r.data.is_empty());
    }

    #[test]
    fn get_data_application_related_data_carries_discretionary_data_objects() {
        let mut card = test_card();
        let aid = data::aid(card.serial).to_vec();
        card.command(&Capdu { cla: 0x00, ins: 0xa4, p1: 0x04, p2: 0x00, data: aid, le: 0 });
        let r = card.command(&Capdu { cla: 0x00, ins: 0xca, p1: 0x00, p2: 0x6e, data: Vec::new(), le: 0 });
        assert_eq!((r.sw1, r.sw2), (0x90, 0x00));
        assert!(r.data.windows(2).any(|w| w[0] == 0x73));
        // nested Extended Capabilities / Algorithm Attributes / PW Status tags
        assert!(r.data.windows(2).any(|w| w == [0xc0, 10]));
        assert!(r.data.windows(2).any(|w| w == [0xc4, 7]));
    }

    #[test]
    fn get_challenge_returns_requested_length() {
        let mut card = test_card();
        let r = card.command(&Capdu { cla: 0x00, ins: 0x84, p1: 0x00, p2: 0x00, data: Vec::new(), le: 16 });
        assert_eq!((r.sw1, r.sw2), (0x90, 0x00));
        assert_eq!(r.data.len(), 16);
    }

    #[test]
    fn select_relocks_previously_unlocked_subkey() {
        let mut card = test_card();
        verify::verify(&mut card, verify::PW_VERIFY, verify::PW1_CDS, b"secret1");
        assert!(!card.subkey_mut(Role::Sig).unwrap().is_locked());
        card.select(&Capdu { cla: 0x00, ins: 0xa4, p1: 0x04, p2: 0x00, data: vec![0xde, 0xad], le: 0 });
        assert!(card.subkey_mut(Role::Sig).unwrap().is_locked());
    }
}
