//! Adapts a shared [`Card`] to [`ccid::Icc`], routing CCID wake calls through
//! the same reference-counted frequency guard the console uses, so a CCID
//! session and a concurrent console command never fight over the CPU state.

use std::sync::{Arc, Mutex};

use card::apdu::Capdu;
use card::Card;
use ccid::Icc;

use crate::wake::{WakeToken, Waker};

pub struct SharedIcc {
    card: Arc<Mutex<Card>>,
    waker: Arc<Waker>,
    token: Mutex<Option<WakeToken>>,
}

impl SharedIcc {
    pub fn new(card: Arc<Mutex<Card>>, waker: Arc<Waker>) -> SharedIcc {
        SharedIcc { card, waker, token: Mutex::new(None) }
    }
}

impl Icc for SharedIcc {
    fn atr(&self) -> Vec<u8> {
        card::data::atr()
    }

    fn wake(&mut self) {
        *self.token.lock().unwrap() = Some(self.waker.acquire());
    }

    fn raw_command(&mut self, capdu: &[u8]) -> Vec<u8> {
        match Capdu::parse(capdu) {
            Some(c) => self.card.lock().unwrap().command(&c).to_bytes(),
            None => card::apdu::wrong_data().to_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keywrap::SoftwareMaster;

    const TEST_KEY: &str = include_str!("../../card/tests/data/test-key.asc");

    fn test_shared_icc() -> SharedIcc {
        let card = Card::new(
            card::CardConfig {
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
        .unwrap();
        SharedIcc::new(Arc::new(Mutex::new(card)), Arc::new(Waker::new(Arc::new(crate::wake::NoopCpuFreq))))
    }

    #[test]
    fn wake_acquires_and_holds_a_token() {
        let mut icc = test_shared_icc();
        assert!(!icc.waker.awake());
        icc.wake();
        assert!(icc.waker.awake());
    }

    #[test]
    fn raw_command_round_trips_a_select() {
        let mut icc = test_shared_icc();
        let serial = icc.card.lock().unwrap().serial();
        let aid = card::data::aid(serial);
        let mut capdu = vec![0x00, 0xa4, 0x04, 0x00, aid.len() as u8];
        capdu.extend_from_slice(&aid);
        let reply = icc.raw_command(&capdu);
        assert_eq!(&reply[reply.len() - 2..], &[0x90, 0x00]);
    }

    #[test]
    fn raw_command_rejects_malformed_apdu() {
        let mut icc = test_shared_icc();
        let reply = icc.raw_command(&[]);
        assert_eq!(&reply[reply.len() - 2..], &[0x6a, 0x80]);
    }
}
