//! Adapts [`card::Card`] to the [`crate::Icc`] trait.
//!
//! Wake accounting here is a bare counter; the firmware binary wraps this
//! with the real CPU-frequency scope guard described in SPEC_FULL §5/§9.

use card::apdu::Capdu;
use card::Card;

use crate::Icc;

pub struct CardIcc {
    pub card: Card,
    pub wakes: u64,
}

impl CardIcc {
    pub fn new(card: Card) -> CardIcc {
        CardIcc { card, wakes: 0 }
    }
}

impl Icc for CardIcc {
    fn atr(&self) -> Vec<u8> {
        card::data::atr()
    }

    fn wake(&mut self) {
        self.wakes += 1;
    }

    fn raw_command(&mut self, capdu: &[u8]) -> Vec<u8> {
        match Capdu::parse(capdu) {
            Some(c) => self.card.command(&c).to_bytes(),
            None => card::apdu::wrong_data().to_bytes(),
        }
    }
}
