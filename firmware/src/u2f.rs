//! FIDO U2F HID token: an out-of-scope black-box collaborator (SPEC_FULL
//! §1 Non-goals). This models only the two things the management console
//! needs to drive: initialization and the user-presence gate, grounded in
//! the source's `u2f.Init` and `u2f.Presence` channel.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;
use std::time::Duration;

/// The user-presence wait is bounded to 10s; exceeding it resolves to
/// "absent" (SPEC_FULL §5 cancellation note).
pub const PRESENCE_TIMEOUT: Duration = Duration::from_secs(10);

pub trait U2f: Send {
    fn init(&mut self) -> Result<(), String>;
    fn counter(&self) -> u32;
    /// Non-blocking: signals presence to a pending wait, if any. Returns
    /// false if nothing was waiting (mirrors the source's `select`+`default`
    /// on an unbuffered channel).
    fn confirm_presence(&self) -> bool;
}

pub struct StubU2f {
    initialized: Mutex<bool>,
    counter: AtomicU32,
    presence_tx: SyncSender<()>,
    presence_rx: Mutex<Receiver<()>>,
}

impl StubU2f {
    pub fn new() -> StubU2f {
        let (presence_tx, presence_rx) = mpsc::sync_channel(0);
        StubU2f { initialized: Mutex::new(false), counter: AtomicU32::new(0), presence_tx, presence_rx: Mutex::new(presence_rx) }
    }

    pub fn initialized(&self) -> bool {
        *self.initialized.lock().unwrap()
    }

    /// Blocks for up to `timeout` for a matching `confirm_presence()` call,
    /// then bumps the monotonic counter on success.
    pub fn wait_for_presence(&self, timeout: Duration) -> bool {
        match self.presence_rx.lock().unwrap().recv_timeout(timeout) {
            Ok(()) => {
                self.counter.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }
}

impl Default for StubU2f {
    fn default() -> Self {
        StubU2f::new()
    }
}

impl U2f for StubU2f {
    fn init(&mut self) -> Result<(), String> {
        *self.initialized.get_mut().unwrap() = true;
        Ok(())
    }

    fn counter(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }

    fn confirm_presence(&self) -> bool {
        self.presence_tx.try_send(()).is_ok()
    }
}
