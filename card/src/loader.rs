//! Parses an armored OpenPGP secret key and identifies the functional
//! subkeys (Signature, Decryption, Authentication) by usage flag.

use sequoia_openpgp as openpgp;
use openpgp::cert::prelude::*;
use openpgp::packet::key::SecretKeyMaterial;
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::types::PublicKeyAlgorithm;
use openpgp::{Cert, Fingerprint};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to parse OpenPGP certificate: {0}")]
    Parse(#[source] anyhow::Error),
    #[error("certificate has no usable subkeys")]
    NoSubkeys,
}

/// A single functional subkey, retained across its whole lifetime in one of
/// two states: locked (encrypted, as parsed) or unlocked (decrypted).
///
/// `locked_snapshot` is the canonical encrypted form captured once at load
/// time; `current` is mutated by VERIFY and is the only field PSO handlers
/// read from.
pub struct Subkey {
    pub fingerprint: Fingerprint,
    pub pk_algo: PublicKeyAlgorithm,
    pub public: openpgp::crypto::mpi::PublicKey,
    pub(crate) locked_snapshot: SecretKeyMaterial,
    pub current: SecretKeyMaterial,
}

impl Subkey {
    /// True if this subkey's private half is currently encrypted.
    pub fn is_locked(&self) -> bool {
        self.current.is_encrypted()
    }

    /// Restores `current` from the canonical locked snapshot, discarding any
    /// decrypted material. A no-op (but still correct) if the snapshot
    /// itself was never passphrase-protected.
    pub fn restore(&mut self) {
        self.current = self.locked_snapshot.clone();
    }
}

/// The three functional roles an OpenPGP card subkey may fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sig,
    Dec,
    Aut,
}

/// The decoded identity: the parsed certificate plus whichever subkeys were
/// found for each role. Multiple subkeys matching the same role resolve to
/// "last one wins", consistent with the order `Cert::keys()` yields them.
pub struct Identity {
    pub cert: Cert,
    pub sig: Option<Subkey>,
    pub dec: Option<Subkey>,
    pub aut: Option<Subkey>,
}

/// Parses `armored` and assigns subkeys to roles by usage flag.
pub fn load(armored: &[u8]) -> Result<Identity, LoaderError> {
    let cert = Cert::from_bytes(armored).map_err(LoaderError::Parse)?;
    let policy = StandardPolicy::new();

    let mut sig = None;
    let mut dec = None;
    let mut aut = None;

    for ka in cert.keys().subkeys() {
        let valid = match ka.with_policy(&policy, None) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let flags = match valid.key_flags() {
            Some(f) => f,
            None => continue,
        };

        let key = valid.key();
        let secret = match key.optional_secret() {
            Some(s) => s.clone(),
            None => continue,
        };

        let subkey = Subkey {
            fingerprint: key.fingerprint(),
            pk_algo: key.pk_algo(),
            public: key.mpis().clone(),
            locked_snapshot: secret.clone(),
            current: secret,
        };

        // Last matching subkey wins, mirroring encounter order in the cert.
        if flags.for_signing() {
            sig = Some(subkey);
            continue;
        }
        if flags.for_storage_encryption() && flags.for_transport_encryption() {
            dec = Some(subkey);
            continue;
        }
        if flags.for_authentication() {
            aut = Some(subkey);
        }
    }

    if sig.is_none() && dec.is_none() && aut.is_none() {
        return Err(LoaderError::NoSubkeys);
    }

    Ok(Identity { cert, sig, dec, aut })
}
