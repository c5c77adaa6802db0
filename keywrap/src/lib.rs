//! Hardware-bound authenticated wrap/unwrap of bundled secrets.
//!
//! A [`Master`] derives a 256-bit key from a short ASCII diversifier. On real
//! hardware this is backed by an SoC co-processor keyed with an OTP-fused
//! secret that software never sees directly; [`SoftwareMaster`] stands in for
//! that collaborator during development and testing.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;

/// Diversifiers used to namespace keys derived from the same master.
pub const DIVERSIFIER_OPENPGP: &[u8; 16] = b"GoKeySNVSOpenPGP";
pub const DIVERSIFIER_OPENSSH: &[u8; 16] = b"GoKeySNVSOpenSSH";
pub const DIVERSIFIER_U2F: &[u8; 16] = b"GoKeySNVSU2F    ";
pub const DIVERSIFIER_DEVICE_KEY: &[u8; 16] = b"GoKeySNVSDeviceK";
pub const DIVERSIFIER_AGE: &[u8; 16] = b"GoKeySNVSAGE    ";

#[derive(Debug, Error)]
pub enum KeyWrapError {
    #[error("input too short to contain iv and hmac")]
    InvalidLength,
    #[error("hmac verification failed")]
    InvalidMac,
    #[error("plaintext must be at least {0} bytes")]
    PlaintextTooShort(usize),
    #[error("key derivation failed: {0}")]
    Derivation(String),
}

/// A source of device-bound key derivation.
///
/// Implementations must be deterministic: the same `(diversifier, iv)` pair
/// always yields the same key on the same device.
pub trait Master {
    fn derive_key(&self, diversifier: &[u8], iv: &[u8; IV_LEN]) -> Result<[u8; KEY_LEN], KeyWrapError>;
}

/// Development/test stand-in for the hardware-backed [`Master`].
///
/// Derives keys via HKDF-SHA256 over a fixed seed, the diversifier and the
/// IV. This is not hardware-bound and must never be used to protect secrets
/// outside of tests.
pub struct SoftwareMaster {
    seed: [u8; 32],
}

impl SoftwareMaster {
    pub fn new(seed: [u8; 32]) -> Self {
        SoftwareMaster { seed }
    }
}

impl Default for SoftwareMaster {
    fn default() -> Self {
        SoftwareMaster::new(*b"keywrap-development-seed-0123456")
    }
}

impl Master for SoftwareMaster {
    fn derive_key(&self, diversifier: &[u8], iv: &[u8; IV_LEN]) -> Result<[u8; KEY_LEN], KeyWrapError> {
        let mut salt = Vec::with_capacity(diversifier.len() + IV_LEN);
        salt.extend_from_slice(diversifier);
        salt.extend_from_slice(iv);
        let hk = hkdf::Hkdf::<Sha256>::new(Some(&salt), &self.seed);
        let mut key = [0u8; KEY_LEN];
        hk.expand(b"keywrap", &mut key)
            .map_err(|e| KeyWrapError::Derivation(e.to_string()))?;
        Ok(key)
    }
}

fn derive(master: &dyn Master, diversifier: &[u8]) -> Result<[u8; KEY_LEN], KeyWrapError> {
    // Key derivation always uses an all-zero IV so a given diversifier
    // deterministically yields the same wrapping key on a given device.
    master.derive_key(diversifier, &[0u8; IV_LEN])
}

/// Encrypts `plaintext` under a key derived from `master` via `diversifier`,
/// using a freshly generated random `iv`.
///
/// Output layout: `iv (16) || ciphertext || hmac-sha256 (32)`.
pub fn encrypt(
    master: &dyn Master,
    diversifier: &[u8],
    iv: [u8; IV_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, KeyWrapError> {
    if plaintext.len() < IV_LEN {
        return Err(KeyWrapError::PlaintextTooShort(IV_LEN));
    }

    let key = derive(master, diversifier)?;

    let mut ciphertext = plaintext.to_vec();
    let mut cipher = Aes256Ctr::new((&key).into(), (&iv).into());
    cipher.apply_keystream(&mut ciphertext);

    let mut mac = HmacSha256::new_from_slice(&key).expect("hmac accepts any key length");
    mac.update(&iv);
    mac.update(&ciphertext);
    let tag = mac.finalize().into_bytes();

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len() + MAC_LEN);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Decrypts a blob produced by [`encrypt`], verifying its HMAC in constant time.
pub fn decrypt(master: &dyn Master, diversifier: &[u8], input: &[u8]) -> Result<Vec<u8>, KeyWrapError> {
    if input.len() < IV_LEN + MAC_LEN {
        return Err(KeyWrapError::InvalidLength);
    }

    let iv: [u8; IV_LEN] = input[..IV_LEN].try_into().unwrap();
    let body_end = input.len() - MAC_LEN;
    let ciphertext = &input[IV_LEN..body_end];
    let tag = &input[body_end..];

    let key = derive(master, diversifier)?;

    let mut mac = HmacSha256::new_from_slice(&key).expect("hmac accepts any key length");
    mac.update(&iv);
    mac.update(ciphertext);
    let expected = mac.finalize().into_bytes();

    if expected.ct_eq(tag).unwrap_u8() != 1 {
        return Err(KeyWrapError::InvalidMac);
    }

    let mut plaintext = ciphertext.to_vec();
    let mut cipher = Aes256Ctr::new((&key).into(), (&iv).into());
    cipher.apply_keystream(&mut plaintext);
    Ok(plaintext)
}
