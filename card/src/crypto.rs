//! PSO: COMPUTE DIGITAL SIGNATURE, PSO: DECIPHER, PSO: ENCIPHER, GET CHALLENGE.

use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::signature::hazmat::PrehashSigner as RsaPrehashSigner;
use rsa::signature::SignatureEncoding;
use rsa::{BigUint, RsaPrivateKey};
use sequoia_openpgp::crypto::mpi;
use sequoia_openpgp::packet::key::SecretKeyMaterial as KeySecret;
use sequoia_openpgp::types::{Curve, PublicKeyAlgorithm};

use crate::apdu::{
    card_key_not_supported, command_completed, security_condition_not_satisfied, unrecoverable_error,
    wrong_data, Rapdu,
};
use crate::card::Card;
use crate::data::{DO_CIPHER, DO_EXT_PUB_KEY, DO_PUB_KEY};
use crate::loader::Subkey;
use crate::tlv::v;
use crate::verify::{verify, PW1_CDS, PW1_CDS_MULTI, PW_LOCK};

const RSA_PADDING: u8 = 0x00;
const AES_PADDING: u8 = 0x02;

fn rsa_private_key(secret: &mpi::SecretKeyMaterial, public: &mpi::PublicKey) -> Option<RsaPrivateKey> {
    let (mpi::SecretKeyMaterial::RSA { d, p, q, .. }, mpi::PublicKey::RSA { e, n }) = (secret, public) else {
        return None;
    };
    let n = BigUint::from_bytes_be(n.value());
    let e = BigUint::from_bytes_be(e.value());
    let d = BigUint::from_bytes_be(d.value());
    let p = BigUint::from_bytes_be(p.value());
    let q = BigUint::from_bytes_be(q.value());
    RsaPrivateKey::from_components(n, e, d, vec![p, q]).ok()
}

/// Octet size for a curve's fixed-width scalar/coordinate encoding, per
/// RFC 7518 section 3.4 (P-521 rounds up to 66 octets).
fn curve_octet_len(curve: &Curve) -> Option<usize> {
    match curve {
        Curve::NistP256 => Some(32),
        Curve::NistP384 => Some(48),
        Curve::NistP521 => Some(66),
        _ => None,
    }
}

/// PSO: COMPUTE DIGITAL SIGNATURE (P1P2 = 0x9E9A).
///
/// RSA input is a DigestInfo prefix followed by a SHA-2 digest; ECDSA input
/// is the raw hash. `PW1_CDS_MULTI == 0` re-locks Sig after exactly one
/// signature, even on a failure path.
pub fn compute_digital_signature(card: &mut Card, data: &[u8]) -> Rapdu {
    if data.is_empty() {
        return wrong_data();
    }

    let sig_present = card.identity.sig.is_some();
    if !sig_present {
        return card_key_not_supported();
    }
    if card.identity.sig.as_ref().unwrap().is_locked() {
        return security_condition_not_satisfied();
    }

    let result = sign(card.identity.sig.as_ref().unwrap(), data);

    if PW1_CDS_MULTI == 0 {
        verify(card, PW_LOCK, PW1_CDS, &[]);
    }

    match result {
        Ok(Some(sig)) => {
            card.ds_counter = card.ds_counter.wrapping_add(1) & 0x00ff_ffff;
            command_completed(sig)
        }
        Ok(None) => wrong_data(),
        Err(()) => unrecoverable_error(),
    }
}

fn sign(subkey: &Subkey, data: &[u8]) -> Result<Option<Vec<u8>>, ()> {
    let unencrypted = match &subkey.current {
        KeySecret::Unencrypted(u) => u,
        KeySecret::Encrypted(_) => return Err(()),
    };

    match subkey.pk_algo {
        PublicKeyAlgorithm::RSAEncryptSign => {
            // 19-byte DigestInfo prefix + digest (32/48/64 bytes for SHA-256/384/512).
            if data.len() < 19 + 32 {
                return Ok(None);
            }
            let digest = &data[19..];
            unencrypted.map(|mpis| {
                let private = rsa_private_key(mpis, &subkey.public).ok_or(())?;
                let result = match digest.len() {
                    32 => {
                        let key = RsaSigningKey::<sha2::Sha256>::new(private);
                        RsaPrehashSigner::sign_prehash(&key, digest).map(|s: rsa::pkcs1v15::Signature| s.to_vec())
                    }
                    48 => {
                        let key = RsaSigningKey::<sha2::Sha384>::new(private);
                        RsaPrehashSigner::sign_prehash(&key, digest).map(|s: rsa::pkcs1v15::Signature| s.to_vec())
                    }
                    64 => {
                        let key = RsaSigningKey::<sha2::Sha512>::new(private);
                        RsaPrehashSigner::sign_prehash(&key, digest).map(|s: rsa::pkcs1v15::Signature| s.to_vec())
                    }
                    _ => return Ok(None),
                };
                result.map(Some).map_err(|_| ())
            })
        }
        PublicKeyAlgorithm::ECDSA => sign_ecdsa(subkey, unencrypted, data),
        _ => Err(()),
    }
}

fn sign_ecdsa(
    subkey: &Subkey,
    unencrypted: &sequoia_openpgp::packet::key::Unencrypted,
    data: &[u8],
) -> Result<Option<Vec<u8>>, ()> {
    let mpi::PublicKey::ECDSA { curve, .. } = &subkey.public else {
        return Err(());
    };
    let octets = curve_octet_len(curve).ok_or(())?;

    let scalar: Vec<u8> = unencrypted.map(|mpis| match mpis {
        mpi::SecretKeyMaterial::ECDSA { scalar } => Some(scalar.value_padded(octets).to_vec()),
        _ => None,
    }).ok_or(())?;

    let signed = match curve {
        Curve::NistP256 => {
            use p256::ecdsa::signature::hazmat::PrehashSigner;
            use p256::ecdsa::SigningKey;
            let key = SigningKey::from_bytes(scalar.as_slice().into()).map_err(|_| ())?;
            let sig: p256::ecdsa::Signature = PrehashSigner::sign_prehash(&key, data).map_err(|_| ())?;
            sig.to_bytes().to_vec()
        }
        Curve::NistP384 => {
            use p384::ecdsa::signature::hazmat::PrehashSigner;
            use p384::ecdsa::SigningKey;
            let key = SigningKey::from_bytes(scalar.as_slice().into()).map_err(|_| ())?;
            let sig: p384::ecdsa::Signature = PrehashSigner::sign_prehash(&key, data).map_err(|_| ())?;
            sig.to_bytes().to_vec()
        }
        Curve::NistP521 => {
            use p521::ecdsa::signature::hazmat::PrehashSigner;
            use p521::ecdsa::SigningKey;
            let key = SigningKey::from_bytes(scalar.as_slice().into()).map_err(|_| ())?;
            let sig: p521::ecdsa::Signature = PrehashSigner::sign_prehash(&key, data).map_err(|_| ())?;
            sig.to_bytes().to_vec()
        }
        _ => return Err(()),
    };

    Ok(Some(signed))
}

/// PSO: DECIPHER (P1P2 = 0x8086). First byte of `data` selects the mode.
pub fn decipher(card: &mut Card, data: &[u8]) -> Rapdu {
    if data.is_empty() {
        return wrong_data();
    }

    if data[0] == AES_PADDING {
        return super::symmetric::decipher(card, &data[1..]);
    }

    let Some(subkey) = card.identity.dec.as_ref() else {
        return card_key_not_supported();
    };
    if subkey.is_locked() {
        return security_condition_not_satisfied();
    }

    match subkey.pk_algo {
        PublicKeyAlgorithm::RSAEncryptSign => {
            if data[0] != RSA_PADDING {
                return card_key_not_supported();
            }
            match decrypt_rsa(subkey, &data[1..]) {
                Ok(pt) => command_completed(pt),
                Err(()) => unrecoverable_error(),
            }
        }
        PublicKeyAlgorithm::ECDH => {
            if data[0] != DO_CIPHER as u8 {
                return card_key_not_supported();
            }
            decipher_ecdh(subkey, data)
        }
        _ => card_key_not_supported(),
    }
}

/// PSO: DECIPHER against an ECDH subkey: `data` is `a6 → 7f49 → 86 = 04‖X‖Y`
/// (the peer's ephemeral point). Derives the raw shared point, takes its X
/// coordinate, and left-zero-pads it to half the encoded point's length —
/// there is no KDF or key-wrap step, matching a bare ECDH decapsulation.
fn decipher_ecdh(subkey: &Subkey, data: &[u8]) -> Rapdu {
    let peer_point = v(v(v(data, DO_CIPHER), DO_PUB_KEY), DO_EXT_PUB_KEY);
    let expected_size = peer_point.len().saturating_sub(1) / 2;
    if peer_point.is_empty() || peer_point[0] != 0x04 || expected_size * 2 != peer_point.len() - 1 {
        return wrong_data();
    }

    let mpi::PublicKey::ECDH { curve, .. } = &subkey.public else {
        return card_key_not_supported();
    };
    let Some(octets) = curve_octet_len(curve) else {
        return card_key_not_supported();
    };

    let unencrypted = match &subkey.current {
        KeySecret::Unencrypted(u) => u,
        KeySecret::Encrypted(_) => return security_condition_not_satisfied(),
    };
    let scalar: Vec<u8> = match unencrypted.map(|mpis| match mpis {
        mpi::SecretKeyMaterial::ECDH { scalar } => Some(scalar.value_padded(octets).to_vec()),
        _ => None,
    }) {
        Some(s) => s,
        None => return unrecoverable_error(),
    };

    let shared = match curve {
        Curve::NistP256 => {
            let secret = p256::NonZeroScalar::try_from(scalar.as_slice()).ok();
            let public = p256::PublicKey::from_sec1_bytes(peer_point).ok();
            secret.zip(public).map(|(s, p)| {
                elliptic_curve::ecdh::diffie_hellman(s, p.as_affine()).raw_secret_bytes().to_vec()
            })
        }
        Curve::NistP384 => {
            let secret = p384::NonZeroScalar::try_from(scalar.as_slice()).ok();
            let public = p384::PublicKey::from_sec1_bytes(peer_point).ok();
            secret.zip(public).map(|(s, p)| {
                elliptic_curve::ecdh::diffie_hellman(s, p.as_affine()).raw_secret_bytes().to_vec()
            })
        }
        Curve::NistP521 => {
            let secret = p521::NonZeroScalar::try_from(scalar.as_slice()).ok();
            let public = p521::PublicKey::from_sec1_bytes(peer_point).ok();
            secret.zip(public).map(|(s, p)| {
                elliptic_curve::ecdh::diffie_hellman(s, p.as_affine()).raw_secret_bytes().to_vec()
            })
        }
        _ => None,
    };

    match shared {
        Some(pt) => command_completed(pt),
        None => unrecoverable_error(),
    }
}

fn decrypt_rsa(subkey: &Subkey, ciphertext: &[u8]) -> Result<Vec<u8>, ()> {
    match &subkey.current {
        KeySecret::Unencrypted(u) => u.map(|mpis| {
            let private = rsa_private_key(mpis, &subkey.public).ok_or(())?;
            private.decrypt(rsa::Pkcs1v15Encrypt, ciphertext).map_err(|_| ())
        }),
        KeySecret::Encrypted(_) => Err(()),
    }
}

/// PSO: ENCIPHER (P1P2 = 0x8680): authorized by the Dec subkey being
/// unlocked, but does not use any OpenPGP key material itself.
pub fn encipher(card: &mut Card, data: &[u8]) -> Rapdu {
    let Some(subkey) = card.identity.dec.as_ref() else {
        return security_condition_not_satisfied();
    };
    if subkey.is_locked() {
        return security_condition_not_satisfied();
    }
    super::symmetric::encipher(card, data)
}

/// GET CHALLENGE (INS 0x84): `n` random bytes from a CSPRNG.
pub fn get_challenge(card: &mut Card, n: usize) -> Rapdu {
    let mut buf = vec![0u8; n];
    use rand_core::RngCore;
    card.rng.fill_bytes(&mut buf);
    command_completed(buf)
}
