//! Primitives: AES-256-GCM and X25519 public-key wrapping.
//!
//! Wrapped key envelope (v1):
//!   version[1] || ephemeral_pk[32] || nonce[12] || aead_ct[16+]
//!
//! wrap key = HKDF-SHA256(x25519_dh, salt=None,
//!                        info = PROTOCOL_ID || b"|wrap|" || SHA3-256(ephemeral_pk || recipient_pk))

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{KeyManagerError, Result};

/// Protocol identifier for KDF domain separation.
pub const PROTOCOL_ID: &[u8] = b"sudo-email-wrap-v1";

pub const WRAP_VERSION: u8 = 0x01;

pub const SYMMETRIC_KEY_BYTES: usize = 32;
pub const IV_BYTES: usize = 12;
pub const TAG_BYTES: usize = 16;
pub const X25519_KEY_BYTES: usize = 32;

/// Minimum wrapped envelope: version + ephemeral pk + nonce + tag
pub const MIN_WRAPPED_BYTES: usize = 1 + X25519_KEY_BYTES + IV_BYTES + TAG_BYTES;

/// Fill a buffer from the OS random source.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    getrandom::getrandom(&mut out).map_err(|_| KeyManagerError::Rng)?;
    Ok(out)
}

/// Generate a random 12-byte IV. Used during encryption only.
pub fn iv() -> Result<[u8; IV_BYTES]> {
    let mut n = [0u8; IV_BYTES];
    getrandom::getrandom(&mut n).map_err(|_| KeyManagerError::Rng)?;
    Ok(n)
}

/// Generate a fresh 256-bit symmetric key.
pub fn symmetric_key() -> Result<Zeroizing<[u8; SYMMETRIC_KEY_BYTES]>> {
    let mut k = Zeroizing::new([0u8; SYMMETRIC_KEY_BYTES]);
    getrandom::getrandom(&mut k[..]).map_err(|_| KeyManagerError::Rng)?;
    Ok(k)
}

pub fn aead_seal(key: &[u8], iv: &[u8; IV_BYTES], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| KeyManagerError::InvalidKeyMaterial("symmetric key must be 32 bytes".into()))?;
    let payload = Payload { msg: plaintext, aad };
    cipher
        .encrypt(Nonce::from_slice(iv), payload)
        .map_err(|_| KeyManagerError::Encrypt)
}

pub fn aead_open(key: &[u8], iv: &[u8; IV_BYTES], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_BYTES {
        return Err(KeyManagerError::Decrypt);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| KeyManagerError::Decrypt)?;
    let payload = Payload { msg: ciphertext, aad };
    cipher
        .decrypt(Nonce::from_slice(iv), payload)
        .map_err(|_| KeyManagerError::Decrypt)
}

/// Generate an X25519 key pair: (private scalar, public key).
pub fn key_pair() -> (Zeroizing<[u8; X25519_KEY_BYTES]>, [u8; X25519_KEY_BYTES]) {
    let sk = StaticSecret::random_from_rng(OsRng);
    let pk = X25519PublicKey::from(&sk);
    (Zeroizing::new(sk.to_bytes()), pk.to_bytes())
}

fn wrap_key(shared: &[u8], ephemeral_pk: &[u8], recipient_pk: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let mut hasher = Sha3_256::new();
    hasher.update(ephemeral_pk);
    hasher.update(recipient_pk);
    let transcript = hasher.finalize();

    let mut info = Vec::with_capacity(PROTOCOL_ID.len() + 6 + transcript.len());
    info.extend_from_slice(PROTOCOL_ID);
    info.extend_from_slice(b"|wrap|");
    info.extend_from_slice(&transcript);

    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut out = Zeroizing::new([0u8; 32]);
    hk.expand(&info, &mut out[..]).map_err(|_| KeyManagerError::Encrypt)?;
    Ok(out)
}

fn parse_public_key(bytes: &[u8]) -> Result<X25519PublicKey> {
    let arr: [u8; X25519_KEY_BYTES] = bytes.try_into().map_err(|_| {
        KeyManagerError::InvalidKeyMaterial(format!(
            "public key must be {} bytes, got {}",
            X25519_KEY_BYTES,
            bytes.len()
        ))
    })?;
    Ok(X25519PublicKey::from(arr))
}

/// Encrypt `data` to a recipient public key.
pub fn wrap(recipient_pk: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let recipient = parse_public_key(recipient_pk)?;
    let eph = EphemeralSecret::random_from_rng(OsRng);
    let eph_pk = X25519PublicKey::from(&eph);
    let shared = eph.diffie_hellman(&recipient);
    if !shared.was_contributory() {
        return Err(KeyManagerError::InvalidKeyMaterial("low-order public key".into()));
    }

    let key = wrap_key(shared.as_bytes(), eph_pk.as_bytes(), recipient.as_bytes())?;
    let nonce = iv()?;
    let ct = aead_seal(&key[..], &nonce, data, eph_pk.as_bytes())?;

    let mut out = Vec::with_capacity(1 + X25519_KEY_BYTES + IV_BYTES + ct.len());
    out.push(WRAP_VERSION);
    out.extend_from_slice(eph_pk.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Decrypt an envelope produced by [`wrap`] with the matching private scalar.
pub fn unwrap(private_key: &[u8; X25519_KEY_BYTES], envelope: &[u8]) -> Result<Vec<u8>> {
    if envelope.len() < MIN_WRAPPED_BYTES || envelope[0] != WRAP_VERSION {
        return Err(KeyManagerError::Decrypt);
    }
    let eph_end = 1 + X25519_KEY_BYTES;
    let nonce_end = eph_end + IV_BYTES;

    let eph_pk = parse_public_key(&envelope[1..eph_end]).map_err(|_| KeyManagerError::Decrypt)?;
    let nonce: [u8; IV_BYTES] = envelope[eph_end..nonce_end]
        .try_into()
        .map_err(|_| KeyManagerError::Decrypt)?;

    let sk = StaticSecret::from(*private_key);
    let own_pk = X25519PublicKey::from(&sk);
    let shared = sk.diffie_hellman(&eph_pk);

    let key = wrap_key(shared.as_bytes(), eph_pk.as_bytes(), own_pk.as_bytes())
        .map_err(|_| KeyManagerError::Decrypt)?;
    aead_open(&key[..], &nonce, &envelope[nonce_end..], eph_pk.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aead_roundtrip_and_tamper() {
        let key = symmetric_key().unwrap();
        let nonce = iv().unwrap();
        let mut ct = aead_seal(&key[..], &nonce, b"subject line", b"").unwrap();
        assert_eq!(ct.len(), b"subject line".len() + TAG_BYTES);
        assert_eq!(aead_open(&key[..], &nonce, &ct, b"").unwrap(), b"subject line");

        ct[0] ^= 0x01;
        assert!(aead_open(&key[..], &nonce, &ct, b"").is_err());
    }

    #[test]
    fn wrap_roundtrip() {
        let (sk, pk) = key_pair();
        let envelope = wrap(&pk, b"one-time message key").unwrap();
        assert_eq!(envelope[0], WRAP_VERSION);
        assert_eq!(unwrap(&sk, &envelope).unwrap(), b"one-time message key");
    }

    #[test]
    fn wrap_wrong_private_key_fails() {
        let (_sk, pk) = key_pair();
        let (other_sk, _) = key_pair();
        let envelope = wrap(&pk, b"data").unwrap();
        assert!(matches!(unwrap(&other_sk, &envelope), Err(KeyManagerError::Decrypt)));
    }

    #[test]
    fn wrap_rejects_short_and_bad_version() {
        let (sk, pk) = key_pair();
        assert!(unwrap(&sk, &[WRAP_VERSION; 10]).is_err());

        let mut envelope = wrap(&pk, b"data").unwrap();
        envelope[0] = 0x7f;
        assert!(unwrap(&sk, &envelope).is_err());
    }

    #[test]
    fn wrap_rejects_bad_public_key_length() {
        assert!(matches!(
            wrap(&[0u8; 31], b"data"),
            Err(KeyManagerError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn each_wrap_uses_fresh_ephemeral() {
        let (_, pk) = key_pair();
        let a = wrap(&pk, b"same").unwrap();
        let b = wrap(&pk, b"same").unwrap();
        assert_ne!(a[1..1 + X25519_KEY_BYTES], b[1..1 + X25519_KEY_BYTES]);
    }
}
