//! Sealed-box encryption for GitHub secrets.
//!
//! GitHub only accepts secret values encrypted with the scope's public key
//! using libsodium sealed boxes (X25519 + XSalsa20-Poly1305). A fresh
//! ephemeral keypair is generated per call, so the ciphertext differs every
//! time even for the same input.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use crypto_box::PublicKey;

use crate::error::CryptoError;

/// Length of a Curve25519 public key.
pub const KEY_LEN: usize = 32;

/// Seals `plaintext` for the holder of `public_key_b64`.
///
/// Returns the base64-encoded ciphertext expected by the secrets endpoints.
///
/// # Errors
///
/// Returns an error if the key is not base64 or does not decode to
/// exactly 32 bytes.
pub fn seal(plaintext: &[u8], public_key_b64: &str) -> Result<String, CryptoError> {
    let key_bytes = BASE64
        .decode(public_key_b64)
        .map_err(|_| CryptoError::InvalidBase64)?;

    let key_array: [u8; KEY_LEN] = key_bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| CryptoError::InvalidKeyLength(bytes.len()))?;

    let public_key = PublicKey::from(key_array);

    let mut rng = crypto_box::aead::OsRng;
    let ciphertext = public_key
        .seal(&mut rng, plaintext)
        .map_err(|_| CryptoError::SealFailed)?;

    Ok(BASE64.encode(ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_box::SecretKey;

    fn test_keypair() -> (String, SecretKey) {
        let secret_key = SecretKey::generate(&mut crypto_box::aead::OsRng);
        let pk_b64 = BASE64.encode(secret_key.public_key().as_bytes());
        (pk_b64, secret_key)
    }

    fn open(sk: &SecretKey, sealed_b64: &str) -> Vec<u8> {
        let ciphertext = BASE64.decode(sealed_b64).expect("ciphertext is base64");
        sk.unseal(&ciphertext).expect("decryption should succeed")
    }

    #[test]
    fn test_roundtrip() {
        let (pk_b64, sk) = test_keypair();
        let sealed = seal(b"super-secret-value-42", &pk_b64).expect("seal");
        assert_eq!(open(&sk, &sealed), b"super-secret-value-42");
    }

    #[test]
    fn test_roundtrip_empty_plaintext() {
        let (pk_b64, sk) = test_keypair();
        let sealed = seal(b"", &pk_b64).expect("seal");
        assert!(open(&sk, &sealed).is_empty());
    }

    #[test]
    fn test_roundtrip_binary_plaintext() {
        let (pk_b64, sk) = test_keypair();
        let plaintext: Vec<u8> = (0..=255).collect();
        let sealed = seal(&plaintext, &pk_b64).expect("seal");
        assert_eq!(open(&sk, &sealed), plaintext);
    }

    #[test]
    fn test_ciphertext_is_not_deterministic() {
        let (pk_b64, _sk) = test_keypair();
        let first = seal(b"same-input", &pk_b64).expect("seal");
        let second = seal(b"same-input", &pk_b64).expect("seal");
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_base64_key_rejected() {
        let err = seal(b"test", "not-valid-base64!!!").expect_err("bad key");
        assert!(matches!(err, CryptoError::InvalidBase64));
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        let short = BASE64.encode(b"too-short");
        assert!(matches!(
            seal(b"test", &short).expect_err("short key"),
            CryptoError::InvalidKeyLength(9)
        ));

        let long = BASE64.encode([7u8; 33]);
        assert!(matches!(
            seal(b"test", &long).expect_err("long key"),
            CryptoError::InvalidKeyLength(33)
        ));
    }
}
