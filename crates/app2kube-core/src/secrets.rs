//! Secret value encryption
//!
//! Values in the `secrets` section may be stored encrypted. An encrypted value
//! is a scheme tag, `#`, then a base64 payload:
//!
//! - `AES#...` AES-256-CBC with a password (`CRYPT#` is the legacy spelling)
//! - `RSA#...` RSA-OAEP/SHA-256 with a key pair
//!
//! Unprefixed values pass through untouched. When both an RSA public key and
//! an AES password are configured, new values are encrypted with RSA.

use std::collections::BTreeMap;
use std::fmt;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::rand_core::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CoreError, Result};

/// Prefix of values encrypted with AES-256-CBC
pub const AES_PREFIX: &str = "AES#";
/// Legacy prefix of AES-256-CBC values
pub const CRYPT_PREFIX: &str = "CRYPT#";
/// Prefix of values encrypted with RSA-OAEP
pub const RSA_PREFIX: &str = "RSA#";

pub const PASSWORD_ENV: &str = "APP2KUBE_PASSWORD";
pub const ENCRYPT_KEY_ENV: &str = "APP2KUBE_ENCRYPT_KEY";
pub const DECRYPT_KEY_ENV: &str = "APP2KUBE_DECRYPT_KEY";

const AES_KEY_LEN: usize = 32;
const AES_IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

// =============================================================================
// KEY MATERIAL
// =============================================================================

/// Key material used to encrypt and decrypt secret values
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretKeys {
    pub aes_password: Option<String>,
    /// Base64 PKIX DER public key
    pub rsa_public_key: Option<String>,
    /// Base64 PKCS#1 DER private key
    pub rsa_private_key: Option<String>,
}

impl fmt::Debug for SecretKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("SecretKeys")
            .field("aes_password", &redact(&self.aes_password))
            .field("rsa_public_key", &redact(&self.rsa_public_key))
            .field("rsa_private_key", &redact(&self.rsa_private_key))
            .finish()
    }
}

impl SecretKeys {
    /// Read key material from `APP2KUBE_PASSWORD`, `APP2KUBE_ENCRYPT_KEY`
    /// and `APP2KUBE_DECRYPT_KEY`
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            aes_password: var(PASSWORD_ENV),
            rsa_public_key: var(ENCRYPT_KEY_ENV),
            rsa_private_key: var(DECRYPT_KEY_ENV),
        }
    }

    /// Encrypt a plaintext value, returning it with its scheme prefix
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if let Some(public_key) = &self.rsa_public_key {
            return Ok(format!("{RSA_PREFIX}{}", encrypt_rsa(public_key, plaintext)?));
        }
        if let Some(password) = &self.aes_password {
            return Ok(format!("{AES_PREFIX}{}", encrypt_aes(password, plaintext)?));
        }
        Err(CoreError::crypto(format!(
            "AES password or RSA public key not specified (set ${PASSWORD_ENV} or ${ENCRYPT_KEY_ENV})"
        )))
    }

    /// Decrypt a prefixed value; unprefixed values are returned as-is
    pub fn decrypt(&self, value: &str) -> Result<String> {
        let aes_payload = value
            .strip_prefix(AES_PREFIX)
            .or_else(|| value.strip_prefix(CRYPT_PREFIX));
        if let Some(payload) = aes_payload {
            let password = self.aes_password.as_deref().ok_or_else(|| {
                CoreError::crypto(format!("AES password not specified in ${PASSWORD_ENV}"))
            })?;
            return decrypt_aes(password, payload);
        }
        if let Some(payload) = value.strip_prefix(RSA_PREFIX) {
            let private_key = self.rsa_private_key.as_deref().ok_or_else(|| {
                CoreError::crypto(format!("RSA private key not specified in ${DECRYPT_KEY_ENV}"))
            })?;
            return decrypt_rsa(private_key, payload);
        }
        Ok(value.to_string())
    }

    /// Decrypt every value of a secrets mapping
    pub fn decrypt_all(&self, secrets: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
        secrets
            .iter()
            .map(|(key, value)| {
                let plain = self.decrypt(value).map_err(|e| match e {
                    CoreError::Crypto { message } => {
                        CoreError::crypto(format!("secret '{key}': {message}"))
                    }
                    other => other,
                })?;
                Ok((key.clone(), plain))
            })
            .collect()
    }
}

/// Whether a value already carries an encryption prefix
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(AES_PREFIX) || value.starts_with(CRYPT_PREFIX) || value.starts_with(RSA_PREFIX)
}

// =============================================================================
// AES-256-CBC
// =============================================================================

fn aes_key(password: &str) -> [u8; AES_KEY_LEN] {
    let mut key = [0u8; AES_KEY_LEN];
    let bytes = password.as_bytes();
    let len = bytes.len().min(AES_KEY_LEN);
    key[..len].copy_from_slice(&bytes[..len]);
    key
}

/// Encrypt with AES-256-CBC; the payload is base64(IV || ciphertext)
pub fn encrypt_aes(password: &str, plaintext: &str) -> Result<String> {
    if plaintext.is_empty() {
        return Ok(String::new());
    }

    let mut iv = [0u8; AES_IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(&aes_key(password), &iv)
        .map_err(|e| CoreError::crypto(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut payload = Vec::with_capacity(AES_IV_LEN + ciphertext.len());
    payload.extend_from_slice(&iv);
    payload.extend_from_slice(&ciphertext);
    Ok(B64.encode(payload))
}

/// Decrypt a base64(IV || ciphertext) AES-256-CBC payload
pub fn decrypt_aes(password: &str, payload: &str) -> Result<String> {
    if payload.is_empty() {
        return Ok(String::new());
    }

    let raw = B64
        .decode(payload.trim())
        .map_err(|e| CoreError::crypto(format!("invalid base64 payload: {e}")))?;
    if raw.len() < AES_IV_LEN * 2 || raw.len() % AES_IV_LEN != 0 {
        return Err(CoreError::crypto("AES payload has an invalid length"));
    }
    let (iv, ciphertext) = raw.split_at(AES_IV_LEN);

    let cipher = Aes256CbcDec::new_from_slices(&aes_key(password), iv)
        .map_err(|e| CoreError::crypto(e.to_string()))?;
    let plain = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CoreError::crypto("AES decryption failed (wrong password?)"))?;

    String::from_utf8(plain).map_err(|_| CoreError::crypto("decrypted value is not valid UTF-8"))
}

// =============================================================================
// RSA-OAEP
// =============================================================================

/// Generate a key pair, returned as base64 (PKIX public key, PKCS#1 private key)
pub fn generate_rsa_keys(bits: usize) -> Result<(String, String)> {
    let private_key =
        RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| CoreError::crypto(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let public_der = public_key
        .to_public_key_der()
        .map_err(|e| CoreError::crypto(e.to_string()))?;
    let private_der = private_key
        .to_pkcs1_der()
        .map_err(|e| CoreError::crypto(e.to_string()))?;

    Ok((B64.encode(public_der.as_bytes()), B64.encode(private_der.as_bytes())))
}

/// Encrypt with RSA-OAEP/SHA-256 under a base64 PKIX DER public key
pub fn encrypt_rsa(public_key: &str, plaintext: &str) -> Result<String> {
    let der = B64
        .decode(public_key.trim())
        .map_err(|e| CoreError::crypto(format!("invalid RSA public key encoding: {e}")))?;
    let key = RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| CoreError::crypto(format!("invalid RSA public key: {e}")))?;

    let encrypted = key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext.as_bytes())
        .map_err(|e| CoreError::crypto(e.to_string()))?;
    Ok(B64.encode(encrypted))
}

/// Decrypt an RSA-OAEP/SHA-256 payload with a base64 PKCS#1 DER private key
pub fn decrypt_rsa(private_key: &str, payload: &str) -> Result<String> {
    let der = B64
        .decode(private_key.trim())
        .map_err(|e| CoreError::crypto(format!("invalid RSA private key encoding: {e}")))?;
    let key = RsaPrivateKey::from_pkcs1_der(&der)
        .map_err(|e| CoreError::crypto(format!("invalid RSA private key: {e}")))?;

    let ciphertext = B64
        .decode(payload.trim())
        .map_err(|e| CoreError::crypto(format!("invalid base64 payload: {e}")))?;
    let plain = key
        .decrypt(Oaep::new::<Sha256>(), &ciphertext)
        .map_err(|e| CoreError::crypto(format!("RSA decryption failed: {e}")))?;

    String::from_utf8(plain).map_err(|_| CoreError::crypto("decrypted value is not valid UTF-8"))
}

// =============================================================================
// IN-PLACE FILE ENCRYPTION
// =============================================================================

/// Encrypt the plaintext entries of the `secrets:` section of a values file
///
/// Works line by line so comments, ordering and template lines elsewhere in
/// the file survive untouched. Returns `None` when nothing needed encrypting.
pub fn encrypt_secrets_section(content: &str, keys: &SecretKeys) -> Result<Option<String>> {
    let mut out = String::with_capacity(content.len());
    let mut in_section = false;
    let mut modified = false;

    for line in content.lines() {
        if line.trim() == "secrets:" {
            in_section = true;
            push_line(&mut out, line);
            continue;
        }
        if !in_section {
            push_line(&mut out, line);
            continue;
        }

        let trimmed = line.trim_start();
        if trimmed.starts_with("{{") || trimmed.starts_with('#') {
            push_line(&mut out, line);
            continue;
        }
        if !(line.starts_with(' ') || line.starts_with('\t')) {
            // Next top-level key ends the section
            in_section = false;
            push_line(&mut out, line);
            continue;
        }

        match line.split_once(':') {
            Some((key, raw)) => {
                let value = unquote(raw.trim());
                if value.is_empty() || is_encrypted(&value) {
                    push_line(&mut out, line);
                } else {
                    let encrypted = keys.encrypt(&value)?;
                    push_line(&mut out, &format!("{key}: {encrypted}"));
                    modified = true;
                }
            }
            None => push_line(&mut out, line),
        }
    }

    Ok(modified.then_some(out))
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn unquote(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw[1..raw.len() - 1].to_string());
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].replace("''", "'");
    }
    raw.to_string()
}
