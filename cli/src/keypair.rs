//! Local keyring: key-pair generation, storage, and unlocking
//!
//! Key pairs are Ed25519. Each pair is stored as two JSON files named by the
//! key fingerprint (SHA-256 of the verifying key): `<fp>.pub` with the public
//! record and `<fp>.key` with the seed. When the owner sets a passphrase the
//! seed is sealed with AES-256-GCM under an Argon2id-derived key; an empty
//! passphrase stores the seed as plain hex.

use crate::error::{Result, SigilError};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// The only key length the Ed25519 backend produces.
pub const ED25519_KEY_LENGTH_BITS: u32 = 256;

/// Fully resolved input to key-pair generation. Constructed once per
/// invocation by the parameter collector; immutable afterwards.
#[derive(Debug, Clone)]
pub struct KeyPairRequest {
    pub name: String,
    pub email: String,
    pub comment: String,
    pub passphrase: String,
    pub key_length_bits: u32,
    pub push_to_keystore: bool,
}

impl KeyPairRequest {
    /// Owner identity in the conventional `Name (comment) <email>` form.
    pub fn identity(&self) -> String {
        if self.comment.is_empty() {
            format!("{} <{}>", self.name, self.email)
        } else {
            format!("{} ({}) <{}>", self.name, self.comment, self.email)
        }
    }
}

/// Public half of a key pair as stored on disk and pushed to the keystore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    pub fingerprint: String,
    pub identity: String,
    pub algorithm: String,
    pub created_at: String,
    /// Hex-encoded 32-byte Ed25519 verifying key
    pub public_key: String,
}

impl PublicKeyRecord {
    /// Decode the verifying key from its hex form.
    pub fn verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey> {
        parse_verifying_key(&self.public_key)
    }
}

/// Parse a hex-encoded Ed25519 verifying key.
pub fn parse_verifying_key(hex_key: &str) -> Result<ed25519_dalek::VerifyingKey> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| SigilError::Config(format!("Invalid public key hex: {}", e)))?;

    if bytes.len() != 32 {
        return Err(SigilError::Config(format!(
            "Public key must be 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&bytes);

    ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| SigilError::Config(format!("Invalid Ed25519 public key: {}", e)))
}

/// Handle to a freshly generated key pair.
#[derive(Debug, Clone)]
pub struct KeyHandle {
    pub record: PublicKeyRecord,
    pub public_path: PathBuf,
    pub secret_path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct SecretKeyFile {
    fingerprint: String,
    /// Plain hex seed, present only for passphrase-less keys
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sealed: Option<SealedSeed>,
}

#[derive(Serialize, Deserialize)]
struct SealedSeed {
    kdf: String,
    salt: String,
    nonce: String,
    ciphertext: String,
}

/// A directory of key pairs
pub struct Keyring {
    dir: PathBuf,
}

impl Keyring {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Keyring { dir: dir.into() }
    }

    fn public_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.pub"))
    }

    fn secret_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.key"))
    }

    /// Generate a new key pair from a resolved request and store both halves.
    pub fn generate(&self, request: &KeyPairRequest) -> Result<KeyHandle> {
        if request.key_length_bits != ED25519_KEY_LENGTH_BITS {
            return Err(SigilError::Generation(format!(
                "unsupported key length {} (Ed25519 keys are {} bits)",
                request.key_length_bits, ED25519_KEY_LENGTH_BITS
            )));
        }

        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = signing_key.verifying_key();

        let fingerprint = hex::encode(Sha256::digest(verifying_key.to_bytes()));

        let record = PublicKeyRecord {
            fingerprint: fingerprint.clone(),
            identity: request.identity(),
            algorithm: "ed25519".into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            public_key: hex::encode(verifying_key.to_bytes()),
        };

        let secret = if request.passphrase.is_empty() {
            SecretKeyFile {
                fingerprint: fingerprint.clone(),
                seed: Some(hex::encode(signing_key.to_bytes())),
                sealed: None,
            }
        } else {
            SecretKeyFile {
                fingerprint: fingerprint.clone(),
                seed: None,
                sealed: Some(seal_seed(&signing_key.to_bytes(), &request.passphrase)?),
            }
        };

        fs::create_dir_all(&self.dir)?;

        let public_path = self.public_path(&fingerprint);
        let secret_path = self.secret_path(&fingerprint);

        fs::write(&public_path, serde_json::to_string_pretty(&record)?)?;
        fs::write(&secret_path, serde_json::to_string_pretty(&secret)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&secret_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&secret_path, perms)?;
        }

        debug!("Stored key pair {} in {:?}", fingerprint, self.dir);

        Ok(KeyHandle {
            record,
            public_path,
            secret_path,
        })
    }

    /// List all public key records in the keyring, ordered by fingerprint.
    pub fn list(&self) -> Result<Vec<PublicKeyRecord>> {
        let mut records = Vec::new();

        if !self.dir.exists() {
            return Ok(records);
        }

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "pub").unwrap_or(false) {
                let record: PublicKeyRecord = serde_json::from_str(&fs::read_to_string(&path)?)?;
                records.push(record);
            }
        }

        records.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(records)
    }

    /// Look up a public key record by fingerprint.
    pub fn find(&self, fingerprint: &str) -> Result<Option<PublicKeyRecord>> {
        let path = self.public_path(fingerprint);
        if !path.exists() {
            return Ok(None);
        }
        let record: PublicKeyRecord = serde_json::from_str(&fs::read_to_string(&path)?)?;
        Ok(Some(record))
    }

    /// Whether the secret key for a fingerprint is passphrase-sealed.
    pub fn requires_passphrase(&self, fingerprint: &str) -> Result<bool> {
        let path = self.secret_path(fingerprint);
        if !path.exists() {
            return Err(SigilError::KeyNotFound(fingerprint.to_string()));
        }
        let secret: SecretKeyFile = serde_json::from_str(&fs::read_to_string(&path)?)?;
        Ok(secret.sealed.is_some())
    }

    /// Load and unseal the signing key for a fingerprint.
    pub fn unlock(&self, fingerprint: &str, passphrase: &str) -> Result<SigningKey> {
        let path = self.secret_path(fingerprint);
        if !path.exists() {
            return Err(SigilError::KeyNotFound(fingerprint.to_string()));
        }

        let secret: SecretKeyFile = serde_json::from_str(&fs::read_to_string(&path)?)?;

        let seed_bytes = match (&secret.seed, &secret.sealed) {
            (Some(seed), _) => hex::decode(seed)
                .map_err(|e| SigilError::KeyUnlock(format!("malformed seed: {e}")))?,
            (None, Some(sealed)) => open_seed(sealed, passphrase)?,
            (None, None) => {
                return Err(SigilError::KeyUnlock(format!(
                    "secret key file for {fingerprint} holds no key material"
                )))
            }
        };

        let bytes: [u8; 32] = seed_bytes
            .try_into()
            .map_err(|_| SigilError::KeyUnlock("seed must be 32 bytes".into()))?;

        Ok(SigningKey::from_bytes(&bytes))
    }
}

fn derive_sealing_key(passphrase: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| SigilError::Generation(format!("passphrase derivation failed: {e}")))?;
    Ok(key)
}

fn seal_seed(seed: &[u8; 32], passphrase: &str) -> Result<SealedSeed> {
    let mut salt = [0u8; 16];
    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_sealing_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| SigilError::Generation(format!("sealing key setup failed: {e}")))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), seed.as_slice())
        .map_err(|_| SigilError::Generation("secret key sealing failed".into()))?;

    Ok(SealedSeed {
        kdf: "argon2id".into(),
        salt: hex::encode(salt),
        nonce: hex::encode(nonce),
        ciphertext: hex::encode(ciphertext),
    })
}

fn open_seed(sealed: &SealedSeed, passphrase: &str) -> Result<Vec<u8>> {
    let salt = hex::decode(&sealed.salt)
        .map_err(|e| SigilError::KeyUnlock(format!("malformed salt: {e}")))?;
    let nonce = hex::decode(&sealed.nonce)
        .map_err(|e| SigilError::KeyUnlock(format!("malformed nonce: {e}")))?;
    let ciphertext = hex::decode(&sealed.ciphertext)
        .map_err(|e| SigilError::KeyUnlock(format!("malformed ciphertext: {e}")))?;

    let key = derive_sealing_key(passphrase, &salt)
        .map_err(|e| SigilError::KeyUnlock(e.to_string()))?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| SigilError::KeyUnlock(format!("sealing key setup failed: {e}")))?;

    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| SigilError::KeyUnlock("wrong passphrase or corrupted key file".into()))
}
