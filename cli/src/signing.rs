//! Object signing and signature verification over image manifests
//!
//! Signatures for a container image live in a JSON manifest next to the image
//! (`<image>.sig`). Each entry describes one signed object as a byte range of
//! the image file together with its SHA-256 digest, an Ed25519 signature over
//! that digest, and the signer's key fingerprint. The image's own binary
//! layout is never parsed.

use crate::error::{Result, SigilError};
use crate::keypair::{Keyring, PublicKeyRecord};
use crate::keystore::{ClientOpts, KeyserverClient, KeyserverOp};
use crate::verify::VerificationTarget;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MANIFEST_VERSION: u32 = 1;

/// Signature manifest stored alongside an image (`<image>.sig`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureManifest {
    pub version: u32,
    pub entries: Vec<SignatureEntry>,
}

/// One signed object within an image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureEntry {
    /// Descriptor ID, nonzero
    pub id: u32,

    /// Signature group this object belongs to
    pub group_id: u32,

    /// Marks the object selected when no descriptor ID is given
    pub primary: bool,

    /// Byte range of the object within the image file
    pub offset: u64,
    pub size: u64,

    /// SHA-256 of the object bytes (hex-encoded)
    pub sha256: String,

    /// Ed25519 signature over the 32-byte digest (hex-encoded)
    pub signature: String,

    /// Fingerprint of the signing key
    pub fingerprint: String,

    /// Signer identity at signing time
    pub signer: String,

    /// Signing timestamp
    pub signed_at: String,
}

/// Outcome of a verification run: every object that was checked.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub objects: Vec<VerifiedObject>,
}

#[derive(Debug, Clone)]
pub struct VerifiedObject {
    pub id: u32,
    pub group_id: u32,
    pub fingerprint: String,
    pub signer: String,
}

/// Path of the signature manifest for an image.
pub fn manifest_path(image: &Path) -> PathBuf {
    let mut os = image.as_os_str().to_os_string();
    os.push(".sig");
    PathBuf::from(os)
}

/// Load the manifest for an image.
pub fn load_manifest(image: &Path) -> Result<SignatureManifest> {
    let path = manifest_path(image);
    if !path.exists() {
        return Err(SigilError::Verification(format!(
            "no signatures found for {} ({} is missing)",
            image.display(),
            path.display()
        )));
    }

    let manifest: SignatureManifest = serde_json::from_str(&fs::read_to_string(&path)?)?;
    if manifest.version != MANIFEST_VERSION {
        return Err(SigilError::Verification(format!(
            "unsupported signature manifest version {}",
            manifest.version
        )));
    }

    Ok(manifest)
}

fn save_manifest(image: &Path, manifest: &SignatureManifest) -> Result<()> {
    let path = manifest_path(image);
    fs::write(&path, serde_json::to_string_pretty(manifest)?)?;
    debug!("Wrote signature manifest {:?}", path);
    Ok(())
}

/// SHA-256 over a byte range of the image file.
fn hash_object(image: &Path, offset: u64, size: u64) -> Result<Vec<u8>> {
    let mut file = File::open(image)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut hasher = Sha256::new();
    let copied = std::io::copy(&mut file.by_ref().take(size), &mut hasher)?;

    if copied != size {
        return Err(SigilError::Verification(format!(
            "object data truncated: expected {size} bytes at offset {offset}, found {copied}"
        )));
    }

    Ok(hasher.finalize().to_vec())
}

/// Sign an object of the image and record it in the manifest.
///
/// The object covers the whole image file. The entry keeps (or acquires) the
/// primary flag when no other entry holds it; re-signing an existing
/// descriptor ID replaces its entry in place.
pub fn sign_object(
    image: &Path,
    id: u32,
    group_id: u32,
    signing_key: &SigningKey,
    record: &PublicKeyRecord,
) -> Result<SignatureEntry> {
    if id == 0 {
        return Err(SigilError::Validation(
            "descriptor IDs start at 1".into(),
        ));
    }

    let size = fs::metadata(image)?.len();
    let digest = hash_object(image, 0, size)?;
    let signature = signing_key.sign(&digest);

    let mut manifest = if manifest_path(image).exists() {
        load_manifest(image)?
    } else {
        SignatureManifest {
            version: MANIFEST_VERSION,
            entries: Vec::new(),
        }
    };

    let primary = manifest
        .entries
        .iter()
        .all(|e| !e.primary || e.id == id);

    manifest.entries.retain(|e| e.id != id);
    let entry = SignatureEntry {
        id,
        group_id,
        primary,
        offset: 0,
        size,
        sha256: hex::encode(&digest),
        signature: hex::encode(signature.to_bytes()),
        fingerprint: record.fingerprint.clone(),
        signer: record.identity.clone(),
        signed_at: chrono::Utc::now().to_rfc3339(),
    };
    manifest.entries.push(entry.clone());
    manifest.entries.sort_by_key(|e| e.id);

    save_manifest(image, &manifest)?;

    Ok(entry)
}

/// Pick the manifest entries a target selects.
fn select_entries<'a>(
    manifest: &'a SignatureManifest,
    target: &VerificationTarget,
) -> Result<Vec<&'a SignatureEntry>> {
    if target.is_group {
        let hits: Vec<_> = manifest
            .entries
            .iter()
            .filter(|e| e.group_id == target.object_id)
            .collect();
        if hits.is_empty() {
            return Err(SigilError::Verification(format!(
                "no signatures for group {}",
                target.object_id
            )));
        }
        return Ok(hits);
    }

    if target.object_id == 0 {
        // Descriptor ID 0 doubles as "unset"; it selects the primary object.
        return manifest
            .entries
            .iter()
            .find(|e| e.primary)
            .map(|e| vec![e])
            .ok_or_else(|| SigilError::Verification("no primary signature object".into()));
    }

    manifest
        .entries
        .iter()
        .find(|e| e.id == target.object_id)
        .map(|e| vec![e])
        .ok_or_else(|| {
            SigilError::Verification(format!(
                "no signature for descriptor {}",
                target.object_id
            ))
        })
}

/// Resolve the verifying key for an entry: local keyring first, then the
/// keyserver named by the target.
async fn resolve_key(
    entry: &SignatureEntry,
    keyring: &Keyring,
    target: &VerificationTarget,
    auth_token: Option<&str>,
) -> Result<PublicKeyRecord> {
    if let Some(record) = keyring.find(&entry.fingerprint)? {
        return Ok(record);
    }

    info!(
        "Key {} not in local keyring, fetching from {}",
        entry.fingerprint, target.keyserver_url
    );
    let opts = ClientOpts::new(&target.keyserver_url, auth_token, KeyserverOp::Lookup)?;
    let client = KeyserverClient::new(opts)?;
    client.fetch_public_key(&entry.fingerprint).await
}

/// Verify the signature(s) an already-resolved target selects.
pub async fn verify(
    target: &VerificationTarget,
    keyring: &Keyring,
    auth_token: Option<&str>,
) -> Result<VerificationReport> {
    let manifest = load_manifest(&target.image_path)?;
    let selected = select_entries(&manifest, target)?;

    let mut objects = Vec::new();
    for entry in selected {
        let digest = hash_object(&target.image_path, entry.offset, entry.size)?;
        let actual = hex::encode(&digest);
        if actual != entry.sha256 {
            return Err(SigilError::HashMismatch {
                expected: entry.sha256.clone(),
                actual,
            });
        }

        let record = resolve_key(entry, keyring, target, auth_token).await?;
        let verifying_key = record.verifying_key()?;

        let signature_bytes = hex::decode(&entry.signature)
            .map_err(|e| SigilError::Verification(format!("malformed signature hex: {e}")))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|e| SigilError::Verification(format!("malformed signature: {e}")))?;

        verifying_key
            .verify(&digest, &signature)
            .map_err(|_| SigilError::SignatureVerification)?;

        println!("✓ object {} verified, signed by {}", entry.id, entry.signer);

        objects.push(VerifiedObject {
            id: entry.id,
            group_id: entry.group_id,
            fingerprint: entry.fingerprint.clone(),
            signer: entry.signer.clone(),
        });
    }

    Ok(VerificationReport { objects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::{KeyPairRequest, ED25519_KEY_LENGTH_BITS};
    use crate::verify::resolve_target;
    use std::io::Write;

    fn fixture() -> (tempfile::TempDir, PathBuf, Keyring, crate::keypair::KeyHandle) {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("img.sif");
        let mut file = File::create(&image).unwrap();
        file.write_all(b"container image payload").unwrap();

        let keyring = Keyring::new(dir.path().join("keys"));
        let handle = keyring
            .generate(&KeyPairRequest {
                name: "Alice".into(),
                email: "alice@example.com".into(),
                comment: String::new(),
                passphrase: String::new(),
                key_length_bits: ED25519_KEY_LENGTH_BITS,
                push_to_keystore: false,
            })
            .unwrap();

        (dir, image, keyring, handle)
    }

    fn sign_fixture(
        image: &Path,
        keyring: &Keyring,
        handle: &crate::keypair::KeyHandle,
        id: u32,
        group_id: u32,
    ) {
        let key = keyring.unlock(&handle.record.fingerprint, "").unwrap();
        sign_object(image, id, group_id, &key, &handle.record).unwrap();
    }

    #[test]
    fn signing_writes_a_primary_entry() {
        let (_dir, image, keyring, handle) = fixture();
        sign_fixture(&image, &keyring, &handle, 1, 1);

        let manifest = load_manifest(&image).unwrap();
        assert_eq!(manifest.entries.len(), 1);
        let entry = &manifest.entries[0];
        assert_eq!(entry.id, 1);
        assert_eq!(entry.group_id, 1);
        assert!(entry.primary);
        assert_eq!(entry.fingerprint, handle.record.fingerprint);
    }

    #[test]
    fn only_the_first_entry_is_primary() {
        let (_dir, image, keyring, handle) = fixture();
        sign_fixture(&image, &keyring, &handle, 1, 1);
        sign_fixture(&image, &keyring, &handle, 2, 1);

        let manifest = load_manifest(&image).unwrap();
        assert_eq!(manifest.entries.len(), 2);
        assert!(manifest.entries[0].primary);
        assert!(!manifest.entries[1].primary);
    }

    #[tokio::test]
    async fn verifies_primary_descriptor_and_group() {
        let (_dir, image, keyring, handle) = fixture();
        sign_fixture(&image, &keyring, &handle, 1, 1);
        sign_fixture(&image, &keyring, &handle, 2, 1);

        // default target: descriptor 0 selects the primary object
        let target = resolve_target(&image, 0, 0, "https://keys.example.com").unwrap();
        let report = verify(&target, &keyring, None).await.unwrap();
        assert_eq!(report.objects.len(), 1);
        assert_eq!(report.objects[0].id, 1);

        // explicit descriptor
        let target = resolve_target(&image, 0, 2, "https://keys.example.com").unwrap();
        let report = verify(&target, &keyring, None).await.unwrap();
        assert_eq!(report.objects.len(), 1);
        assert_eq!(report.objects[0].id, 2);

        // group selects every member
        let target = resolve_target(&image, 1, 0, "https://keys.example.com").unwrap();
        let report = verify(&target, &keyring, None).await.unwrap();
        assert_eq!(report.objects.len(), 2);
    }

    #[tokio::test]
    async fn tampered_image_is_a_hash_mismatch() {
        let (_dir, image, keyring, handle) = fixture();
        sign_fixture(&image, &keyring, &handle, 1, 1);

        let mut file = std::fs::OpenOptions::new().write(true).open(&image).unwrap();
        file.write_all(b"tampered").unwrap();

        let target = resolve_target(&image, 0, 0, "https://keys.example.com").unwrap();
        assert!(matches!(
            verify(&target, &keyring, None).await,
            Err(SigilError::HashMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn corrupted_signature_fails_verification() {
        let (_dir, image, keyring, handle) = fixture();
        sign_fixture(&image, &keyring, &handle, 1, 1);

        let mut manifest = load_manifest(&image).unwrap();
        // a valid-length signature that was not produced over this digest
        manifest.entries[0].signature = hex::encode([0u8; 64]);
        save_manifest(&image, &manifest).unwrap();

        let target = resolve_target(&image, 0, 0, "https://keys.example.com").unwrap();
        assert!(matches!(
            verify(&target, &keyring, None).await,
            Err(SigilError::SignatureVerification)
        ));
    }

    #[tokio::test]
    async fn unknown_group_and_descriptor_are_reported() {
        let (_dir, image, keyring, handle) = fixture();
        sign_fixture(&image, &keyring, &handle, 1, 1);

        let target = resolve_target(&image, 9, 0, "https://keys.example.com").unwrap();
        assert!(matches!(
            verify(&target, &keyring, None).await,
            Err(SigilError::Verification(_))
        ));

        let target = resolve_target(&image, 0, 9, "https://keys.example.com").unwrap();
        assert!(matches!(
            verify(&target, &keyring, None).await,
            Err(SigilError::Verification(_))
        ));
    }

    #[tokio::test]
    async fn missing_manifest_is_reported() {
        let (_dir, image, keyring, _handle) = fixture();
        let target = resolve_target(&image, 0, 0, "https://keys.example.com").unwrap();
        assert!(matches!(
            verify(&target, &keyring, None).await,
            Err(SigilError::Verification(_))
        ));
    }
}
