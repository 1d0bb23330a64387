//! Sign an object of a container image with a local key pair

use crate::config::Config;
use crate::error::{Result, SigilError};
use crate::interactive::Interact;
use crate::keypair::{Keyring, PublicKeyRecord};
use crate::signing;
use std::path::Path;
use tracing::debug;

fn select_key(keyring: &Keyring, fingerprint: Option<&str>) -> Result<PublicKeyRecord> {
    match fingerprint {
        Some(fp) => keyring
            .find(fp)?
            .ok_or_else(|| SigilError::KeyNotFound(fp.to_string())),
        None => keyring.list()?.into_iter().next().ok_or_else(|| {
            SigilError::Config("no local key pair; run 'sigil key newpair' first".into())
        }),
    }
}

/// Sign the image, recording the signature under the given descriptor and
/// group IDs. Passphrase-sealed keys are unlocked interactively.
pub fn run(
    image: &Path,
    id: u32,
    group_id: u32,
    fingerprint: Option<&str>,
    config: &Config,
    prompt: &mut dyn Interact,
) -> Result<()> {
    let keyring = Keyring::new(&config.key_dir);
    let record = select_key(&keyring, fingerprint)?;
    debug!("signing with key {}", record.fingerprint);

    let passphrase = if keyring.requires_passphrase(&record.fingerprint)? {
        prompt.ask_secret("Enter key passphrase : ")?
    } else {
        String::new()
    };
    let signing_key = keyring.unlock(&record.fingerprint, &passphrase)?;

    println!("Signing image: {}", image.display());
    let entry = signing::sign_object(image, id, group_id, &signing_key, &record)?;

    println!(
        "Created signature for object {} (group {}) as {}",
        entry.id, entry.group_id, record.identity
    );
    println!(
        "Signature written to {}",
        signing::manifest_path(image).display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyserverConfig;
    use crate::interactive::script::ScriptedPrompt;
    use crate::keypair::{KeyPairRequest, ED25519_KEY_LENGTH_BITS};
    use std::path::PathBuf;

    fn setup(passphrase: &str) -> (tempfile::TempDir, PathBuf, Config, String) {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("img.sif");
        std::fs::write(&image, b"payload").unwrap();

        let config = Config {
            key_dir: dir.path().join("keys"),
            keyserver: KeyserverConfig {
                url: "https://keys.example.com".into(),
                auth_token: None,
            },
        };

        let keyring = Keyring::new(&config.key_dir);
        let handle = keyring
            .generate(&KeyPairRequest {
                name: "Alice".into(),
                email: "alice@example.com".into(),
                comment: String::new(),
                passphrase: passphrase.into(),
                key_length_bits: ED25519_KEY_LENGTH_BITS,
                push_to_keystore: false,
            })
            .unwrap();

        (dir, image, config, handle.record.fingerprint)
    }

    #[test]
    fn signs_with_the_sole_local_key_without_prompting() {
        let (_dir, image, config, _fp) = setup("");

        let mut prompt = ScriptedPrompt::new(&[]);
        run(&image, 1, 1, None, &config, &mut prompt).unwrap();

        assert!(prompt.asked.is_empty());
        assert_eq!(signing::load_manifest(&image).unwrap().entries.len(), 1);
    }

    #[test]
    fn sealed_key_prompts_for_its_passphrase() {
        let (_dir, image, config, fp) = setup("hunter2");

        let mut prompt = ScriptedPrompt::new(&["hunter2"]);
        run(&image, 1, 1, Some(&fp), &config, &mut prompt).unwrap();
        assert_eq!(prompt.asked.len(), 1);

        let mut prompt = ScriptedPrompt::new(&["wrong"]);
        assert!(matches!(
            run(&image, 2, 1, Some(&fp), &config, &mut prompt),
            Err(SigilError::KeyUnlock(_))
        ));
    }

    #[test]
    fn empty_keyring_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("img.sif");
        std::fs::write(&image, b"payload").unwrap();
        let config = Config {
            key_dir: dir.path().join("keys"),
            keyserver: KeyserverConfig {
                url: "https://keys.example.com".into(),
                auth_token: None,
            },
        };

        let mut prompt = ScriptedPrompt::new(&[]);
        assert!(matches!(
            run(&image, 1, 1, None, &config, &mut prompt),
            Err(SigilError::Config(_))
        ));
    }

    #[test]
    fn unknown_fingerprint_is_reported() {
        let (_dir, image, config, _fp) = setup("");

        let mut prompt = ScriptedPrompt::new(&[]);
        assert!(matches!(
            run(&image, 1, 1, Some("nope"), &config, &mut prompt),
            Err(SigilError::KeyNotFound(_))
        ));
    }
}
