//! Verification target resolution
//!
//! A `verify` invocation may select what to check with `--groupid` or `--id`.
//! The selectors are mutually exclusive; resolution normalizes them into one
//! unambiguous target before any signature work happens.

use crate::config::Config;
use crate::error::{Result, SigilError};
use crate::keypair::Keyring;
use crate::signing;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolved verification target, passed once to the verification service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationTarget {
    pub image_path: PathBuf,
    pub is_group: bool,
    pub object_id: u32,
    pub keyserver_url: String,
}

/// Normalize the two selectors into a target.
///
/// `0` means "unset" for both selectors, so group 0 and descriptor 0 cannot
/// be requested explicitly; descriptor 0 selects the image's primary object.
pub fn resolve_target(
    image_path: &Path,
    group_id: u32,
    descriptor_id: u32,
    keyserver_url: &str,
) -> Result<VerificationTarget> {
    if group_id != 0 && descriptor_id != 0 {
        return Err(SigilError::Validation(
            "only one of -i or -g may be set".into(),
        ));
    }

    let (is_group, object_id) = if group_id != 0 {
        (true, group_id)
    } else {
        (false, descriptor_id)
    };

    Ok(VerificationTarget {
        image_path: image_path.to_path_buf(),
        is_group,
        object_id,
        keyserver_url: keyserver_url.to_string(),
    })
}

/// Resolve the target and delegate to signature verification.
pub async fn run(image: &Path, group_id: u32, descriptor_id: u32, config: &Config) -> Result<()> {
    println!("Verifying image: {}", image.display());

    let target = resolve_target(image, group_id, descriptor_id, &config.keyserver.url)?;
    debug!(?target, "resolved verification target");

    let keyring = Keyring::new(&config.key_dir);
    let report = signing::verify(&target, &keyring, config.keyserver.auth_token.as_deref()).await?;

    println!(
        "Image is authentic: {} object(s) verified.",
        report.objects.len()
    );
    Ok(())
}
