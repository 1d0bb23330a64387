//! Key-pair provisioning: parameter collection and orchestration
//!
//! `key newpair` resolves its parameters from a mix of explicit flags and
//! interactive prompts, generates the key pair, and optionally publishes the
//! public key. A flag that was passed is used verbatim, including an empty
//! string; only omitted flags fall back to a prompt.

use crate::config::Config;
use crate::error::{Result, SigilError};
use crate::interactive::{Answer, Interact};
use crate::keypair::{KeyPairRequest, Keyring};
use crate::keystore::{ClientOpts, KeyserverClient, KeyserverOp};
use indicatif::ProgressBar;
use std::time::Duration;
use tracing::debug;

/// Flag values for `key newpair`. `None` means the flag was not passed.
#[derive(Debug, Clone, Default)]
pub struct NewpairFlags {
    pub name: Option<String>,
    pub email: Option<String>,
    pub comment: Option<String>,
    pub password: Option<String>,
    pub push: Option<bool>,
    pub bits: u32,
}

/// Produce a fully populated request, prompting for whatever was omitted.
///
/// An empty passphrase from the prompt needs an explicit confirmation; the
/// user declining it fails collection before anything is generated.
pub fn collect_input(flags: &NewpairFlags, prompt: &mut dyn Interact) -> Result<KeyPairRequest> {
    let name = match &flags.name {
        Some(name) => name.clone(),
        None => prompt.ask("Enter your name (e.g., John Doe) : ")?,
    };

    let email = match &flags.email {
        Some(email) => email.clone(),
        None => prompt.ask("Enter your email address (e.g., john.doe@example.com) : ")?,
    };

    let comment = match &flags.comment {
        Some(comment) => comment.clone(),
        None => prompt.ask("Enter optional comment (e.g., development keys) : ")?,
    };

    let passphrase = match &flags.password {
        Some(password) => password.clone(),
        None => {
            let passphrase = prompt.ask_passphrase("Enter a passphrase : ", 3)?;
            if passphrase.is_empty() {
                let answer = prompt.ask_yes_no(
                    Answer::No,
                    "WARNING: if there is no passphrase set, your key is not secure. Do you want to continue? [y/n] ",
                )?;
                if answer == Answer::No {
                    return Err(SigilError::PassphraseRejected);
                }
            }
            passphrase
        }
    };

    let push_to_keystore = match flags.push {
        Some(push) => push,
        None => {
            prompt.ask_yes_no(Answer::Yes, "Would you like to push it to the keystore? [Y,n] ")?
                == Answer::Yes
        }
    };

    Ok(KeyPairRequest {
        name,
        email,
        comment,
        passphrase,
        key_length_bits: flags.bits,
        push_to_keystore,
    })
}

/// Collect parameters, generate the key pair, and publish it when requested.
///
/// A publish failure does not invalidate the freshly generated key pair: it
/// is reported and the command still succeeds.
pub async fn run(flags: &NewpairFlags, config: &Config, prompt: &mut dyn Interact) -> Result<()> {
    let request = collect_input(flags, prompt)?;
    debug!(identity = %request.identity(), push = request.push_to_keystore, "collected key parameters");

    let keyring = Keyring::new(&config.key_dir);

    let spinner = ProgressBar::new_spinner();
    spinner.set_message("Generating Ed25519 key pair...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    let handle = match keyring.generate(&request) {
        Ok(handle) => handle,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };
    spinner.finish_and_clear();

    println!("Generated key pair {}", handle.record.fingerprint);
    println!("  identity: {}", handle.record.identity);
    println!("  public:   {}", handle.public_path.display());
    println!("  secret:   {}", handle.secret_path.display());

    if !request.push_to_keystore {
        println!("NOT pushing newly created key to: {}", config.keyserver.url);
        return Ok(());
    }

    // Only touch the endpoint when a push was requested. Failing to build
    // the client options is a configuration problem and aborts; a failed
    // push is only reported.
    let opts = ClientOpts::new(
        &config.keyserver.url,
        config.keyserver.auth_token.as_deref(),
        KeyserverOp::Push,
    )?;
    let client = KeyserverClient::new(opts)?;

    match client.push_public_key(&handle.record).await {
        Ok(()) => println!("Key successfully pushed to: {}", config.keyserver.url),
        Err(e) => println!("Failed to push newly created key to keystore: {e}"),
    }

    Ok(())
}
