//! Keystore client: publish and fetch public keys
//!
//! The keystore speaks a small JSON protocol: `POST /v1/keys` uploads a
//! public-key record, `GET /v1/keys/<fingerprint>` retrieves one. Client
//! options are constructed per operation so that configuration problems
//! (bad URL, missing auth token for a push) surface before any network
//! traffic happens.

use crate::error::{Result, SigilError};
use crate::keypair::PublicKeyRecord;
use std::time::Duration;
use tracing::debug;

/// Operation a client is being configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyserverOp {
    /// Uploading a public key; requires an auth token.
    Push,
    /// Fetching a public key; anonymous access is fine.
    Lookup,
}

/// Validated options for talking to a keystore endpoint.
#[derive(Debug, Clone)]
pub struct ClientOpts {
    base_url: reqwest::Url,
    auth_token: Option<String>,
}

impl ClientOpts {
    /// Validate the endpoint for an operation.
    ///
    /// Failures here are configuration problems, not transient network
    /// errors, and callers treat them as fatal.
    pub fn new(url: &str, auth_token: Option<&str>, op: KeyserverOp) -> Result<Self> {
        let base_url = reqwest::Url::parse(url)
            .map_err(|e| SigilError::Config(format!("invalid keyserver URL {url:?}: {e}")))?;

        if op == KeyserverOp::Push && auth_token.is_none() {
            return Err(SigilError::Config(format!(
                "pushing to {url} requires an auth token (set {} or keyserver.auth_token)",
                crate::config::AUTH_TOKEN_ENV
            )));
        }

        Ok(ClientOpts {
            base_url,
            auth_token: auth_token.map(|t| t.to_string()),
        })
    }
}

/// HTTP client bound to one keystore endpoint.
pub struct KeyserverClient {
    client: reqwest::Client,
    opts: ClientOpts,
}

impl KeyserverClient {
    pub fn new(opts: ClientOpts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("sigil/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SigilError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(KeyserverClient { client, opts })
    }

    fn endpoint(&self, path: &str) -> Result<reqwest::Url> {
        self.opts
            .base_url
            .join(path)
            .map_err(|e| SigilError::Config(format!("invalid keyserver path {path:?}: {e}")))
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.opts.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Upload a public-key record.
    pub async fn push_public_key(&self, record: &PublicKeyRecord) -> Result<()> {
        let url = self.endpoint("/v1/keys")?;
        debug!("Pushing key {} to {}", record.fingerprint, url);

        self.authorized(self.client.post(url))
            .json(record)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SigilError::Publish(e.to_string()))?;

        Ok(())
    }

    /// Fetch the public-key record for a fingerprint.
    pub async fn fetch_public_key(&self, fingerprint: &str) -> Result<PublicKeyRecord> {
        let url = self.endpoint(&format!("/v1/keys/{fingerprint}"))?;
        debug!("Fetching key {} from {}", fingerprint, url);

        let response = self
            .authorized(self.client.get(url))
            .send()
            .await?
            .error_for_status()
            .map_err(|_| SigilError::KeyNotFound(fingerprint.to_string()))?;

        let record: PublicKeyRecord = response.json().await?;

        if record.fingerprint != fingerprint {
            return Err(SigilError::Verification(format!(
                "keyserver returned key {} for requested fingerprint {}",
                record.fingerprint, fingerprint
            )));
        }

        Ok(record)
    }
}
