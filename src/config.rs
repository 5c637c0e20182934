//! Service configuration.
//!
//! Values come from command line flags or their environment variables
//! (`ASC_BASE_URL`, `ASC_TOKEN`, `ASC_POLL_INTERVAL_SECS`,
//! `ASC_POLL_TIMEOUT_SECS`).

use crate::delivery::{
    PollingConfig,
    utils::http::{ReqwestTransport, StaticTokenProvider},
};
use crate::error::CliError;
use anyhow::Context;
use std::{sync::Arc, time::Duration};
use url::Url;

/// Connection and polling settings for App Store Connect.
#[derive(Clone)]
pub struct UploaderConfig {
    pub base_url: Url,
    pub token: Option<String>,
    pub polling: PollingConfig,
}

impl UploaderConfig {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        poll_interval_secs: u64,
        poll_timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid App Store Connect base URL: {}", base_url))?;
        anyhow::ensure!(
            matches!(base_url.scheme(), "http" | "https"),
            "App Store Connect base URL must use http or https: {}",
            base_url
        );

        Ok(Self {
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            polling: PollingConfig {
                interval: Duration::from_secs(poll_interval_secs),
                timeout: Duration::from_secs(poll_timeout_secs),
            },
        })
    }

    /// The bearer credential; required before any request is sent.
    pub fn require_token(&self) -> Result<&str, CliError> {
        self.token.as_deref().ok_or_else(|| CliError::MissingArgument {
            argument: "--token (or ASC_TOKEN)".to_string(),
        })
    }

    /// Builds the authenticated transport.
    ///
    /// A missing token is tolerated so dry runs work offline; no request is
    /// ever sent in that case.
    pub fn transport(&self) -> crate::delivery::Result<ReqwestTransport> {
        let tokens = Arc::new(StaticTokenProvider::new(self.token.clone().unwrap_or_default()));
        ReqwestTransport::new(self.base_url.as_str(), tokens)
    }
}

impl std::fmt::Debug for UploaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploaderConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("polling", &self.polling)
            .finish()
    }
}
