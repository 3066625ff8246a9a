use crate::engine::process::{ManagedProcess, ProcessRegistry};
use crate::engine::shell::{self, ShellCommand};
use crate::error::ActionError;
use anyhow::Context;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;

/// A single readiness check.
#[derive(Debug, Clone)]
pub enum Probe {
    /// GET returns a status in [200, 500).
    Http { url: String },
    /// The diagnostic command exits 0.
    Command(ShellCommand),
}

impl Probe {
    pub fn http(url: impl Into<String>) -> Self {
        Probe::Http { url: url.into() }
    }

    /// What the probe waits on, for error messages.
    pub fn target(&self) -> String {
        match self {
            Probe::Http { url } => url.clone(),
            Probe::Command(cmd) => cmd.display(),
        }
    }

    pub async fn check(&self, client: &Client, attempt_timeout: Duration) -> bool {
        match self {
            Probe::Http { url } => is_url_ready(client, url, attempt_timeout).await,
            Probe::Command(cmd) => tokio::time::timeout(attempt_timeout, shell::succeeds(cmd))
                .await
                .unwrap_or(false),
        }
    }
}

/// HTTP client for loopback probes. Proxies are bypassed; every target is local.
pub fn http_client() -> anyhow::Result<Client> {
    Client::builder()
        .no_proxy()
        .build()
        .context("build HTTP client")
}

/// Client error pages still prove the listener is up; 5xx and connection failures do not.
pub async fn is_url_ready(client: &Client, url: &str, timeout: Duration) -> bool {
    match client.get(url).timeout(timeout).send().await {
        Ok(resp) => (200..500).contains(&resp.status().as_u16()),
        Err(e) => {
            tracing::debug!(url, error = %e, "readiness probe failed");
            false
        }
    }
}

/// Parameters for a readiness polling loop.
pub(crate) struct PollParams<'a> {
    pub probe: &'a Probe,
    pub client: &'a Client,
    pub interval: Duration,
    pub attempt_timeout: Duration,
    pub timeout: Duration,
    /// When set, the loop fails fast once this process is gone.
    pub process: Option<&'a ManagedProcess>,
    pub registry: &'a ProcessRegistry,
}

/// Poll until the probe succeeds, the watched process dies, or `timeout` elapses.
///
/// Every attempt and sleep is clamped to the remaining budget, so the loop never
/// runs past its deadline.
pub(crate) async fn wait_until_ready(params: PollParams<'_>) -> Result<(), ActionError> {
    let PollParams {
        probe,
        client,
        interval,
        attempt_timeout,
        timeout,
        process,
        registry,
    } = params;
    let deadline = Instant::now() + timeout;
    let timed_out = || ActionError::Timeout {
        target: probe.target(),
        timeout,
    };

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out());
        }

        let ready = tokio::time::timeout(remaining, probe.check(client, attempt_timeout.min(remaining)))
            .await
            .unwrap_or(false);
        if ready {
            return Ok(());
        }

        if let Some(p) = process {
            if !registry.is_alive(Some(p)) {
                return Err(ActionError::ExitedEarly {
                    target: probe.target(),
                });
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out());
        }
        tokio::time::sleep(interval.min(remaining)).await;
    }
}
