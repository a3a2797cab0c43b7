//! Periodic HTTP reachability probe.

use std::time::Duration;

use tokio::task::JoinHandle;

use super::ConnectivityWatch;
use crate::util::is_http_url;

/// Probes a URL on an interval and publishes the result to a [`ConnectivityWatch`]
///
/// Any HTTP response, including error statuses, counts as reachable. Only
/// transport failures (DNS, refused connection, timeout) count as offline.
#[derive(Clone, Debug)]
pub struct ReachabilityProbe {
    url: String,
    interval: Duration,
    client: reqwest::Client,
}

impl ReachabilityProbe {
    pub fn new(url: impl Into<String>, interval: Duration, timeout: Duration) -> crate::Result<Self> {
        let url = url.into().trim().to_string();
        if !is_http_url(&url) {
            return Err(crate::Error::InvalidInput(format!(
                "reachability URL must include http:// or https://, got '{url}'"
            )));
        }
        if interval.is_zero() {
            return Err(crate::Error::InvalidInput(
                "reachability probe interval must be positive".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| crate::Error::Remote(error.into()))?;

        Ok(Self {
            url,
            interval,
            client,
        })
    }

    /// Probe once and publish the result
    pub async fn check(&self, watch: &ConnectivityWatch) -> bool {
        let reachable = match self.client.get(&self.url).send().await {
            Ok(response) => {
                tracing::trace!("Reachability probe got HTTP {}", response.status());
                true
            }
            Err(error) => {
                tracing::debug!("Reachability probe failed for {}: {}", self.url, error);
                false
            }
        };
        watch.set_connected(reachable);
        reachable
    }

    /// Run the probe loop in the background until the handle is stopped or dropped
    #[must_use]
    pub fn start(self, watch: ConnectivityWatch) -> ProbeHandle {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.check(&watch).await;
            }
        });
        ProbeHandle { task: Some(task) }
    }
}

/// Owner of a running probe task
#[derive(Debug)]
pub struct ProbeHandle {
    task: Option<JoinHandle<()>>,
}

impl ProbeHandle {
    /// Stop probing
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
