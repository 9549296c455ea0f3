//! Connectivity probing
//!
//! Feeds the shared `Connectivity` signal that gates sync queue flushes.

use crate::error::{NetworkError, NetworkResult};
use futures::future::{self, FutureExt};
use reqwest::Client as ReqwestClient;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tradecost_config::NetworkConfig;
use tradecost_core::Connectivity;

/// Upper bound for a single probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probes a list of URLs and publishes the result
#[derive(Clone)]
pub struct ConnectivityChecker {
    client: ReqwestClient,
    check_urls: Vec<String>,
    connectivity: Connectivity,
}

impl ConnectivityChecker {
    /// Creates a checker probing `urls`
    ///
    /// With no URLs the device is always considered online.
    pub fn new(client: ReqwestClient, urls: Vec<String>, connectivity: Connectivity) -> Self {
        Self {
            client,
            check_urls: urls,
            connectivity,
        }
    }

    /// Creates a checker from the `[network]` config section
    pub fn from_config(config: &NetworkConfig, connectivity: Connectivity) -> NetworkResult<Self> {
        let client = ReqwestClient::builder()
            .timeout(config.request_timeout().min(PROBE_TIMEOUT))
            .user_agent(&config.user_agent)
            .build()
            .map_err(NetworkError::Http)?;

        Ok(Self::new(client, config.connectivity_urls.clone(), connectivity))
    }

    /// Returns the signal this checker updates
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Returns true if any probe URL answers
    ///
    /// Any HTTP response counts, whatever its status.
    pub async fn is_online(&self) -> bool {
        if self.check_urls.is_empty() {
            return true;
        }

        let probes = self.check_urls.iter().map(|url| {
            let request = self.client.head(url).send();
            async move {
                request.await.map(|_| ()).map_err(|e| {
                    log::debug!("Connectivity probe {} failed: {}", url, e);
                })
            }
            .boxed()
        });

        future::select_ok(probes).await.is_ok()
    }

    /// Probes and returns an error if offline
    pub async fn check(&self) -> NetworkResult<()> {
        if self.refresh().await {
            Ok(())
        } else {
            Err(NetworkError::NetworkUnavailable)
        }
    }

    /// Probes and publishes the result to the connectivity signal
    pub async fn refresh(&self) -> bool {
        let online = self.is_online().await;
        self.connectivity.set_online(online);
        online
    }

    /// Probes now and then every `interval` on the current Tokio runtime
    pub fn spawn(self, interval: Duration) -> MonitorHandle {
        let (stop, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        self.refresh().await;
                    }
                }
            }

            log::debug!("Connectivity monitor stopped");
        });

        MonitorHandle { stop, task }
    }
}

/// Handle to a running connectivity monitor
#[derive(Debug)]
pub struct MonitorHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stops the monitor and waits for it to exit
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            log::warn!("Connectivity monitor ended abnormally: {}", e);
        }
    }
}
