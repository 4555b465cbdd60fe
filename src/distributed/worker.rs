// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::application::{run_executors, Application};
use crate::config::{Address, AppOptions};
use crate::connectors::{connect_with_retry, NetworkSettings};
use crate::distributed::protocol::{loopback_for, reachable, unexpected, ControlChannel, ControlMessage, Endpoints};
use crate::engine::{FragmentExecutor, RunReport};
use crate::errors::{ExecutionError, TransportError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

static WORKER_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// Runs the fragments the driver assigns to this process.
#[derive(Debug, Clone)]
pub struct Worker {
    id: String,
    driver: Address,
    driver_override: Option<SocketAddr>,
    bind_host: String,
    targets: Vec<String>,
}

impl Worker {
    pub fn from_options(options: &AppOptions) -> Self {
        let sequence = WORKER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("worker-{}-{}", std::process::id(), sequence),
            driver: options.driver_address.clone(),
            driver_override: None,
            bind_host: options.worker_address.host.clone(),
            targets: options.worker_targets.clone(),
        }
    }

    /// Connects to `address` instead of resolving the configured driver address.
    pub fn with_driver(mut self, address: SocketAddr) -> Self {
        self.driver_override = Some(address);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn driver_addr(&self) -> Result<SocketAddr, ExecutionError> {
        let address = match self.driver_override {
            Some(address) => address,
            None => tokio::net::lookup_host(self.driver.to_string())
                .await
                .map_err(TransportError::from)?
                .next()
                .ok_or_else(|| ExecutionError::Protocol {
                    reason: format!("driver address '{}' did not resolve", self.driver),
                })?,
        };
        Ok(reachable(address, loopback_for(address)))
    }

    async fn open(&self, settings: &NetworkSettings) -> Result<ControlChannel, ExecutionError> {
        let address = self.driver_addr().await?;
        let stream = connect_with_retry("driver", address, settings).await?;
        Ok(ControlChannel::new(stream, address))
    }

    /// Registers with the driver, runs the assigned fragments, and returns
    /// once the driver says to shut down.
    pub async fn run(self, app: Application) -> Result<Vec<RunReport>, ExecutionError> {
        let parts = app.into_parts();
        let mut channel = self.open(&parts.settings).await?;
        channel
            .send(&ControlMessage::Register {
                worker_id: self.id.clone(),
                targets: self.targets.clone(),
            })
            .await?;
        let assigned = match channel.recv().await? {
            ControlMessage::Assign { fragments } => fragments,
            other => return Err(unexpected("assign", &other)),
        };
        tracing::info!(worker = %self.id, fragments = assigned.join(","), "Worker received {} fragment(s)", assigned.len());

        let transport = CancellationToken::new();
        let _transport_guard = transport.clone().drop_guard();

        let (mut executors, bound) = match self.bind(parts.executors(assigned, &transport)).await {
            Ok(ready) => ready,
            Err(err) => {
                let _ = channel
                    .send(&ControlMessage::Failed {
                        reason: err.to_string(),
                    })
                    .await;
                return Err(err);
            }
        };
        channel.send(&ControlMessage::Bound { endpoints: bound }).await?;

        let endpoints: HashMap<String, SocketAddr> = match channel.recv().await? {
            ControlMessage::Connect { endpoints } => endpoints.into_iter().collect(),
            ControlMessage::Shutdown => return Ok(Vec::new()),
            other => return Err(unexpected("connect", &other)),
        };

        let mut failures = Vec::new();
        let mut ready = Vec::with_capacity(executors.len());
        for mut executor in executors.drain(..) {
            let prepared = match executor.connect(&endpoints).await {
                Ok(()) => executor.initialize(),
                Err(err) => Err(err),
            };
            match prepared {
                Ok(()) => ready.push(executor),
                Err(err) => failures.push((executor.name().to_string(), err.to_string())),
            }
        }

        let (reports, mut run_failures) = run_executors(ready).await;
        failures.append(&mut run_failures);
        for report in &reports {
            channel
                .send(&ControlMessage::Finished {
                    fragment: report.fragment.clone(),
                    error: None,
                })
                .await?;
        }
        for (fragment, reason) in &failures {
            channel
                .send(&ControlMessage::Finished {
                    fragment: fragment.clone(),
                    error: Some(reason.clone()),
                })
                .await?;
        }

        loop {
            match channel.recv().await {
                Ok(ControlMessage::Shutdown) => break,
                Ok(other) => tracing::debug!(worker = %self.id, kind = other.kind(), "Ignoring frame while finishing"),
                Err(err) => {
                    tracing::debug!(worker = %self.id, error = %err, "Driver left without shutdown");
                    break;
                }
            }
        }
        transport.cancel();

        if failures.is_empty() {
            Ok(reports)
        } else {
            Err(ExecutionError::FragmentsFailed { failures })
        }
    }

    async fn bind(
        &self,
        executors: Result<Vec<FragmentExecutor>, ExecutionError>,
    ) -> Result<(Vec<FragmentExecutor>, Endpoints), ExecutionError> {
        let mut executors = executors?;
        let mut endpoints = Endpoints::new();
        for executor in &mut executors {
            endpoints.extend(executor.bind(&self.bind_host).await?);
        }
        Ok((executors, endpoints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workers_get_distinct_ids() {
        let options = AppOptions::default().with_targets("f1, f2");
        let first = Worker::from_options(&options);
        let second = Worker::from_options(&options);

        assert_ne!(first.id(), second.id());
        assert_eq!(first.targets, vec!["f1".to_string(), "f2".to_string()]);
        assert_eq!(first.bind_host, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_unspecified_driver_override_connects_over_loopback() {
        let worker = Worker::from_options(&AppOptions::default()).with_driver("0.0.0.0:9100".parse().unwrap());

        assert_eq!(worker.driver_addr().await.unwrap(), "127.0.0.1:9100".parse().unwrap());
    }
}
