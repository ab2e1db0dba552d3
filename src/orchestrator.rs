use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analyzer::Analyzer;
use crate::collector::Collector;
use crate::config::Config;
use crate::error::{DeviceUnavailableError, TransportError};
use crate::rules;
use crate::transport::{CommandSpec, DeviceSession, Transport};
use crate::types::{DeviceHandle, DeviceReport, FallbackReason, HealthSnapshot};

/// Fans scans out over a set of devices and gathers one report per device.
#[derive(Clone)]
pub struct Scanner {
    transport: Arc<dyn Transport>,
    collector: Arc<Collector>,
    analyzer: Arc<Analyzer>,
    max_concurrent: usize,
    scan_timeout: Duration,
    command_timeout: Duration,
}

impl Scanner {
    pub fn new(config: &Config, transport: Arc<dyn Transport>, analyzer: Arc<Analyzer>) -> Self {
        Self {
            transport,
            collector: Arc::new(Collector::new(config)),
            analyzer,
            max_concurrent: config.max_concurrent_scans.max(1),
            scan_timeout: config.scan_timeout(),
            command_timeout: config.command_timeout(),
        }
    }

    /// Reports come back in the order `devices` was given, one per entry,
    /// whatever happens to the individual scans.
    pub async fn scan(
        &self,
        devices: Vec<DeviceHandle>,
        cancel: CancellationToken,
    ) -> Vec<DeviceReport> {
        info!(
            devices = devices.len(),
            concurrency = self.max_concurrent,
            "Starting fleet scan"
        );
        let permits = Arc::new(Semaphore::new(self.max_concurrent));

        let mut tasks = Vec::with_capacity(devices.len());
        for device in devices {
            let scanner = self.clone();
            let permits = permits.clone();
            let device_cancel = cancel.child_token();
            let handle = device.clone();
            let task = tokio::spawn(async move {
                // the semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                scanner.scan_device(device, device_cancel).await
            });
            tasks.push((handle, task));
        }

        let mut reports = Vec::with_capacity(tasks.len());
        for (device, task) in tasks {
            match task.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(serial = %device.serial, error = %e, "Scan task failed");
                    let failure = DeviceUnavailableError {
                        serial: device.serial.clone(),
                        reason: format!("scan task failed: {e}"),
                    };
                    reports.push(unreachable_report(device, &failure));
                }
            }
        }
        info!(reports = reports.len(), "Fleet scan complete");
        reports
    }

    /// Preflight, collect, assess. A device gone at preflight yields an
    /// unreachable report without running the collector.
    pub async fn scan_device(&self, device: DeviceHandle, cancel: CancellationToken) -> DeviceReport {
        let collected_at = Utc::now();
        info!(serial = %device.serial, name = %device.display_name, "Scanning device");

        match self.preflight(&device, &cancel).await {
            Ok(()) => {}
            Err(TransportError::Cancelled) => {
                let snapshot = HealthSnapshot::unavailable(device.mode, "scan cancelled");
                let assessment = self.analyzer.fallback(&snapshot, FallbackReason::Cancelled);
                return DeviceReport::new(device, snapshot, assessment, collected_at);
            }
            Err(e) => {
                warn!(serial = %device.serial, error = %e, "Device failed preflight");
                let failure = DeviceUnavailableError {
                    serial: device.serial.clone(),
                    reason: e.to_string(),
                };
                return unreachable_report(device, &failure);
            }
        }

        let deadline = cancel.child_token();
        let timer = {
            let deadline = deadline.clone();
            let after = self.scan_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                deadline.cancel();
            })
        };
        let (snapshot, halted) = self
            .collector
            .collect(self.transport.as_ref(), &device, deadline.clone())
            .await;
        timer.abort();

        let assessment = match halted {
            Some(e @ TransportError::NotFound { .. }) => {
                warn!(
                    serial = %device.serial,
                    error = %e,
                    "Device lost mid-scan, skipping AI analysis"
                );
                let failure = DeviceUnavailableError {
                    serial: device.serial.clone(),
                    reason: e.to_string(),
                };
                self.analyzer.disconnected(&snapshot, &failure)
            }
            _ if deadline.is_cancelled() => {
                warn!(
                    serial = %device.serial,
                    timed_out = !cancel.is_cancelled(),
                    "Scan cut short, skipping AI analysis"
                );
                self.analyzer.fallback(&snapshot, FallbackReason::Cancelled)
            }
            _ => self.analyzer.analyze(&snapshot).await,
        };

        info!(
            serial = %device.serial,
            score = assessment.score,
            provenance = ?assessment.provenance,
            "Device report ready"
        );
        DeviceReport::new(device, snapshot, assessment, collected_at)
    }

    async fn preflight(
        &self,
        device: &DeviceHandle,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let mut session = DeviceSession::new(self.transport.as_ref(), device, cancel.clone());
        let state = session
            .run(&CommandSpec::new(&["get-state"], self.command_timeout))
            .await?;
        match state.stdout.trim() {
            "device" => Ok(()),
            other => Err(TransportError::NotFound {
                serial: format!("{} ({})", device.serial, other),
            }),
        }
    }
}

fn unreachable_report(device: DeviceHandle, failure: &DeviceUnavailableError) -> DeviceReport {
    let snapshot = HealthSnapshot::unavailable(device.mode, &failure.reason);
    DeviceReport::new(device, snapshot, rules::unreachable(failure), Utc::now())
}
