use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::netdiag::NetworkDiagnostics;
use crate::parsers;
use crate::transport::{CommandSpec, DeviceSession, Transport};
use crate::types::{
    AppInventory, BatteryMetrics, CpuMetrics, DeviceHandle, DeviceInfo, ErrorLogs, HealthSnapshot,
    MemoryMetrics, MetricField, StorageMetrics,
};

const TOP_CONSUMERS: usize = 10;

/// Runs the fixed battery of diagnostic commands against one device.
///
/// Groups are collected in a fixed order (device info, battery, storage,
/// memory, cpu, network, apps, logs) and independently of one another: a
/// failed command only blanks the fields it feeds.
#[derive(Debug, Clone)]
pub struct Collector {
    tracked_mounts: Vec<String>,
    max_log_lines: usize,
    command_timeout: Duration,
    network: NetworkDiagnostics,
}

impl Collector {
    pub fn new(config: &Config) -> Self {
        Self {
            tracked_mounts: config.tracked_mounts.clone(),
            max_log_lines: config.max_log_lines,
            command_timeout: config.command_timeout(),
            network: NetworkDiagnostics::new(config.probes.clone(), config.command_timeout()),
        }
    }

    /// Returns the snapshot together with the error that halted the session
    /// early, if any: the device going missing or the scan being cancelled.
    pub async fn collect(
        &self,
        transport: &dyn Transport,
        device: &DeviceHandle,
        cancel: CancellationToken,
    ) -> (HealthSnapshot, Option<TransportError>) {
        let mut session = DeviceSession::new(transport, device, cancel);

        let device_info = self.device_info(&mut session).await;
        let battery = self.battery(&mut session).await;
        let storage = self.storage(&mut session).await;
        let memory = self.memory(&mut session).await;
        let cpu = self.cpu(&mut session).await;
        let network = self.network.probe(&mut session).await;
        let apps = self.apps(&mut session).await;
        let logs = self.logs(&mut session).await;

        let snapshot = HealthSnapshot {
            device_info,
            battery,
            storage,
            memory,
            cpu,
            network,
            apps,
            logs,
        };

        let halted = session.halted().cloned();
        match &halted {
            Some(reason) => warn!(
                serial = %device.serial,
                reason = %reason,
                "Collection stopped early"
            ),
            None => info!(
                serial = %device.serial,
                missing = ?snapshot.missing_groups(),
                "Collection complete"
            ),
        }
        (snapshot, halted)
    }

    async fn fetch(
        &self,
        session: &mut DeviceSession<'_>,
        command: CommandSpec,
    ) -> Result<String, String> {
        match session.run(&command).await {
            Ok(raw) => Ok(raw.stdout),
            Err(e) => {
                warn!(
                    serial = %session.device().serial,
                    command = %command,
                    error = %e,
                    "Command failed"
                );
                Err(e.to_string())
            }
        }
    }

    fn shell(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::shell(args, self.command_timeout)
    }

    async fn device_info(&self, session: &mut DeviceSession<'_>) -> DeviceInfo {
        match self.fetch(session, self.shell(&["getprop"])).await {
            Ok(raw) => parsers::parse_getprop(&raw),
            Err(reason) => DeviceInfo::unavailable(&reason),
        }
    }

    async fn battery(&self, session: &mut DeviceSession<'_>) -> BatteryMetrics {
        match self.fetch(session, self.shell(&["dumpsys", "battery"])).await {
            Ok(raw) => parsers::parse_battery(&raw),
            Err(reason) => BatteryMetrics::unavailable(&reason),
        }
    }

    async fn storage(&self, session: &mut DeviceSession<'_>) -> StorageMetrics {
        match self.fetch(session, self.shell(&["df", "-k"])).await {
            Ok(raw) => StorageMetrics {
                mounts: MetricField::from_result(parsers::parse_df(&raw, &self.tracked_mounts)),
            },
            Err(reason) => StorageMetrics::unavailable(&reason),
        }
    }

    async fn memory(&self, session: &mut DeviceSession<'_>) -> MemoryMetrics {
        let (total_kb, available_kb, used_ratio) =
            match self.fetch(session, self.shell(&["cat", "/proc/meminfo"])).await {
                Ok(raw) => parsers::parse_meminfo(&raw),
                Err(reason) => (
                    MetricField::unavailable(&reason),
                    MetricField::unavailable(&reason),
                    MetricField::unavailable(&reason),
                ),
            };

        let top_consumers = match self.fetch(session, self.shell(&["dumpsys", "meminfo"])).await {
            Ok(raw) => MetricField::from_result(parsers::parse_top_memory(&raw, TOP_CONSUMERS)),
            Err(reason) => MetricField::unavailable(reason),
        };

        MemoryMetrics {
            total_kb,
            available_kb,
            used_ratio,
            top_consumers,
        }
    }

    async fn cpu(&self, session: &mut DeviceSession<'_>) -> CpuMetrics {
        match self.fetch(session, self.shell(&["dumpsys", "cpuinfo"])).await {
            Ok(raw) => parsers::parse_cpuinfo(&raw, TOP_CONSUMERS),
            Err(reason) => CpuMetrics::unavailable(&reason),
        }
    }

    /// Counts come from two listings: every package, and third-party only.
    async fn apps(&self, session: &mut DeviceSession<'_>) -> AppInventory {
        let all = match self.fetch(session, self.shell(&["pm", "list", "packages"])).await {
            Ok(raw) => {
                let packages = parsers::parse_package_list(&raw);
                if packages.is_empty() {
                    Err("empty package listing".to_string())
                } else {
                    Ok(packages)
                }
            }
            Err(reason) => Err(reason),
        };
        let third_party = self
            .fetch(session, self.shell(&["pm", "list", "packages", "-3"]))
            .await
            .map(|raw| parsers::parse_package_list(&raw));

        let system_count = match (&all, &third_party) {
            (Ok(all), Ok(third)) => {
                let third: HashSet<&String> = third.iter().collect();
                MetricField::Ok(all.iter().filter(|p| !third.contains(p)).count())
            }
            (Err(reason), _) | (_, Err(reason)) => MetricField::unavailable(reason.as_str()),
        };

        AppInventory {
            total_count: MetricField::from_result(all.as_ref().map(Vec::len)),
            system_count,
            third_party_count: MetricField::from_result(third_party.as_ref().map(Vec::len)),
            third_party_packages: MetricField::from_result(third_party),
        }
    }

    async fn logs(&self, session: &mut DeviceSession<'_>) -> ErrorLogs {
        let command = CommandSpec::new(&["logcat", "-d", "*:E"], self.command_timeout);
        match self.fetch(session, command).await {
            Ok(raw) => parsers::parse_logcat(&raw, self.max_log_lines),
            Err(reason) => ErrorLogs::unavailable(&reason),
        }
    }
}
