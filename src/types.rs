use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Usb,
    Wifi,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub serial: String,
    pub mode: TransportMode,
    pub display_name: String,
}

impl DeviceHandle {
    pub fn new(serial: impl Into<String>, display_name: impl Into<String>) -> Self {
        let serial = serial.into();
        // adb names network-attached devices host:port
        let mode = if serial.contains(':') {
            TransportMode::Wifi
        } else {
            TransportMode::Usb
        };
        Self {
            serial,
            mode,
            display_name: display_name.into(),
        }
    }
}

/// A single collected value. Nothing in a snapshot is stored bare: a value is
/// either `Ok` or carries the reason it could not be collected.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum MetricField<T> {
    Ok(T),
    Unavailable { reason: String },
}

impl<T> MetricField<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        MetricField::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn from_option(value: Option<T>, reason: impl Into<String>) -> Self {
        match value {
            Some(v) => MetricField::Ok(v),
            None => MetricField::unavailable(reason),
        }
    }

    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => MetricField::Ok(v),
            Err(e) => MetricField::unavailable(e.to_string()),
        }
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            MetricField::Ok(v) => Some(v),
            MetricField::Unavailable { .. } => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, MetricField::Ok(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MetricField<U> {
        match self {
            MetricField::Ok(v) => MetricField::Ok(f(v)),
            MetricField::Unavailable { reason } => MetricField::Unavailable { reason },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub model: MetricField<String>,
    pub brand: MetricField<String>,
    pub device: MetricField<String>,
    pub android_version: MetricField<String>,
    pub sdk_level: MetricField<u32>,
    pub build_id: MetricField<String>,
    pub serial: MetricField<String>,
    pub hardware: MetricField<String>,
}

impl DeviceInfo {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            model: MetricField::unavailable(reason),
            brand: MetricField::unavailable(reason),
            device: MetricField::unavailable(reason),
            android_version: MetricField::unavailable(reason),
            sdk_level: MetricField::unavailable(reason),
            build_id: MetricField::unavailable(reason),
            serial: MetricField::unavailable(reason),
            hardware: MetricField::unavailable(reason),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChargingState {
    Unknown,
    Charging,
    Discharging,
    NotCharging,
    Full,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatteryHealth {
    Unknown,
    Good,
    Overheat,
    Dead,
    OverVoltage,
    Failure,
    Cold,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    Ac,
    Usb,
    Wireless,
    Battery,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatteryMetrics {
    pub level_percent: MetricField<u8>,
    pub temperature_c: MetricField<f32>,
    pub charging: MetricField<ChargingState>,
    pub health: MetricField<BatteryHealth>,
    pub voltage_mv: MetricField<u32>,
    pub technology: MetricField<String>,
    pub power_source: MetricField<PowerSource>,
}

impl BatteryMetrics {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            level_percent: MetricField::unavailable(reason),
            temperature_c: MetricField::unavailable(reason),
            charging: MetricField::unavailable(reason),
            health: MetricField::unavailable(reason),
            voltage_mv: MetricField::unavailable(reason),
            technology: MetricField::unavailable(reason),
            power_source: MetricField::unavailable(reason),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MountUsage {
    pub mount: String,
    pub filesystem: String,
    pub total_kb: u64,
    pub used_kb: u64,
    pub free_kb: u64,
    pub free_percent: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StorageMetrics {
    pub mounts: MetricField<Vec<MountUsage>>,
}

impl StorageMetrics {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            mounts: MetricField::unavailable(reason),
        }
    }

    /// Lowest free percentage over all tracked mounts.
    pub fn min_free_percent(&self) -> Option<&MountUsage> {
        self.mounts.ok()?.iter().min_by(|a, b| {
            a.free_percent
                .partial_cmp(&b.free_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProcessUsage {
    pub process: String,
    pub pid: Option<u32>,
    pub value: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MemoryMetrics {
    pub total_kb: MetricField<u64>,
    pub available_kb: MetricField<u64>,
    pub used_ratio: MetricField<f64>,
    /// Resident set per process in KiB.
    pub top_consumers: MetricField<Vec<ProcessUsage>>,
}

impl MemoryMetrics {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            total_kb: MetricField::unavailable(reason),
            available_kb: MetricField::unavailable(reason),
            used_ratio: MetricField::unavailable(reason),
            top_consumers: MetricField::unavailable(reason),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CpuMetrics {
    pub load: MetricField<LoadAverage>,
    /// CPU percent per process.
    pub top_consumers: MetricField<Vec<ProcessUsage>>,
}

impl CpuMetrics {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            load: MetricField::unavailable(reason),
            top_consumers: MetricField::unavailable(reason),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    Ghz2_4,
    #[serde(rename = "5GHz")]
    Ghz5,
    #[serde(rename = "6GHz")]
    Ghz6,
    #[serde(rename = "unknown")]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalTier {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WifiState {
    pub ssid: String,
    pub rssi_dbm: i32,
    pub frequency_mhz: u32,
    pub band: Band,
    pub signal: SignalTier,
    pub signal_percent: u8,
    pub link_speed_mbps: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LatencySample {
    pub target: String,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub packet_loss_percent: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DnsCheck {
    pub host: String,
    pub resolved: MetricField<bool>,
    pub address: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NetworkMetrics {
    pub connection: TransportMode,
    pub wifi: MetricField<WifiState>,
    pub ip_address: MetricField<String>,
    pub latency: MetricField<LatencySample>,
    pub dns_resolution: MetricField<bool>,
    pub dns_checks: Vec<DnsCheck>,
}

impl NetworkMetrics {
    pub fn unavailable(connection: TransportMode, reason: &str) -> Self {
        Self {
            connection,
            wifi: MetricField::unavailable(reason),
            ip_address: MetricField::unavailable(reason),
            latency: MetricField::unavailable(reason),
            dns_resolution: MetricField::unavailable(reason),
            dns_checks: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppInventory {
    pub total_count: MetricField<usize>,
    pub system_count: MetricField<usize>,
    pub third_party_count: MetricField<usize>,
    pub third_party_packages: MetricField<Vec<String>>,
}

impl AppInventory {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            total_count: MetricField::unavailable(reason),
            system_count: MetricField::unavailable(reason),
            third_party_count: MetricField::unavailable(reason),
            third_party_packages: MetricField::unavailable(reason),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorLogs {
    pub total_errors: MetricField<usize>,
    pub fatal_count: MetricField<usize>,
    pub recent: MetricField<Vec<String>>,
}

impl ErrorLogs {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            total_errors: MetricField::unavailable(reason),
            fatal_count: MetricField::unavailable(reason),
            recent: MetricField::unavailable(reason),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub device_info: DeviceInfo,
    pub battery: BatteryMetrics,
    pub storage: StorageMetrics,
    pub memory: MemoryMetrics,
    pub cpu: CpuMetrics,
    pub network: NetworkMetrics,
    pub apps: AppInventory,
    pub logs: ErrorLogs,
}

impl HealthSnapshot {
    /// Snapshot for a device that could not be reached at all.
    pub fn unavailable(connection: TransportMode, reason: &str) -> Self {
        Self {
            device_info: DeviceInfo::unavailable(reason),
            battery: BatteryMetrics::unavailable(reason),
            storage: StorageMetrics::unavailable(reason),
            memory: MemoryMetrics::unavailable(reason),
            cpu: CpuMetrics::unavailable(reason),
            network: NetworkMetrics::unavailable(connection, reason),
            apps: AppInventory::unavailable(reason),
            logs: ErrorLogs::unavailable(reason),
        }
    }

    /// Names of groups in which not a single field was collected.
    pub fn missing_groups(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.device_info.model.is_ok() && !self.device_info.android_version.is_ok() {
            missing.push("device_info");
        }
        let b = &self.battery;
        if !b.level_percent.is_ok() && !b.temperature_c.is_ok() && !b.health.is_ok() {
            missing.push("battery");
        }
        if !self.storage.mounts.is_ok() {
            missing.push("storage");
        }
        if !self.memory.total_kb.is_ok() && !self.memory.top_consumers.is_ok() {
            missing.push("memory");
        }
        if !self.cpu.load.is_ok() && !self.cpu.top_consumers.is_ok() {
            missing.push("cpu");
        }
        let n = &self.network;
        if !n.wifi.is_ok() && !n.latency.is_ok() && !n.dns_resolution.is_ok() {
            missing.push("network");
        }
        if !self.apps.total_count.is_ok() && !self.apps.third_party_count.is_ok() {
            missing.push("apps");
        }
        if !self.logs.total_errors.is_ok() {
            missing.push("logs");
        }
        missing
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Issue {
    pub severity: Severity,
    pub category: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Ai,
    RuleBased,
}

/// Why the AI path was abandoned.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    NotConfigured,
    RateLimited,
    Timeout,
    Network,
    ServerError,
    Rejected,
    MalformedResponse,
    Cancelled,
    DeviceUnreachable,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: u8,
    pub summary: String,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<String>,
    pub provenance: Provenance,
    pub fallback_reason: Option<FallbackReason>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeviceReport {
    pub report_id: Uuid,
    pub device: DeviceHandle,
    pub snapshot: HealthSnapshot,
    pub assessment: Assessment,
    pub collected_at: DateTime<Utc>,
}

impl DeviceReport {
    pub fn new(
        device: DeviceHandle,
        snapshot: HealthSnapshot,
        assessment: Assessment,
        collected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            device,
            snapshot,
            assessment,
            collected_at,
        }
    }
}
