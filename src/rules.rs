//! Local rule engine used whenever the inference backend cannot be used.
//!
//! Evaluation is a pure function of the snapshot and the policy: it never
//! fails and always yields the same assessment for the same input.

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::config::RulePolicy;
use crate::error::DeviceUnavailableError;
use crate::types::{
    Assessment, BatteryHealth, FallbackReason, HealthSnapshot, Issue, Provenance, Severity,
};

pub mod category {
    pub const BATTERY_THERMAL: &str = "battery-thermal";
    pub const BATTERY_LEVEL: &str = "battery-level";
    pub const BATTERY_HEALTH: &str = "battery-health";
    pub const STORAGE_LOW: &str = "storage-low";
    pub const MEMORY_PRESSURE: &str = "memory-pressure";
    pub const CPU_LOAD: &str = "cpu-load";
    pub const NETWORK_SIGNAL: &str = "network-signal";
    pub const NETWORK_LATENCY: &str = "network-latency";
    pub const NETWORK_DNS: &str = "network-dns";
    pub const ERROR_LOGS: &str = "error-logs";
    pub const COLLECTION_GAPS: &str = "collection-gaps";
    pub const DEVICE_UNREACHABLE: &str = "device-unreachable";
}

pub const NO_ACTION: &str = "No immediate action required";

lazy_static! {
    static ref RECOMMENDATIONS: HashMap<&'static str, &'static str> = [
        (category::BATTERY_THERMAL, "Let the device cool down and avoid charging while under heavy load"),
        (category::BATTERY_LEVEL, "Charge the device soon"),
        (category::BATTERY_HEALTH, "Consider battery replacement"),
        (category::STORAGE_LOW, "Free up space or move data to external storage"),
        (category::MEMORY_PRESSURE, "Close background apps to free memory"),
        (category::CPU_LOAD, "Identify and stop apps with sustained CPU usage"),
        (category::NETWORK_SIGNAL, "Move closer to the router or check for interference"),
        (category::NETWORK_LATENCY, "Check the upstream connection and router load"),
        (category::NETWORK_DNS, "Verify DNS settings on the device and the network"),
        (category::ERROR_LOGS, "Review crashing apps in the error log and update or remove them"),
        (category::COLLECTION_GAPS, "Re-run the scan with the device unlocked and connected"),
        (category::DEVICE_UNREACHABLE, "Reconnect the device and confirm USB debugging is authorized"),
    ]
    .into_iter()
    .collect();
}

/// Generic advice for an issue category, if the category is known.
pub fn recommendation_for(category: &str) -> Option<&'static str> {
    RECOMMENDATIONS.get(category).copied()
}

struct Finding {
    issue: Issue,
    deduction: u8,
}

impl Finding {
    fn new(severity: Severity, category: &str, description: String, deduction: u8) -> Self {
        Self {
            issue: Issue {
                severity,
                category: category.to_string(),
                description,
            },
            deduction,
        }
    }
}

type Rule = fn(&HealthSnapshot, &RulePolicy) -> Option<Finding>;

// Order here is the order issues are reported in.
const RULES: &[Rule] = &[
    battery_thermal,
    battery_level,
    battery_health,
    storage_low,
    memory_pressure,
    cpu_load,
    network_signal,
    network_latency,
    network_dns,
    error_logs,
    collection_gaps,
];

pub fn evaluate(
    snapshot: &HealthSnapshot,
    policy: &RulePolicy,
    reason: FallbackReason,
) -> Assessment {
    let findings: Vec<Finding> = RULES
        .iter()
        .filter_map(|rule| rule(snapshot, policy))
        .collect();

    let deducted: i32 = findings.iter().map(|f| f.deduction as i32).sum();
    let score = (100 - deducted).clamp(0, 100) as u8;
    let issues: Vec<Issue> = findings.into_iter().map(|f| f.issue).collect();

    build(score, issues, reason)
}

/// Assessment for a device that vanished before anything was collected.
pub fn unreachable(error: &DeviceUnavailableError) -> Assessment {
    build(0, vec![unreachable_issue(error)], FallbackReason::DeviceUnreachable)
}

/// Assessment for a device that vanished part way through collection. Rule
/// findings on the groups already collected are kept after the unreachable
/// issue; the score is zero either way.
pub fn disconnected(
    snapshot: &HealthSnapshot,
    policy: &RulePolicy,
    error: &DeviceUnavailableError,
) -> Assessment {
    let mut issues = vec![unreachable_issue(error)];
    issues.extend(
        RULES
            .iter()
            .filter_map(|rule| rule(snapshot, policy))
            .map(|f| f.issue),
    );
    build(0, issues, FallbackReason::DeviceUnreachable)
}

fn unreachable_issue(error: &DeviceUnavailableError) -> Issue {
    Issue {
        severity: Severity::Critical,
        category: category::DEVICE_UNREACHABLE.to_string(),
        description: format!("{} could not be reached: {}", error.serial, error.reason),
    }
}

fn build(score: u8, issues: Vec<Issue>, reason: FallbackReason) -> Assessment {
    let mut recommendations: Vec<String> = Vec::new();
    for issue in &issues {
        if let Some(rec) = recommendation_for(&issue.category) {
            if !recommendations.iter().any(|r| r == rec) {
                recommendations.push(rec.to_string());
            }
        }
    }
    if recommendations.is_empty() {
        recommendations.push(NO_ACTION.to_string());
    }

    Assessment {
        score,
        summary: format!(
            "Device health score is {}/100. Found {} issue(s) requiring attention.",
            score,
            issues.len()
        ),
        issues,
        recommendations,
        provenance: Provenance::RuleBased,
        fallback_reason: Some(reason),
    }
}

fn battery_thermal(s: &HealthSnapshot, p: &RulePolicy) -> Option<Finding> {
    let temp = *s.battery.temperature_c.ok()?;
    (temp > p.battery_temp_max_c).then(|| {
        Finding::new(
            Severity::Warning,
            category::BATTERY_THERMAL,
            format!(
                "Battery temperature is {:.1}°C, above the {:.1}°C limit",
                temp, p.battery_temp_max_c
            ),
            p.battery_thermal_deduction,
        )
    })
}

fn battery_level(s: &HealthSnapshot, p: &RulePolicy) -> Option<Finding> {
    let level = *s.battery.level_percent.ok()?;
    (level < p.battery_level_min).then(|| {
        Finding::new(
            Severity::Warning,
            category::BATTERY_LEVEL,
            format!("Battery level is low at {}%", level),
            p.battery_level_deduction,
        )
    })
}

fn battery_health(s: &HealthSnapshot, p: &RulePolicy) -> Option<Finding> {
    let health = *s.battery.health.ok()?;
    // an unknown code says nothing about the cell
    if matches!(health, BatteryHealth::Good | BatteryHealth::Unknown) {
        return None;
    }
    Some(Finding::new(
        Severity::Critical,
        category::BATTERY_HEALTH,
        format!("Battery health is reported as {:?}", health),
        p.battery_health_deduction,
    ))
}

fn storage_low(s: &HealthSnapshot, p: &RulePolicy) -> Option<Finding> {
    let mount = s.storage.min_free_percent()?;
    (mount.free_percent < p.storage_free_min_percent).then(|| {
        Finding::new(
            Severity::Critical,
            category::STORAGE_LOW,
            format!(
                "{} has only {:.1}% free space ({} KiB)",
                mount.mount, mount.free_percent, mount.free_kb
            ),
            p.storage_low_deduction,
        )
    })
}

fn memory_pressure(s: &HealthSnapshot, p: &RulePolicy) -> Option<Finding> {
    let available = 1.0 - *s.memory.used_ratio.ok()?;
    (available < p.memory_available_min_ratio).then(|| {
        Finding::new(
            Severity::Warning,
            category::MEMORY_PRESSURE,
            format!("Only {:.1}% of memory is available", available * 100.0),
            p.memory_pressure_deduction,
        )
    })
}

fn cpu_load(s: &HealthSnapshot, p: &RulePolicy) -> Option<Finding> {
    let load = s.cpu.load.ok()?;
    (load.one > p.cpu_load_max).then(|| {
        Finding::new(
            Severity::Warning,
            category::CPU_LOAD,
            format!("1-minute load average is {:.2}", load.one),
            p.cpu_load_deduction,
        )
    })
}

fn network_signal(s: &HealthSnapshot, p: &RulePolicy) -> Option<Finding> {
    let wifi = s.network.wifi.ok()?;
    (wifi.rssi_dbm < p.signal_min_dbm).then(|| {
        Finding::new(
            Severity::Info,
            category::NETWORK_SIGNAL,
            format!("WiFi signal on {} is weak (RSSI: {}dBm)", wifi.ssid, wifi.rssi_dbm),
            p.weak_signal_deduction,
        )
    })
}

fn network_latency(s: &HealthSnapshot, p: &RulePolicy) -> Option<Finding> {
    let sample = s.network.latency.ok()?;
    (sample.avg_ms > p.latency_max_ms).then(|| {
        Finding::new(
            Severity::Info,
            category::NETWORK_LATENCY,
            format!(
                "Average round trip to {} is {:.1} ms",
                sample.target, sample.avg_ms
            ),
            p.latency_deduction,
        )
    })
}

fn network_dns(s: &HealthSnapshot, p: &RulePolicy) -> Option<Finding> {
    let resolved = *s.network.dns_resolution.ok()?;
    (!resolved).then(|| {
        Finding::new(
            Severity::Warning,
            category::NETWORK_DNS,
            "DNS resolution failed for every probed host".to_string(),
            p.dns_failure_deduction,
        )
    })
}

fn error_logs(s: &HealthSnapshot, p: &RulePolicy) -> Option<Finding> {
    let total = *s.logs.total_errors.ok()?;
    let fatal = s.logs.fatal_count.ok().copied().unwrap_or(0);
    (total > p.error_log_max || fatal > p.fatal_log_max).then(|| {
        Finding::new(
            Severity::Warning,
            category::ERROR_LOGS,
            format!("{} error log lines, {} fatal", total, fatal),
            p.error_log_deduction,
        )
    })
}

fn collection_gaps(s: &HealthSnapshot, _: &RulePolicy) -> Option<Finding> {
    let missing = s.missing_groups();
    (!missing.is_empty()).then(|| {
        Finding::new(
            Severity::Info,
            category::COLLECTION_GAPS,
            format!("Could not collect: {}", missing.join(", ")),
            0,
        )
    })
}
