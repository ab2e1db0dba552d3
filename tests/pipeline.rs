use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use droidpulse::analyzer::{Analyzer, InferenceBackend, InferenceRequest};
use droidpulse::collector::Collector;
use droidpulse::config::{AiConfig, Config};
use droidpulse::error::{AnalysisBackendError, TransportError};
use droidpulse::orchestrator::Scanner;
use droidpulse::rules::category;
use droidpulse::simulate::{SimulatedDevice, SimulatedTransport};
use droidpulse::types::{DeviceHandle, FallbackReason, MetricField, Provenance};

const HOT_BATTERY: &str = "\
Current Battery Service state:
  AC powered: true
  USB powered: false
  status: 2
  health: 2
  level: 64
  scale: 100
  voltage: 4210
  temperature: 450
  technology: Li-ion
";

const FULL_DISK: &str = "\
Filesystem        1K-blocks     Used Available Use% Mounted on
/dev/block/dm-42  100000000 97000000   3000000  97% /data
/dev/fuse         100000000 97000000   3000000  97% /storage/emulated
";

/// Answers every request the same way and counts them.
struct CountingBackend {
    reply: Result<String, AnalysisBackendError>,
    calls: AtomicU32,
}

impl CountingBackend {
    fn new(reply: Result<String, AnalysisBackendError>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for CountingBackend {
    async fn infer(&self, _: &InferenceRequest) -> Result<String, AnalysisBackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

fn ai_settings() -> AiConfig {
    AiConfig {
        api_key: Some("test-key".to_string()),
        retry_delay_ms: 1,
        ..AiConfig::default()
    }
}

fn rule_only(config: &Config) -> Arc<Analyzer> {
    Arc::new(Analyzer::new(None, config.ai.clone(), config.rules.clone()))
}

fn handle(serial: &str) -> DeviceHandle {
    DeviceHandle::new(serial, format!("Handset {serial}"))
}

#[tokio::test]
async fn log_collection_failure_only_blanks_logs() {
    let config = Config::default();
    let transport = Arc::new(SimulatedTransport::new().with_device(
        "dev-1",
        SimulatedDevice::healthy().with_failure(
            "logcat",
            TransportError::Timeout {
                after: Duration::from_secs(30),
            },
        ),
    ));
    let scanner = Scanner::new(&config, transport, rule_only(&config));

    let report = scanner
        .scan_device(handle("dev-1"), CancellationToken::new())
        .await;

    assert_eq!(report.snapshot.missing_groups(), vec!["logs"]);
    assert!(!report.snapshot.logs.fatal_count.is_ok());
    assert!(!report.snapshot.logs.recent.is_ok());
    assert!(report.snapshot.battery.level_percent.is_ok());
    assert!(report.snapshot.network.latency.is_ok());

    let assessment = &report.assessment;
    assert_eq!(assessment.provenance, Provenance::RuleBased);
    assert_eq!(assessment.score, 100);
    assert_eq!(assessment.issues.len(), 1);
    assert_eq!(assessment.issues[0].category, category::COLLECTION_GAPS);
    assert!(!assessment.recommendations.is_empty());
}

#[tokio::test]
async fn hot_battery_and_full_disk_yield_two_issues() {
    let config = Config::default();
    let transport = Arc::new(
        SimulatedTransport::new().with_device(
            "dev-1",
            SimulatedDevice::healthy()
                .with_output("shell dumpsys battery", HOT_BATTERY)
                .with_output("shell df -k", FULL_DISK),
        ),
    );
    let scanner = Scanner::new(&config, transport, rule_only(&config));

    let report = scanner
        .scan_device(handle("dev-1"), CancellationToken::new())
        .await;

    assert_eq!(report.snapshot.battery.temperature_c, MetricField::Ok(45.0));
    let categories: Vec<&str> = report
        .assessment
        .issues
        .iter()
        .map(|i| i.category.as_str())
        .collect();
    assert_eq!(categories, vec![category::BATTERY_THERMAL, category::STORAGE_LOW]);
    assert!(report.assessment.score < 100);
    assert_eq!(report.assessment.provenance, Provenance::RuleBased);
    assert_eq!(
        report.assessment.fallback_reason,
        Some(FallbackReason::NotConfigured)
    );
}

#[tokio::test]
async fn disconnected_device_in_the_middle_of_a_fleet() {
    let config = Config::default();
    let transport = Arc::new(
        SimulatedTransport::new()
            .with_device("dev-1", SimulatedDevice::healthy())
            .with_device("dev-2", SimulatedDevice::healthy().disconnected())
            .with_device("dev-3", SimulatedDevice::healthy()),
    );
    let scanner = Scanner::new(&config, transport, rule_only(&config));

    let reports = scanner
        .scan(
            vec![handle("dev-1"), handle("dev-2"), handle("dev-3")],
            CancellationToken::new(),
        )
        .await;

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[1].device.serial, "dev-2");
    assert_eq!(reports[1].snapshot.missing_groups().len(), 8);
    assert_eq!(
        reports[1].assessment.issues[0].category,
        category::DEVICE_UNREACHABLE
    );
    assert_eq!(reports[1].assessment.score, 0);
    for report in [&reports[0], &reports[2]] {
        assert!(report.snapshot.missing_groups().is_empty());
        assert_eq!(report.assessment.score, 100);
    }
}

#[tokio::test]
async fn device_lost_mid_scan_never_reaches_the_ai_backend() {
    let config = Config::default();
    let backend = CountingBackend::new(Ok(r#"{"health_score": 100, "issues": []}"#.to_string()));
    let analyzer = Arc::new(Analyzer::new(
        Some(backend.clone()),
        ai_settings(),
        config.rules.clone(),
    ));
    let transport = Arc::new(
        SimulatedTransport::new().with_device("dev-1", SimulatedDevice::healthy().disconnect_after(3)),
    );
    let scanner = Scanner::new(&config, transport, analyzer);

    let report = scanner
        .scan_device(handle("dev-1"), CancellationToken::new())
        .await;

    assert_eq!(backend.calls(), 0);
    assert_eq!(report.assessment.score, 0);
    assert_eq!(
        report.assessment.issues[0].category,
        category::DEVICE_UNREACHABLE
    );
    assert_eq!(
        report.assessment.fallback_reason,
        Some(FallbackReason::DeviceUnreachable)
    );
    assert!(report.snapshot.battery.level_percent.is_ok());
}

#[tokio::test]
async fn unchanged_device_collects_identically() {
    let config = Config::default();
    let transport = SimulatedTransport::new().with_device("dev-1", SimulatedDevice::healthy());
    let collector = Collector::new(&config);
    let analyzer = rule_only(&config);
    let device = handle("dev-1");

    let (first, _) = collector
        .collect(&transport, &device, CancellationToken::new())
        .await;
    let (second, _) = collector
        .collect(&transport, &device, CancellationToken::new())
        .await;

    assert_eq!(first, second);
    assert_eq!(
        analyzer.analyze(&first).await,
        analyzer.analyze(&second).await
    );
}

#[tokio::test]
async fn rate_limit_is_shared_across_the_fleet() {
    let config = Config {
        max_concurrent_scans: 1,
        ..Config::default()
    };
    let backend = CountingBackend::new(Err(AnalysisBackendError::RateLimited {
        retry_after: Some(Duration::from_secs(120)),
    }));
    let analyzer = Arc::new(Analyzer::new(
        Some(backend.clone()),
        ai_settings(),
        config.rules.clone(),
    ));
    let transport = Arc::new(
        SimulatedTransport::new()
            .with_device("dev-1", SimulatedDevice::healthy())
            .with_device("dev-2", SimulatedDevice::healthy())
            .with_device("dev-3", SimulatedDevice::healthy()),
    );
    let scanner = Scanner::new(&config, transport, analyzer);

    let reports = scanner
        .scan(
            vec![handle("dev-1"), handle("dev-2"), handle("dev-3")],
            CancellationToken::new(),
        )
        .await;

    assert_eq!(backend.calls(), 1);
    for report in &reports {
        assert_eq!(report.assessment.provenance, Provenance::RuleBased);
        assert_eq!(
            report.assessment.fallback_reason,
            Some(FallbackReason::RateLimited)
        );
        assert_eq!(report.assessment.score, 100);
    }
}

#[tokio::test]
async fn ai_assessment_flows_into_the_report() {
    let config = Config::default();
    let backend = CountingBackend::new(Ok(r#"```json
{"health_score": 91, "summary": "Healthy handset.", "issues": [{"category": "logs", "severity": "info", "description": "Two recent error lines"}], "recommendations": ["Nothing urgent"]}
```"#
        .to_string()));
    let analyzer = Arc::new(Analyzer::new(
        Some(backend.clone()),
        ai_settings(),
        config.rules.clone(),
    ));
    let transport = Arc::new(SimulatedTransport::new().with_device("dev-1", SimulatedDevice::healthy()));
    let scanner = Scanner::new(&config, transport, analyzer);

    let report = scanner
        .scan_device(handle("dev-1"), CancellationToken::new())
        .await;

    assert_eq!(backend.calls(), 1);
    assert_eq!(report.assessment.provenance, Provenance::Ai);
    assert_eq!(report.assessment.score, 91);
    assert_eq!(report.assessment.summary, "Healthy handset.");
    assert_eq!(report.assessment.fallback_reason, None);
}

#[tokio::test]
async fn report_json_keeps_every_field() {
    let config = Config::default();
    let transport = Arc::new(SimulatedTransport::new());
    let scanner = Scanner::new(&config, transport, rule_only(&config));

    let report = scanner
        .scan_device(handle("missing"), CancellationToken::new())
        .await;
    let json = serde_json::to_value(&report).unwrap();

    for group in [
        "device_info",
        "battery",
        "storage",
        "memory",
        "cpu",
        "network",
        "apps",
        "logs",
    ] {
        assert!(json["snapshot"][group].is_object(), "{group} missing");
    }
    assert_eq!(json["snapshot"]["battery"]["level_percent"]["status"], "unavailable");
    assert_eq!(json["assessment"]["provenance"], "rule_based");
}
