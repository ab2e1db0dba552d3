use std::time::Duration;
use tracing::{debug, info};

use crate::config::ProbeConfig;
use crate::error::TransportError;
use crate::parsers;
use crate::transport::{CommandSpec, DeviceSession};
use crate::types::{DnsCheck, MetricField, NetworkMetrics};

/// WiFi state plus active probes issued from the device shell.
#[derive(Debug, Clone)]
pub struct NetworkDiagnostics {
    probes: ProbeConfig,
    command_timeout: Duration,
}

impl NetworkDiagnostics {
    pub fn new(probes: ProbeConfig, command_timeout: Duration) -> Self {
        Self {
            probes,
            command_timeout,
        }
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probes.probe_timeout_secs)
    }

    /// Each probe degrades on its own: a failed DNS lookup leaves a good
    /// latency sample untouched and vice versa.
    pub async fn probe(&self, session: &mut DeviceSession<'_>) -> NetworkMetrics {
        let connection = session.device().mode;

        let wifi = match session
            .run(&CommandSpec::shell(&["dumpsys", "wifi"], self.command_timeout))
            .await
        {
            Ok(raw) => MetricField::from_result(parsers::parse_wifi(&raw.stdout)),
            Err(e) => MetricField::unavailable(e.to_string()),
        };

        let ip_address = match session
            .run(&CommandSpec::shell(
                &["ip", "addr", "show", "wlan0"],
                self.command_timeout,
            ))
            .await
        {
            Ok(raw) => MetricField::from_result(parsers::parse_ip_addr(&raw.stdout)),
            Err(e) => MetricField::unavailable(e.to_string()),
        };

        let latency = self.latency_probe(session).await;

        let mut dns_checks = Vec::with_capacity(self.probes.dns_targets.len());
        for host in &self.probes.dns_targets {
            dns_checks.push(self.dns_probe(session, host).await);
        }
        let dns_resolution = summarize_dns(&dns_checks);

        info!(
            serial = %session.device().serial,
            wifi = wifi.is_ok(),
            latency = latency.is_ok(),
            dns = ?dns_resolution.ok(),
            "Network diagnostics complete"
        );

        NetworkMetrics {
            connection,
            wifi,
            ip_address,
            latency,
            dns_resolution,
            dns_checks,
        }
    }

    async fn latency_probe(
        &self,
        session: &mut DeviceSession<'_>,
    ) -> MetricField<crate::types::LatencySample> {
        let target = self.probes.latency_target.as_str();
        let count = self.probes.ping_count.max(1).to_string();
        let command = CommandSpec::shell(
            &["ping", "-c", count.as_str(), "-W", "2", target],
            self.probe_timeout(),
        );

        match session.run(&command).await {
            Ok(raw) => MetricField::from_result(parsers::parse_ping(&raw.stdout, target)),
            // ping exits non-zero on packet loss but still prints statistics
            Err(TransportError::NonZeroExit { stdout, stderr, .. }) => {
                match parsers::parse_ping(&stdout, target) {
                    Ok(sample) => MetricField::Ok(sample),
                    Err(e) if stderr.trim().is_empty() => MetricField::unavailable(e.to_string()),
                    Err(_) => MetricField::unavailable(stderr.trim().to_string()),
                }
            }
            Err(e) => MetricField::unavailable(e.to_string()),
        }
    }

    async fn dns_probe(&self, session: &mut DeviceSession<'_>, host: &str) -> DnsCheck {
        let command = CommandSpec::shell(&["ping", "-c", "1", "-W", "2", host], self.probe_timeout());
        let (stdout, stderr) = match session.run(&command).await {
            Ok(raw) => (raw.stdout, String::new()),
            Err(TransportError::NonZeroExit { stdout, stderr, .. }) => (stdout, stderr),
            Err(e) => {
                debug!(host, error = %e, "DNS probe did not run");
                return DnsCheck {
                    host: host.to_string(),
                    resolved: MetricField::unavailable(e.to_string()),
                    address: None,
                };
            }
        };

        let address = parsers::parse_resolved_address(&stdout);
        let resolved = if address.is_some() {
            MetricField::Ok(true)
        } else if is_resolution_failure(&stdout) || is_resolution_failure(&stderr) {
            MetricField::Ok(false)
        } else {
            MetricField::unavailable("unrecognised ping output")
        };
        DnsCheck {
            host: host.to_string(),
            resolved,
            address,
        }
    }
}

fn is_resolution_failure(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("unknown host")
        || text.contains("bad address")
        || text.contains("name or service not known")
        || text.contains("temporary failure in name resolution")
}

/// Any resolved host means DNS works; otherwise any definite failure means
/// it does not.
fn summarize_dns(checks: &[DnsCheck]) -> MetricField<bool> {
    if checks.iter().any(|c| c.resolved.ok() == Some(&true)) {
        MetricField::Ok(true)
    } else if checks.iter().any(|c| c.resolved.ok() == Some(&false)) {
        MetricField::Ok(false)
    } else {
        MetricField::unavailable("no DNS probe completed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::simulate::{SimulatedDevice, SimulatedTransport};
    use crate::types::{Band, DeviceHandle};
    use tokio_util::sync::CancellationToken;

    fn diagnostics() -> NetworkDiagnostics {
        let config = Config::default();
        NetworkDiagnostics::new(config.probes.clone(), config.command_timeout())
    }

    #[tokio::test]
    async fn healthy_device_probes() {
        let transport = SimulatedTransport::new().with_device("sim-1", SimulatedDevice::healthy());
        let device = DeviceHandle::new("sim-1", "Pixel 7");
        let mut session = DeviceSession::new(&transport, &device, CancellationToken::new());

        let net = diagnostics().probe(&mut session).await;
        let wifi = net.wifi.ok().unwrap();
        assert_eq!(wifi.ssid, "HomeNet");
        assert_eq!(wifi.band, Band::Ghz5);
        assert_eq!(net.ip_address, MetricField::Ok("192.168.1.42".to_string()));
        assert_eq!(net.latency.ok().map(|l| l.avg_ms), Some(17.5));
        assert_eq!(net.dns_resolution, MetricField::Ok(true));
        assert_eq!(net.dns_checks.len(), 2);
    }

    #[tokio::test]
    async fn dns_failure_keeps_latency() {
        let unknown = |host: &str| TransportError::NonZeroExit {
            code: 2,
            stdout: String::new(),
            stderr: format!("ping: unknown host {host}"),
        };
        let sim = SimulatedDevice::healthy()
            .with_failure("shell ping -c 1 -W 2 google.com", unknown("google.com"))
            .with_failure("shell ping -c 1 -W 2 github.com", unknown("github.com"));
        let transport = SimulatedTransport::new().with_device("sim-1", sim);
        let device = DeviceHandle::new("sim-1", "Pixel 7");
        let mut session = DeviceSession::new(&transport, &device, CancellationToken::new());

        let net = diagnostics().probe(&mut session).await;
        assert_eq!(net.dns_resolution, MetricField::Ok(false));
        assert!(net.latency.is_ok());
    }

    #[tokio::test]
    async fn latency_timeout_keeps_dns() {
        let sim = SimulatedDevice::healthy().with_failure(
            "shell ping -c 3",
            TransportError::Timeout {
                after: Duration::from_secs(10),
            },
        );
        let transport = SimulatedTransport::new().with_device("sim-1", sim);
        let device = DeviceHandle::new("sim-1", "Pixel 7");
        let mut session = DeviceSession::new(&transport, &device, CancellationToken::new());

        let net = diagnostics().probe(&mut session).await;
        assert!(!net.latency.is_ok());
        assert_eq!(net.dns_resolution, MetricField::Ok(true));
    }

    #[tokio::test]
    async fn total_packet_loss_is_unavailable() {
        let sim = SimulatedDevice::healthy().with_failure(
            "shell ping -c 3",
            TransportError::NonZeroExit {
                code: 1,
                stdout: "3 packets transmitted, 0 received, 100% packet loss, time 2030ms\n"
                    .to_string(),
                stderr: String::new(),
            },
        );
        let transport = SimulatedTransport::new().with_device("sim-1", sim);
        let device = DeviceHandle::new("sim-1", "Pixel 7");
        let mut session = DeviceSession::new(&transport, &device, CancellationToken::new());

        let net = diagnostics().probe(&mut session).await;
        match net.latency {
            MetricField::Unavailable { reason } => assert!(reason.contains("100")),
            MetricField::Ok(_) => panic!("expected unavailable latency"),
        }
    }

    #[test]
    fn dns_summary_rules() {
        let check = |resolved| DnsCheck {
            host: "h".to_string(),
            resolved,
            address: None,
        };
        assert_eq!(
            summarize_dns(&[check(MetricField::Ok(false)), check(MetricField::Ok(true))]),
            MetricField::Ok(true)
        );
        assert_eq!(
            summarize_dns(&[check(MetricField::unavailable("x")), check(MetricField::Ok(false))]),
            MetricField::Ok(false)
        );
        assert!(!summarize_dns(&[check(MetricField::unavailable("x"))]).is_ok());
        assert!(!summarize_dns(&[]).is_ok());
    }
}
