use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::{CommandSpec, RawOutput, Transport};
use crate::types::DeviceHandle;

const GETPROP: &str = "\
[ro.build.display.id]: [UQ1A.240105.004]
[ro.build.version.release]: [14]
[ro.build.version.sdk]: [34]
[ro.hardware]: [panther]
[ro.product.brand]: [google]
[ro.product.device]: [panther]
[ro.product.model]: [Pixel 7]
[ro.serialno]: [28011FDH2000XY]
";

const BATTERY: &str = "\
Current Battery Service state:
  AC powered: false
  USB powered: true
  Wireless powered: false
  Max charging current: 500000
  status: 2
  health: 2
  present: true
  level: 76
  scale: 100
  voltage: 4102
  temperature: 312
  technology: Li-ion
";

const DF: &str = "\
Filesystem        1K-blocks     Used Available Use% Mounted on
/dev/block/dm-5     5000000  4800000    200000  96% /
/dev/block/dm-42  118000000 59000000  59000000  50% /data
/dev/fuse         118000000 59000000  59000000  50% /storage/emulated
";

const DF_NEARLY_FULL: &str = "\
Filesystem        1K-blocks     Used Available Use% Mounted on
/dev/block/dm-42   54000000 52380000   1620000  97% /data
/dev/fuse          54000000 52380000   1620000  97% /storage/emulated
";

const MEMINFO: &str = "\
MemTotal:        7869588 kB
MemFree:          412000 kB
MemAvailable:    3120400 kB
Buffers:            2048 kB
Cached:          2543000 kB
";

const DUMPSYS_MEMINFO: &str = "\
Applications Memory Usage (in Kilobytes):
Uptime: 123456 Realtime: 123456

Total RSS by process:
    412,345K: system (pid 1431)
    288,100K: com.android.systemui (pid 2011)
    190,552K: com.google.android.gms.persistent (pid 3120)

Total RSS by OOM adjustment:
    900,000K: Native
";

const CPUINFO: &str = "\
Load: 3.12 / 2.85 / 2.40
CPU usage from 60000ms to 0ms ago:
  12% 1431/system_server: 8% user + 4% kernel
  4.2% 2011/com.android.systemui: 3% user + 1.2% kernel
  21% TOTAL: 14% user + 7% kernel
";

const WIFI: &str = "\
Wi-Fi is enabled
mWifiInfo SSID: \"HomeNet\", BSSID: 3c:84:6a:11:22:33, MAC: 02:00:00:00:00:00, Security type: 2, \
Supplicant state: COMPLETED, Wi-Fi standard: 11ax, RSSI: -55, Link speed: 866Mbps, \
Tx Link speed: 866Mbps, Rx Link speed: 780Mbps, Frequency: 5180MHz, Net ID: 4
";

const IP_ADDR: &str = "\
23: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP group default qlen 3000
    link/ether 02:00:00:00:00:00 brd ff:ff:ff:ff:ff:ff
    inet 192.168.1.42/24 brd 192.168.1.255 scope global wlan0
";

const PING_LATENCY: &str = "\
PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=18.2 ms
64 bytes from 8.8.8.8: icmp_seq=2 ttl=117 time=16.9 ms
64 bytes from 8.8.8.8: icmp_seq=3 ttl=117 time=17.4 ms

--- 8.8.8.8 ping statistics ---
3 packets transmitted, 3 received, 0% packet loss, time 2004ms
rtt min/avg/max/mdev = 16.900/17.500/18.200/0.540 ms
";

const PACKAGES_ALL: &str = "\
package:android
package:com.android.systemui
package:com.android.settings
package:com.google.android.gms
package:com.spotify.music
package:org.mozilla.firefox
";

const PACKAGES_THIRD_PARTY: &str = "\
package:org.mozilla.firefox
package:com.spotify.music
";

const LOGCAT: &str = "\
--------- beginning of main
10-16 09:12:01.101  1431  1502 E ActivityManager: ANR in com.example.app
10-16 09:12:04.332  3120  3188 E GmsClient: connection failed
";

fn dns_output(host: &str, address: &str) -> String {
    format!(
        "PING {host} ({address}) 56(84) bytes of data.\n\
         64 bytes from {address}: icmp_seq=1 ttl=117 time=21.0 ms\n\n\
         --- {host} ping statistics ---\n\
         1 packets transmitted, 1 received, 0% packet loss, time 0ms\n\
         rtt min/avg/max/mdev = 21.000/21.000/21.000/0.000 ms\n"
    )
}

/// Canned responses for one simulated device, keyed by command line.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    outputs: HashMap<String, Result<RawOutput, TransportError>>,
    failures: Vec<(String, TransportError)>,
    connected: bool,
    disconnect_after: Option<u32>,
}

impl SimulatedDevice {
    /// A Pixel 7 on home WiFi with nothing wrong with it.
    pub fn healthy() -> Self {
        let mut outputs = HashMap::new();
        let mut ok = |key: &str, out: String| {
            outputs.insert(key.to_string(), Ok(RawOutput::new(out)));
        };
        ok("get-state", "device\n".to_string());
        ok("shell getprop", GETPROP.to_string());
        ok("shell dumpsys battery", BATTERY.to_string());
        ok("shell df -k", DF.to_string());
        ok("shell cat /proc/meminfo", MEMINFO.to_string());
        ok("shell dumpsys meminfo", DUMPSYS_MEMINFO.to_string());
        ok("shell dumpsys cpuinfo", CPUINFO.to_string());
        ok("shell dumpsys wifi", WIFI.to_string());
        ok("shell ip addr show wlan0", IP_ADDR.to_string());
        ok("shell ping -c 3 -W 2 8.8.8.8", PING_LATENCY.to_string());
        ok("shell ping -c 1 -W 2 google.com", dns_output("google.com", "142.250.74.46"));
        ok("shell ping -c 1 -W 2 github.com", dns_output("github.com", "140.82.121.4"));
        ok("shell pm list packages", PACKAGES_ALL.to_string());
        ok("shell pm list packages -3", PACKAGES_THIRD_PARTY.to_string());
        ok("logcat -d *:E", LOGCAT.to_string());

        Self {
            outputs,
            failures: Vec::new(),
            connected: true,
            disconnect_after: None,
        }
    }

    /// An ageing handset: hot battery below the low-charge mark and both
    /// tracked mounts nearly full.
    pub fn worn() -> Self {
        Self::healthy()
            .with_output(
                "shell getprop",
                GETPROP
                    .replace("[Pixel 7]", "[Pixel 4a]")
                    .replace("[panther]", "[sunfish]"),
            )
            .with_output(
                "shell dumpsys battery",
                BATTERY
                    .replace("level: 76", "level: 14")
                    .replace("temperature: 312", "temperature: 450"),
            )
            .with_output("shell df -k", DF_NEARLY_FULL)
    }

    pub fn with_output(mut self, key: &str, stdout: impl Into<String>) -> Self {
        self.outputs
            .insert(key.to_string(), Ok(RawOutput::new(stdout)));
        self
    }

    /// Fails every command whose line starts with `prefix`.
    pub fn with_failure(mut self, prefix: &str, error: TransportError) -> Self {
        self.failures.push((prefix.to_string(), error));
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    /// Device disappears once it has answered `commands` commands.
    pub fn disconnect_after(mut self, commands: u32) -> Self {
        self.disconnect_after = Some(commands);
        self
    }

    fn respond(&self, serial: &str, key: &str, served: u32) -> Result<RawOutput, TransportError> {
        let gone = !self.connected || self.disconnect_after.is_some_and(|n| served >= n);
        if gone {
            return Err(TransportError::NotFound {
                serial: serial.to_string(),
            });
        }
        if let Some((_, err)) = self.failures.iter().find(|(p, _)| key.starts_with(p.as_str())) {
            return Err(err.clone());
        }
        self.outputs.get(key).cloned().unwrap_or_else(|| {
            Err(TransportError::NonZeroExit {
                code: 127,
                stdout: String::new(),
                stderr: format!("/system/bin/sh: {key}: inaccessible or not found"),
            })
        })
    }
}

/// In-process stand-in for adb.
#[derive(Default)]
pub struct SimulatedTransport {
    devices: Mutex<HashMap<String, SimulatedDevice>>,
    served: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
    total_calls: AtomicU32,
    delay: Option<Duration>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, serial: &str, device: SimulatedDevice) -> Self {
        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(serial.to_string(), device);
        }
        self
    }

    /// Every command takes this long to answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `serial: command` for every command issued, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, serial: &str) -> Vec<String> {
        let prefix = format!("{serial}: ");
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn total_calls(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn handles(&self) -> Vec<DeviceHandle> {
        let mut serials: Vec<String> = self
            .devices
            .lock()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default();
        serials.sort();
        serials
            .into_iter()
            .map(|s| DeviceHandle::new(s.clone(), format!("Simulated {s}")))
            .collect()
    }
}

/// Three handsets for the demo mode: one healthy, one worn, one unplugged
/// mid-session.
pub fn demo_fleet() -> SimulatedTransport {
    SimulatedTransport::new()
        .with_device("sim-pixel-7", SimulatedDevice::healthy())
        .with_device("sim-pixel-4a", SimulatedDevice::worn())
        .with_device("sim-unplugged", SimulatedDevice::healthy().disconnected())
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn execute(
        &self,
        device: &DeviceHandle,
        command: &CommandSpec,
    ) -> Result<RawOutput, TransportError> {
        let key = command.key();
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{}: {}", device.serial, key));
        }

        if let Some(delay) = self.delay {
            if delay >= command.timeout {
                tokio::time::sleep(command.timeout).await;
                return Err(TransportError::Timeout {
                    after: command.timeout,
                });
            }
            tokio::time::sleep(delay).await;
        }

        let served = self
            .served
            .lock()
            .map(|mut s| {
                let n = s.entry(device.serial.clone()).or_insert(0);
                let before = *n;
                *n += 1;
                before
            })
            .unwrap_or(0);

        let devices = self.devices.lock().map_err(|_| TransportError::Spawn {
            message: "simulator state poisoned".to_string(),
        })?;
        match devices.get(&device.serial) {
            Some(sim) => sim.respond(&device.serial, &key, served),
            None => Err(TransportError::NotFound {
                serial: device.serial.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_serial_is_not_found() {
        let transport = SimulatedTransport::new();
        let err = transport
            .execute(
                &DeviceHandle::new("nobody", "Nobody"),
                &CommandSpec::new(&["get-state"], Duration::from_secs(1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotFound { .. }));
        assert_eq!(transport.total_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_command_exits_127() {
        let transport = SimulatedTransport::new().with_device("a", SimulatedDevice::healthy());
        let err = transport
            .execute(
                &DeviceHandle::new("a", "A"),
                &CommandSpec::shell(&["uptime"], Duration::from_secs(1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NonZeroExit { code: 127, .. }));
    }

    #[test]
    fn demo_fleet_is_sorted() {
        let serials: Vec<String> = demo_fleet().handles().into_iter().map(|h| h.serial).collect();
        assert_eq!(serials, vec!["sim-pixel-4a", "sim-pixel-7", "sim-unplugged"]);
    }
}
