//! Named parsers for each block of `adb` output.
//!
//! Every parser is tolerant: lines it does not recognise are skipped, and a
//! field whose line is missing becomes `Unavailable` rather than failing the
//! whole group.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::error::ParseError;
use crate::types::{
    Band, BatteryHealth, BatteryMetrics, ChargingState, CpuMetrics, DeviceHandle, DeviceInfo,
    ErrorLogs, LatencySample, LoadAverage, MetricField, MountUsage, PowerSource, ProcessUsage,
    SignalTier, WifiState,
};

lazy_static! {
    static ref GETPROP_LINE: Regex = Regex::new(r"^\[([^\]]+)\]:\s*\[(.*)\]\s*$").unwrap();
    static ref MEMINFO_LINE: Regex = Regex::new(r"^(\w+):\s+(\d+)").unwrap();
    static ref MEM_CONSUMER: Regex =
        Regex::new(r"^\s*([\d,]+)K: (.+?)(?: \(pid (\d+)[^)]*\))?\s*$").unwrap();
    static ref CPU_LOAD: Regex =
        Regex::new(r"Load:\s+([\d.]+)\s*/\s*([\d.]+)\s*/\s*([\d.]+)").unwrap();
    static ref CPU_CONSUMER: Regex = Regex::new(r"^\s*([\d.]+)% (\d+)/([^:]+):").unwrap();
    static ref WIFI_SSID: Regex =
        Regex::new(r#"(?:^|[\s,])SSID: (?:"([^"]*)"|([^,]*))"#).unwrap();
    static ref WIFI_RSSI: Regex = Regex::new(r"RSSI: (-?\d+)").unwrap();
    static ref WIFI_FREQ: Regex = Regex::new(r"Frequency: (\d+)\s*MHz").unwrap();
    static ref WIFI_LINK: Regex = Regex::new(r"(?:^|,\s*)Link speed: (\d+)\s*Mbps").unwrap();
    static ref INET_ADDR: Regex = Regex::new(r"inet (\d+\.\d+\.\d+\.\d+)/\d+").unwrap();
    static ref PING_STATS: Regex =
        Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received.*?([\d.]+)% packet loss")
            .unwrap();
    static ref PING_RTT: Regex =
        Regex::new(r"(?:rtt|round-trip) min/avg/max(?:/mdev)? = ([\d.]+)/([\d.]+)/([\d.]+)").unwrap();
    static ref PING_HEADER: Regex =
        Regex::new(r"(?m)^PING \S+ \((\d+\.\d+\.\d+\.\d+)\)").unwrap();
}

/// `adb devices -l`: keeps only devices in the `device` state.
pub fn parse_device_list(raw: &str) -> Vec<DeviceHandle> {
    raw.lines()
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            if parts.next()? != "device" {
                return None;
            }
            let model = parts
                .find_map(|p| p.strip_prefix("model:"))
                .map(|m| m.replace('_', " "))
                .unwrap_or_else(|| serial.to_string());
            Some(DeviceHandle::new(serial, model))
        })
        .collect()
}

/// Full `getprop` dump.
pub fn parse_getprop(raw: &str) -> DeviceInfo {
    let props: HashMap<&str, &str> = raw
        .lines()
        .filter_map(|line| {
            let caps = GETPROP_LINE.captures(line.trim())?;
            Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
        })
        .collect();

    let text = |key: &str| -> MetricField<String> {
        MetricField::from_option(
            props
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            format!("{key} not reported"),
        )
    };

    DeviceInfo {
        model: text("ro.product.model"),
        brand: text("ro.product.brand"),
        device: text("ro.product.device"),
        android_version: text("ro.build.version.release"),
        sdk_level: MetricField::from_option(
            props
                .get("ro.build.version.sdk")
                .and_then(|v| v.trim().parse().ok()),
            "ro.build.version.sdk not reported",
        ),
        build_id: text("ro.build.display.id"),
        serial: text("ro.serialno"),
        hardware: text("ro.hardware"),
    }
}

fn key_values(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// `dumpsys battery`.
pub fn parse_battery(raw: &str) -> BatteryMetrics {
    let kv = key_values(raw);
    let int = |key: &str| kv.get(key).and_then(|v| v.parse::<i64>().ok());
    let flag = |key: &str| kv.get(key).map(|v| v.eq_ignore_ascii_case("true"));

    let level_percent = match (int("level"), int("scale")) {
        (Some(level), Some(scale)) if scale > 0 => {
            MetricField::Ok((level * 100 / scale).clamp(0, 100) as u8)
        }
        (Some(level), _) => MetricField::Ok(level.clamp(0, 100) as u8),
        _ => MetricField::unavailable("level not reported"),
    };

    // reported in tenths of a degree
    let temperature_c = MetricField::from_option(
        int("temperature").map(|t| t as f32 / 10.0),
        "temperature not reported",
    );

    let charging = MetricField::from_option(
        int("status").map(|code| match code {
            2 => ChargingState::Charging,
            3 => ChargingState::Discharging,
            4 => ChargingState::NotCharging,
            5 => ChargingState::Full,
            _ => ChargingState::Unknown,
        }),
        "status not reported",
    );

    let health = MetricField::from_option(
        int("health").map(|code| match code {
            2 => BatteryHealth::Good,
            3 => BatteryHealth::Overheat,
            4 => BatteryHealth::Dead,
            5 => BatteryHealth::OverVoltage,
            6 => BatteryHealth::Failure,
            7 => BatteryHealth::Cold,
            _ => BatteryHealth::Unknown,
        }),
        "health not reported",
    );

    let voltage_mv = MetricField::from_option(
        int("voltage").filter(|v| *v >= 0).map(|v| v as u32),
        "voltage not reported",
    );

    let technology = MetricField::from_option(
        kv.get("technology").filter(|t| !t.is_empty()).cloned(),
        "technology not reported",
    );

    let sources = [
        (flag("ac powered"), PowerSource::Ac),
        (flag("usb powered"), PowerSource::Usb),
        (flag("wireless powered"), PowerSource::Wireless),
    ];
    let power_source = if sources.iter().all(|(seen, _)| seen.is_none()) {
        MetricField::unavailable("power source not reported")
    } else {
        MetricField::Ok(
            sources
                .iter()
                .find(|(seen, _)| *seen == Some(true))
                .map(|(_, source)| *source)
                .unwrap_or(PowerSource::Battery),
        )
    };

    BatteryMetrics {
        level_percent,
        temperature_c,
        charging,
        health,
        voltage_mv,
        technology,
        power_source,
    }
}

/// `df -k`, restricted to the tracked mount points.
pub fn parse_df(raw: &str, tracked: &[String]) -> Result<Vec<MountUsage>, ParseError> {
    let mut mounts: Vec<MountUsage> = Vec::new();
    for line in raw.lines().skip_while(|l| !l.trim_start().starts_with("Filesystem")).skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        let mount = parts[5..].join(" ");
        if !tracked.iter().any(|t| *t == mount) || mounts.iter().any(|m| m.mount == mount) {
            continue;
        }
        let (Ok(total_kb), Ok(used_kb), Ok(free_kb)) = (
            parts[1].parse::<u64>(),
            parts[2].parse::<u64>(),
            parts[3].parse::<u64>(),
        ) else {
            continue;
        };
        if total_kb == 0 {
            continue;
        }
        mounts.push(MountUsage {
            mount,
            filesystem: parts[0].to_string(),
            total_kb,
            used_kb,
            free_kb,
            free_percent: free_kb as f64 * 100.0 / total_kb as f64,
        });
    }

    if mounts.is_empty() {
        return Err(ParseError::new("storage", "no tracked mount in df output"));
    }
    Ok(mounts)
}

/// `/proc/meminfo`: total, available and the used ratio derived from them.
pub fn parse_meminfo(raw: &str) -> (MetricField<u64>, MetricField<u64>, MetricField<f64>) {
    let values: HashMap<&str, u64> = raw
        .lines()
        .filter_map(|line| {
            let caps = MEMINFO_LINE.captures(line)?;
            Some((caps.get(1)?.as_str(), caps.get(2)?.as_str().parse().ok()?))
        })
        .collect();

    let total = values.get("MemTotal").copied().filter(|t| *t > 0);
    let available = values.get("MemAvailable").copied();
    let ratio = match (total, available) {
        (Some(t), Some(a)) => MetricField::Ok(t.saturating_sub(a) as f64 / t as f64),
        _ => MetricField::unavailable("MemTotal or MemAvailable missing"),
    };

    (
        MetricField::from_option(total, "MemTotal missing"),
        MetricField::from_option(available, "MemAvailable missing"),
        ratio,
    )
}

/// The per-process section of `dumpsys meminfo`.
pub fn parse_top_memory(raw: &str, limit: usize) -> Result<Vec<ProcessUsage>, ParseError> {
    let consumers: Vec<ProcessUsage> = raw
        .lines()
        .skip_while(|l| !l.contains("by process:"))
        .skip(1)
        .take_while(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let caps = MEM_CONSUMER.captures(line)?;
            let kb: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
            Some(ProcessUsage {
                process: caps.get(2)?.as_str().trim().to_string(),
                pid: caps.get(3).and_then(|p| p.as_str().parse().ok()),
                value: kb,
            })
        })
        .take(limit)
        .collect();

    if consumers.is_empty() {
        return Err(ParseError::new("memory", "no per-process section"));
    }
    Ok(consumers)
}

/// `dumpsys cpuinfo`.
pub fn parse_cpuinfo(raw: &str, limit: usize) -> CpuMetrics {
    let load = MetricField::from_option(
        CPU_LOAD.captures(raw).and_then(|caps| {
            Some(LoadAverage {
                one: caps.get(1)?.as_str().parse().ok()?,
                five: caps.get(2)?.as_str().parse().ok()?,
                fifteen: caps.get(3)?.as_str().parse().ok()?,
            })
        }),
        "load line missing",
    );

    let consumers: Vec<ProcessUsage> = raw
        .lines()
        .filter_map(|line| {
            let caps = CPU_CONSUMER.captures(line)?;
            Some(ProcessUsage {
                value: caps.get(1)?.as_str().parse().ok()?,
                pid: caps.get(2)?.as_str().parse().ok(),
                process: caps.get(3)?.as_str().trim().to_string(),
            })
        })
        .take(limit)
        .collect();
    let top_consumers = if consumers.is_empty() {
        MetricField::unavailable("no per-process lines")
    } else {
        MetricField::Ok(consumers)
    };

    CpuMetrics { load, top_consumers }
}

/// `pm list packages [-3]`.
pub fn parse_package_list(raw: &str) -> Vec<String> {
    let mut packages: Vec<String> = raw
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    packages.sort();
    packages.dedup();
    packages
}

/// `logcat -d *:E` in threadtime format.
pub fn parse_logcat(raw: &str, max_lines: usize) -> ErrorLogs {
    let lines: Vec<&str> = raw
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with("--------- beginning of"))
        .collect();

    let fatal = lines
        .iter()
        .filter(|line| {
            line.split_whitespace().nth(4) == Some("F") || line.contains("FATAL EXCEPTION")
        })
        .count();

    let start = lines.len().saturating_sub(max_lines);
    ErrorLogs {
        total_errors: MetricField::Ok(lines.len()),
        fatal_count: MetricField::Ok(fatal),
        recent: MetricField::Ok(lines[start..].iter().map(|l| l.to_string()).collect()),
    }
}

pub fn classify_band(frequency_mhz: u32) -> Band {
    match frequency_mhz {
        ..=2499 => Band::Ghz2_4,
        4900..=5899 => Band::Ghz5,
        5925..=7125 => Band::Ghz6,
        _ => Band::Unknown,
    }
}

pub fn classify_signal(rssi_dbm: i32) -> SignalTier {
    match rssi_dbm {
        r if r >= -50 => SignalTier::Excellent,
        r if r >= -60 => SignalTier::Good,
        r if r >= -70 => SignalTier::Fair,
        _ => SignalTier::Poor,
    }
}

pub fn signal_percent(rssi_dbm: i32) -> u8 {
    (2 * (rssi_dbm + 100)).clamp(0, 100) as u8
}

/// The `mWifiInfo` line of `dumpsys wifi`.
pub fn parse_wifi(raw: &str) -> Result<WifiState, ParseError> {
    let line = raw
        .lines()
        .find(|l| l.contains("mWifiInfo"))
        .ok_or_else(|| ParseError::new("wifi", "no mWifiInfo line"))?;

    let ssid = WIFI_SSID
        .captures(line)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty() && s != "<unknown ssid>")
        .ok_or_else(|| ParseError::new("wifi", "not associated"))?;

    let rssi_dbm: i32 = WIFI_RSSI
        .captures(line)
        .and_then(|caps| caps.get(1)?.as_str().parse().ok())
        .filter(|r| *r > -127)
        .ok_or_else(|| ParseError::new("wifi", "RSSI missing"))?;

    let frequency_mhz: u32 = WIFI_FREQ
        .captures(line)
        .and_then(|caps| caps.get(1)?.as_str().parse().ok())
        .ok_or_else(|| ParseError::new("wifi", "frequency missing"))?;

    let link_speed_mbps = WIFI_LINK
        .captures(line)
        .and_then(|caps| caps.get(1)?.as_str().parse().ok());

    Ok(WifiState {
        ssid,
        rssi_dbm,
        frequency_mhz,
        band: classify_band(frequency_mhz),
        signal: classify_signal(rssi_dbm),
        signal_percent: signal_percent(rssi_dbm),
        link_speed_mbps,
    })
}

/// `ip addr show wlan0`.
pub fn parse_ip_addr(raw: &str) -> Result<String, ParseError> {
    INET_ADDR
        .captures(raw)
        .and_then(|caps| Some(caps.get(1)?.as_str().to_string()))
        .ok_or_else(|| ParseError::new("ip_address", "no IPv4 address on interface"))
}

/// Summary lines of `ping -c N`.
pub fn parse_ping(raw: &str, target: &str) -> Result<LatencySample, ParseError> {
    let loss: f64 = PING_STATS
        .captures(raw)
        .and_then(|caps| caps.get(3)?.as_str().parse().ok())
        .ok_or_else(|| ParseError::new("latency", "no ping statistics"))?;

    let caps = PING_RTT
        .captures(raw)
        .ok_or_else(|| ParseError::new("latency", format!("no replies ({loss}% loss)")))?;
    let ms = |i: usize| -> Result<f64, ParseError> {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| ParseError::new("latency", "malformed rtt line"))
    };

    Ok(LatencySample {
        target: target.to_string(),
        min_ms: ms(1)?,
        avg_ms: ms(2)?,
        max_ms: ms(3)?,
        packet_loss_percent: loss,
    })
}

/// Address a DNS probe resolved to, read from the `PING host (addr)` header.
pub fn parse_resolved_address(raw: &str) -> Option<String> {
    PING_HEADER
        .captures(raw)
        .and_then(|caps| Some(caps.get(1)?.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransportMode;

    #[test]
    fn device_list_keeps_ready_devices() {
        let raw = "List of devices attached\n\
                   R58N123ABC     device usb:1-1 product:a52q model:SM_A525F device:a52q transport_id:1\n\
                   192.168.1.20:5555 device product:panther model:Pixel_7 device:panther transport_id:2\n\
                   XYZ987         unauthorized usb:1-2 transport_id:3\n\n";
        let devices = parse_device_list(raw);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].display_name, "SM A525F");
        assert_eq!(devices[0].mode, TransportMode::Usb);
        assert_eq!(devices[1].serial, "192.168.1.20:5555");
        assert_eq!(devices[1].mode, TransportMode::Wifi);
    }

    #[test]
    fn getprop_missing_keys_are_unavailable() {
        let raw = "[ro.build.version.sdk]: [34]\n[ro.product.model]: [Pixel 7]\n[ro.product.brand]: []\n";
        let info = parse_getprop(raw);
        assert_eq!(info.model, MetricField::Ok("Pixel 7".to_string()));
        assert_eq!(info.sdk_level, MetricField::Ok(34));
        assert!(!info.brand.is_ok());
        assert!(!info.hardware.is_ok());
    }

    #[test]
    fn battery_fields_survive_reordering_and_gaps() {
        let raw = "Current Battery Service state:\n  temperature: 451\n  level: 40\n  \
                   USB powered: true\n  AC powered: false\n  health: 3\n  scale: 50\n";
        let battery = parse_battery(raw);
        assert_eq!(battery.level_percent, MetricField::Ok(80));
        assert_eq!(battery.temperature_c, MetricField::Ok(45.1));
        assert_eq!(battery.health, MetricField::Ok(BatteryHealth::Overheat));
        assert_eq!(battery.power_source, MetricField::Ok(PowerSource::Usb));
        assert!(!battery.charging.is_ok());
        assert!(!battery.voltage_mv.is_ok());
    }

    #[test]
    fn df_keeps_tracked_mounts_only() {
        let raw = "Filesystem      1K-blocks     Used Available Use% Mounted on\n\
                   /dev/root        5000000  4900000    100000  98% /\n\
                   /dev/block/dm-8 100000000 97000000   3000000  97% /data\n\
                   /dev/fuse       100000000 97000000   3000000  97% /storage/emulated\n";
        let tracked = vec!["/data".to_string(), "/storage/emulated".to_string()];
        let mounts = parse_df(raw, &tracked).unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].mount, "/data");
        assert!((mounts[0].free_percent - 3.0).abs() < 1e-9);

        let err = parse_df(raw, &["/cache".to_string()]).unwrap_err();
        assert_eq!(err.field, "storage");
    }

    #[test]
    fn meminfo_ratio() {
        let raw = "MemTotal:        8000000 kB\nMemFree:          100000 kB\nMemAvailable:    2000000 kB\n";
        let (total, available, ratio) = parse_meminfo(raw);
        assert_eq!(total, MetricField::Ok(8_000_000));
        assert_eq!(available, MetricField::Ok(2_000_000));
        assert_eq!(ratio, MetricField::Ok(0.75));

        let (_, available, ratio) = parse_meminfo("MemTotal: 100 kB\n");
        assert!(!available.is_ok());
        assert!(!ratio.is_ok());
    }

    #[test]
    fn top_memory_section() {
        let raw = "Applications Memory Usage (in Kilobytes):\n\nTotal RSS by process:\n    \
                   412,345K: system (pid 1234)\n    201,000K: com.android.systemui (pid 2001 / activities)\n\n\
                   Total RSS by OOM adjustment:\n    999,999K: Native\n";
        let top = parse_top_memory(raw, 10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].process, "system");
        assert_eq!(top[0].pid, Some(1234));
        assert_eq!(top[1].value, 201_000.0);
    }

    #[test]
    fn cpuinfo_load_and_consumers() {
        let raw = "Load: 7.52 / 7.41 / 7.35\nCPU usage from 5000ms to 0ms ago:\n  \
                   25% 1234/system_server: 20% user + 5% kernel\n  3.1% 987/com.foo.bar: 3% user + 0.1% kernel\n  \
                   39% TOTAL: 20% user + 19% kernel\n";
        let cpu = parse_cpuinfo(raw, 10);
        assert_eq!(cpu.load.ok().map(|l| l.one), Some(7.52));
        let top = cpu.top_consumers.ok().unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].process, "com.foo.bar");

        let cpu = parse_cpuinfo("garbage", 10);
        assert!(!cpu.load.is_ok());
    }

    #[test]
    fn logcat_counts_fatal_and_bounds_recent() {
        let raw = "--------- beginning of crash\n\
                   10-16 10:00:00.000  100  100 E Tag: one\n\
                   10-16 10:00:01.000  100  100 F libc: Fatal signal 11\n\
                   10-16 10:00:02.000  200  200 E AndroidRuntime: FATAL EXCEPTION: main\n\
                   10-16 10:00:03.000  300  300 E Tag: four\n";
        let logs = parse_logcat(raw, 2);
        assert_eq!(logs.total_errors, MetricField::Ok(4));
        assert_eq!(logs.fatal_count, MetricField::Ok(2));
        let recent = logs.recent.ok().unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[1].ends_with("four"));
    }

    #[test]
    fn wifi_line_in_any_order() {
        let raw = "Wi-Fi is enabled\nmWifiInfo SSID: \"Home, Net\", BSSID: aa:bb:cc:dd:ee:ff, RSSI: -65, \
                   Link speed: 433Mbps, Tx Link speed: 433Mbps, Frequency: 5180MHz, Net ID: 3\n";
        let wifi = parse_wifi(raw).unwrap();
        assert_eq!(wifi.ssid, "Home, Net");
        assert_eq!(wifi.rssi_dbm, -65);
        assert_eq!(wifi.band, Band::Ghz5);
        assert_eq!(wifi.signal, SignalTier::Fair);
        assert_eq!(wifi.signal_percent, 70);
        assert_eq!(wifi.link_speed_mbps, Some(433));

        let reordered = "mWifiInfo Frequency: 2437MHz, RSSI: -45, SSID: \"Cafe\"";
        let wifi = parse_wifi(reordered).unwrap();
        assert_eq!(wifi.band, Band::Ghz2_4);
        assert_eq!(wifi.signal, SignalTier::Excellent);
        assert_eq!(wifi.link_speed_mbps, None);
    }

    #[test]
    fn wifi_disconnected_is_an_error() {
        let raw = "mWifiInfo SSID: <unknown ssid>, BSSID: <none>, RSSI: -127, Frequency: -1MHz";
        assert!(parse_wifi(raw).is_err());
    }

    #[test]
    fn band_and_signal_thresholds() {
        assert_eq!(classify_band(2412), Band::Ghz2_4);
        assert_eq!(classify_band(2300), Band::Ghz2_4);
        assert_eq!(classify_band(2500), Band::Unknown);
        assert_eq!(classify_band(5745), Band::Ghz5);
        assert_eq!(classify_band(5955), Band::Ghz6);
        assert_eq!(classify_band(60480), Band::Unknown);
        assert_eq!(classify_signal(-50), SignalTier::Excellent);
        assert_eq!(classify_signal(-60), SignalTier::Good);
        assert_eq!(classify_signal(-70), SignalTier::Fair);
        assert_eq!(classify_signal(-71), SignalTier::Poor);
        assert_eq!(signal_percent(-30), 100);
        assert_eq!(signal_percent(-110), 0);
    }

    #[test]
    fn ping_summary() {
        let raw = "PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.\n\
                   --- 8.8.8.8 ping statistics ---\n\
                   3 packets transmitted, 3 received, 0% packet loss, time 2003ms\n\
                   rtt min/avg/max/mdev = 10.100/12.300/15.200/2.000 ms\n";
        let sample = parse_ping(raw, "8.8.8.8").unwrap();
        assert_eq!(sample.avg_ms, 12.3);
        assert_eq!(sample.packet_loss_percent, 0.0);

        let lost = "3 packets transmitted, 0 received, 100% packet loss, time 2030ms\n";
        let err = parse_ping(lost, "8.8.8.8").unwrap_err();
        assert!(err.detail.contains("100"));
    }

    #[test]
    fn resolved_address_from_header() {
        let raw = "PING google.com (142.250.74.46) 56(84) bytes of data.\n";
        assert_eq!(parse_resolved_address(raw).as_deref(), Some("142.250.74.46"));
        assert_eq!(parse_resolved_address("ping: unknown host google.com"), None);
    }

    #[test]
    fn package_lists() {
        let raw = "package:com.b\npackage:com.a\n\npackage:com.a\nnoise\n";
        assert_eq!(parse_package_list(raw), vec!["com.a", "com.b"]);
    }
}
