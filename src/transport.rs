use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::parsers;
use crate::types::DeviceHandle;

/// One diagnostic command, as the argument list handed to `adb -s <serial>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(args: &[&str], timeout: Duration) -> Self {
        Self {
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout,
        }
    }

    /// A command run through the device shell.
    pub fn shell(args: &[&str], timeout: Duration) -> Self {
        let mut spec = Self::new(&["shell"], timeout);
        spec.args.extend(args.iter().map(|a| a.to_string()));
        spec
    }

    pub fn key(&self) -> String {
        self.args.join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
}

impl RawOutput {
    pub fn new(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
        }
    }
}

/// The command channel to a device. Implementations must bound every call by
/// `command.timeout` and must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        device: &DeviceHandle,
        command: &CommandSpec,
    ) -> Result<RawOutput, TransportError>;
}

pub struct AdbTransport {
    adb_path: String,
}

impl AdbTransport {
    pub fn new(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    /// Fails when the adb binary cannot be launched at all.
    pub async fn ensure_available(&self, timeout: Duration) -> Result<String, TransportError> {
        let out = self.run(None, &CommandSpec::new(&["version"], timeout)).await?;
        let version = out.stdout.lines().next().unwrap_or_default().trim().to_string();
        log::info!("Using {}", version);
        Ok(version)
    }

    pub async fn list_devices(&self, timeout: Duration) -> Result<Vec<DeviceHandle>, TransportError> {
        let out = self
            .run(None, &CommandSpec::new(&["devices", "-l"], timeout))
            .await?;
        let devices = parsers::parse_device_list(&out.stdout);
        log::info!("Found {} attached device(s).", devices.len());
        Ok(devices)
    }

    async fn run(
        &self,
        serial: Option<&str>,
        command: &CommandSpec,
    ) -> Result<RawOutput, TransportError> {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(serial) = serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| TransportError::Spawn {
            message: format!("{}: {}", self.adb_path, e),
        })?;

        let out = match tokio::time::timeout(command.timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                return Err(TransportError::Spawn {
                    message: e.to_string(),
                })
            }
            Err(_) => {
                log::warn!("adb {} timed out after {:?}", command, command.timeout);
                return Err(TransportError::Timeout {
                    after: command.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&out.stdout).to_string();
        let stderr = String::from_utf8_lossy(&out.stderr).to_string();
        if out.status.success() {
            return Ok(RawOutput { stdout });
        }

        if is_device_missing(&stderr) {
            return Err(TransportError::NotFound {
                serial: serial.unwrap_or_default().to_string(),
            });
        }
        Err(TransportError::NonZeroExit {
            code: out.status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

#[async_trait]
impl Transport for AdbTransport {
    async fn execute(
        &self,
        device: &DeviceHandle,
        command: &CommandSpec,
    ) -> Result<RawOutput, TransportError> {
        log::debug!("adb -s {} {}", device.serial, command);
        self.run(Some(&device.serial), command).await
    }
}

/// Sequential command issuance against one device for the length of a scan.
///
/// Once the device is reported missing or the scan is cancelled the session
/// halts: later commands fail immediately with the same error instead of
/// reaching the transport.
pub struct DeviceSession<'a> {
    transport: &'a dyn Transport,
    device: &'a DeviceHandle,
    cancel: CancellationToken,
    halted: Option<TransportError>,
}

impl<'a> DeviceSession<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        device: &'a DeviceHandle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            device,
            cancel,
            halted: None,
        }
    }

    pub fn device(&self) -> &DeviceHandle {
        self.device
    }

    pub fn halted(&self) -> Option<&TransportError> {
        self.halted.as_ref()
    }

    pub async fn run(&mut self, command: &CommandSpec) -> Result<RawOutput, TransportError> {
        if let Some(err) = &self.halted {
            return Err(err.clone());
        }
        if self.cancel.is_cancelled() {
            self.halted = Some(TransportError::Cancelled);
            return Err(TransportError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            res = self.transport.execute(self.device, command) => res,
        };
        if let Err(err @ (TransportError::NotFound { .. } | TransportError::Cancelled)) = &result {
            self.halted = Some(err.clone());
        }
        result
    }
}

fn is_device_missing(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    (stderr.contains("device") && stderr.contains("not found"))
        || stderr.contains("device offline")
        || stderr.contains("no devices/emulators found")
}
