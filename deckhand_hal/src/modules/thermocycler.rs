//! Thermocycler module drivers.
//!
//! [`Thermocycler`] talks g-code to the device over a [`SerialTransport`].
//! Commands that get no acknowledgement are retried by a bounded loop with
//! linear backoff, reopening the port between attempts.
//! [`SimulatingThermocycler`] answers the same command set in memory.
//!
//! Both drivers track lid and temperature state from the commands they
//! carry, so `status()` and `live_data()` never touch the device.

use super::transport::{SerialPortTransport, SerialTransport, TransportError};
use async_trait::async_trait;
use deckhand_common::hal::module::{DeviceInfo, Module, ModuleError};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Registered module name.
pub const THERMOCYCLER_NAME: &str = "thermocycler";

const DISPLAY_NAME: &str = "Thermocycler";

/// G-code command table.
pub mod gcode {
    pub const OPEN_LID: &str = "M126";
    pub const CLOSE_LID: &str = "M127";
    pub const GET_LID_STATUS: &str = "M119";
    pub const SET_LID_TEMP: &str = "M140";
    pub const DEACTIVATE_LID_HEATING: &str = "M108";
    pub const EDIT_PID_PARAMS: &str = "M301";
    pub const SET_PLATE_TEMP: &str = "M104";
    pub const GET_PLATE_TEMP: &str = "M105";
    pub const SET_RAMP_RATE: &str = "M566";
    pub const DEACTIVATE: &str = "M18";
    pub const DEVICE_INFO: &str = "M115";
}

pub const BAUDRATE: u32 = 115_200;
pub const COMMAND_TERMINATOR: &str = "\r\n\r\n";
pub const ACK: &str = "ok\r\nok\r\n";
const ERROR_KEYWORD: &str = "error";

/// Temperatures within this band of the target count as reached (°C).
pub const TEMP_THRESHOLD: f64 = 0.5;

/// Bounded retry schedule for unacknowledged commands.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, first send included.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `n * backoff_delay` before retrying.
    pub backoff_delay: Duration,
    /// Acknowledgement timeout per attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(1),
        }
    }
}

// ─── Shared State Tracking ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidStatus {
    Open,
    Closed,
    Unknown,
}

impl LidStatus {
    fn as_str(self) -> &'static str {
        match self {
            LidStatus::Open => "open",
            LidStatus::Closed => "closed",
            LidStatus::Unknown => "unknown",
        }
    }
}

/// Last known thermocycler readings.
#[derive(Debug, Clone)]
pub struct ThermocyclerState {
    pub lid: LidStatus,
    pub lid_target: Option<f64>,
    pub target_temp: Option<f64>,
    pub current_temp: Option<f64>,
    pub ramp_rate: Option<f64>,
}

impl Default for ThermocyclerState {
    fn default() -> Self {
        Self {
            lid: LidStatus::Unknown,
            lid_target: None,
            target_temp: None,
            current_temp: None,
            ramp_rate: None,
        }
    }
}

impl ThermocyclerState {
    /// Fold a successful command and its response into the state.
    fn observe(&mut self, command: &str, response: &str) {
        let (code, args) = split_command(command);
        match code {
            gcode::OPEN_LID => self.lid = LidStatus::Open,
            gcode::CLOSE_LID => self.lid = LidStatus::Closed,
            gcode::GET_LID_STATUS => {
                self.lid = match parse_key_values(response).get("Lid").map(String::as_str) {
                    Some("open") => LidStatus::Open,
                    Some("closed") => LidStatus::Closed,
                    _ => LidStatus::Unknown,
                }
            }
            gcode::SET_LID_TEMP => self.lid_target = args.get("S").copied(),
            gcode::DEACTIVATE_LID_HEATING => self.lid_target = None,
            gcode::SET_PLATE_TEMP => self.target_temp = args.get("S").copied(),
            gcode::SET_RAMP_RATE => self.ramp_rate = args.get("S").copied(),
            gcode::GET_PLATE_TEMP => {
                let values = parse_key_values(response);
                self.target_temp = values.get("T").and_then(|v| v.parse().ok());
                self.current_temp = values.get("C").and_then(|v| v.parse().ok());
            }
            gcode::DEACTIVATE => {
                self.target_temp = None;
                self.lid_target = None;
            }
            _ => {}
        }
    }

    fn status(&self) -> String {
        match (self.target_temp, self.current_temp) {
            (None, _) => "idle".to_string(),
            (Some(target), Some(current)) if (target - current).abs() < TEMP_THRESHOLD => {
                "holding at target".to_string()
            }
            _ => "ramping".to_string(),
        }
    }

    fn live_data(&self, status: String) -> serde_json::Value {
        json!({
            "status": status,
            "lid": self.lid.as_str(),
            "lidTarget": self.lid_target,
            "currentTemp": self.current_temp,
            "targetTemp": self.target_temp,
            "rampRate": self.ramp_rate,
        })
    }
}

/// Split `M104 S40.0` into its code and numeric arguments.
fn split_command(command: &str) -> (&str, BTreeMap<String, f64>) {
    let mut parts = command.split_whitespace();
    let code = parts.next().unwrap_or("");
    let args = parts
        .filter_map(|p| {
            let (key, value) = p.split_at_checked(1)?;
            Some((key.to_string(), value.parse().ok()?))
        })
        .collect();
    (code, args)
}

/// Parse `key:value` tokens from a device response.
fn parse_key_values(response: &str) -> BTreeMap<String, String> {
    response
        .split_whitespace()
        .filter_map(|token| token.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn parse_device_info(response: &str) -> DeviceInfo {
    let values = parse_key_values(response);
    let field = |key: &str| values.get(key).cloned().unwrap_or_default();
    DeviceInfo {
        serial: field("serial"),
        model: field("model"),
        version: field("version"),
    }
}

/// Strip the acknowledgement and reject device-reported errors.
fn process_response(command: &str, raw: &str) -> Result<String, ModuleError> {
    let cleaned = raw.replace(ACK, "").trim().to_string();
    if cleaned.to_lowercase().contains(ERROR_KEYWORD) {
        warn!("Thermocycler rejected '{}': {}", command, cleaned);
        return Err(ModuleError::DeviceError(cleaned));
    }
    Ok(cleaned)
}

// ─── Serial Driver ──────────────────────────────────────────────────

type SharedTransport = Arc<Mutex<Box<dyn SerialTransport>>>;

/// Thermocycler on a serial port.
pub struct Thermocycler {
    port: String,
    transport: Option<SharedTransport>,
    retry: RetryPolicy,
    state: ThermocyclerState,
    device_info: Option<DeviceInfo>,
}

impl Thermocycler {
    /// Driver that opens a serial port on `connect`.
    pub fn new() -> Self {
        Self {
            port: String::new(),
            transport: None,
            retry: RetryPolicy::default(),
            state: ThermocyclerState::default(),
            device_info: None,
        }
    }

    /// Driver over an already-open transport.
    pub fn with_transport(transport: Box<dyn SerialTransport>) -> Self {
        Self {
            transport: Some(Arc::new(Mutex::new(transport))),
            ..Self::new()
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> &ThermocyclerState {
        &self.state
    }

    /// Send `command`, retrying unacknowledged attempts.
    async fn send_command(&self, command: &str) -> Result<String, ModuleError> {
        let transport = self.transport.clone().ok_or(ModuleError::NotConnected)?;
        let line = format!("{} {}", command, COMMAND_TERMINATOR);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let port = transport.clone();
            let data = line.clone();
            let timeout = self.retry.timeout;
            let result = tokio::task::spawn_blocking(move || {
                let mut port = port.blocking_lock();
                port.write_and_read(&data, ACK, timeout)
            })
            .await
            .map_err(|e| ModuleError::Io(format!("Serial I/O task failed: {}", e)))?;

            match result {
                Ok(raw) => return process_response(command, &raw),
                Err(TransportError::Timeout) if attempt < self.retry.max_attempts => {
                    warn!(
                        "No response to '{}' (attempt {}/{}), reconnecting",
                        command, attempt, self.retry.max_attempts
                    );
                    tokio::time::sleep(self.retry.backoff_delay * attempt).await;
                    let port = transport.clone();
                    tokio::task::spawn_blocking(move || port.blocking_lock().reopen())
                        .await
                        .map_err(|e| ModuleError::Io(format!("Serial I/O task failed: {}", e)))?
                        .map_err(|e| ModuleError::Io(e.to_string()))?;
                }
                Err(TransportError::Timeout) => {
                    return Err(ModuleError::NoResponse {
                        command: command.to_string(),
                        attempts: attempt,
                    });
                }
                Err(TransportError::Io(msg)) => return Err(ModuleError::Io(msg)),
            }
        }
    }
}

impl Default for Thermocycler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for Thermocycler {
    fn name(&self) -> &'static str {
        THERMOCYCLER_NAME
    }

    fn display_name(&self) -> &'static str {
        DISPLAY_NAME
    }

    fn port(&self) -> &str {
        &self.port
    }

    fn is_simulated(&self) -> bool {
        false
    }

    async fn connect(&mut self, port: &str) -> Result<(), ModuleError> {
        if self.transport.is_none() {
            let name = port.to_string();
            let transport =
                tokio::task::spawn_blocking(move || SerialPortTransport::open(&name, BAUDRATE))
                    .await
                    .map_err(|e| ModuleError::Io(format!("Serial I/O task failed: {}", e)))?
                    .map_err(|e| ModuleError::Io(e.to_string()))?;
            self.transport = Some(Arc::new(Mutex::new(Box::new(transport))));
        }
        self.port = port.to_string();

        let info = self.send_command(gcode::DEVICE_INFO).await?;
        self.device_info = Some(parse_device_info(&info));
        let lid = self.send_command(gcode::GET_LID_STATUS).await?;
        self.state.observe(gcode::GET_LID_STATUS, &lid);
        info!("Thermocycler connected on {}", self.port);
        Ok(())
    }

    async fn send(&mut self, command: &str) -> Result<String, ModuleError> {
        let response = self.send_command(command).await?;
        self.state.observe(command, &response);
        Ok(response)
    }

    fn status(&self) -> String {
        self.state.status()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.device_info.clone()
    }

    fn live_data(&self) -> serde_json::Value {
        self.state.live_data(self.status())
    }

    async fn deactivate(&mut self) -> Result<(), ModuleError> {
        self.send(gcode::DEACTIVATE).await.map(|_| ())
    }

    async fn disconnect(&mut self) -> Result<(), ModuleError> {
        if self.transport.take().is_some() {
            debug!("Thermocycler on {} disconnected", self.port);
        }
        Ok(())
    }
}

// ─── Simulating Driver ──────────────────────────────────────────────

/// In-memory thermocycler; temperatures are reached instantly.
pub struct SimulatingThermocycler {
    port: String,
    connected: bool,
    state: ThermocyclerState,
}

impl SimulatingThermocycler {
    pub fn new() -> Self {
        Self {
            port: String::new(),
            connected: false,
            state: ThermocyclerState {
                lid: LidStatus::Open,
                ..ThermocyclerState::default()
            },
        }
    }

    fn respond(&mut self, command: &str) -> Result<String, ModuleError> {
        let (code, args) = split_command(command);
        let response = match code {
            gcode::GET_LID_STATUS => format!("Lid:{}", self.state.lid.as_str()),
            gcode::GET_PLATE_TEMP => format!(
                "T:{} C:{}",
                fmt_temp(self.state.target_temp),
                fmt_temp(self.state.current_temp)
            ),
            gcode::DEVICE_INFO => "serial:dummySerial model:dummyModel version:dummyVersion".to_string(),
            gcode::SET_PLATE_TEMP => {
                if !args.contains_key("S") {
                    return Err(ModuleError::InvalidCommand(command.to_string()));
                }
                self.state.current_temp = args.get("S").copied();
                String::new()
            }
            gcode::OPEN_LID
            | gcode::CLOSE_LID
            | gcode::SET_LID_TEMP
            | gcode::DEACTIVATE_LID_HEATING
            | gcode::EDIT_PID_PARAMS
            | gcode::SET_RAMP_RATE => String::new(),
            gcode::DEACTIVATE => {
                self.state.current_temp = None;
                String::new()
            }
            _ => return Err(ModuleError::InvalidCommand(command.to_string())),
        };
        Ok(response)
    }
}

fn fmt_temp(temp: Option<f64>) -> String {
    temp.map(|t| t.to_string()).unwrap_or_else(|| "none".to_string())
}

impl Default for SimulatingThermocycler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for SimulatingThermocycler {
    fn name(&self) -> &'static str {
        THERMOCYCLER_NAME
    }

    fn display_name(&self) -> &'static str {
        DISPLAY_NAME
    }

    fn port(&self) -> &str {
        &self.port
    }

    fn is_simulated(&self) -> bool {
        true
    }

    async fn connect(&mut self, port: &str) -> Result<(), ModuleError> {
        self.port = port.to_string();
        self.connected = true;
        debug!("Simulating thermocycler connected on {}", port);
        Ok(())
    }

    async fn send(&mut self, command: &str) -> Result<String, ModuleError> {
        if !self.connected {
            return Err(ModuleError::NotConnected);
        }
        let response = self.respond(command)?;
        self.state.observe(command, &response);
        Ok(response)
    }

    fn status(&self) -> String {
        self.state.status()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(parse_device_info(
            "serial:dummySerial model:dummyModel version:dummyVersion",
        ))
    }

    fn live_data(&self) -> serde_json::Value {
        self.state.live_data(self.status())
    }

    async fn deactivate(&mut self) -> Result<(), ModuleError> {
        self.send(gcode::DEACTIVATE).await.map(|_| ())
    }

    async fn disconnect(&mut self) -> Result<(), ModuleError> {
        self.connected = false;
        Ok(())
    }
}
