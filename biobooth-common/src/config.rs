//! Configuration loading and session timing presets
//!
//! Values resolve in priority order: command-line argument (handled by the
//! binary), environment variable (also handled by clap), TOML config file,
//! compiled default.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Which cardiac source variant to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcgSource {
    /// Pseudo-random simulated heart, no hardware required
    Sim,
    /// Serial-attached ECG hardware (fatal if the port cannot be opened)
    Serial,
}

/// Which cortical source variant to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EegSource {
    /// Pseudo-random simulated headset, no hardware required
    Sim,
    /// UDP/OSC headset stream
    Udp,
}

impl FromStr for EcgSource {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sim" => Ok(EcgSource::Sim),
            "serial" => Ok(EcgSource::Serial),
            other => Err(Error::Config(format!(
                "unknown ecg source '{other}' (expected 'sim' or 'serial')"
            ))),
        }
    }
}

impl FromStr for EegSource {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sim" => Ok(EegSource::Sim),
            "udp" => Ok(EegSource::Udp),
            other => Err(Error::Config(format!(
                "unknown eeg source '{other}' (expected 'sim' or 'udp')"
            ))),
        }
    }
}

/// Session phase timing, in seconds
///
/// The phase machine is driven purely by these durations; sensor dropout
/// never pauses or extends a phase.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimingConfig {
    /// Tick interval for publishing live values
    pub vis_period_sec: f64,
    /// Baseline phase duration
    pub baseline_sec: f64,
    /// Condition phase duration
    pub condition_sec: f64,
    /// Sub-window at the start of Baseline during which the instruction
    /// message is additionally published
    pub baseline_inst_sec: f64,
    /// Sub-window at the start of Condition for the instruction message
    pub condition_inst_sec: f64,
}

impl TimingConfig {
    /// Full visitor-mode timing
    pub fn live() -> Self {
        Self {
            vis_period_sec: 0.25,
            baseline_sec: 30.0,
            condition_sec: 90.0,
            baseline_inst_sec: 6.0,
            condition_inst_sec: 9.0,
        }
    }

    /// Expedited timing for bench testing
    pub fn debug() -> Self {
        Self {
            vis_period_sec: 0.25,
            baseline_sec: 5.0,
            condition_sec: 5.0,
            baseline_inst_sec: 2.0,
            condition_inst_sec: 2.0,
        }
    }

    /// Look up a named preset
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "live" => Ok(Self::live()),
            "debug" => Ok(Self::debug()),
            other => Err(Error::Config(format!(
                "unknown timing preset '{other}' (expected 'live' or 'debug')"
            ))),
        }
    }
}

/// Process configuration for the booth engine
#[derive(Debug, Clone, Deserialize)]
pub struct BoothConfig {
    /// Pub/sub server host
    #[serde(default = "default_server")]
    pub server: String,

    /// Pub/sub server port (only the visualization port is recognized)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client name announced on the pub/sub channel
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Cardiac source variant
    #[serde(default = "default_ecg_source")]
    pub ecg_source: EcgSource,

    /// Serial device for the real cardiac source
    #[serde(default = "default_serial_port")]
    pub serial_port: String,

    /// Cardiac sample rate in Hz (drives the lead-off timeout frame count)
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,

    /// Cortical source variant
    #[serde(default = "default_eeg_source")]
    pub eeg_source: EegSource,

    /// UDP bind address for the cortical OSC listener
    #[serde(default = "default_osc_bind")]
    pub osc_bind: String,

    /// Session phase timing
    #[serde(default = "TimingConfig::debug")]
    pub timing: TimingConfig,
}

fn default_server() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9002
}

fn default_client_name() -> String {
    "booth-7".to_string()
}

fn default_ecg_source() -> EcgSource {
    EcgSource::Sim
}

fn default_serial_port() -> String {
    "COM7".to_string()
}

fn default_sample_rate() -> u32 {
    512
}

fn default_eeg_source() -> EegSource {
    EegSource::Sim
}

fn default_osc_bind() -> String {
    "127.0.0.1:5000".to_string()
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
            client_name: default_client_name(),
            ecg_source: default_ecg_source(),
            serial_port: default_serial_port(),
            sample_rate_hz: default_sample_rate(),
            eeg_source: default_eeg_source(),
            osc_bind: default_osc_bind(),
            timing: TimingConfig::debug(),
        }
    }
}

impl BoothConfig {
    /// Load configuration from a TOML file, or compiled defaults when no
    /// file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
            }
        }
    }
}
