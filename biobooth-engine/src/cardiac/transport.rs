//! Cardiac transport and analysis boundary
//!
//! The serial hardware yields, per sample, a timestamp, a raw value and a
//! lead-off code; the DSP step turning raw samples into R-R intervals and
//! HRV sits behind [`CardiacAnalyzer`] so a vendor algorithm can replace
//! the built-in one without touching the acquisition loop.
//!
//! [`ThinkGearPort`] implements the ThinkGear-style serial framing used by
//! the chest-strap hardware: packets of `0xAA 0xAA <len> <payload> <chk>`,
//! where payload rows carry a lead-off code (row 0x02) or a big-endian
//! 16-bit raw sample (row 0x80).

use biobooth_common::{Error, Result};
use chrono::Utc;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

/// Lead-off code meaning full lead contact
pub const LEAD_ON_CODE: u8 = 200;

/// Lead-off code meaning no contact at all; intermediate values are
/// transitional/unreliable contact
pub const LEAD_OFF_CODE: u8 = 0;

/// One sample from the cardiac hardware, pre-analysis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardiacFrame {
    /// Seconds since the Unix epoch at arrival
    pub timestamp: f64,
    /// Raw ADC sample
    pub raw: i32,
    /// Hardware lead-off code (0 = off, 200 = on, intermediate = unreliable)
    pub leadoff: u8,
}

/// New derived values reported for one analyzed frame
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisUpdate {
    /// New HRV value, if the frame completed one
    pub hrv: Option<f64>,
    /// New R-R interval in sample units, if a beat was detected
    pub rri: Option<i64>,
}

/// Byte-stream side of the cardiac boundary
pub trait CardiacTransport: Send {
    /// Wait briefly for the next frame.
    ///
    /// `Ok(None)` means no frame arrived within the transport's internal
    /// timeout; the caller re-checks its shutdown flag and retries.
    fn next_frame(&mut self) -> Result<Option<CardiacFrame>>;
}

/// DSP side of the cardiac boundary
pub trait CardiacAnalyzer: Send {
    /// Hardware sample rate in Hz
    fn sample_rate_hz(&self) -> u32;

    /// Feed one frame; reports any newly derived values
    fn analyze(&mut self, frame: &CardiacFrame) -> AnalysisUpdate;

    /// Clear accumulated beat history (lead-off timeout recovery)
    fn reset(&mut self);

    /// Beats detected since start or last reset
    fn total_detected_beats(&self) -> u64;
}

const SYNC: u8 = 0xAA;
const MAX_PAYLOAD: usize = 169;
const ROW_LEADOFF: u8 = 0x02;
const ROW_RAW: u8 = 0x80;

/// Incremental ThinkGear packet parser, separate from the port for testing
#[derive(Default)]
pub struct ThinkGearParser {
    window: Vec<u8>,
    leadoff: u8,
}

impl ThinkGearParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and return any complete frames they produced
    pub fn push_bytes(&mut self, bytes: &[u8], now: f64) -> Vec<CardiacFrame> {
        self.window.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            // Hunt for the double sync marker
            let Some(start) = self
                .window
                .windows(2)
                .position(|w| w == [SYNC, SYNC])
            else {
                // Keep a trailing lone sync byte, discard the rest
                let keep = usize::from(self.window.last() == Some(&SYNC));
                self.window.drain(..self.window.len() - keep);
                return frames;
            };
            self.window.drain(..start);

            if self.window.len() < 3 {
                return frames;
            }
            let plen = self.window[2] as usize;
            if plen > MAX_PAYLOAD {
                // Corrupt length byte: skip one sync byte and resync
                self.window.drain(..1);
                continue;
            }
            if self.window.len() < 3 + plen + 1 {
                return frames;
            }

            let payload: Vec<u8> = self.window[3..3 + plen].to_vec();
            let checksum = self.window[3 + plen];
            self.window.drain(..3 + plen + 1);

            let sum: u32 = payload.iter().map(|&b| u32::from(b)).sum();
            if !(sum as u8) != checksum {
                debug!("dropping cardiac packet with bad checksum");
                continue;
            }

            self.parse_payload(&payload, now, &mut frames);
        }
    }

    fn parse_payload(&mut self, payload: &[u8], now: f64, frames: &mut Vec<CardiacFrame>) {
        let mut i = 0;
        while i < payload.len() {
            let code = payload[i];
            i += 1;
            if code < 0x80 {
                // Single-byte value row
                let Some(&value) = payload.get(i) else { return };
                i += 1;
                if code == ROW_LEADOFF {
                    self.leadoff = value;
                }
            } else {
                // Multi-byte row: explicit length then value bytes
                let Some(&vlen) = payload.get(i) else { return };
                i += 1;
                let Some(value) = payload.get(i..i + vlen as usize) else {
                    return;
                };
                i += vlen as usize;
                if code == ROW_RAW && vlen == 2 {
                    let raw = i16::from_be_bytes([value[0], value[1]]);
                    frames.push(CardiacFrame {
                        timestamp: now,
                        raw: i32::from(raw),
                        leadoff: self.leadoff,
                    });
                }
            }
        }
    }
}

/// Serial port speaking the ThinkGear framing
pub struct ThinkGearPort {
    port: Box<dyn serialport::SerialPort>,
    parser: ThinkGearParser,
    pending: std::collections::VecDeque<CardiacFrame>,
    read_buf: [u8; 512],
}

impl ThinkGearPort {
    const BAUD: u32 = 57_600;
    const READ_TIMEOUT: Duration = Duration::from_millis(250);

    /// Open the named serial device.
    ///
    /// Failure here is fatal for the real cardiac source; there is no
    /// hardware-absent fallback.
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, Self::BAUD)
            .timeout(Self::READ_TIMEOUT)
            .open()
            .map_err(|e| Error::TransportUnavailable(format!("{path}: {e}")))?;
        Ok(Self {
            port,
            parser: ThinkGearParser::new(),
            pending: std::collections::VecDeque::new(),
            read_buf: [0; 512],
        })
    }
}

impl CardiacTransport for ThinkGearPort {
    fn next_frame(&mut self) -> Result<Option<CardiacFrame>> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }
        match self.port.read(&mut self.read_buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                let now = Utc::now().timestamp_micros() as f64 / 1e6;
                self.pending
                    .extend(self.parser.push_bytes(&self.read_buf[..n], now));
                Ok(self.pending.pop_front())
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
