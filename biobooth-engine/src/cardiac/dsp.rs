//! Built-in R-peak analyzer
//!
//! Stands behind the [`CardiacAnalyzer`] boundary where the hardware
//! vendor's algorithm would otherwise sit: adaptive-threshold beat
//! detection, R-R intervals in sample units, and an RMSSD-based HRV over a
//! sliding window of recent intervals.

use super::transport::{AnalysisUpdate, CardiacAnalyzer, CardiacFrame};
use std::collections::VecDeque;

/// Recent R-R intervals retained for the HRV estimate
const RRI_WINDOW: usize = 32;

/// EMA coefficient for the signal-level tracker
const LEVEL_ALPHA: f64 = 0.02;

pub struct RPeakAnalyzer {
    sample_rate: u32,
    /// Samples seen since start or last reset
    index: u64,
    /// Sample index of the last detected beat
    last_beat: Option<u64>,
    /// Recent intervals, sample units
    rris: VecDeque<i64>,
    total_beats: u64,
    /// Running estimate of mean absolute signal level
    level: f64,
    /// Minimum samples between beats (refractory period, 250 ms)
    refractory: u64,
    /// True while the signal is above threshold (one beat per excursion)
    above: bool,
}

impl RPeakAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            index: 0,
            last_beat: None,
            rris: VecDeque::with_capacity(RRI_WINDOW),
            total_beats: 0,
            level: 0.0,
            refractory: u64::from(sample_rate) / 4,
            above: false,
        }
    }

    fn threshold(&self) -> f64 {
        4.0 * self.level + 1.0
    }

    /// RMSSD over the retained intervals, in milliseconds
    fn rmssd_ms(&self) -> Option<f64> {
        if self.rris.len() < 2 {
            return None;
        }
        let ms_per_sample = 1000.0 / f64::from(self.sample_rate);
        let diffs: Vec<f64> = self
            .rris
            .iter()
            .zip(self.rris.iter().skip(1))
            .map(|(a, b)| (b - a) as f64 * ms_per_sample)
            .collect();
        let mean_sq = diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64;
        Some(mean_sq.sqrt())
    }
}

impl CardiacAnalyzer for RPeakAnalyzer {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate
    }

    fn analyze(&mut self, frame: &CardiacFrame) -> AnalysisUpdate {
        let x = f64::from(frame.raw).abs();
        let threshold = self.threshold();
        self.level += LEVEL_ALPHA * (x - self.level);

        let mut update = AnalysisUpdate::default();
        let index = self.index;
        self.index += 1;

        if x <= threshold {
            self.above = false;
            return update;
        }
        if self.above {
            return update;
        }
        self.above = true;

        if let Some(last) = self.last_beat {
            if index - last < self.refractory {
                return update;
            }
            let rri = (index - last) as i64;
            if self.rris.len() == RRI_WINDOW {
                self.rris.pop_front();
            }
            self.rris.push_back(rri);
            update.rri = Some(rri);
        }

        self.last_beat = Some(index);
        self.total_beats += 1;
        update.hrv = self.rmssd_ms();
        update
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_beat = None;
        self.rris.clear();
        self.total_beats = 0;
        self.level = 0.0;
        self.above = false;
    }

    fn total_detected_beats(&self) -> u64 {
        self.total_beats
    }
}
