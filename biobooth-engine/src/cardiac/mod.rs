//! Cardiac acquisition: serial producer + analysis consumer
//!
//! A dedicated thread reads the serial transport and enqueues frames; a
//! second thread pops them strictly in arrival order, maintains lead
//! contact state, applies the lead-off timeout recovery policy, and feeds
//! the analyzer. The session engine reads latest values only; this
//! component is the sole writer of its exposed fields.

pub mod dsp;
pub mod queue;
pub mod transport;

pub use dsp::RPeakAnalyzer;
pub use transport::{
    AnalysisUpdate, CardiacAnalyzer, CardiacFrame, CardiacTransport, ThinkGearParser,
    ThinkGearPort, LEAD_OFF_CODE, LEAD_ON_CODE,
};

use crate::shutdown::Shutdown;
use crate::sources::{CardiacSource, ABSENT, ABSENT_RRI};
use queue::FrameQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reset the analyzer after this long at full lead-off.
///
/// Long enough to hold values between baseline and condition on the same
/// wearer, short enough to clear a previous wearer's beat history.
pub const LEAD_TIMEOUT_SECS: u32 = 30;

/// Frame FIFO bound (~4 s at 512 Hz); overflow drops the oldest frame
const FRAME_QUEUE_CAPACITY: usize = 2048;

/// Consumer wait per pop, bounding shutdown latency
const POP_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Default)]
struct DerivedMetrics {
    hrv: Option<f64>,
    hrv_t: Option<f64>,
    rri: Option<i64>,
}

/// Latest-value state shared with readers
#[derive(Default)]
struct CardiacLatest {
    lead_on: AtomicBool,
    metrics: RwLock<DerivedMetrics>,
}

/// Owns the serial producer and analysis consumer threads
pub struct CardiacAcquisition {
    latest: Arc<CardiacLatest>,
    reader: Mutex<Option<JoinHandle<()>>>,
    analysis: Mutex<Option<JoinHandle<()>>>,
    shutdown: Shutdown,
}

impl CardiacAcquisition {
    /// Spawn the producer/consumer pair.
    ///
    /// The threads run until `shutdown` is signalled; call [`stop`] at
    /// process teardown to join them.
    ///
    /// [`stop`]: CardiacAcquisition::stop
    pub fn start(
        transport: Box<dyn CardiacTransport>,
        analyzer: Box<dyn CardiacAnalyzer>,
        shutdown: Shutdown,
    ) -> Self {
        let latest = Arc::new(CardiacLatest::default());
        let frames = Arc::new(FrameQueue::with_capacity(FRAME_QUEUE_CAPACITY));

        let reader = {
            let frames = Arc::clone(&frames);
            let shutdown = shutdown.clone();
            thread::spawn(move || reader_loop(transport, frames, shutdown))
        };
        let analysis = {
            let latest = Arc::clone(&latest);
            let shutdown = shutdown.clone();
            thread::spawn(move || analysis_loop(analyzer, frames, latest, shutdown))
        };

        info!("cardiac acquisition started (producer + analysis threads)");

        Self {
            latest,
            reader: Mutex::new(Some(reader)),
            analysis: Mutex::new(Some(analysis)),
            shutdown,
        }
    }

    /// Join both threads after the shutdown flag has been signalled
    pub fn stop(&self) {
        self.shutdown.signal();
        if let Some(handle) = self.reader.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.analysis.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("cardiac acquisition stopped");
    }
}

impl CardiacSource for CardiacAcquisition {
    fn is_lead_on(&self) -> bool {
        self.latest.lead_on.load(Ordering::Relaxed)
    }

    fn hrv(&self) -> f64 {
        self.latest.metrics.read().unwrap().hrv.unwrap_or(ABSENT)
    }

    fn hrv_timestamp(&self) -> f64 {
        self.latest.metrics.read().unwrap().hrv_t.unwrap_or(ABSENT)
    }

    fn rri(&self) -> i64 {
        self.latest.metrics.read().unwrap().rri.unwrap_or(ABSENT_RRI)
    }
}

/// Producer: pull frames from the transport into the FIFO
fn reader_loop(
    mut transport: Box<dyn CardiacTransport>,
    frames: Arc<FrameQueue>,
    shutdown: Shutdown,
) {
    debug!("cardiac reader thread started");
    while !shutdown.is_signalled() {
        match transport.next_frame() {
            Ok(Some(frame)) => {
                if frames.push(frame) {
                    debug!("cardiac frame queue full, dropped oldest sample");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("cardiac transport read failed: {e}");
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
    debug!("cardiac reader thread exiting");
}

/// Consumer: lead state, timeout recovery, analysis, latest-value updates
fn analysis_loop(
    mut analyzer: Box<dyn CardiacAnalyzer>,
    frames: Arc<FrameQueue>,
    latest: Arc<CardiacLatest>,
    shutdown: Shutdown,
) {
    debug!("cardiac analysis thread started");
    let timeout_frames = u64::from(analyzer.sample_rate_hz()) * u64::from(LEAD_TIMEOUT_SECS);
    let mut leadoff_run: u64 = 0;

    while !shutdown.is_signalled() {
        let Some(frame) = frames.pop_timeout(POP_TIMEOUT) else {
            continue;
        };

        latest
            .lead_on
            .store(frame.leadoff == LEAD_ON_CODE, Ordering::Relaxed);

        if frame.leadoff == LEAD_OFF_CODE {
            leadoff_run += 1;
            if leadoff_run > timeout_frames {
                // Clear a previous wearer's beat history exactly once per
                // qualifying run: reset zeroes the beat count, disarming
                // the guard until beats are detected again. The run
                // counter keeps accumulating until contact resumes, and
                // frames past the timeout are not analyzed.
                if analyzer.total_detected_beats() != 0 {
                    info!(
                        "lead off for over {LEAD_TIMEOUT_SECS}s, resetting cardiac analyzer"
                    );
                    analyzer.reset();
                }
                continue;
            }
        } else {
            leadoff_run = 0;
        }

        let update = analyzer.analyze(&frame);
        if update.hrv.is_some() || update.rri.is_some() {
            let mut metrics = latest.metrics.write().unwrap();
            if let Some(hrv) = update.hrv {
                metrics.hrv = Some(hrv);
                metrics.hrv_t = Some(frame.timestamp);
            }
            if let Some(rri) = update.rri {
                metrics.rri = Some(rri);
            }
        }
    }
    debug!("cardiac analysis thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    /// Transport replaying a fixed frame script, then idling
    struct ScriptedTransport {
        frames: std::collections::VecDeque<CardiacFrame>,
    }

    impl ScriptedTransport {
        fn new(frames: Vec<CardiacFrame>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl CardiacTransport for ScriptedTransport {
        fn next_frame(&mut self) -> biobooth_common::Result<Option<CardiacFrame>> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None => {
                    thread::sleep(Duration::from_millis(5));
                    Ok(None)
                }
            }
        }
    }

    /// Analyzer that counts resets and pretends every frame is a beat
    struct CountingAnalyzer {
        sample_rate: u32,
        beats: u64,
        resets: Arc<AtomicU64>,
        analyzed: Arc<AtomicU64>,
    }

    impl CardiacAnalyzer for CountingAnalyzer {
        fn sample_rate_hz(&self) -> u32 {
            self.sample_rate
        }

        fn analyze(&mut self, frame: &CardiacFrame) -> AnalysisUpdate {
            self.analyzed.fetch_add(1, Ordering::Relaxed);
            if frame.raw == 0 {
                return AnalysisUpdate::default();
            }
            self.beats += 1;
            AnalysisUpdate {
                hrv: Some(f64::from(frame.raw)),
                rri: Some(i64::from(frame.raw)),
            }
        }

        fn reset(&mut self) {
            self.beats = 0;
            self.resets.fetch_add(1, Ordering::Relaxed);
        }

        fn total_detected_beats(&self) -> u64 {
            self.beats
        }
    }

    fn frame(leadoff: u8, raw: i32) -> CardiacFrame {
        CardiacFrame {
            timestamp: 1000.0,
            raw,
            leadoff,
        }
    }

    fn wait_until(deadline_ms: u64, mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..deadline_ms / 5 {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn fresh_source_reports_sentinels() {
        let shutdown = Shutdown::new();
        let acquisition = CardiacAcquisition::start(
            Box::new(ScriptedTransport::new(vec![])),
            Box::new(RPeakAnalyzer::new(512)),
            shutdown.clone(),
        );

        assert_eq!(acquisition.hrv(), ABSENT);
        assert_eq!(acquisition.hrv_timestamp(), ABSENT);
        assert_eq!(acquisition.rri(), ABSENT_RRI);
        assert!(!acquisition.is_lead_on());

        acquisition.stop();
    }

    #[test]
    fn lead_state_tracks_latest_code_and_reads_idempotently() {
        let shutdown = Shutdown::new();
        let acquisition = CardiacAcquisition::start(
            Box::new(ScriptedTransport::new(vec![frame(200, 1)])),
            Box::new(RPeakAnalyzer::new(512)),
            shutdown.clone(),
        );

        assert!(wait_until(1000, || acquisition.is_lead_on()));
        // Repeated reads between writes return the same value
        assert!(acquisition.is_lead_on());
        assert!(acquisition.is_lead_on());

        acquisition.stop();
    }

    #[test]
    fn analysis_updates_latest_metrics() {
        let shutdown = Shutdown::new();
        let resets = Arc::new(AtomicU64::new(0));
        let analyzed = Arc::new(AtomicU64::new(0));
        let analyzer = CountingAnalyzer {
            sample_rate: 4,
            beats: 0,
            resets: Arc::clone(&resets),
            analyzed: Arc::clone(&analyzed),
        };
        let acquisition = CardiacAcquisition::start(
            Box::new(ScriptedTransport::new(vec![frame(200, 42)])),
            Box::new(analyzer),
            shutdown.clone(),
        );

        assert!(wait_until(1000, || acquisition.rri() == 42));
        assert_eq!(acquisition.hrv(), 42.0);
        assert_eq!(acquisition.hrv_timestamp(), 1000.0);

        acquisition.stop();
    }

    #[test]
    fn leadoff_timeout_resets_exactly_once_per_run() {
        // sample_rate 4 and a 30s timeout: a run of >120 zero frames fires
        // the reset once, after which the zeroed beat count disarms it.
        let shutdown = Shutdown::new();
        let resets = Arc::new(AtomicU64::new(0));
        let analyzed = Arc::new(AtomicU64::new(0));
        let analyzer = CountingAnalyzer {
            sample_rate: 4,
            beats: 0,
            resets: Arc::clone(&resets),
            analyzed: Arc::clone(&analyzed),
        };

        let mut script = vec![frame(200, 1)]; // one beat so the guard arms
        script.extend(std::iter::repeat(frame(0, 0)).take(200));

        let acquisition = CardiacAcquisition::start(
            Box::new(ScriptedTransport::new(script)),
            Box::new(analyzer),
            shutdown.clone(),
        );

        assert!(wait_until(2000, || resets.load(Ordering::Relaxed) == 1));
        // No further resets despite the run continuing past the timeout
        thread::sleep(Duration::from_millis(50));
        assert_eq!(resets.load(Ordering::Relaxed), 1);
        // Beat frame + 120 pre-timeout zeros were analyzed, the rest skipped
        assert_eq!(analyzed.load(Ordering::Relaxed), 121);

        acquisition.stop();
    }

    #[test]
    fn reset_requires_a_previously_detected_beat() {
        let shutdown = Shutdown::new();
        let resets = Arc::new(AtomicU64::new(0));
        let analyzed = Arc::new(AtomicU64::new(0));
        let analyzer = CountingAnalyzer {
            sample_rate: 4,
            beats: 0,
            resets: Arc::clone(&resets),
            analyzed: Arc::clone(&analyzed),
        };

        // All lead-off from the start: no beats, so no reset ever fires
        let script = vec![frame(0, 0); 200];
        let acquisition = CardiacAcquisition::start(
            Box::new(ScriptedTransport::new(script)),
            Box::new(analyzer),
            shutdown.clone(),
        );

        assert!(wait_until(2000, || analyzed.load(Ordering::Relaxed) >= 120));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(resets.load(Ordering::Relaxed), 0);

        acquisition.stop();
    }
}
