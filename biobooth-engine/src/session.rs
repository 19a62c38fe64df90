//! Session state machine and publish tick loop
//!
//! Phases run Idle -> Baseline -> Condition -> Baseline -> ... until
//! tag-out. Transitions are driven purely by elapsed wall-clock time;
//! sensor content (including lead-off) never pauses or extends a phase, so
//! the exhibit's timing stays externally predictable.

use crate::clock::Clock;
use crate::publish::PublishSink;
use crate::shutdown::Shutdown;
use crate::sources::{CardiacSource, CorticalSource};
use biobooth_common::config::TimingConfig;
use biobooth_common::payload;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Exhibit experience phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Baseline,
    Condition,
}

/// Phase timing as durations
#[derive(Debug, Clone)]
pub struct SessionTiming {
    pub vis_period: Duration,
    pub baseline: Duration,
    pub condition: Duration,
    pub baseline_instruction: Duration,
    pub condition_instruction: Duration,
}

impl From<&TimingConfig> for SessionTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            vis_period: Duration::from_secs_f64(config.vis_period_sec),
            baseline: Duration::from_secs_f64(config.baseline_sec),
            condition: Duration::from_secs_f64(config.condition_sec),
            baseline_instruction: Duration::from_secs_f64(config.baseline_inst_sec),
            condition_instruction: Duration::from_secs_f64(config.condition_inst_sec),
        }
    }
}

struct PhaseState {
    phase: SessionPhase,
    /// Set while a session is running; re-based by exactly one phase
    /// duration on each transition so timing never drifts
    phase_started: Option<Instant>,
}

/// The orchestrator: pulls latest values from both acquisition components
/// each tick, publishes them, and advances the phase timer
pub struct SessionEngine {
    cardiac: Arc<dyn CardiacSource>,
    cortical: Arc<dyn CorticalSource>,
    sink: Arc<dyn PublishSink>,
    timing: SessionTiming,
    clock: Arc<dyn Clock>,
    state: Mutex<PhaseState>,
}

impl SessionEngine {
    pub fn new(
        cardiac: Arc<dyn CardiacSource>,
        cortical: Arc<dyn CorticalSource>,
        sink: Arc<dyn PublishSink>,
        timing: SessionTiming,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cardiac,
            cortical,
            sink,
            timing,
            clock,
            state: Mutex::new(PhaseState {
                phase: SessionPhase::Idle,
                phase_started: None,
            }),
        }
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.state.lock().unwrap().phase
    }

    /// Start a session, or restart the phase clock at Baseline when one is
    /// already running
    pub fn tag_in(&self) {
        let mut state = self.state.lock().unwrap();
        match state.phase {
            SessionPhase::Idle => info!("tag in: session started"),
            _ => info!("tag in during active session: restarting at baseline"),
        }
        state.phase = SessionPhase::Baseline;
        state.phase_started = Some(self.clock.now());
    }

    /// End the session and return to Idle
    pub fn tag_out(&self) {
        let mut state = self.state.lock().unwrap();
        if state.phase != SessionPhase::Idle {
            info!("tag out: session ended");
        }
        state.phase = SessionPhase::Idle;
        state.phase_started = None;
    }

    /// One engine tick: publish live values, then advance the phase timer.
    ///
    /// Live values publish on every tick, in or out of a session (the
    /// visualization renders an attract loop while Idle); instruction
    /// events and phase advancement happen only in-session.
    pub fn tick(&self) {
        let alpha = self.cortical.alpha_batch();
        let live = payload::format_eeg_ecg(&alpha, self.cardiac.hrv(), self.cardiac.is_lead_on());
        if let Err(e) = self.sink.publish(payload::CHANNEL_EEG_ECG, &live) {
            warn!("live value publish failed: {e}");
        }

        let mut state = self.state.lock().unwrap();
        let Some(started) = state.phase_started else {
            return;
        };
        let mut elapsed = self.clock.now() - started;

        // Advance through as many phase boundaries as elapsed time covers,
        // keeping wall-clock alignment even across a stalled tick
        loop {
            let duration = match state.phase {
                SessionPhase::Baseline => self.timing.baseline,
                SessionPhase::Condition => self.timing.condition,
                SessionPhase::Idle => return,
            };
            if elapsed < duration {
                break;
            }
            state.phase = match state.phase {
                SessionPhase::Baseline => SessionPhase::Condition,
                SessionPhase::Condition => SessionPhase::Baseline,
                SessionPhase::Idle => return,
            };
            if let Some(at) = state.phase_started.as_mut() {
                *at += duration;
            }
            elapsed -= duration;
            debug!("phase transition to {:?}", state.phase);
        }

        let (condition, instruction_window) = match state.phase {
            SessionPhase::Baseline => (false, self.timing.baseline_instruction),
            SessionPhase::Condition => (true, self.timing.condition_instruction),
            SessionPhase::Idle => return,
        };
        if elapsed < instruction_window {
            let text = payload::instruction_text(condition);
            if let Err(e) = self.sink.publish(payload::CHANNEL_INSTRUCTION, text) {
                warn!("instruction publish failed: {e}");
            }
        }
    }

    /// Run the fixed-period tick loop until shutdown
    pub async fn run(self: Arc<Self>, shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(self.timing.vis_period);
        info!(
            "session engine running, tick period {:?}",
            self.timing.vis_period
        );
        loop {
            ticker.tick().await;
            if shutdown.is_signalled() {
                break;
            }
            self.tick();
        }
        info!("session engine stopped");
    }
}
