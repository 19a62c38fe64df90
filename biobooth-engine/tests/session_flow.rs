//! End-to-end session flow through the public API: sources in, phase
//! machine in the middle, published payloads out.

use biobooth_common::config::TimingConfig;
use biobooth_common::payload;
use biobooth_engine::clock::ManualClock;
use biobooth_engine::publish::MemorySink;
use biobooth_engine::session::{SessionEngine, SessionPhase, SessionTiming};
use biobooth_engine::sources::{CardiacSource, CorticalSource, ABSENT, ABSENT_RRI};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cardiac source whose readings the test scripts directly
struct ScriptedCardiac {
    lead_on: Mutex<bool>,
    hrv: Mutex<f64>,
}

impl ScriptedCardiac {
    fn new() -> Self {
        Self {
            lead_on: Mutex::new(false),
            hrv: Mutex::new(ABSENT),
        }
    }

    fn set(&self, lead_on: bool, hrv: f64) {
        *self.lead_on.lock().unwrap() = lead_on;
        *self.hrv.lock().unwrap() = hrv;
    }
}

impl CardiacSource for ScriptedCardiac {
    fn is_lead_on(&self) -> bool {
        *self.lead_on.lock().unwrap()
    }
    fn hrv(&self) -> f64 {
        *self.hrv.lock().unwrap()
    }
    fn hrv_timestamp(&self) -> f64 {
        ABSENT
    }
    fn rri(&self) -> i64 {
        ABSENT_RRI
    }
}

/// Cortical source returning a fresh scripted batch per tick
struct ScriptedCortical {
    batches: Mutex<Vec<Vec<f64>>>,
}

impl ScriptedCortical {
    fn new(batches: Vec<Vec<f64>>) -> Self {
        Self {
            batches: Mutex::new(batches),
        }
    }
}

impl CorticalSource for ScriptedCortical {
    fn alpha_batch(&self) -> Vec<f64> {
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            Vec::new()
        } else {
            batches.remove(0)
        }
    }
    fn is_on_forehead(&self) -> Option<bool> {
        Some(true)
    }
    fn secs_since_forehead_transition(&self) -> f64 {
        0.0
    }
}

struct Booth {
    engine: SessionEngine,
    clock: Arc<ManualClock>,
    sink: Arc<MemorySink>,
    cardiac: Arc<ScriptedCardiac>,
}

fn booth(batches: Vec<Vec<f64>>) -> Booth {
    let clock = Arc::new(ManualClock::new());
    let sink = Arc::new(MemorySink::new());
    let cardiac = Arc::new(ScriptedCardiac::new());
    let engine = SessionEngine::new(
        cardiac.clone(),
        Arc::new(ScriptedCortical::new(batches)),
        sink.clone(),
        SessionTiming::from(&TimingConfig::debug()),
        clock.clone(),
    );
    Booth {
        engine,
        clock,
        sink,
        cardiac,
    }
}

#[test]
fn full_visit_walkthrough() {
    let booth = booth(vec![
        vec![],
        vec![1.0, 2.0, 3.0],
        vec![4.0, 5.0, 6.0, 7.0, 8.0],
    ]);

    // Attract loop before anyone tags in: sentinels everywhere
    booth.engine.tick();
    assert_eq!(booth.engine.phase(), SessionPhase::Idle);
    assert_eq!(
        booth.sink.messages_for(payload::CHANNEL_EEG_ECG),
        vec!["-1,-1,-1,-1,-1,0"]
    );

    // Visitor tags in and the sensors come alive
    booth.engine.tag_in();
    booth.cardiac.set(true, 42.5);
    booth.clock.advance(Duration::from_millis(500));
    booth.engine.tick();
    assert_eq!(booth.engine.phase(), SessionPhase::Baseline);
    assert_eq!(
        booth.sink.messages_for(payload::CHANNEL_EEG_ECG)[1],
        "-1,1,2,3,42.5,1"
    );
    assert_eq!(
        booth.sink.messages_for(payload::CHANNEL_INSTRUCTION),
        vec!["baseline"]
    );

    // Into the condition phase; only the newest four values survive
    booth.clock.set_elapsed(Duration::from_millis(5600));
    booth.engine.tick();
    assert_eq!(booth.engine.phase(), SessionPhase::Condition);
    assert_eq!(
        booth.sink.messages_for(payload::CHANNEL_EEG_ECG)[2],
        "5,6,7,8,42.5,1"
    );
    assert_eq!(
        booth.sink.messages_for(payload::CHANNEL_INSTRUCTION),
        vec!["baseline", "condition"]
    );

    // Visitor leaves; the booth returns to the attract loop
    booth.engine.tag_out();
    booth.clock.set_elapsed(Duration::from_secs(60));
    booth.engine.tick();
    assert_eq!(booth.engine.phase(), SessionPhase::Idle);
    assert_eq!(booth.sink.messages_for(payload::CHANNEL_INSTRUCTION).len(), 2);
}

#[test]
fn lead_dropout_never_pauses_the_phase_clock() {
    let booth = booth(vec![]);
    booth.engine.tag_in();
    booth.cardiac.set(false, ABSENT);

    // Debug timing alternates every 5s regardless of sensor contact
    booth.clock.set_elapsed(Duration::from_secs(6));
    booth.engine.tick();
    assert_eq!(booth.engine.phase(), SessionPhase::Condition);

    booth.clock.set_elapsed(Duration::from_secs(11));
    booth.engine.tick();
    assert_eq!(booth.engine.phase(), SessionPhase::Baseline);

    // Lead state is reported, not acted on
    let live = booth.sink.messages_for(payload::CHANNEL_EEG_ECG);
    assert!(live.iter().all(|p| p.ends_with(",0")));
}

#[test]
fn live_values_publish_every_tick_in_and_out_of_session() {
    let booth = booth(vec![]);
    for i in 0..4 {
        booth
            .clock
            .set_elapsed(Duration::from_millis(250 * (i + 1)));
        booth.engine.tick();
    }
    booth.engine.tag_in();
    for i in 4..8 {
        booth
            .clock
            .set_elapsed(Duration::from_millis(250 * (i + 1)));
        booth.engine.tick();
    }
    assert_eq!(booth.sink.messages_for(payload::CHANNEL_EEG_ECG).len(), 8);
}
