//! Simulated biosignal sources
//!
//! Used for development and demo without hardware. Values come from a
//! seeded pseudo-random generator on a fixed cadence; forehead attachment
//! reads "off" for a configurable warm-up interval, then "on". Given a
//! fixed seed and clock the output is fully deterministic.

use crate::clock::Clock;
use crate::sources::{CardiacSource, CorticalSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Lead reads off for this many polls before the simulated heart "attaches"
const LEAD_WARMUP_POLLS: u32 = 5;

/// Samples returned by each simulated alpha drain
const ALPHA_BATCH_LEN: usize = 10;

/// Simulated cardiac source
pub struct SimCardiac {
    rng: Mutex<StdRng>,
    lead_polls: AtomicU32,
}

impl SimCardiac {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            lead_polls: AtomicU32::new(0),
        }
    }
}

impl CardiacSource for SimCardiac {
    fn is_lead_on(&self) -> bool {
        self.lead_polls.fetch_add(1, Ordering::Relaxed) + 1 > LEAD_WARMUP_POLLS
    }

    fn hrv(&self) -> f64 {
        self.rng.lock().unwrap().gen()
    }

    fn hrv_timestamp(&self) -> f64 {
        self.rng.lock().unwrap().gen()
    }

    fn rri(&self) -> i64 {
        // Plausible beat-to-beat spacing in sample units at 512 Hz
        self.rng.lock().unwrap().gen_range(300..900)
    }
}

/// Simulated cortical source
pub struct SimCortical {
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    started_at: Instant,
    warmup: Duration,
}

impl SimCortical {
    pub fn new(clock: Arc<dyn Clock>, seed: u64, warmup: Duration) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            started_at,
            warmup,
        }
    }
}

impl CorticalSource for SimCortical {
    fn alpha_batch(&self) -> Vec<f64> {
        let mut rng = self.rng.lock().unwrap();
        (0..ALPHA_BATCH_LEN).map(|_| rng.gen()).collect()
    }

    fn is_on_forehead(&self) -> Option<bool> {
        Some(self.clock.now() - self.started_at >= self.warmup)
    }

    fn secs_since_forehead_transition(&self) -> f64 {
        4.0
    }
}
