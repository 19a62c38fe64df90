//! Cortical acquisition: UDP control-protocol demultiplexer
//!
//! A listener thread decodes typed messages from the headset and updates
//! latest-value contact state or appends into one of ten band-power queues
//! (5 frequency bands x absolute/relative). Band-power messages carry four
//! per-channel readings; only the average of the two frontal channels is
//! recorded. The session engine drains the alpha-absolute queue each tick.

pub mod listener;

use crate::clock::Clock;
use crate::shutdown::Shutdown;
use crate::sources::CorticalSource;
use biobooth_common::Result;
use std::collections::VecDeque;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info};

/// Frequency bands reported by the headset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

/// Absolute or relative band power
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerKind {
    Absolute,
    Relative,
}

/// One of the ten band-power metrics, mapped to its queue at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandMetric {
    pub band: Band,
    pub kind: PowerKind,
}

impl BandMetric {
    pub const COUNT: usize = 10;

    pub const ALPHA_ABSOLUTE: BandMetric = BandMetric {
        band: Band::Alpha,
        kind: PowerKind::Absolute,
    };

    /// Fixed queue index for this metric
    pub fn index(self) -> usize {
        let band = match self.band {
            Band::Delta => 0,
            Band::Theta => 1,
            Band::Alpha => 2,
            Band::Beta => 3,
            Band::Gamma => 4,
        };
        let kind = match self.kind {
            PowerKind::Absolute => 0,
            PowerKind::Relative => 1,
        };
        band * 2 + kind
    }

    /// OSC address carrying this metric
    pub fn osc_address(self) -> &'static str {
        match (self.band, self.kind) {
            (Band::Delta, PowerKind::Absolute) => "/muse/elements/delta_absolute",
            (Band::Theta, PowerKind::Absolute) => "/muse/elements/theta_absolute",
            (Band::Alpha, PowerKind::Absolute) => "/muse/elements/alpha_absolute",
            (Band::Beta, PowerKind::Absolute) => "/muse/elements/beta_absolute",
            (Band::Gamma, PowerKind::Absolute) => "/muse/elements/gamma_absolute",
            (Band::Delta, PowerKind::Relative) => "/muse/elements/delta_relative",
            (Band::Theta, PowerKind::Relative) => "/muse/elements/theta_relative",
            (Band::Alpha, PowerKind::Relative) => "/muse/elements/alpha_relative",
            (Band::Beta, PowerKind::Relative) => "/muse/elements/beta_relative",
            (Band::Gamma, PowerKind::Relative) => "/muse/elements/gamma_relative",
        }
    }

    pub fn from_osc_address(address: &str) -> Option<Self> {
        let name = address.strip_prefix("/muse/elements/")?;
        let (band, kind) = name.split_once('_')?;
        let band = match band {
            "delta" => Band::Delta,
            "theta" => Band::Theta,
            "alpha" => Band::Alpha,
            "beta" => Band::Beta,
            "gamma" => Band::Gamma,
            _ => return None,
        };
        let kind = match kind {
            "absolute" => PowerKind::Absolute,
            "relative" => PowerKind::Relative,
            _ => return None,
        };
        Some(Self { band, kind })
    }

    fn all() -> [Self; Self::COUNT] {
        let mut metrics = [Self::ALPHA_ABSOLUTE; Self::COUNT];
        let mut i = 0;
        for band in [Band::Delta, Band::Theta, Band::Alpha, Band::Beta, Band::Gamma] {
            for kind in [PowerKind::Absolute, PowerKind::Relative] {
                metrics[i] = Self { band, kind };
                i += 1;
            }
        }
        metrics
    }
}

/// One band-power observation, owned by its metric queue until popped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPowerSample {
    pub value: f64,
    /// Seconds since the Unix epoch at arrival
    pub observed_at: f64,
}

/// Average of the two frontal channels; rear channels (0 and 3) are
/// intentionally discarded. Fixed sensor-fusion rule, not configurable.
pub fn frontal_average(channels: &[f64; 4]) -> f64 {
    (channels[1] + channels[2]) / 2.0
}

/// Band-power queue bound; drained every tick, so steady-state depth is
/// arrival rate x tick period. Overflow drops the oldest sample.
const QUEUE_CAPACITY: usize = 1024;

/// Forehead contact, latest value only
#[derive(Default)]
struct ContactState {
    on_forehead: Option<bool>,
    last_transition: Option<Instant>,
}

/// Cortical acquisition state; sole writer is the listener thread
pub struct CorticalAcquisition {
    clock: Arc<dyn Clock>,
    queues: [Mutex<VecDeque<BandPowerSample>>; BandMetric::COUNT],
    contact: RwLock<ContactState>,
    horseshoe: RwLock<Option<[i32; 4]>>,
    battery: RwLock<Option<f64>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    local_addr: Option<SocketAddr>,
    shutdown: Shutdown,
}

impl CorticalAcquisition {
    /// State-only constructor; the writer-side handlers are driven directly
    /// (used by tests and the listener thread alike)
    pub fn new(clock: Arc<dyn Clock>, shutdown: Shutdown) -> Arc<Self> {
        Arc::new(Self {
            clock,
            queues: std::array::from_fn(|_| Mutex::new(VecDeque::new())),
            contact: RwLock::new(ContactState::default()),
            horseshoe: RwLock::new(None),
            battery: RwLock::new(None),
            listener: Mutex::new(None),
            local_addr: None,
            shutdown,
        })
    }

    /// Bind the UDP listener and start demultiplexing messages
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        clock: Arc<dyn Clock>,
        shutdown: Shutdown,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(addr)?;
        let local_addr = socket.local_addr()?;
        info!("cortical OSC listener bound on {local_addr}");

        let acquisition = Arc::new(Self {
            clock,
            queues: std::array::from_fn(|_| Mutex::new(VecDeque::new())),
            contact: RwLock::new(ContactState::default()),
            horseshoe: RwLock::new(None),
            battery: RwLock::new(None),
            listener: Mutex::new(None),
            local_addr: Some(local_addr),
            shutdown: shutdown.clone(),
        });

        let handle = listener::spawn(Arc::clone(&acquisition), socket, shutdown);
        *acquisition.listener.lock().unwrap() = Some(handle);
        Ok(acquisition)
    }

    /// Bound address of the listener socket, when one is running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Join the listener thread after the shutdown flag has been signalled
    pub fn stop(&self) {
        self.shutdown.signal();
        if let Some(handle) = self.listener.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    // Writer side, called by the listener thread.

    pub(crate) fn record_band_power(&self, metric: BandMetric, channels: [f64; 4]) {
        let sample = BandPowerSample {
            value: frontal_average(&channels),
            observed_at: self.clock.epoch_secs(),
        };
        let mut queue = self.queues[metric.index()].lock().unwrap();
        if queue.len() == QUEUE_CAPACITY {
            queue.pop_front();
            debug!("band-power queue full for {metric:?}, dropped oldest sample");
        }
        queue.push_back(sample);
    }

    pub(crate) fn record_forehead(&self, touching: bool) {
        let mut contact = self.contact.write().unwrap();
        if contact.on_forehead != Some(touching) {
            contact.last_transition = Some(self.clock.now());
        }
        contact.on_forehead = Some(touching);
    }

    pub(crate) fn record_horseshoe(&self, quality: [i32; 4]) {
        *self.horseshoe.write().unwrap() = Some(quality);
    }

    pub(crate) fn record_battery(&self, percent: f64) {
        *self.battery.write().unwrap() = Some(percent);
    }

    // Reader side.

    /// Drain one metric queue in FIFO order; never blocks
    pub fn pop_all(&self, metric: BandMetric) -> Vec<BandPowerSample> {
        self.queues[metric.index()]
            .lock()
            .unwrap()
            .drain(..)
            .collect()
    }

    /// Latest per-sensor contact quality (1 = good, 2 = ok, >= 3 = bad)
    pub fn sensor_state(&self) -> Option<[i32; 4]> {
        *self.horseshoe.read().unwrap()
    }

    /// Latest battery percentage
    pub fn battery(&self) -> Option<f64> {
        *self.battery.read().unwrap()
    }
}

impl CorticalSource for CorticalAcquisition {
    fn alpha_batch(&self) -> Vec<f64> {
        self.pop_all(BandMetric::ALPHA_ABSOLUTE)
            .into_iter()
            .map(|sample| sample.value)
            .collect()
    }

    fn is_on_forehead(&self) -> Option<bool> {
        self.contact.read().unwrap().on_forehead
    }

    fn secs_since_forehead_transition(&self) -> f64 {
        match self.contact.read().unwrap().last_transition {
            Some(at) => (self.clock.now() - at).as_secs_f64(),
            None => 0.0,
        }
    }
}
