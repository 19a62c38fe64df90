//! Process wiring
//!
//! Builds the configured source variants, hands them to the session
//! engine, and keeps the acquisition handles for orderly teardown. All
//! collaborators are passed in explicitly; nothing here is global.

use crate::cardiac::{CardiacAcquisition, RPeakAnalyzer, ThinkGearPort};
use crate::clock::Clock;
use crate::cortical::CorticalAcquisition;
use crate::publish::PublishSink;
use crate::session::{SessionEngine, SessionTiming};
use crate::shutdown::Shutdown;
use crate::sim::{SimCardiac, SimCortical};
use crate::sources::{CardiacSource, CorticalSource};
use biobooth_common::config::{BoothConfig, EcgSource, EegSource};
use biobooth_common::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Simulated headset reads "off forehead" for this long after startup
const SIM_FOREHEAD_WARMUP: Duration = Duration::from_secs(5);

/// The wired-up engine plus the acquisition handles it reads from
pub struct BoothContext {
    pub engine: Arc<SessionEngine>,
    cardiac: Option<Arc<CardiacAcquisition>>,
    cortical: Option<Arc<CorticalAcquisition>>,
    shutdown: Shutdown,
}

impl BoothContext {
    /// Build sources per the configuration and wire the session engine.
    ///
    /// A serial cardiac source that cannot be opened and a UDP bind
    /// failure are both fatal; the exhibit must not run half-instrumented
    /// when real hardware was requested.
    pub fn build(
        config: &BoothConfig,
        sink: Arc<dyn PublishSink>,
        clock: Arc<dyn Clock>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let mut cardiac_handle = None;
        let cardiac: Arc<dyn CardiacSource> = match config.ecg_source {
            EcgSource::Sim => {
                info!("cardiac source: simulated");
                Arc::new(SimCardiac::new(rand::random()))
            }
            EcgSource::Serial => {
                info!("cardiac source: serial on {}", config.serial_port);
                let transport = ThinkGearPort::open(&config.serial_port)?;
                let acquisition = Arc::new(CardiacAcquisition::start(
                    Box::new(transport),
                    Box::new(RPeakAnalyzer::new(config.sample_rate_hz)),
                    shutdown.clone(),
                ));
                cardiac_handle = Some(Arc::clone(&acquisition));
                acquisition
            }
        };

        let mut cortical_handle = None;
        let cortical: Arc<dyn CorticalSource> = match config.eeg_source {
            EegSource::Sim => {
                info!("cortical source: simulated");
                Arc::new(SimCortical::new(
                    Arc::clone(&clock),
                    rand::random(),
                    SIM_FOREHEAD_WARMUP,
                ))
            }
            EegSource::Udp => {
                info!("cortical source: OSC on {}", config.osc_bind);
                let acquisition = CorticalAcquisition::bind(
                    config.osc_bind.as_str(),
                    Arc::clone(&clock),
                    shutdown.clone(),
                )?;
                cortical_handle = Some(Arc::clone(&acquisition));
                acquisition
            }
        };

        let engine = Arc::new(SessionEngine::new(
            cardiac,
            cortical,
            sink,
            SessionTiming::from(&config.timing),
            clock,
        ));

        Ok(Self {
            engine,
            cardiac: cardiac_handle,
            cortical: cortical_handle,
            shutdown,
        })
    }

    /// Signal shutdown and join any acquisition threads
    pub fn stop(&self) {
        self.shutdown.signal();
        if let Some(cardiac) = &self.cardiac {
            cardiac.stop();
        }
        if let Some(cortical) = &self.cortical {
            cortical.stop();
        }
    }
}
