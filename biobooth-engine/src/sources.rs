//! Biosignal source capability interfaces
//!
//! Every source variant (simulated or real, cardiac or cortical) exposes the
//! same minimal contract so the session engine never branches on hardware
//! type.

pub use biobooth_common::payload::ABSENT;

/// Sentinel R-R interval before the first beat pair is observed
pub const ABSENT_RRI: i64 = -1;

/// Cardiac source contract
///
/// Latest-value getters return the documented sentinel ([`ABSENT`] /
/// [`ABSENT_RRI`]) until a value has been observed; callers treat the
/// sentinel as "unknown", never as a reading.
pub trait CardiacSource: Send + Sync {
    /// Latest lead contact state
    fn is_lead_on(&self) -> bool;

    /// Latest heart-rate-variability value, or [`ABSENT`]
    fn hrv(&self) -> f64;

    /// Timestamp of the latest HRV value, or [`ABSENT`]
    fn hrv_timestamp(&self) -> f64;

    /// Latest R-R interval in sample units, or [`ABSENT_RRI`]
    fn rri(&self) -> i64;
}

/// Cortical source contract
pub trait CorticalSource: Send + Sync {
    /// Drain all buffered alpha-band samples since the last call, FIFO.
    /// Never blocks; returns an empty batch when nothing arrived.
    fn alpha_batch(&self) -> Vec<f64>;

    /// Latest forehead contact state, `None` before the first report
    fn is_on_forehead(&self) -> Option<bool>;

    /// Seconds since the forehead contact state last changed
    fn secs_since_forehead_transition(&self) -> f64;
}
