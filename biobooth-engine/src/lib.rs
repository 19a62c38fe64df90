//! # Biobooth Engine
//!
//! Concurrent biosignal acquisition and session timing for the exhibit:
//! - Cardiac acquisition: serial producer + analysis consumer with lead-off
//!   timeout recovery
//! - Cortical acquisition: UDP/OSC listener demultiplexing typed messages
//!   into per-metric queues
//! - Session engine: fixed-period tick loop publishing live values and
//!   advancing the baseline/condition phase timer
//! - Publish sink: pub/sub websocket client for the visualization front end

pub mod app;
pub mod cardiac;
pub mod clock;
pub mod cortical;
pub mod publish;
pub mod session;
pub mod shutdown;
pub mod sim;
pub mod sources;

pub use shutdown::Shutdown;
