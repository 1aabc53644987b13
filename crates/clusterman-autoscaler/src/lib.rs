//! The autoscaling control loop (§4.4/§5): reads a signal's resource
//! request, turns it into a new pool-wide target capacity via a
//! setpoint/margin computation, and applies it through a
//! [`clusterman_pool::PoolManager`].

pub mod compute;
pub mod error;
pub mod health;
pub mod loop_;
pub mod signal_source;

pub use compute::{compute_target_capacity, PoolCapacitySnapshot};
pub use error::{AutoscalerError, AutoscalerResult};
pub use health::{HealthCheckSink, LoggingHealthCheckSink, NoopHealthCheckSink, RecordingHealthCheckSink};
pub use loop_::Autoscaler;
pub use signal_source::{SignalSource, StaticSignalSource};
