//! Shared data model for the clusterman autoscaling core.
//!
//! Every other crate in the workspace depends on this one for the
//! vocabulary types that cross component boundaries: markets, pool and
//! autoscaling configuration, signal configuration, and the resource
//! request shape a signal hands back to the autoscaling loop.

pub mod config;
pub mod error;
pub mod market;
pub mod request;

pub use config::{AutoscalingConfig, MetricSpec, MetricType, PoolConfig, SignalConfig};
pub use error::{CoreError, CoreResult};
pub use market::Market;
pub use request::{Resource, ResourceRequest};
