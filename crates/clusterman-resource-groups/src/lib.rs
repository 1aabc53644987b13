//! The resource-group contract: a uniform capability set over
//! heterogeneous cloud fleet types, plus the two concrete backends
//! (spot fleets and auto scaling groups) specified for this core.

pub mod auto_scaling;
pub mod error;
pub mod group;
pub mod registry;
pub mod spot_fleet;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::{ResourceGroupError, ResourceGroupResult};
pub use group::{GroupKind, GroupStatus, ResourceGroup};
pub use registry::load_all;
