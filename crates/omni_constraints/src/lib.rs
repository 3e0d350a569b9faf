pub mod builder;
pub mod drift;
pub mod profile;
pub mod snapshot;

pub use builder::{build_constraints, run, write_constraints};
pub use drift::{compare_snapshots, DriftReport};
pub use profile::ConstraintProfile;
pub use snapshot::Snapshot;

pub mod prelude {
    pub use super::{ConstraintProfile, DriftReport, Snapshot};
    pub use omni_core::{Error, Result};
}
