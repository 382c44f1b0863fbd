//! Change monitor for vendor product pages: finds the datasheet link and the
//! specifications fragment, fingerprints both, and compares them with the
//! stored baseline.

pub mod archive;
pub mod compare;
pub mod config;
pub mod diff;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod fingerprint;
pub mod runner;
pub mod store;
pub mod summary;
pub mod verify;

pub use config::{Settings, Target};
pub use error::{ExtractionFailure, MonitorError, TargetFailure};
pub use runner::{run_batch, BatchSummary, TargetStatus};
pub use verify::{verify_target, ChangeReport, Verification};
