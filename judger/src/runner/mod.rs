//! Concrete implementation on running submitted programs.
//!
//! This module knows nothing about work items or verdict policy beyond what a
//! single test-case process needs. See [`crate::judge`] for the pipeline and
//! [`crate::tester`] for classification.

pub mod compile;
pub mod exec;
pub mod model;
pub mod supervisor;
pub mod usage;

pub use exec::{Launcher, PlainLauncher, RlimitLauncher};
pub use model::CommandLine;
pub use supervisor::Supervisor;
