//! exptrack core: the experiment/run registry
//!
//! [`ExperimentService`] enforces experiment-name and run-version uniqueness,
//! validates run children before any write, and hands the atomic insert to an
//! [`exptrack_state::ExperimentRepository`]. Outcomes are reported through an
//! injected [`RegistryObserver`].

pub mod allocator;
pub mod error;
pub mod obs;
pub mod service;
pub mod telemetry;

pub use allocator::RunVersionAllocator;
pub use error::{ErrorKind, RegistryError, Result};
pub use obs::{
    Operation, Outcome, RecordingObserver, RegistryEvent, RegistryObserver, TracingObserver,
};
pub use service::ExperimentService;
pub use telemetry::{init_tracing, level_for};

pub use exptrack_state::{
    Artifact, Experiment, ExperimentId, Metric, NewArtifact, NewExperiment, NewMetric,
    NewParameter, NewRun, Parameter, Run, RunId, RunStatus, ValidationError,
};
