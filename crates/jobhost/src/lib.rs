//! Job function indexing host.
//!
//! Discovers job functions in loaded modules, resolves how each parameter
//! binds to an external resource, and keeps a persistent registry of the
//! discovered functions reconciled against what the code currently declares.

pub mod binding;
pub mod config;
pub mod descriptor;
pub mod indexer;
pub mod module;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod telemetry;

pub use config::HostConfig;
pub use descriptor::{FunctionDescriptor, Location};
pub use indexer::{DeleteOutcome, IndexError, IndexReport, Indexer, RunOutcome};
pub use registry::FunctionRegistry;
