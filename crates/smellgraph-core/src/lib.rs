//! Smellgraph core library: architectural-smell detection over a structural
//! code graph.
//!
//! The crate indexes a project into a graph of files, types and functions
//! joined by import edges, answers dependency queries over that graph, and
//! runs threshold and single-responsibility rules against each file. Every
//! finding is keyed by the normalized shape of its code so repeated shapes
//! are recognised and suppressions expire once the shape changes.
//!
//! [`workspace::Workspace`] wires the pieces together for one project.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod indexer;
pub mod ledger;
pub mod models;
pub mod query;
pub mod review;
pub mod rules;
pub mod store;
pub mod workspace;

pub use config::AnalysisConfig;
pub use errors::{SmellError, SmellResult};
pub use workspace::Workspace;
