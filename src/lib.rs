pub mod cli;
pub mod config;
pub mod embed;
pub mod error;
pub mod graph;
pub mod index;
pub mod lang;
pub mod logging;
pub mod retrieve;
pub mod store;
pub mod workspace;

pub use config::Config;
pub use error::{IndexError, RunStats};
pub use graph::{Graph, GraphEdge, GraphNode};
pub use index::{index_repository, IndexOptions, IndexOutcome};
