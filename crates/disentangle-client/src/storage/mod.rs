//! Storage: explicit, caller-driven export of client state.
//!
//! Nothing is persisted implicitly.

pub mod graph_file;

pub use graph_file::GraphFile;
