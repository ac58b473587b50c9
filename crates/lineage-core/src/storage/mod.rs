//! # Storage Backends
//!
//! Disk-backed implementations of the `GraphStore` trait.

pub mod redb_graph;

pub use redb_graph::RedbGraph;
