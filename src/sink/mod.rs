// src/sink/mod.rs
//! Sink adapters: where encoded batches end up.

pub mod artifact;
pub mod directory;
pub mod http;

pub use artifact::{Artifact, TableFormat};
pub use directory::DirectoryUploader;
pub use http::HttpUploader;
