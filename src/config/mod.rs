// src/config/mod.rs

//! Configuration for scriptdock.
//!
//! Responsibilities:
//! - Define the settings data model (`model.rs`).
//! - Load the settings file from disk (`loader.rs`).
//! - Load and rewrite per-project descriptors (`descriptor.rs`).

pub mod descriptor;
pub mod loader;
pub mod model;

pub use descriptor::{DescriptorFile, ProjectDescriptor, DESCRIPTOR_FILE, MANIFEST_FILE};
pub use loader::{load_from_path, load_or_default};
pub use model::AppSettings;
