// src/server/mod.rs

//! Server directories: where cores come from, what is written next to
//! them, and the list of directories warden knows about.

pub mod catalog;
pub mod list;
pub mod metadata;
pub mod provision;

pub use catalog::CoreCatalog;
pub use list::{ServerEntry, ServerList};
pub use metadata::{METADATA_FILE, ServerMetadata};
pub use provision::{ProvisionRequest, ProvisionedServer, Provisioner};
