//! Transport-free types for the WASP/Conduit record service.
//!
//! This crate holds the JSON shapes exchanged with the service that do not
//! need an HTTP client to be useful: the placeholder entries that stand for
//! files and references inside record bodies, and the read-only collection
//! metadata snapshots ([`SystemInfo`] and [`ViewConfig`]).

pub mod entry;
pub mod error;
pub mod system_info;
pub mod view;

pub use entry::{Entry, ReferenceEntry};
pub use error::CoreError;
pub use system_info::{SystemInfo, TagSchema};
pub use view::{Column, ViewConfig};

/// Tag holding the server-assigned record identifier.
pub const ID_TAG: &str = "_id";

/// Tag holding the record version counter.
pub const VERSION_TAG: &str = "version";

/// Tag holding the mutability flag. Records without it are mutable.
pub const MUTABLE_TAG: &str = "conduit_mutable";

/// Tags assigned by the server that are never sent back on upload.
pub const SYSTEM_TAGS: [&str; 5] = ["date", ID_TAG, "conduitVersion", "unique_name", VERSION_TAG];

/// `type` value of a metadata tag (`{"type": "meta_data", "value": ...}`).
pub const METADATA_TYPE: &str = "meta_data";
