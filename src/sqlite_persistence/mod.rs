mod versioned_schema;

pub use versioned_schema::*;

/// Offset added to schema versions before they are written to `PRAGMA user_version`,
/// so a database created by some other tool is never mistaken for one of ours.
pub const BASE_DB_VERSION: usize = 77000;
