/*!
 * Correspondence between legacy and target identifiers.
 *
 * A single shared store, keyed by entity family, that every importer uses
 * to register the records it creates and to remap foreign keys.
 */

pub mod family;
pub mod store;

// Re-export main types
pub use family::{tax_rate_key, EntityFamily};
pub use store::{CorrespondenceStore, Lookup};
