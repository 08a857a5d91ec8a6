#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Federation/pool/sequence/location/blocked-action persistence and the
//! global lease (C3 `FederationData`).

mod blob;
mod error;
mod lease;
mod sequence;
mod store;

pub use blob::{BlobReference, parse_blob_url};
pub use error::{FederationDataError, Result};
pub use lease::GlobalLease;
pub use sequence::{
    MAX_SEQUENCE_ID_PROPERTIES, MAX_SEQUENCE_IDS_PER_PROPERTY, MAX_STR_ENTITY_PROPERTY_LENGTH,
    TRUNCATED_ENTRY_COUNT, append_bounded, first_sequence_id, pack_sequence, pop_and_pack, unpack_sequence,
};
pub use store::FederationData;
