//! Serialization of documents.
//!
//! - `archive`: append-only output sink
//! - `creator`: staged writer for full rewrites and incremental updates

pub mod archive;
pub mod creator;

pub use archive::{Archive, FileArchive};
pub use creator::{Creator, Stage};

use bitflags::bitflags;

bitflags! {
    /// Options for [`Creator::create`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CreateFlags: u32 {
        /// Append an update to the source instead of rewriting it.
        const INCREMENTAL = 1;
        /// With [`INCREMENTAL`](Self::INCREMENTAL), write only the update, not
        /// the source bytes it extends.
        const NO_ORIGINAL = 1 << 1;
    }
}
