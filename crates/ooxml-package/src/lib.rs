//! Part cache, reconciliation and write-back engine for OOXML packages.
//!
//! An opened archive becomes a [`PackageSession`]: its parts are unpacked into a
//! [`PartCache`] (three copies per part: `normal`, `prev`, `compare`) and mirrored by a
//! [`PartTree`] whose file nodes carry a [`PartStatus`]. Reloading the archive reclassifies
//! every part against the previous pass; saving an edited `normal` copy writes the part back
//! into the archive. All user interaction goes through the [`Host`] trait.

mod accessor;
mod cache;
mod config;
mod error;
mod gate;
mod host;
mod part_name;
mod registry;
mod session;
mod tree;
mod watch;

pub use accessor::{content_type_for_part, ArchiveWriter, PackageAccessor, PackagePart};
pub use cache::{session_hash, CacheVariant, PartCache};
pub use config::{
    default_storage_root, ViewerConfig, DEFAULT_MAX_PACKAGE_BYTES, DEFAULT_MAX_PARTS,
    DEFAULT_MAX_XML_PART_BYTES,
};
pub use error::PackageError;
pub use gate::{ReloadGate, ReloadTicket};
pub use host::Host;
pub use part_name::{normalize_part_name, part_file_name};
pub use registry::{SessionHandle, SessionRegistry};
pub use session::{OpenOutcome, PackageSession, PartSummary, SaveOutcome};
pub use tree::{Absence, NodeId, NodeKind, PartNode, PartStatus, PartTree, PartVisit};
pub use watch::{OnClosed, SessionWatch, WatchEvent};
