//! Game library core for Cartridge
//!
//! Scans ROM directories into per-system trees, persists per-game metadata
//! in gamelist documents with crash-safe recovery fragments, and derives
//! collection views (favorites, last played, custom lists) that alias games
//! without owning them.

pub mod arcade;
mod catalog;
pub mod collections;
mod events;
mod gamelist;
pub mod metadata;
pub mod paths;
mod registry;
mod scanner;
mod sorting;
mod store;
mod tree;

pub use catalog::Catalog;
pub use collections::{CollectionEngine, CollectionInstance, Facet, FilterIndex, ToggleOutcome};
pub use events::{CatalogEvent, ChangeKind, EventBus};
pub use gamelist::{DocumentEntry, EntryKind, GamelistDocument};
pub use metadata::{MetaKey, Metadata};
pub use registry::{Library, NoThemes, SystemGroup, ThemeResolver};
pub use scanner::{RomScanner, ScanConfig, ScanResult};
pub use sorting::{DisplayEntry, compose_display};
pub use store::{CatalogStore, SaveOutcome};
pub use tree::{Indexed, Node, NodeId, NodeKind, NodeRef, Tree, TreeId};

use cartridge_config::{ConfigError, LibrarySettings};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("No system with games could be loaded")]
    NoCatalogs,

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid collection name: '{0}'")]
    InvalidCollectionName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Whether fork/join phases may run on the worker pool
pub(crate) fn parallelism_enabled(settings: &LibrarySettings) -> bool {
    settings.parallel_population
        && std::thread::available_parallelism().is_ok_and(|n| n.get() > 1)
}
