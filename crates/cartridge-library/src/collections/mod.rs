//! Game collections
//!
//! Collections are virtual trees of aliases into system catalogs. Automatic
//! collections are filled from a predicate over every game; custom ones from
//! a membership file the user edits through the library.

mod custom;
mod declarations;
mod engine;
mod filter_index;
mod instance;

pub use custom::{SharedPathIndex, discover, membership_file, read_membership};
pub use declarations::{
    BUNDLE_KEY, CollectionDecl, CollectionKind, PlayerRange, RECENT_CAP, SortOrder,
    declare_builtins,
};
pub use engine::{CollectionEngine, ToggleOutcome};
pub use filter_index::{Facet, FilterIndex};
pub use instance::{CollectionInstance, PopulateContext, PopulationState};
