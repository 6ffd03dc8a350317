//! Ordering of the displayed catalog list

use crate::catalog::Catalog;
use crate::collections::CollectionEngine;
use crate::registry::SystemGroup;
use cartridge_config::{HardwareClass, LibrarySettings, SortMode};
use std::cmp::Reverse;

/// One entry of the displayed list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayEntry {
    System(usize),
    Group(usize),
    Collection(usize),
    Bundle,
}

#[derive(Debug, Clone)]
struct SystemKey {
    entry: DisplayEntry,
    name: String,
    manufacturer: String,
    hardware: HardwareClass,
    release_year: Option<u16>,
}

#[derive(Debug, Clone)]
struct CollectionKey {
    entry: DisplayEntry,
    name: String,
}

/// Compose the displayed list from visible catalogs, groups and collections
pub fn compose_display(
    catalogs: &[Catalog],
    groups: &[SystemGroup],
    engine: &CollectionEngine,
    settings: &LibrarySettings,
) -> Vec<DisplayEntry> {
    let mut systems = Vec::new();
    for (i, catalog) in catalogs.iter().enumerate() {
        if settings.is_system_hidden(catalog.name()) {
            continue;
        }
        let (entry, name) = match catalog
            .group()
            .and_then(|g| groups.iter().position(|group| group.name() == g))
        {
            Some(g) => (DisplayEntry::Group(g), groups[g].name().to_string()),
            None => (DisplayEntry::System(i), catalog.full_name().to_string()),
        };
        // a group takes the slot of its first visible member
        if systems.iter().any(|s: &SystemKey| s.entry == entry) {
            continue;
        }
        systems.push(SystemKey {
            entry,
            name,
            manufacturer: catalog.manufacturer().to_string(),
            hardware: catalog.hardware(),
            release_year: catalog.release_year(),
        });
    }

    let top_level = engine.top_level();
    let instances = engine.instances();
    let mut collections: Vec<CollectionKey> = top_level
        .iter()
        .filter(|i| !instances[**i].is_custom())
        .map(|i| CollectionKey {
            entry: DisplayEntry::Collection(*i),
            name: instances[*i].decl().display_name.clone(),
        })
        .collect();
    if engine.shows_bundle() {
        collections.push(CollectionKey {
            entry: DisplayEntry::Bundle,
            name: engine.bundle_decl().display_name.clone(),
        });
    }
    collections.extend(
        top_level
            .iter()
            .filter(|i| instances[**i].is_custom())
            .map(|i| CollectionKey {
                entry: DisplayEntry::Collection(*i),
                name: instances[*i].decl().display_name.clone(),
            }),
    );

    arrange(systems, collections, settings)
}

fn arrange(
    mut systems: Vec<SystemKey>,
    mut collections: Vec<CollectionKey>,
    settings: &LibrarySettings,
) -> Vec<DisplayEntry> {
    let name_key = |name: &str| name.to_lowercase();

    match settings.sort_mode {
        SortMode::None => {
            return systems
                .iter()
                .map(|s| s.entry)
                .chain(collections.iter().map(|c| c.entry))
                .collect();
        }
        SortMode::Alphabetical => {
            collections.sort_by_key(|c| name_key(&c.name));
            systems.sort_by_key(|s| {
                (
                    settings.sort_hardware_last && s.hardware.sorts_last(),
                    name_key(&s.name),
                )
            });
        }
        SortMode::Manufacturer => systems.sort_by_key(|s| {
            (
                s.manufacturer.is_empty(),
                name_key(&s.manufacturer),
                name_key(&s.name),
            )
        }),
        SortMode::Hardware => systems.sort_by_key(|s| (s.hardware.rank(), name_key(&s.name))),
        SortMode::ReleaseDecade => systems.sort_by_key(|s| {
            (
                s.release_year.is_none(),
                s.release_year.map(|year| year / 10),
                name_key(&s.name),
            )
        }),
    }

    if settings.bundle_first {
        collections.sort_by_key(|c| Reverse(c.entry == DisplayEntry::Bundle));
    }
    collections
        .iter()
        .map(|c| c.entry)
        .chain(systems.iter().map(|s| s.entry))
        .collect()
}
