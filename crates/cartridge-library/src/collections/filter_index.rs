//! Facet counts over a collection's members

use crate::metadata::{MetaKey, Metadata};
use chrono::Datelike;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Facet {
    Genre,
    Players,
    Developer,
    Publisher,
    Favorite,
    Rating,
    ReleaseDecade,
}

impl Facet {
    pub const ALL: [Facet; 7] = [
        Facet::Genre,
        Facet::Players,
        Facet::Developer,
        Facet::Publisher,
        Facet::Favorite,
        Facet::Rating,
        Facet::ReleaseDecade,
    ];

    /// Bucket a member falls into for this facet
    fn value_of(self, metadata: &Metadata) -> String {
        let text = |key: MetaKey| match metadata.get(key).trim() {
            "" => UNKNOWN.to_string(),
            value => value.to_string(),
        };
        match self {
            Facet::Genre => text(MetaKey::Genre),
            Facet::Players => text(MetaKey::Players),
            Facet::Developer => text(MetaKey::Developer),
            Facet::Publisher => text(MetaKey::Publisher),
            Facet::Favorite => metadata.favorite().to_string(),
            // five star buckets
            Facet::Rating => ((metadata.rating().clamp(0.0, 1.0) * 5.0).round() as u8).to_string(),
            Facet::ReleaseDecade => match metadata.release_date() {
                Some(date) => format!("{}s", date.year() / 10 * 10),
                None => UNKNOWN.to_string(),
            },
        }
    }
}

const UNKNOWN: &str = "Unknown";

/// Per-facet value counts, keyed by member path so a member can be
/// re-indexed or removed
#[derive(Debug, Clone, Default)]
pub struct FilterIndex {
    counts: HashMap<Facet, BTreeMap<String, usize>>,
    members: HashMap<PathBuf, Vec<String>>,
}

impl FilterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a member, replacing any previous snapshot of it
    pub fn add(&mut self, path: &Path, metadata: &Metadata) {
        self.remove(path);
        let values: Vec<String> = Facet::ALL.iter().map(|f| f.value_of(metadata)).collect();
        self.insert(path.to_path_buf(), values);
    }

    fn insert(&mut self, path: PathBuf, values: Vec<String>) {
        for (facet, value) in Facet::ALL.iter().zip(&values) {
            *self
                .counts
                .entry(*facet)
                .or_default()
                .entry(value.clone())
                .or_insert(0) += 1;
        }
        self.members.insert(path, values);
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        let Some(values) = self.members.remove(path) else {
            return false;
        };
        for (facet, value) in Facet::ALL.iter().zip(values) {
            if let Some(buckets) = self.counts.get_mut(facet) {
                if let Some(count) = buckets.get_mut(&value) {
                    *count -= 1;
                    if *count == 0 {
                        buckets.remove(&value);
                    }
                }
            }
        }
        true
    }

    /// Merge another index's members into this one
    pub fn import(&mut self, other: &FilterIndex) {
        for (path, values) in &other.members {
            if !self.members.contains_key(path) {
                self.insert(path.clone(), values.clone());
            }
        }
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.members.clear();
    }

    pub fn count(&self, facet: Facet, value: &str) -> usize {
        self.counts
            .get(&facet)
            .and_then(|buckets| buckets.get(value))
            .copied()
            .unwrap_or(0)
    }

    /// Values present for a facet with their counts, sorted by value
    pub fn values(&self, facet: Facet) -> Vec<(&str, usize)> {
        self.counts
            .get(&facet)
            .map(|buckets| buckets.iter().map(|(v, c)| (v.as_str(), *c)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(genre: &str, favorite: bool) -> Metadata {
        let mut metadata = Metadata::with_name("x");
        metadata.set(MetaKey::Genre, genre);
        metadata.set(MetaKey::Favorite, favorite.to_string());
        metadata.set(MetaKey::ReleaseDate, "19940101T000000");
        metadata
    }

    #[test]
    fn test_add_and_count() {
        let mut index = FilterIndex::new();
        index.add(Path::new("/a"), &game("Shooter", true));
        index.add(Path::new("/b"), &game("Shooter", false));
        index.add(Path::new("/c"), &game("", false));

        assert_eq!(index.count(Facet::Genre, "Shooter"), 2);
        assert_eq!(index.count(Facet::Genre, "Unknown"), 1);
        assert_eq!(index.count(Facet::Favorite, "true"), 1);
        assert_eq!(index.count(Facet::ReleaseDecade, "1990s"), 3);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_re_adding_replaces_snapshot() {
        let mut index = FilterIndex::new();
        index.add(Path::new("/a"), &game("Shooter", false));
        index.add(Path::new("/a"), &game("Puzzle", true));

        assert_eq!(index.count(Facet::Genre, "Shooter"), 0);
        assert_eq!(index.count(Facet::Genre, "Puzzle"), 1);
        assert_eq!(index.values(Facet::Genre), vec![("Puzzle", 1)]);
    }

    #[test]
    fn test_remove_and_import() {
        let mut first = FilterIndex::new();
        first.add(Path::new("/a"), &game("Shooter", false));
        let mut second = FilterIndex::new();
        second.add(Path::new("/a"), &game("Shooter", false));
        second.add(Path::new("/b"), &game("Racing", false));

        let mut bundle = FilterIndex::new();
        bundle.import(&first);
        bundle.import(&second);
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.count(Facet::Genre, "Shooter"), 1);

        assert!(bundle.remove(Path::new("/b")));
        assert!(!bundle.remove(Path::new("/b")));
        assert_eq!(bundle.count(Facet::Genre, "Racing"), 0);
    }
}
