//! Game metadata handling
//!
//! Every node carries an ordered set of string fields. Values equal to a
//! field's default are not stored, so an entry with nothing but its derived
//! name compacts to "no explicit entry" when persisted.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::path::Path;

/// Timestamp format used by `lastplayed` and `releasedate`
pub const TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Metadata field, in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetaKey {
    Name,
    Desc,
    Image,
    Video,
    Marquee,
    Thumbnail,
    Rating,
    ReleaseDate,
    Developer,
    Publisher,
    Genre,
    Players,
    Favorite,
    Hidden,
    KidGame,
    PlayCount,
    LastPlayed,
    ArcadeSystemName,
}

impl MetaKey {
    pub const ALL: [MetaKey; 18] = [
        MetaKey::Name,
        MetaKey::Desc,
        MetaKey::Image,
        MetaKey::Video,
        MetaKey::Marquee,
        MetaKey::Thumbnail,
        MetaKey::Rating,
        MetaKey::ReleaseDate,
        MetaKey::Developer,
        MetaKey::Publisher,
        MetaKey::Genre,
        MetaKey::Players,
        MetaKey::Favorite,
        MetaKey::Hidden,
        MetaKey::KidGame,
        MetaKey::PlayCount,
        MetaKey::LastPlayed,
        MetaKey::ArcadeSystemName,
    ];

    /// Element name in gamelist documents
    pub fn tag(self) -> &'static str {
        match self {
            MetaKey::Name => "name",
            MetaKey::Desc => "desc",
            MetaKey::Image => "image",
            MetaKey::Video => "video",
            MetaKey::Marquee => "marquee",
            MetaKey::Thumbnail => "thumbnail",
            MetaKey::Rating => "rating",
            MetaKey::ReleaseDate => "releasedate",
            MetaKey::Developer => "developer",
            MetaKey::Publisher => "publisher",
            MetaKey::Genre => "genre",
            MetaKey::Players => "players",
            MetaKey::Favorite => "favorite",
            MetaKey::Hidden => "hidden",
            MetaKey::KidGame => "kidgame",
            MetaKey::PlayCount => "playcount",
            MetaKey::LastPlayed => "lastplayed",
            MetaKey::ArcadeSystemName => "arcadesystemname",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.tag() == tag)
    }

    pub fn default_value(self) -> &'static str {
        match self {
            MetaKey::Rating | MetaKey::PlayCount => "0",
            MetaKey::Favorite | MetaKey::Hidden | MetaKey::KidGame => "false",
            _ => "",
        }
    }

    /// Fields holding media file paths
    pub fn is_media(self) -> bool {
        matches!(
            self,
            MetaKey::Image | MetaKey::Video | MetaKey::Marquee | MetaKey::Thumbnail
        )
    }
}

/// Metadata attached to a game or folder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    values: BTreeMap<MetaKey, String>,
    /// Unrecognized elements, kept so they survive a rewrite
    extra: Vec<(String, String)>,
    dirty: bool,
}

impl Metadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata holding only a name, not dirty
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut metadata = Self::new();
        metadata.set(MetaKey::Name, name);
        metadata.dirty = false;
        metadata
    }

    /// Value of a field, or its default
    pub fn get(&self, key: MetaKey) -> &str {
        self.values
            .get(&key)
            .map(String::as_str)
            .unwrap_or(key.default_value())
    }

    /// Set a field. Returns whether the value changed; a change marks the
    /// metadata dirty.
    pub fn set(&mut self, key: MetaKey, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.get(key) == value {
            return false;
        }
        if value == key.default_value() {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value);
        }
        self.dirty = true;
        true
    }

    /// Keep an unrecognized element
    pub fn set_extra(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        let tag = tag.into();
        let value = value.into();
        match self.extra.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = value,
            None => self.extra.push((tag, value)),
        }
        self.dirty = true;
    }

    pub fn extras(&self) -> &[(String, String)] {
        &self.extra
    }

    /// Explicitly stored fields in document order
    pub fn iter(&self) -> impl Iterator<Item = (MetaKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Drop every field except a fresh name
    pub fn reset(&mut self, name: impl Into<String>) {
        self.values.clear();
        self.extra.clear();
        self.set(MetaKey::Name, name);
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// True when nothing but the derived name would be persisted
    pub fn is_default_except_name(&self, default_name: &str) -> bool {
        self.extra.is_empty()
            && self.values.iter().all(|(key, value)| match key {
                MetaKey::Name => value == default_name,
                _ => false,
            })
    }

    pub fn name(&self) -> &str {
        self.get(MetaKey::Name)
    }

    pub fn favorite(&self) -> bool {
        parse_bool(self.get(MetaKey::Favorite))
    }

    pub fn hidden(&self) -> bool {
        parse_bool(self.get(MetaKey::Hidden))
    }

    pub fn kid_game(&self) -> bool {
        parse_bool(self.get(MetaKey::KidGame))
    }

    pub fn play_count(&self) -> u32 {
        self.get(MetaKey::PlayCount).trim().parse().unwrap_or(0)
    }

    pub fn rating(&self) -> f32 {
        self.get(MetaKey::Rating).trim().parse().unwrap_or(0.0)
    }

    pub fn last_played(&self) -> Option<NaiveDateTime> {
        parse_time(self.get(MetaKey::LastPlayed))
    }

    pub fn release_date(&self) -> Option<NaiveDateTime> {
        parse_time(self.get(MetaKey::ReleaseDate))
    }

    pub fn set_last_played(&mut self, when: NaiveDateTime) -> bool {
        self.set(MetaKey::LastPlayed, when.format(TIME_FORMAT).to_string())
    }
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Parse a gamelist timestamp. Accepts the full `%Y%m%dT%H%M%S` form and
/// falls back to a leading four-digit year.
pub fn parse_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(time) = NaiveDateTime::parse_from_str(value, TIME_FORMAT) {
        return Some(time);
    }
    let year: i32 = value.get(..4)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)
}

/// Name shown for a node that has no explicit name: the cleaned file stem
/// for games, the plain file name for folders.
pub fn default_name(path: &Path, is_game: bool) -> String {
    if is_game {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let clean = clean_game_name(&stem);
        if clean.is_empty() { stem } else { clean }
    } else {
        path.file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Clean up a game name (remove region codes, dump flags, etc.)
pub fn clean_game_name(name: &str) -> String {
    let mut clean = name.to_string();

    let patterns = [
        // Regions
        "(USA)", "(Europe)", "(Japan)", "(World)", "(U)", "(E)", "(J)", "(W)", "(En)", "(Fr)",
        "(De)", "(Es)", "(It)", // Versions
        "(Rev 1)", "(Rev 2)", "(Rev A)", "(Rev B)", "(v1.0)", "(v1.1)", "(v1.2)",
        // Tags
        "(Unl)", "(Proto)", "(Beta)", "(Demo)", "(Sample)",
    ];

    for pattern in &patterns {
        clean = clean.replace(pattern, "");
    }

    // Remove anything in square brackets
    while let Some(start) = clean.find('[') {
        match clean[start..].find(']') {
            Some(len) => {
                let end = start + len;
                clean = format!("{}{}", &clean[..start], &clean[end + 1..]);
            }
            None => break,
        }
    }

    clean.split_whitespace().collect::<Vec<_>>().join(" ")
}
