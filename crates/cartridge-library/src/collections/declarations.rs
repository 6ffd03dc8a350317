//! Built-in collection declarations

use crate::arcade::MANUFACTURERS;

/// Maximum size of the recently played collection
pub const RECENT_CAP: usize = 50;

/// Key of the custom collections bundle
pub const BUNDLE_KEY: &str = "collections";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    All,
    Recent,
    Favorites,
    TwoPlayers,
    FourPlayers,
    NeverPlayed,
    VerticalArcade,
    Arcade,
    /// Arcade games whose system tag matches the manufacturer key
    Manufacturer(&'static str),
    Custom,
}

/// Default ordering of a collection's members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    NameAscending,
    LastPlayedDescending,
}

/// Immutable description of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDecl {
    pub kind: CollectionKind,
    pub key: String,
    pub display_name: String,
    pub default_sort: SortOrder,
    pub theme_folder: String,
    pub is_custom: bool,
    pub display_if_empty: bool,
}

impl CollectionDecl {
    fn builtin(kind: CollectionKind, key: &str, display_name: &str) -> Self {
        let default_sort = match kind {
            CollectionKind::Recent => SortOrder::LastPlayedDescending,
            _ => SortOrder::NameAscending,
        };
        Self {
            kind,
            key: key.to_string(),
            display_name: display_name.to_string(),
            default_sort,
            theme_folder: format!("auto-{}", key),
            is_custom: false,
            display_if_empty: kind == CollectionKind::Favorites,
        }
    }

    /// Declaration of a user-defined collection
    pub fn custom(name: &str) -> Self {
        Self {
            kind: CollectionKind::Custom,
            key: name.to_string(),
            display_name: name.to_string(),
            default_sort: SortOrder::NameAscending,
            theme_folder: name.to_string(),
            is_custom: true,
            display_if_empty: true,
        }
    }

    /// Declaration of the bundle grouping un-themed custom collections
    pub fn bundle() -> Self {
        Self {
            kind: CollectionKind::Custom,
            key: BUNDLE_KEY.to_string(),
            display_name: "Collections".to_string(),
            default_sort: SortOrder::NameAscending,
            theme_folder: format!("custom-{}", BUNDLE_KEY),
            is_custom: true,
            display_if_empty: false,
        }
    }
}

/// Built-in collections in display order: general collections, one bucket
/// per arcade manufacturer, then the custom collections bundle
pub fn declare_builtins() -> Vec<CollectionDecl> {
    let mut decls = vec![
        CollectionDecl::builtin(CollectionKind::All, "all", "All Games"),
        CollectionDecl::builtin(CollectionKind::Recent, "recent", "Last Played"),
        CollectionDecl::builtin(CollectionKind::Favorites, "favorites", "Favorites"),
        CollectionDecl::builtin(CollectionKind::TwoPlayers, "2players", "2 Players"),
        CollectionDecl::builtin(CollectionKind::FourPlayers, "4players", "4 Players"),
        CollectionDecl::builtin(CollectionKind::NeverPlayed, "neverplayed", "Never Played"),
        CollectionDecl::builtin(CollectionKind::VerticalArcade, "vertical", "Vertical Arcade"),
        CollectionDecl::builtin(CollectionKind::Arcade, "arcade", "Arcade"),
    ];
    for &(key, name) in MANUFACTURERS {
        decls.push(CollectionDecl::builtin(
            CollectionKind::Manufacturer(key),
            key,
            name,
        ));
    }
    decls.push(CollectionDecl::bundle());
    decls
}

/// Player count field: `N`, `min-max` or `min+`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerRange {
    min: u32,
    max: Option<u32>,
}

impl PlayerRange {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(min) = value.strip_suffix('+') {
            let min = min.trim().parse().ok()?;
            return Some(Self { min, max: None });
        }
        if let Some((min, max)) = value.split_once('-') {
            let min: u32 = min.trim().parse().ok()?;
            let max: u32 = max.trim().parse().ok()?;
            if min > max {
                return None;
            }
            return Some(Self {
                min,
                max: Some(max),
            });
        }
        let count = value.parse().ok()?;
        Some(Self {
            min: count,
            max: Some(count),
        })
    }

    pub fn contains(&self, players: u32) -> bool {
        players >= self.min && self.max.is_none_or(|max| players <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let decls = declare_builtins();
        assert_eq!(decls[0].kind, CollectionKind::All);
        assert_eq!(decls[1].key, "recent");
        assert_eq!(decls[1].default_sort, SortOrder::LastPlayedDescending);
        assert!(matches!(decls[8].kind, CollectionKind::Manufacturer("capcom")));

        let last = decls.last().unwrap();
        assert_eq!(last.key, BUNDLE_KEY);
        assert!(last.is_custom);
        assert_eq!(decls.len(), 8 + MANUFACTURERS.len() + 1);
    }

    #[test]
    fn test_keys_are_unique() {
        let decls = declare_builtins();
        let mut keys: Vec<_> = decls.iter().map(|d| d.key.as_str()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), decls.len());
    }

    #[test]
    fn test_player_ranges() {
        let single = PlayerRange::parse("2").unwrap();
        assert!(single.contains(2));
        assert!(!single.contains(4));

        let range = PlayerRange::parse("1-4").unwrap();
        assert!(range.contains(2) && range.contains(4));
        assert!(!range.contains(5));

        let open = PlayerRange::parse("3+").unwrap();
        assert!(open.contains(4));
        assert!(!open.contains(2));

        assert!(PlayerRange::parse("").is_none());
        assert!(PlayerRange::parse("many").is_none());
        assert!(PlayerRange::parse("4-2").is_none());
    }
}
