//! Static arcade classification tables

/// BIOS and device sets that ship as archives next to playable sets.
/// They are needed by the emulator but are not games.
const ASSET_SETS: &[&str] = &[
    "acpsx", "airsys", "atarisy1", "awbios", "bubsys", "cdibios", "cpzn1", "cpzn2", "decocass",
    "f355bios", "gq863", "hikaru", "hng64", "isgsm", "konamigv", "konamigx", "megaplay",
    "megatech", "naomi", "naomi2", "naomigd", "neocdz", "neogeo", "nss", "pgm", "playch10",
    "qsound", "segasp", "skns", "stvbios", "sys246", "sys256", "sys573", "taitofx1", "taitogn",
    "tps", "triforce", "v4bios", "ym2608", "ym2413", "ymz770", "z80",
];

/// Archive extensions the asset rule applies to
const ARCHIVE_EXTENSIONS: &[&str] = &[".zip", ".7z"];

/// Sets whose cabinet monitor is mounted vertically
const VERTICAL_SETS: &[&str] = &[
    "1942", "1943", "1943kai", "19xx", "1944", "armedf", "batsugun", "bgaregga", "bkraidu",
    "centiped", "ddonpach", "digdug", "dkong", "dkong3", "dkongjr", "dogyuun", "donpachi",
    "dsmbl", "espgal", "espra", "esprade", "frogger", "galaga", "galaxian", "gunbird",
    "gunbird2", "gyruss", "ikari", "ketsui", "kingdmgp", "mooncrst", "mspacman", "pacman",
    "progear", "qix", "raiden", "raiden2", "sf1944", "shippumd", "sstriker", "strikers",
    "tengai", "tetris", "truxton", "truxton2", "vimana", "xevious",
];

/// Arcade manufacturer buckets: (key, display name)
pub const MANUFACTURERS: &[(&str, &str)] = &[
    ("capcom", "Capcom"),
    ("cave", "Cave"),
    ("dataeast", "Data East"),
    ("irem", "Irem"),
    ("konami", "Konami"),
    ("midway", "Midway"),
    ("namco", "Namco"),
    ("neogeo", "Neo-Geo"),
    ("nintendo", "Nintendo"),
    ("sega", "Sega"),
    ("snk", "SNK"),
    ("taito", "Taito"),
    ("technos", "Technos"),
    ("toaplan", "Toaplan"),
];

/// Whether a file is an arcade companion asset rather than a game
pub fn is_asset(stem: &str, extension: &str) -> bool {
    ARCHIVE_EXTENSIONS.contains(&extension)
        && ASSET_SETS.iter().any(|set| set.eq_ignore_ascii_case(stem))
}

/// Whether a set runs on a vertical monitor
pub fn is_vertical(stem: &str) -> bool {
    VERTICAL_SETS.iter().any(|set| set.eq_ignore_ascii_case(stem))
}
