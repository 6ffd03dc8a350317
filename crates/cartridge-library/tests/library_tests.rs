//! Integration tests for the library registry and collections

mod common;

use cartridge_library::{
    ChangeKind, DisplayEntry, Library, LibraryError, MetaKey, NoThemes, NodeRef, ToggleOutcome,
    TreeId,
};
use common::{TestEnv, game_ref, members};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

#[test]
fn test_init_without_games_fails() {
    let env = TestEnv::new();
    env.system_dir("nes");
    let result = Library::init(&env.config(&["nes"]), &env.settings(), &NoThemes);
    assert!(matches!(result, Err(LibraryError::NoCatalogs)));
}

#[test]
fn test_invalid_systems_are_dropped() {
    let env = TestEnv::new();
    env.rom("nes", "a.rom");
    let mut config = env.config(&["nes"]);
    let mut broken = env.system("snes");
    broken.command.clear();
    config.systems.push(broken);

    let library = Library::init(&config, &env.settings(), &NoThemes).unwrap();
    assert_eq!(library.catalogs().len(), 1);
    assert_eq!(library.display()[0], DisplayEntry::System(0));
}

#[test]
fn test_aliases_never_own_games() {
    let env = TestEnv::new();
    for name in ["a.rom", "b.rom", "sub/c.rom"] {
        env.rom("nes", name);
    }
    env.rom("snes", "d.rom");
    let library = Library::init(&env.config(&["nes", "snes"]), &env.settings(), &NoThemes).unwrap();

    let all = members(&library, "all");
    assert_eq!(all.len(), 4);

    for (i, instance) in library.collections().instances().iter().enumerate() {
        let tree = library.tree(TreeId::Collection(i)).unwrap();
        assert_eq!(tree.root(), instance.tree().root());
        for alias in tree.aliases() {
            let target = tree[alias].alias_target().unwrap();
            let TreeId::System(system) = target.tree else {
                panic!("collection alias into {:?}", target.tree);
            };
            let owners = library
                .catalogs()
                .iter()
                .filter(|c| c.tree().find(tree[alias].path()).is_some())
                .count();
            assert_eq!(owners, 1);
            let game = library.node(target).unwrap();
            assert!(game.is_game());
            assert!(library.catalogs()[system].tree().find(game.path()).is_some());
        }
    }
}

#[test]
fn test_favorite_toggle_is_symmetric() {
    let env = TestEnv::new();
    let a = env.rom("nes", "a.rom");
    env.rom("nes", "b.rom");
    let mut library = Library::init(&env.config(&["nes"]), &env.settings(), &NoThemes).unwrap();
    let events = library.subscribe();
    let game = game_ref(&library, "nes", &a);
    let before = members(&library, "favorites");
    assert!(before.is_empty());

    assert_eq!(library.toggle_membership(game), Some(ToggleOutcome::Added));
    assert_eq!(members(&library, "favorites"), vec![a.clone()]);
    assert!(library.metadata(game).unwrap().favorite());

    let favorites = library.collections().automatic("favorites").unwrap();
    let added: Vec<_> = events
        .try_iter()
        .filter(|e| e.node.tree == TreeId::Collection(favorites) && e.change == ChangeKind::Added)
        .collect();
    assert_eq!(added.len(), 1);

    assert_eq!(library.toggle_membership(game), Some(ToggleOutcome::Removed));
    assert_eq!(members(&library, "favorites"), before);
    let removed = events
        .try_iter()
        .filter(|e| e.node.tree == TreeId::Collection(favorites) && e.change == ChangeKind::Removed)
        .count();
    assert_eq!(removed, 1);
}

#[test]
fn test_toggle_through_collection_alias() {
    let env = TestEnv::new();
    let a = env.rom("nes", "a.rom");
    let mut library = Library::init(&env.config(&["nes"]), &env.settings(), &NoThemes).unwrap();

    let all = library.collections().automatic("all").unwrap();
    let alias = library.collections().instances()[all].member(&a).unwrap();
    let through_alias = NodeRef::new(TreeId::Collection(all), alias);
    assert_eq!(library.resolve(through_alias), Some(game_ref(&library, "nes", &a)));

    assert_eq!(
        library.toggle_membership(through_alias),
        Some(ToggleOutcome::Added)
    );
    assert_eq!(members(&library, "favorites"), vec![a]);
}

#[test]
fn test_recent_keeps_most_recently_played() {
    let env = TestEnv::new();
    let roms: Vec<_> = (0..55)
        .map(|i| env.rom("nes", &format!("game{:02}.rom", i)))
        .collect();
    let mut library = Library::init(&env.config(&["nes"]), &env.settings(), &NoThemes).unwrap();

    for (i, rom) in roms.iter().enumerate() {
        let game = game_ref(&library, "nes", rom);
        library.set_metadata(game, MetaKey::PlayCount, "1");
        library.set_metadata(game, MetaKey::LastPlayed, &format!("20200101T00{:02}00", i));
        assert!(members(&library, "recent").len() <= 50);
    }

    let recent = members(&library, "recent");
    let expected: Vec<_> = roms.iter().rev().take(50).cloned().collect();
    assert_eq!(recent, expected);
    assert!(!members(&library, "neverplayed").contains(&roms[0]));
}

#[test]
fn test_recent_refills_after_member_leaves() {
    let env = TestEnv::new();
    let roms: Vec<_> = (0..55)
        .map(|i| env.rom("nes", &format!("game{:02}.rom", i)))
        .collect();
    let mut library = Library::init(&env.config(&["nes"]), &env.settings(), &NoThemes).unwrap();
    for (i, rom) in roms.iter().enumerate() {
        let game = game_ref(&library, "nes", rom);
        library.set_metadata(game, MetaKey::PlayCount, "1");
        library.set_metadata(game, MetaKey::LastPlayed, &format!("20200101T00{:02}00", i));
    }
    let events = library.subscribe();

    let newest = game_ref(&library, "nes", &roms[54]);
    library.set_metadata(newest, MetaKey::Hidden, "true");

    let expected: Vec<_> = roms[..54].iter().rev().take(50).cloned().collect();
    assert_eq!(members(&library, "recent"), expected);

    let recent = library.collections().automatic("recent").unwrap();
    let added = events
        .try_iter()
        .filter(|e| e.node.tree == TreeId::Collection(recent) && e.change == ChangeKind::Added)
        .count();
    assert_eq!(added, 1);
}

#[test]
fn test_mark_played_moves_game_to_front() {
    let env = TestEnv::new();
    let a = env.rom("nes", "a.rom");
    let b = env.rom("nes", "b.rom");
    let mut library = Library::init(&env.config(&["nes"]), &env.settings(), &NoThemes).unwrap();

    let (a_ref, b_ref) = (game_ref(&library, "nes", &a), game_ref(&library, "nes", &b));
    library.set_metadata(a_ref, MetaKey::PlayCount, "4");
    library.set_metadata(a_ref, MetaKey::LastPlayed, "20200101T000000");
    assert_eq!(members(&library, "recent"), vec![a.clone()]);

    assert!(library.mark_played(b_ref));
    assert!(library.mark_played(a_ref));
    assert_eq!(members(&library, "recent"), vec![a.clone(), b.clone()]);
    assert_eq!(library.metadata(a_ref).unwrap().play_count(), 5);
    assert!(library.metadata(b_ref).unwrap().last_played().is_some());
}

#[test]
fn test_custom_collection_membership_file() {
    let env = TestEnv::new();
    let system_dir = env.root.join("roms");
    fs::create_dir_all(&system_dir).unwrap();
    let a = system_dir.join("a.rom");
    fs::write(&a, b"x").unwrap();
    fs::write(system_dir.join("b.rom"), b"x").unwrap();

    let mut system = env.system("nes");
    system.path = system_dir.to_string_lossy().to_string();
    let config = cartridge_config::CatalogConfig {
        systems: vec![system],
    };

    let settings = cartridge_config::LibrarySettings {
        custom_collections: vec!["picks".to_string()],
        bundle_custom_collections: false,
        ..env.settings()
    };
    fs::create_dir_all(&settings.collections_dir).unwrap();
    fs::write(
        settings.collections_dir.join("custom-picks.cfg"),
        "roms/a.rom\n# comment\n\nroms/missing.rom\n",
    )
    .unwrap();

    let library = Library::init(&config, &settings, &NoThemes).unwrap();
    let picks = library.collections().custom("picks").unwrap();
    let instance = &library.collections().instances()[picks];
    assert_eq!(instance.member_paths(), vec![a]);
    assert!(!instance.needs_save());
    assert!(library.display().contains(&DisplayEntry::Collection(picks)));
}

#[test]
fn test_custom_collection_edit_and_reload() {
    let env = TestEnv::new();
    let a = env.rom("nes", "a.rom");
    env.rom("nes", "b.rom");
    let settings = env.settings();
    let config = env.config(&["nes"]);

    {
        let mut library = Library::init(&config, &settings, &NoThemes).unwrap();
        library.create_custom("shmups", &NoThemes).unwrap();
        assert!(library.display().contains(&DisplayEntry::Bundle));
        library.set_editing(Some("shmups")).unwrap();

        let game = game_ref(&library, "nes", &a);
        assert_eq!(library.toggle_membership(game), Some(ToggleOutcome::Added));
        // editing a custom collection leaves favorites alone
        assert!(members(&library, "favorites").is_empty());
        assert!(library.shutdown() >= 1);
    }

    let file = settings.collections_dir.join("custom-shmups.cfg");
    let contents = fs::read_to_string(&file).unwrap();
    assert!(contents.lines().any(|line| line == "roms/nes/a.rom"));

    let settings = cartridge_config::LibrarySettings {
        custom_collections: vec!["shmups".to_string()],
        ..settings
    };
    let mut library = Library::init(&config, &settings, &NoThemes).unwrap();
    let shmups = library.collections().custom("shmups").unwrap();
    assert_eq!(library.collections().instances()[shmups].member_paths(), vec![a.clone()]);
    assert_eq!(library.collections().bundled(), &[shmups]);

    let bundle = library.tree(TreeId::Bundle).unwrap();
    let alias = bundle.aliases()[0];
    let target = library.resolve(NodeRef::new(TreeId::Bundle, alias)).unwrap();
    assert_eq!(target.tree, TreeId::Collection(shmups));

    library.delete_custom("shmups").unwrap();
    assert!(!file.exists());
    assert!(!library.display().contains(&DisplayEntry::Bundle));
}

#[test]
fn test_editing_unpopulated_collection_keeps_members() {
    let env = TestEnv::new();
    let a = env.rom("nes", "a.rom");
    let b = env.rom("nes", "b.rom");
    let c = env.rom("nes", "c.rom");
    let settings = env.settings();
    fs::create_dir_all(&settings.collections_dir).unwrap();
    let file = settings.collections_dir.join("custom-picks.cfg");
    fs::write(&file, "roms/nes/a.rom\nroms/nes/b.rom\n").unwrap();

    let mut library = Library::init(&env.config(&["nes"]), &settings, &NoThemes).unwrap();
    let picks = library.collections().custom("picks").unwrap();
    assert!(!library.collections().instances()[picks].is_populated());

    library.set_editing(Some("picks")).unwrap();
    let game = game_ref(&library, "nes", &c);
    assert_eq!(library.toggle_membership(game), Some(ToggleOutcome::Added));
    assert_eq!(
        library.collections().instances()[picks].member_paths(),
        vec![a, b, c]
    );
    library.shutdown();

    let lines: BTreeSet<String> = fs::read_to_string(&file)
        .unwrap()
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    let expected: BTreeSet<String> = ["roms/nes/a.rom", "roms/nes/b.rom", "roms/nes/c.rom"]
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(lines, expected);
}

#[test]
fn test_hidden_systems_leave_collections() {
    let env = TestEnv::new();
    env.rom("nes", "a.rom");
    let d = env.rom("snes", "d.rom");
    let mut library =
        Library::init(&env.config(&["nes", "snes"]), &env.settings(), &NoThemes).unwrap();
    assert!(members(&library, "all").contains(&d));

    library.set_hidden_systems(vec!["snes".to_string()]);
    assert!(!members(&library, "all").contains(&d));
    assert!(!library.display().contains(&DisplayEntry::System(1)));
    assert!(library.display().contains(&DisplayEntry::System(0)));
}

#[test]
fn test_grouped_systems_share_an_entry() {
    let env = TestEnv::new();
    env.rom("nes", "a.rom");
    env.rom("snes", "b.rom");
    let mut config = env.config(&["nes", "snes"]);
    for system in &mut config.systems {
        system.group = Some("Nintendo".to_string());
    }

    let library = Library::init(&config, &env.settings(), &NoThemes).unwrap();
    let groups: Vec<_> = library
        .display()
        .iter()
        .filter(|e| matches!(e, DisplayEntry::Group(_)))
        .collect();
    assert_eq!(groups, vec![&DisplayEntry::Group(0)]);
    assert_eq!(library.display_name(DisplayEntry::Group(0)), "Nintendo");
    assert_eq!(library.groups()[0].members(), &[0, 1]);

    let group_tree = library.tree(TreeId::Group(0)).unwrap();
    let alias = group_tree.aliases()[1];
    let target = library.resolve(NodeRef::new(TreeId::Group(0), alias)).unwrap();
    assert_eq!(target.tree, TreeId::System(1));
}

#[test]
fn test_parallel_population_matches_sequential() {
    let env = TestEnv::new();
    for system in ["nes", "snes", "gb", "md"] {
        for i in 0..6 {
            env.rom(system, &format!("{}-{}.rom", system, i));
        }
    }
    let config = env.config(&["nes", "snes", "gb", "md"]);
    let enabled = vec![
        "all".to_string(),
        "favorites".to_string(),
        "recent".to_string(),
        "neverplayed".to_string(),
        "2players".to_string(),
    ];
    let sequential = cartridge_config::LibrarySettings {
        auto_collections: enabled.clone(),
        ..env.settings()
    };
    let parallel = cartridge_config::LibrarySettings {
        parallel_population: true,
        ..sequential.clone()
    };

    let snapshot = |library: &Library| -> HashMap<String, Vec<PathBuf>> {
        library
            .collections()
            .instances()
            .iter()
            .map(|i| (i.key().to_string(), i.member_paths()))
            .collect()
    };

    let first = Library::init(&config, &sequential, &NoThemes).unwrap();
    let second = Library::init(&config, &parallel, &NoThemes).unwrap();
    assert_eq!(first.display(), second.display());
    assert_eq!(snapshot(&first), snapshot(&second));
    assert_eq!(members(&first, "all").len(), 24);
}

#[test]
fn test_enabling_collection_populates_it() {
    let env = TestEnv::new();
    let a = env.rom("nes", "a.rom");
    env.rom("nes", "b.rom");
    let mut library = Library::init(&env.config(&["nes"]), &env.settings(), &NoThemes).unwrap();
    let game = game_ref(&library, "nes", &a);
    library.set_metadata(game, MetaKey::Players, "1-4");

    let two_players = library.collections().automatic("2players").unwrap();
    assert!(!library.collections().instances()[two_players].is_populated());
    assert!(!library.display().contains(&DisplayEntry::Collection(two_players)));

    assert!(library.set_collection_enabled(two_players, true, &NoThemes));
    assert!(!library.set_collection_enabled(two_players, true, &NoThemes));
    assert_eq!(members(&library, "2players"), vec![a]);
    assert!(library.display().contains(&DisplayEntry::Collection(two_players)));

    library.set_collection_enabled(two_players, false, &NoThemes);
    assert!(!library.display().contains(&DisplayEntry::Collection(two_players)));
}

#[test]
fn test_arcade_collections_from_scanned_systems() {
    let env = TestEnv::new();
    let galaga = env.rom("arcade", "galaga.zip");
    let sf2 = env.rom("arcade", "sf2.zip");
    let mslug = env.rom("arcade", "mslug.zip");
    let bios = env.rom("arcade", "neogeo.zip");
    let smb = env.rom("nes", "smb.rom");
    fs::write(
        env.system_dir("arcade").join("gamelist.xml"),
        "<gameList>\
         <game><path>./sf2.zip</path><name>Street Fighter II</name>\
         <players>1-4</players><arcadesystemname>capcom</arcadesystemname></game>\
         <game><path>./mslug.zip</path><name>Metal Slug</name><players>3+</players></game>\
         </gameList>",
    )
    .unwrap();
    fs::write(
        env.system_dir("nes").join("gamelist.xml"),
        "<gameList><game><path>./smb.rom</path><name>Super Mario Bros.</name><players>2</players></game></gameList>",
    )
    .unwrap();

    let mut arcade = env.system("arcade");
    arcade.extension = ".zip".to_string();
    let config = cartridge_config::CatalogConfig {
        systems: vec![arcade, env.system("nes")],
    };
    let settings = cartridge_config::LibrarySettings {
        auto_collections: ["all", "arcade", "capcom", "vertical", "4players"]
            .iter()
            .map(|key| key.to_string())
            .collect(),
        ..env.settings()
    };
    let library = Library::init(&config, &settings, &NoThemes).unwrap();

    let set = |key: &str| -> BTreeSet<PathBuf> { members(&library, key).into_iter().collect() };
    assert!(!set("all").contains(&bios));
    assert!(set("all").contains(&smb));
    assert_eq!(
        set("arcade"),
        BTreeSet::from([galaga.clone(), sf2.clone(), mslug.clone()])
    );
    assert_eq!(set("capcom"), BTreeSet::from([sf2.clone()]));
    assert_eq!(set("vertical"), BTreeSet::from([galaga]));
    assert_eq!(set("4players"), BTreeSet::from([sf2, mslug]));
}
