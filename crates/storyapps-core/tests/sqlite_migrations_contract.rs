use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use storyapps_core::durable::DurableStore;
use storyapps_core::models::Story;
use storyapps_core::persistence::MigrationStore;
use storyapps_core::sqlite::{SqliteStore, current_schema_version, migration, migrations};

fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("storyapps-{test_name}-{nanos}.sqlite3"))
}

fn story(id: &str) -> Story {
    Story {
        id: id.to_string(),
        name: "Dimas".to_string(),
        description: "Sunrise over Bromo".to_string(),
        photo_url: format!("https://story-api.dicoding.dev/images/stories/{id}.jpg"),
        lat: Some(-7.94),
        lon: Some(112.95),
        created_at: "2024-05-01T06:34:18.598Z".to_string(),
    }
}

#[test]
fn migration_versions_are_strictly_increasing() {
    let entries = migrations();
    assert!(!entries.is_empty());

    let mut previous = 0;
    for entry in entries {
        assert!(entry.version > previous);
        previous = entry.version;
    }
}

#[test]
fn migration_lookup_and_schema_version_are_consistent() {
    let latest = current_schema_version();
    let latest_entry = migration(latest).expect("latest migration must exist");
    assert_eq!(latest_entry.version, latest);
    assert_eq!(latest, 2);
}

#[test]
fn migration_sql_is_defined_for_up_and_down_paths() {
    for entry in migrations() {
        assert!(!entry.up_sql.trim().is_empty(), "up sql must not be empty");
        assert!(
            !entry.down_sql.trim().is_empty(),
            "down sql must not be empty"
        );
    }
}

#[test]
fn planned_migrations_start_after_the_applied_version() {
    let store = SqliteStore::new(test_db_path("planned"));
    let planned: Vec<i64> = store
        .planned_migrations(1)
        .into_iter()
        .map(|entry| entry.version)
        .collect();
    assert_eq!(planned, vec![2]);
    assert!(store.planned_migrations(current_schema_version()).is_empty());
}

#[test]
fn rerunning_migrations_is_harmless() {
    let path = test_db_path("rerun");
    let store = SqliteStore::new(&path);

    store.migrate_to_latest().expect("first migration should succeed");
    store.migrate_to_latest().expect("second migration should succeed");

    assert_eq!(
        store.current_version().expect("version should be readable"),
        current_schema_version()
    );
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn upgrading_from_version_one_keeps_cached_stories() {
    let path = test_db_path("upgrade");
    let durable = DurableStore::open(&path).await.expect("store should open");
    durable
        .save_stories(vec![story("story-1"), story("story-2")])
        .await
        .expect("stories should save");

    let raw = SqliteStore::new(&path);
    raw.apply_migration(1).expect("downgrade to v1 should succeed");
    assert_eq!(raw.current_version().expect("version"), 1);

    let reopened = DurableStore::open(&path).await.expect("store should reopen");
    assert_eq!(raw.current_version().expect("version"), current_schema_version());

    let stories = reopened.get_stories().await.expect("stories should load");
    let ids: Vec<&str> = stories.iter().map(|story| story.id.as_str()).collect();
    assert_eq!(ids, vec!["story-1", "story-2"]);
    assert_eq!(reopened.session().await.expect("session table exists"), None);

    let _ = std::fs::remove_file(path);
}
