use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params};

use crate::models::{CoreError, CoreErrorKind, PushSubscription, Session, Story, SubscriptionKeys};
use crate::persistence::{
    FavoriteStore, MigrationStore, PersistenceResult, PushSubscriptionStore, SessionStore,
    StoryStore,
};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "storyapps_schema_migrations";
const SESSION_KEY: &str = "session";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Access {
    Open,
    Read,
    Write,
}

enum OpenFailure {
    Unavailable(String),
    Sqlite(rusqlite::Error),
}

pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &'static str,
        access: Access,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|failure| open_error(operation_name, failure))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, access, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", Access::Read, |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                Access::Open,
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                Access::Open,
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", Access::Open, |connection| {
            ensure_migrations_table(connection)?;

            // Immediate so that concurrent openers serialize on the version check
            // instead of racing to record the same migration.
            let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current_version = read_current_version(&transaction)?;

            if target_version == current_version {
                // Re-apply DDL to repair a database whose version row survived but
                // whose tables did not. Every statement is IF NOT EXISTS.
                for version in 1..=target_version {
                    if let Some(entry) = migration(version) {
                        transaction.execute_batch(entry.up_sql)?;
                    }
                }
            } else if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    let entry = defined_migration(version)?;
                    apply_up_migration(&transaction, entry)?;
                    tracing::info!(
                        version = entry.version,
                        name = entry.name,
                        "applied durable store migration"
                    );
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    let entry = defined_migration(version)?;
                    apply_down_migration(&transaction, entry)?;
                    tracing::info!(
                        version = entry.version,
                        name = entry.name,
                        "reverted durable store migration"
                    );
                }
            }

            transaction.commit()
        })
    }
}

impl StoryStore for SqliteStore {
    fn upsert_stories(&self, stories: &[Story]) -> PersistenceResult<()> {
        self.with_connection("save_stories", Access::Write, |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            {
                let mut statement = transaction.prepare(
                    "
INSERT INTO stories (
    id, name, description, photo_url, lat, lon, created_at, cached_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, strftime('%s', 'now'))
ON CONFLICT(id) DO UPDATE SET
    name = excluded.name,
    description = excluded.description,
    photo_url = excluded.photo_url,
    lat = excluded.lat,
    lon = excluded.lon,
    created_at = excluded.created_at,
    cached_at_unix = excluded.cached_at_unix
",
                )?;

                for story in stories {
                    statement.execute(params![
                        story.id,
                        story.name,
                        story.description,
                        story.photo_url,
                        story.lat,
                        story.lon,
                        story.created_at,
                    ])?;
                }
            }
            transaction.commit()?;
            Ok(())
        })
    }

    fn list_stories(&self) -> PersistenceResult<Vec<Story>> {
        self.with_connection("get_stories", Access::Read, |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT id, name, description, photo_url, lat, lon, created_at
FROM stories
ORDER BY id
",
            )?;
            let rows = statement.query_map([], story_from_row)?;
            rows.collect()
        })
    }

    fn story(&self, id: &str) -> PersistenceResult<Option<Story>> {
        self.with_connection("get_story_by_id", Access::Read, |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "
SELECT id, name, description, photo_url, lat, lon, created_at
FROM stories
WHERE id = ?1
",
                    [id],
                    story_from_row,
                )
                .optional()
        })
    }

    fn delete_story(&self, id: &str) -> PersistenceResult<()> {
        self.with_connection("delete_story", Access::Write, |connection| {
            ensure_schema_ready(connection)?;
            connection.execute("DELETE FROM stories WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    fn clear_stories(&self) -> PersistenceResult<()> {
        self.with_connection("clear_stories", Access::Write, |connection| {
            ensure_schema_ready(connection)?;
            connection.execute("DELETE FROM stories", [])?;
            Ok(())
        })
    }
}

impl FavoriteStore for SqliteStore {
    fn upsert_favorite(&self, story: &Story) -> PersistenceResult<()> {
        self.with_connection("add_to_favorites", Access::Write, |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO favorites (
    id, name, description, photo_url, lat, lon, created_at, saved_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, strftime('%s', 'now'))
ON CONFLICT(id) DO UPDATE SET
    name = excluded.name,
    description = excluded.description,
    photo_url = excluded.photo_url,
    lat = excluded.lat,
    lon = excluded.lon,
    created_at = excluded.created_at,
    saved_at_unix = excluded.saved_at_unix
",
                params![
                    story.id,
                    story.name,
                    story.description,
                    story.photo_url,
                    story.lat,
                    story.lon,
                    story.created_at,
                ],
            )?;
            Ok(())
        })
    }

    fn delete_favorite(&self, id: &str) -> PersistenceResult<()> {
        self.with_connection("remove_from_favorites", Access::Write, |connection| {
            ensure_schema_ready(connection)?;
            connection.execute("DELETE FROM favorites WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    fn list_favorites(&self) -> PersistenceResult<Vec<Story>> {
        self.with_connection("get_favorites", Access::Read, |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT id, name, description, photo_url, lat, lon, created_at
FROM favorites
ORDER BY id
",
            )?;
            let rows = statement.query_map([], story_from_row)?;
            rows.collect()
        })
    }

    fn favorite_exists(&self, id: &str) -> PersistenceResult<bool> {
        self.with_connection("is_favorite", Access::Read, |connection| {
            ensure_schema_ready(connection)?;
            connection.query_row(
                "SELECT EXISTS(SELECT 1 FROM favorites WHERE id = ?1)",
                [id],
                |row| row.get::<_, i64>(0).map(sqlite_to_bool),
            )
        })
    }
}

impl SessionStore for SqliteStore {
    fn save_session(&self, session: &Session) -> PersistenceResult<()> {
        self.with_connection("save_session", Access::Write, |connection| {
            ensure_schema_ready(connection)?;
            let encoded = serde_json::to_string(session)
                .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
            connection.execute(
                "
INSERT INTO app_settings (key, value)
VALUES (?1, ?2)
ON CONFLICT(key) DO UPDATE SET
    value = excluded.value
",
                params![SESSION_KEY, encoded],
            )?;
            Ok(())
        })
    }

    fn session(&self) -> PersistenceResult<Option<Session>> {
        self.with_connection("session", Access::Read, |connection| {
            ensure_schema_ready(connection)?;
            let raw: Option<String> = connection
                .query_row(
                    "SELECT value FROM app_settings WHERE key = ?1",
                    [SESSION_KEY],
                    |row| row.get(0),
                )
                .optional()?;

            raw.map(|value| {
                serde_json::from_str::<Session>(&value).map_err(|error| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(error))
                })
            })
            .transpose()
        })
    }

    fn clear_session(&self) -> PersistenceResult<()> {
        self.with_connection("clear_session", Access::Write, |connection| {
            ensure_schema_ready(connection)?;
            connection.execute("DELETE FROM app_settings WHERE key = ?1", [SESSION_KEY])?;
            Ok(())
        })
    }
}

impl PushSubscriptionStore for SqliteStore {
    fn upsert_push_subscription(&self, subscription: &PushSubscription) -> PersistenceResult<()> {
        self.with_connection("save_push_subscription", Access::Write, |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO push_subscriptions (endpoint, p256dh, auth, created_at_unix)
VALUES (?1, ?2, ?3, strftime('%s', 'now'))
ON CONFLICT(endpoint) DO UPDATE SET
    p256dh = excluded.p256dh,
    auth = excluded.auth
",
                params![
                    subscription.endpoint,
                    subscription.keys.p256dh,
                    subscription.keys.auth,
                ],
            )?;
            Ok(())
        })
    }

    fn list_push_subscriptions(&self) -> PersistenceResult<Vec<PushSubscription>> {
        self.with_connection("push_subscriptions", Access::Read, |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT endpoint, p256dh, auth
FROM push_subscriptions
ORDER BY created_at_unix, endpoint
",
            )?;
            let rows = statement.query_map([], |row| {
                Ok(PushSubscription {
                    endpoint: row.get(0)?,
                    keys: SubscriptionKeys {
                        p256dh: row.get(1)?,
                        auth: row.get(2)?,
                    },
                })
            })?;
            rows.collect()
        })
    }

    fn delete_push_subscription(&self, endpoint: &str) -> PersistenceResult<()> {
        self.with_connection("delete_push_subscription", Access::Write, |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "DELETE FROM push_subscriptions WHERE endpoint = ?1",
                [endpoint],
            )?;
            Ok(())
        })
    }

    fn clear_push_subscriptions(&self) -> PersistenceResult<()> {
        self.with_connection("clear_push_subscriptions", Access::Write, |connection| {
            ensure_schema_ready(connection)?;
            connection.execute("DELETE FROM push_subscriptions", [])?;
            Ok(())
        })
    }
}

fn open_connection(database_path: &Path) -> Result<Connection, OpenFailure> {
    if database_path.as_os_str().is_empty() {
        return Err(OpenFailure::Unavailable(
            "no durable storage location is configured".to_string(),
        ));
    }

    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| {
            OpenFailure::Unavailable(format!(
                "cannot create storage directory '{}': {error}",
                parent.display()
            ))
        })?;
    }

    let connection = Connection::open(database_path).map_err(OpenFailure::Sqlite)?;
    connection
        .busy_timeout(BUSY_TIMEOUT)
        .map_err(OpenFailure::Sqlite)?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(
        "
CREATE TABLE IF NOT EXISTS storyapps_schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
",
    )?;
    Ok(())
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version < current_schema_version() {
        return Err(storage_error_sqlite(&format!(
            "durable store schema is at version {version}; open the store before using it"
        )));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version)
        .ok_or_else(|| storage_error_sqlite(&format!("migration version '{version}' is not defined")))
}

fn apply_up_migration(connection: &Connection, migration: &SqliteMigration) -> rusqlite::Result<()> {
    connection.execute_batch(migration.up_sql)?;
    connection.execute(
        &format!(
            "INSERT OR IGNORE INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    Ok(())
}

fn apply_down_migration(
    connection: &Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    connection.execute_batch(migration.down_sql)?;
    connection.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    Ok(())
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<Story> {
    Ok(Story {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        photo_url: row.get(3)?,
        lat: row.get(4)?,
        lon: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn sqlite_to_bool(value: i64) -> bool {
    value != 0
}

fn open_error(operation: &'static str, failure: OpenFailure) -> CoreError {
    match failure {
        OpenFailure::Unavailable(message) => {
            CoreError::new(CoreErrorKind::StorageUnavailable, message).with_operation(operation)
        }
        OpenFailure::Sqlite(rusqlite::Error::SqliteFailure(error, detail))
            if error.code == ErrorCode::CannotOpen =>
        {
            CoreError::new(
                CoreErrorKind::StorageUnavailable,
                format!(
                    "durable storage cannot be opened: {}",
                    detail.unwrap_or_else(|| error.to_string())
                ),
            )
            .with_operation(operation)
        }
        OpenFailure::Sqlite(error) => storage_error(operation, Access::Open, error),
    }
}

fn storage_error(operation: &'static str, access: Access, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, access, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn storage_error_text(
    operation: &'static str,
    access: Access,
    message: impl AsRef<str>,
) -> CoreError {
    let kind = match access {
        Access::Open => CoreErrorKind::OpenError,
        Access::Read => CoreErrorKind::ReadError,
        Access::Write => CoreErrorKind::WriteError,
    };
    CoreError::new(
        kind,
        format!("durable store '{operation}' failed: {}", message.as_ref()),
    )
    .with_operation(operation)
}
