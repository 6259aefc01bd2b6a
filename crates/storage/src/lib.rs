use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{
    domain::{default_categories, Category, LaundryRecord},
    protocol::{
        CategoriesDocument, RecordsDocument, CATEGORIES_STORAGE_KEY, RECORDS_STORAGE_KEY,
    },
};

/// Durable key/value home for the persisted JSON documents. Each key holds one
/// complete document; writes replace it wholesale.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_document(&self, key: &str) -> Result<Option<String>>;
    async fn save_document(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` is its own database, so the
        // pool must keep exactly one alive for the lifetime of the store.
        let pool = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(connect_options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(connect_options)
                .await?
        };

        let storage = Self { pool };
        storage.ensure_documents_table().await?;
        Ok(storage)
    }

    /// Confirms the documents table answers a read.
    pub async fn health_check(&self) -> Result<()> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .context("documents table is not readable")?;
        debug!("storage: health check ok documents={documents}");
        Ok(())
    }

    async fn ensure_documents_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure documents table exists")?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for Storage {
    async fn load_document(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM documents WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read document '{key}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn save_document(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write document '{key}'"))?;
        debug!("storage: saved document key={key} bytes={}", value.len());
        Ok(())
    }
}

async fn load_json<T: DeserializeOwned>(store: &dyn DocumentStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.load_document(key).await? else {
        return Ok(None);
    };
    let parsed = serde_json::from_str(&raw)
        .with_context(|| format!("document '{key}' is not valid JSON for its shape"))?;
    Ok(Some(parsed))
}

async fn save_json<T: Serialize>(store: &dyn DocumentStore, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)
        .with_context(|| format!("failed to serialize document '{key}'"))?;
    store.save_document(key, &json).await
}

/// Missing document yields the six built-in categories.
pub async fn load_categories(store: &dyn DocumentStore) -> Result<Vec<Category>> {
    Ok(load_json::<CategoriesDocument>(store, CATEGORIES_STORAGE_KEY)
        .await?
        .map(|doc| doc.categories)
        .unwrap_or_else(default_categories))
}

pub async fn save_categories(store: &dyn DocumentStore, categories: &[Category]) -> Result<()> {
    save_json(
        store,
        CATEGORIES_STORAGE_KEY,
        &CategoriesDocument {
            categories: categories.to_vec(),
        },
    )
    .await
}

/// Missing document yields an empty record list.
pub async fn load_records(store: &dyn DocumentStore) -> Result<Vec<LaundryRecord>> {
    Ok(load_json::<RecordsDocument>(store, RECORDS_STORAGE_KEY)
        .await?
        .map(|doc| doc.records)
        .unwrap_or_default())
}

pub async fn save_records(store: &dyn DocumentStore, records: &[LaundryRecord]) -> Result<()> {
    save_json(
        store,
        RECORDS_STORAGE_KEY,
        &RecordsDocument {
            records: records.to_vec(),
        },
    )
    .await
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .filter(|parent| !parent.as_os_str().is_empty())
    else {
        return Ok(());
    };

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "cannot create directory '{}' for laundry database '{database_url}'",
            parent.display()
        )
    })
}

/// File behind a SQLite URL, without query parameters. `None` for memory
/// databases and non-SQLite URLs.
fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) {
        return None;
    }
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    rest.split('?')
        .next()
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
