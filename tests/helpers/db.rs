use std::sync::Arc;

use tempfile::NamedTempFile;
use tessera::settings::{Database, Engine};
use tessera::storage::{self, StorageAdapter};

/// Test database with automatic cleanup
pub struct TestDb {
    store: Arc<dyn StorageAdapter>,
    url: String,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with the engine's schema applied
    pub async fn new(engine: Engine) -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let url = format!("sqlite://{}?mode=rwc", db_path);

        let store = open(&url, engine).await;

        Self {
            store,
            url,
            _temp_file: temp_file,
        }
    }

    pub fn store(&self) -> Arc<dyn StorageAdapter> {
        Arc::clone(&self.store)
    }

    /// A second, independently pooled adapter over the same database file
    pub async fn reopen(&self, engine: Engine) -> Arc<dyn StorageAdapter> {
        open(&self.url, engine).await
    }
}

async fn open(url: &str, engine: Engine) -> Arc<dyn StorageAdapter> {
    let cfg = Database {
        url: url.to_string(),
        engine,
        ..Database::default()
    };

    let store = storage::connect(&cfg)
        .await
        .expect("Failed to connect to test database");
    store
        .initialize()
        .await
        .expect("Failed to initialize schema");
    store
}
