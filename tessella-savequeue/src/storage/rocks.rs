//! RocksDB-backed key/value store.
//!
//! Values are LZ4-compressed before hitting RocksDB: snapshots of page states
//! are JSON and compress well, and LZ4 decompression is cheap enough to sit
//! on the load path.
//!
//! Writes default to buffered (no per-write fsync); enable `sync_writes` if
//! the host cannot tolerate losing the last few writes on power failure.

use rocksdb::{BlockBasedOptions, Cache, DBWithThreadMode, Options, SingleThreaded, WriteOptions};
use std::path::{Path, PathBuf};

use super::kv::{KeyValue, KvError};

/// RocksDB store configuration.
#[derive(Debug, Clone)]
pub struct RocksConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 32MB)
    pub block_cache_size: usize,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 128)
    pub max_open_files: i32,
}

impl Default for RocksConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tessella_data"),
            block_cache_size: 32 * 1024 * 1024, // 32MB
            sync_writes: false,
            max_open_files: 128,
        }
    }
}

impl RocksConfig {
    /// Config for testing (small cache, temp directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024, // 4MB
            sync_writes: false,
            max_open_files: 64,
        }
    }
}

impl From<rocksdb::Error> for KvError {
    fn from(e: rocksdb::Error) -> Self {
        KvError::Backend(e.to_string())
    }
}

/// RocksDB-backed [`KeyValue`] implementation with LZ4 value compression.
pub struct RocksKv {
    /// RocksDB instance (single-threaded mode — concurrency via tokio)
    db: DBWithThreadMode<SingleThreaded>,
    config: RocksConfig,
}

impl RocksKv {
    /// Open (creating if missing) the database at the configured path.
    pub fn open(config: RocksConfig) -> Result<Self, KvError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_keep_log_file_num(5);

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        opts.set_block_based_table_factory(&block_opts);

        let db = DBWithThreadMode::<SingleThreaded>::open(&opts, &config.path)?;
        Ok(Self { db, config })
    }

    /// The database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

impl KeyValue for RocksKv {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let stored = match self.db.get(key.as_bytes()) {
            Ok(stored) => stored?,
            Err(e) => {
                log::warn!("rocksdb read failed for key {key}: {e}");
                return None;
            }
        };
        match lz4_flex::decompress_size_prepended(&stored) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("discarding undecompressable value for key {key}: {e}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let compressed = lz4_flex::compress_prepend_size(value);
        self.db
            .put_opt(key.as_bytes(), &compressed, &self.write_options())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        self.db
            .delete_opt(key.as_bytes(), &self.write_options())?;
        Ok(())
    }
}
