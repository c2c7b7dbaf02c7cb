//! Container Module
//!
//! Top-level handle: maps collection names to open collections under one
//! base directory.
//!
//! ## Responsibilities
//! - Open collections lazily, once per name
//! - Map collection names to backing file names
//! - Flush and close every collection together
//! - Own the background compaction worker (when enabled)

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::collection::{Collection, CollectionState, Compactor, CompactorHandle};
use crate::config::Config;
use crate::error::{Result, ZelosError};
use crate::store::FILE_EXTENSION;

/// Longest file name most filesystems accept
const MAX_FILE_NAME_LEN: usize = 255;

/// Backing file name for a collection
///
/// Bytes in `[A-Za-z0-9_-]` are kept; every other byte of the UTF-8 name is
/// written as `%XX`. Distinct names therefore never share a file.
pub fn collection_file_name(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(ZelosError::InvalidCollectionName(name.to_string()));
    }

    let mut file_name = String::with_capacity(name.len() + FILE_EXTENSION.len() + 1);
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            file_name.push(byte as char);
        } else {
            let _ = write!(file_name, "%{:02X}", byte);
        }
    }
    file_name.push('.');
    file_name.push_str(FILE_EXTENSION);

    if file_name.len() > MAX_FILE_NAME_LEN {
        return Err(ZelosError::InvalidCollectionName(name.to_string()));
    }

    Ok(file_name)
}

/// Entry point: a set of collections stored under one directory
///
/// ## Concurrency:
/// - `collections`: RwLock; lookups share it, opening a collection takes it
///   exclusively so two callers never open the same file twice
/// - `closed`: only flipped under the `collections` write lock
pub struct Container {
    config: Arc<Config>,

    collections: RwLock<HashMap<String, Arc<Collection>>>,

    /// Background compaction worker (background_compaction only)
    compactor: Mutex<Option<Compactor>>,

    closed: AtomicBool,
}

impl Container {
    /// Open or create a container with the given config
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.base_dir)?;

        let compactor = if config.background_compaction {
            Some(Compactor::start()?)
        } else {
            None
        };

        tracing::info!(
            base_dir = %config.base_dir.display(),
            background_compaction = config.background_compaction,
            "Container opened"
        );

        Ok(Self {
            config: Arc::new(config),
            collections: RwLock::new(HashMap::new()),
            compactor: Mutex::new(compactor),
            closed: AtomicBool::new(false),
        })
    }

    /// Return the collection called `name`, opening it on first use
    ///
    /// Every call with the same name returns the same instance until the
    /// collection is closed; after that the next call reopens it.
    pub fn get_or_open_collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.ensure_open()?;

        if let Some(collection) = self.collections.read().get(name) {
            if collection.state() == CollectionState::Open {
                return Ok(Arc::clone(collection));
            }
        }

        let mut collections = self.collections.write();
        self.ensure_open()?;

        // Another caller may have opened it while we waited
        if let Some(collection) = collections.get(name) {
            if collection.state() == CollectionState::Open {
                return Ok(Arc::clone(collection));
            }
        }

        let path = self.collection_path(name)?;
        let collection = Collection::open_with(
            name.to_string(),
            &path,
            Arc::clone(&self.config),
            self.compactor_handle(),
        )?;

        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Close one collection and forget it. Returns whether it was open.
    pub fn close_collection(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;

        let removed = self.collections.write().remove(name);
        match removed {
            Some(collection) => {
                let was_open = collection.is_open();
                collection.close()?;
                Ok(was_open)
            }
            None => Ok(false),
        }
    }

    /// Names of the currently open collections, sorted
    pub fn collection_names(&self) -> Result<Vec<String>> {
        self.ensure_open()?;

        let mut names: Vec<String> = self
            .collections
            .read()
            .iter()
            .filter(|(_, collection)| collection.is_open())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Flush every open collection
    ///
    /// All collections are attempted; the first error is returned.
    pub fn flush_all(&self) -> Result<()> {
        self.ensure_open()?;

        let mut result = Ok(());
        for collection in self.open_collections() {
            if let Err(e) = collection.flush() {
                tracing::error!(collection = %collection.name(), "Flush failed: {}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Flush and close every collection, then stop background work
    ///
    /// Afterwards every container operation fails with `ContainerClosed`.
    /// Calling it again is a no-op.
    pub fn close_all(&self) -> Result<()> {
        let collections = {
            let mut map = self.collections.write();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            std::mem::take(&mut *map)
        };

        let mut result = Ok(());
        for (name, collection) in collections {
            if let Err(e) = collection.close() {
                tracing::error!(collection = %name, "Close failed: {}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        if let Some(mut compactor) = self.compactor.lock().take() {
            compactor.shutdown();
        }

        tracing::info!(base_dir = %self.config.base_dir.display(), "Container closed");
        result
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Backing file path for `name`
    pub fn collection_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.config.base_dir.join(collection_file_name(name)?))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ZelosError::ContainerClosed);
        }
        Ok(())
    }

    fn open_collections(&self) -> Vec<Arc<Collection>> {
        self.collections
            .read()
            .values()
            .filter(|collection| collection.is_open())
            .cloned()
            .collect()
    }

    fn compactor_handle(&self) -> Option<CompactorHandle> {
        self.compactor.lock().as_ref().map(Compactor::handle)
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(e) = self.close_all() {
            tracing::warn!("Failed to close container cleanly: {}", e);
        }
    }
}
