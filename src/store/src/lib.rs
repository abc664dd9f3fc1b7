pub mod address;
pub mod tables;

mod clusters;
mod error;
mod history;
mod variants;

pub use address::{Level, SnpAddress};
pub use error::{ErrorKind, StoreError};
pub use tables::{
    ClusterId, ClusterRow, HistoryRow, MemberFilter, MergeRow, SampleId, SampleRow, StatsRow,
    Tables,
};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};

/// The backing store: the logical tables plus their on-disk location.
///
/// A single writer is assumed. All mutation goes through [`Store::begin`];
/// reads are served from shared references. No in-memory cache survives a
/// transaction boundary; the transaction owns its working copy outright.
#[derive(Debug, Default)]
pub struct Store {
    tables: Tables,
    path  : Option<PathBuf>,
}

impl Store {
    /// An unbacked store, used by tests and by callers that persist manually.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create a fresh store file. Refuses to clobber an existing one.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            return Err(StoreError::AlreadyInitialised);
        }
        let store = Self { tables: Tables::default(), path: Some(path.to_path_buf()) };
        store.save()?;
        Ok(store)
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|source| StoreError::Io {
            action: "open",
            path  : path.to_path_buf(),
            source,
        })?;
        let tables = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            StoreError::Corrupted { path: path.to_path_buf(), source }
        })?;
        debug!("Opened store at {}", path.display());
        Ok(Self { tables, path: Some(path.to_path_buf()) })
    }

    /// Persist the tables. The write goes to a sibling temp file which is
    /// renamed over the target, so a crash never leaves a torn store.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |action: &'static str| {
            let path = path.clone();
            move |source| StoreError::Io { action, path, source }
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err("stage"))?;
        {
            let mut writer = BufWriter::new(&mut tmp);
            serde_json::to_writer(&mut writer, &self.tables)
                .map_err(|source| StoreError::Corrupted { path: path.clone(), source })?;
            writer.flush().map_err(io_err("write"))?;
        }
        tmp.persist(path).map_err(|e| e.error).map_err(io_err("replace"))?;
        debug!("Saved store to {}", path.display());
        Ok(())
    }

    /// Begin a transaction. The transaction works on its own copy of the
    /// tables; dropping it without [`Transaction::commit`] discards every
    /// change.
    pub fn begin(&mut self) -> Transaction<'_> {
        Transaction { work: self.tables.clone(), store: self, now: Utc::now() }
    }

    #[must_use]
    pub fn tables(&self) -> &Tables {
        &self.tables
    }
}

impl Deref for Store {
    type Target = Tables;
    fn deref(&self) -> &Self::Target {
        &self.tables
    }
}

/// A single-writer transaction over the store's tables.
///
/// Every mutation of an admit or remove operation happens on the working
/// copy; [`Transaction::commit`] validates the address-monotonicity
/// invariant and publishes the copy atomically. Until then no partial
/// update is observable through the store.
#[derive(Debug)]
pub struct Transaction<'s> {
    store: &'s mut Store,
    work : Tables,
    now  : DateTime<Utc>,
}

impl Transaction<'_> {
    /// The single timestamp shared by every log entry of this transaction.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.work.check_address_monotonicity()?;
        self.store.tables = self.work;
        info!("Transaction committed");
        Ok(())
    }
}

impl Deref for Transaction<'_> {
    type Target = Tables;
    fn deref(&self) -> &Self::Target {
        &self.work
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.work
    }
}
