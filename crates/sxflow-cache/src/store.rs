use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sxflow_fs::{AtomicWriteOptions, LockFile, atomic_read, atomic_write};
use sxflow_resource::{DeliveryMode, Fingerprint};

use crate::{CacheError, CacheRecord, CachedFile, CodegenEntry, RecordMeta, RecordStatus, Result};

const DB_FILE: &str = "db.json";
const DB_LOCK: &str = "db.lock";
const LOCKS_DIR: &str = "locks";
const ARTIFACTS_DIR: &str = "artifacts";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Database {
    #[serde(default)]
    records:  BTreeMap<Fingerprint, CacheRecord>,
    #[serde(default)]
    codegens: BTreeMap<String, CodegenEntry>,
}

/// Durable record store shared by every delivery using the same cache root.
///
/// All state lives in `db.json`, rewritten atomically while `db.lock` is
/// held, so any number of threads and processes may share one root. Each
/// reservation additionally holds `locks/<fingerprint>.lock` for its whole
/// lifetime; an in-flight record whose lock is free was left by a holder that
/// no longer exists.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

/// Outcome of [`CacheStore::reserve`].
#[derive(Debug)]
pub enum Reservation {
    Granted(ReservationGuard),
    /// A live holder owns the fingerprint. The caller waits for its outcome.
    AlreadyInFlight { transform_id: Option<String> },
}

impl CacheStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [root.clone(), root.join(LOCKS_DIR), root.join(ARTIFACTS_DIR)] {
            std::fs::create_dir_all(&dir).map_err(|e| sxflow_fs::Error::Write {
                path:   dir.clone(),
                source: e,
            })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path { &self.root }

    /// Directory downloaded artifacts for `fp` are placed in.
    pub fn artifact_dir(&self, fp: &Fingerprint) -> PathBuf {
        self.root.join(ARTIFACTS_DIR).join(fp.as_str())
    }

    fn db_path(&self) -> PathBuf { self.root.join(DB_FILE) }

    fn reservation_lock(&self, fp: &Fingerprint) -> PathBuf {
        self.root.join(LOCKS_DIR).join(format!("{fp}.lock"))
    }

    fn load(&self) -> Result<Database> {
        let path = self.db_path();
        match atomic_read(&path)? {
            None => Ok(Database::default()),
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt { path, source })
            }
        }
    }

    fn save(&self, db: &Database) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(db).map_err(CacheError::Encode)?;
        atomic_write(self.db_path(), &bytes, AtomicWriteOptions::default())?;
        Ok(())
    }

    /// Run `f` against the database with `db.lock` held. The database is
    /// written back only when `f` reports a change.
    fn transact<T>(&self, f: impl FnOnce(&mut Database) -> Result<(T, bool)>) -> Result<T> {
        let _lock = LockFile::acquire(self.root.join(DB_LOCK))?;
        let mut db = self.load()?;
        let (out, dirty) = f(&mut db)?;
        if dirty {
            self.save(&db)?;
        }
        Ok(out)
    }

    pub fn lookup(&self, fp: &Fingerprint) -> Result<Option<CacheRecord>> {
        self.transact(|db| Ok((db.records.get(fp).cloned(), false)))
    }

    /// Claim `fp` for a new delivery.
    ///
    /// An existing valid record is handed back through
    /// [`ReservationGuard::previous`] so the holder can reuse its transform.
    /// An in-flight record whose holder is gone is taken over the same way.
    pub fn reserve(&self, fp: &Fingerprint, meta: RecordMeta) -> Result<Reservation> {
        self.transact(|db| {
            let lock = match LockFile::try_acquire(self.reservation_lock(fp)) {
                Ok(lock) => lock,
                Err(sxflow_fs::Error::Contended { .. }) => {
                    let transform_id = db.records.get(fp).and_then(|r| r.transform_id.clone());
                    return Ok((Reservation::AlreadyInFlight { transform_id }, false));
                }
                Err(e) => return Err(e.into()),
            };

            let previous = db.records.get(fp).cloned();
            if let Some(prev) = previous.as_ref().filter(|r| r.status == RecordStatus::InFlight) {
                tracing::warn!(
                    fingerprint = fp.short(),
                    transform_id = ?prev.transform_id,
                    created_at = %prev.created_at,
                    "Taking over stale in-flight cache record"
                );
            }

            let mut record = CacheRecord::in_flight(fp.clone(), meta.clone());
            record.transform_id = previous
                .as_ref()
                .filter(|r| r.status == RecordStatus::InFlight)
                .and_then(|r| r.transform_id.clone());
            db.records.insert(fp.clone(), record);

            let guard = ReservationGuard {
                store: self.clone(),
                fingerprint: fp.clone(),
                lock: Some(lock),
                meta,
                previous,
            };
            Ok((Reservation::Granted(guard), true))
        })
    }

    /// Write `transform_id` into the in-flight record for `fp`.
    ///
    /// Done right after submission so a crashed holder's successor can adopt
    /// the transform instead of submitting again.
    pub fn attach_transform(&self, fp: &Fingerprint, transform_id: &str) -> Result<()> {
        self.transact(|db| match db.records.get_mut(fp) {
            Some(record) if record.status == RecordStatus::InFlight => {
                record.transform_id = Some(transform_id.to_string());
                Ok(((), true))
            }
            _ => Ok(((), false)),
        })
    }

    pub fn list(&self) -> Result<Vec<CacheRecord>> {
        self.transact(|db| Ok((db.records.values().cloned().collect(), false)))
    }

    /// Delete a record and its artifacts. Refuses while a live delivery holds it.
    pub fn remove(&self, fp: &Fingerprint) -> Result<bool> {
        self.transact(|db| {
            if !db.records.contains_key(fp) {
                return Ok((false, false));
            }
            self.evict(db, fp)?;
            Ok((true, true))
        })
    }

    /// Delete every record produced by `transform_id`.
    pub fn remove_by_transform(&self, transform_id: &str) -> Result<usize> {
        self.transact(|db| {
            let matching: Vec<Fingerprint> = db
                .records
                .values()
                .filter(|r| r.transform_id.as_deref() == Some(transform_id))
                .map(|r| r.fingerprint.clone())
                .collect();
            for fp in &matching {
                self.evict(db, fp)?;
            }
            Ok((matching.len(), !matching.is_empty()))
        })
    }

    /// Delete every record not held by a live delivery, plus the codegen cache.
    pub fn clear(&self) -> Result<usize> {
        self.transact(|db| {
            let all: Vec<Fingerprint> = db.records.keys().cloned().collect();
            let mut removed = 0;
            for fp in &all {
                match self.evict(db, fp) {
                    Ok(()) => removed += 1,
                    Err(CacheError::InFlight(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            db.codegens.clear();
            Ok((removed, true))
        })
    }

    fn evict(&self, db: &mut Database, fp: &Fingerprint) -> Result<()> {
        let lock = match LockFile::try_acquire(self.reservation_lock(fp)) {
            Ok(lock) => lock,
            Err(sxflow_fs::Error::Contended { .. }) => return Err(CacheError::InFlight(fp.clone())),
            Err(e) => return Err(e.into()),
        };
        db.records.remove(fp);
        remove_dir_if_exists(&self.artifact_dir(fp))?;
        lock.remove()?;
        Ok(())
    }

    pub fn codegens(&self, endpoint: &str) -> Result<Option<CodegenEntry>> {
        self.transact(|db| Ok((db.codegens.get(endpoint).cloned(), false)))
    }

    pub fn put_codegens(
        &self,
        endpoint: &str,
        generators: BTreeMap<String, String>,
    ) -> Result<CodegenEntry> {
        self.transact(|db| {
            let entry = CodegenEntry {
                fetched_at: Utc::now(),
                generators,
            };
            db.codegens.insert(endpoint.to_string(), entry.clone());
            Ok((entry, true))
        })
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Exclusive claim on one fingerprint.
///
/// Finish it with [`commit`](Self::commit) or [`release`](Self::release).
/// Dropping an unfinished guard releases it on a best-effort basis.
#[derive(Debug)]
pub struct ReservationGuard {
    store:       CacheStore,
    fingerprint: Fingerprint,
    lock:        Option<LockFile>,
    meta:        RecordMeta,
    previous:    Option<CacheRecord>,
}

impl ReservationGuard {
    pub fn fingerprint(&self) -> &Fingerprint { &self.fingerprint }

    /// The record that existed when the reservation was granted: a valid
    /// record being refreshed, or an in-flight record whose holder died.
    pub fn previous(&self) -> Option<&CacheRecord> { self.previous.as_ref() }

    /// Record the remote transform serving this reservation.
    pub fn attach_transform(&self, transform_id: &str) -> Result<()> {
        self.store.attach_transform(&self.fingerprint, transform_id)
    }

    /// Promote the record to valid with its final artifact lists.
    ///
    /// `None` means the mode was not retrieved by this transform; such a
    /// record does not answer requests in that mode.
    pub fn commit(
        mut self,
        transform_id: &str,
        files: Option<Vec<CachedFile>>,
        signed_urls: Option<Vec<String>>,
    ) -> Result<CacheRecord> {
        let lock = self.lock.take();
        self.store.transact(|db| {
            let record = db
                .records
                .entry(self.fingerprint.clone())
                .or_insert_with(|| CacheRecord::in_flight(self.fingerprint.clone(), self.meta.clone()));
            record.status = RecordStatus::Valid;
            record.transform_id = Some(transform_id.to_string());
            record.retrieved.clear();
            if files.is_some() {
                record.retrieved.insert(DeliveryMode::Download);
            }
            if signed_urls.is_some() {
                record.retrieved.insert(DeliveryMode::SignedUrls);
            }
            record.files = files.unwrap_or_default();
            record.signed_urls = signed_urls.unwrap_or_default();
            record.completed_at = Some(Utc::now());
            let committed = record.clone();
            if let Some(lock) = lock {
                lock.remove()?;
            }
            Ok((committed, true))
        })
    }

    /// Give the fingerprint up, leaving no record behind.
    pub fn release(mut self) -> Result<()> { self.release_inner() }

    /// Step away while leaving the in-flight record in place.
    ///
    /// The next reservation treats it like a crashed holder's record and
    /// revalidates its transform, so remote work that is still running is
    /// adopted rather than submitted again.
    pub fn abandon(mut self) -> Result<()> {
        let Some(lock) = self.lock.take() else {
            return Ok(());
        };
        self.store.transact(|_| {
            lock.remove()?;
            Ok(((), false))
        })
    }

    fn release_inner(&mut self) -> Result<()> {
        let Some(lock) = self.lock.take() else {
            return Ok(());
        };
        self.store.transact(|db| {
            db.records.remove(&self.fingerprint);
            lock.remove()?;
            Ok(((), true))
        })
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if self.lock.is_some() {
            if let Err(e) = self.release_inner() {
                tracing::warn!(
                    fingerprint = self.fingerprint.short(),
                    error = %e,
                    "Failed to release dropped reservation"
                );
            }
        }
    }
}
