//! On-disk exchange rate cache
//!
//! A single JSON document maps each base currency to its latest snapshot:
//! `{ "USD": { "base": "USD", "timestamp": ..., "rates": { ... } }, ... }`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tokio::task;

use crate::models::{CurrencyCode, ExchangeRateSnapshot};
use crate::{PlannerError, Result};

/// Everything stored in the cache file, keyed by base currency code
pub type RateCacheMap = BTreeMap<String, ExchangeRateSnapshot>;

pub struct RateCacheStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

fn read_map(path: &Path) -> Result<RateCacheMap> {
    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(RateCacheMap::new()),
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(RateCacheMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_map(path: &Path, map: &RateCacheMap) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| PlannerError::cache(format!("cache task failed: {e}")))?
}

impl RateCacheStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the snapshot for `base`, treating any read failure as a miss.
    #[tracing::instrument(name = "load_rates", level = "debug", skip(self, base), fields(base = %base))]
    pub async fn load(&self, base: &CurrencyCode) -> Option<ExchangeRateSnapshot> {
        match self.load_all().await {
            Ok(mut map) => {
                let entry = map.remove(base.as_str());
                if entry.is_none() {
                    tracing::debug!("Base not found in rate cache");
                }
                entry
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Failed to load exchange rates cache");
                None
            }
        }
    }

    /// Reads the whole cache document; a missing file is an empty cache.
    pub async fn load_all(&self) -> Result<RateCacheMap> {
        let path = self.path.clone();
        blocking(move || read_map(&path)).await
    }

    /// Stores `snapshot`, replacing only the entry for its base.
    #[tracing::instrument(name = "save_rates", level = "debug", skip(self, snapshot), fields(base = %snapshot.base))]
    pub async fn save(&self, snapshot: &ExchangeRateSnapshot) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        let snapshot = snapshot.clone();

        blocking(move || {
            let mut map = read_map(&path).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Discarding unreadable exchange rates cache");
                RateCacheMap::new()
            });
            map.insert(snapshot.base.as_str().to_string(), snapshot);
            write_map(&path, &map)
        })
        .await
    }

    /// Removes the cache file. A missing file is not an error.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::service::tests::code;
    use tempfile::TempDir;

    fn snapshot(base: &str, pairs: &[(&str, f64)]) -> ExchangeRateSnapshot {
        let rates = pairs.iter().map(|(c, r)| ((*c).to_string(), *r)).collect();
        ExchangeRateSnapshot::new(code(base), rates)
    }

    #[tokio::test]
    async fn test_missing_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = RateCacheStore::new(dir.path().join("exchange_rates.json"));
        assert!(store.load(&code("USD")).await.is_none());
    }

    #[tokio::test]
    async fn test_save_creates_directory_and_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = RateCacheStore::new(dir.path().join("data").join("exchange_rates.json"));
        let usd = snapshot("USD", &[("EUR", 0.9)]);

        store.save(&usd).await.unwrap();

        assert_eq!(store.load(&code("USD")).await, Some(usd));
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_save_keeps_other_bases() {
        let dir = TempDir::new().unwrap();
        let store = RateCacheStore::new(dir.path().join("exchange_rates.json"));

        store.save(&snapshot("USD", &[("EUR", 0.9)])).await.unwrap();
        store.save(&snapshot("PLN", &[("EUR", 0.23)])).await.unwrap();
        let replacement = snapshot("USD", &[("EUR", 0.95)]);
        store.save(&replacement).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["USD"], replacement);
        assert_eq!(all["PLN"].rates["EUR"], 0.23);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss_and_gets_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exchange_rates.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = RateCacheStore::new(&path);

        assert!(store.load(&code("USD")).await.is_none());

        store.save(&snapshot("USD", &[("EUR", 0.9)])).await.unwrap();
        assert!(store.load(&code("USD")).await.is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = TempDir::new().unwrap();
        let store = RateCacheStore::new(dir.path().join("exchange_rates.json"));
        store.clear().await.unwrap();

        store.save(&snapshot("USD", &[])).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load(&code("USD")).await.is_none());
    }
}
