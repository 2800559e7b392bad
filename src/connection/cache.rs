//! Run-scoped memoizing cache for metadata documents.
//!
//! Several policies need the same documents (a profile is audited by the
//! profiles policy and also feeds the effective permissions of its users).
//! Each `(type, name)` key owns a once-cell: concurrent requests for the
//! same key await the same fetch, distinct keys never block each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::debug;

use super::{Connection, ConnectionError};

type CacheKey = (String, String);
type Slot = Arc<OnceCell<Option<Arc<serde_json::Value>>>>;

/// Memoizing front for [`Connection::retrieve_metadata`].
///
/// Absent documents are cached as absent. Failed fetches leave the slot
/// empty so a later caller may retry.
#[derive(Debug, Default)]
pub struct MetadataCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl MetadataCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, metadata_type: &str, name: &str) -> Slot {
        // The critical section never awaits; a poisoned lock still holds a valid map.
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            slots
                .entry((metadata_type.to_owned(), name.to_owned()))
                .or_default(),
        )
    }

    /// Number of keys with a settled value.
    pub fn cached_count(&self) -> usize {
        let slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.values().filter(|s| s.initialized()).count()
    }

    /// Fetch a single document.
    ///
    /// # Errors
    ///
    /// Returns the connection error if the document is not cached and the
    /// remote fetch fails.
    pub async fn get(
        &self,
        connection: &dyn Connection,
        metadata_type: &str,
        name: &str,
    ) -> Result<Option<Arc<serde_json::Value>>, ConnectionError> {
        let slot = self.slot(metadata_type, name);
        let value = slot
            .get_or_try_init(|| async {
                debug!(metadata_type, name, "fetching metadata document");
                let names = [name.to_owned()];
                let mut fetched = connection.retrieve_metadata(metadata_type, &names).await?;
                Ok::<_, ConnectionError>(fetched.remove(name).map(Arc::new))
            })
            .await?;
        Ok(value.clone())
    }

    /// Fetch many documents of one type with a single bulk retrieve for the
    /// keys nobody has fetched yet.
    ///
    /// The returned map only contains documents that exist remotely.
    ///
    /// # Errors
    ///
    /// Returns the connection error if the bulk retrieve fails.
    pub async fn get_many(
        &self,
        connection: &dyn Connection,
        metadata_type: &str,
        names: &[String],
    ) -> Result<HashMap<String, Arc<serde_json::Value>>, ConnectionError> {
        let slots: Vec<(&String, Slot)> = names
            .iter()
            .map(|name| (name, self.slot(metadata_type, name)))
            .collect();

        let missing: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| !slot.initialized())
            .map(|(name, _)| (*name).clone())
            .collect();

        if !missing.is_empty() {
            debug!(metadata_type, count = missing.len(), "bulk fetching metadata documents");
            let mut fetched = connection.retrieve_metadata(metadata_type, &missing).await?;
            for (name, slot) in &slots {
                if missing.contains(name) {
                    let value = fetched.remove(name.as_str()).map(Arc::new);
                    // A concurrent fetch may have settled the slot first; both values are equivalent.
                    let _ = slot.set(value);
                }
            }
        }

        let mut out = HashMap::with_capacity(slots.len());
        for (name, slot) in slots {
            let value = match slot.get() {
                Some(value) => value.clone(),
                None => self.get(connection, metadata_type, name).await?,
            };
            if let Some(doc) = value {
                out.insert(name.clone(), doc);
            }
        }
        Ok(out)
    }
}
