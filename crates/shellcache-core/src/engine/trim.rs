//! Bounded-count eviction.

use tracing::debug;

use crate::error::StoreError;
use crate::store::CacheStorage;

/// Delete oldest-inserted entries of `store_name` until it holds at most
/// `max_entries`. Returns the number of entries removed.
///
/// The loop runs at most as many times as the store had entries on entry.
/// A missing store is already within bound.
pub async fn trim(
    storage: &dyn CacheStorage,
    store_name: &str,
    max_entries: usize,
) -> Result<usize, StoreError> {
    let Some(store) = storage.lookup(store_name).await? else {
        return Ok(0);
    };

    let initial = store.len().await?;
    let mut removed = 0;
    for _ in 0..initial {
        let keys = store.keys().await?;
        if keys.len() <= max_entries {
            break;
        }
        if store.delete(&keys[0]).await? {
            removed += 1;
        }
    }

    if removed > 0 {
        debug!(store = store_name, removed, max_entries, "Trimmed store");
    }
    Ok(removed)
}
