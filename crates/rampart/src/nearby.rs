// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Paged proximity search grouped by category.

use rampart_store::{GeoMatch, GeoPoint, RemoteStore, Result};

use crate::keys;

/// Places indexed by location, one geo index per category at `geo:<category>`.
///
/// # Examples
///
/// ```
/// use rampart::{GeoIndex, GeoPoint};
/// use rampart_memory::MemoryStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let index = GeoIndex::new(MemoryStore::new(Clock::new_frozen()));
/// index.add("food", "1", GeoPoint::new(120.149, 30.243)).await?;
/// index.add("food", "2", GeoPoint::new(120.152, 30.245)).await?;
///
/// let page = index.nearby("food", GeoPoint::new(120.150, 30.244), 5_000.0, 1, 10).await?;
/// assert_eq!(page.len(), 2);
/// # Ok::<(), rampart::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct GeoIndex<S> {
    store: S,
}

impl<S: RemoteStore> GeoIndex<S> {
    /// Creates an index over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Adds `member` to `category` at `point`, or moves it there.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable or rejects the coordinates.
    pub async fn add(&self, category: &str, member: &str, point: GeoPoint) -> Result<()> {
        self.store.geo_add(&keys::geo_key(category), member, point).await
    }

    /// Returns page `page` of the members of `category` within `radius_m` metres of
    /// `center`, nearest first.
    ///
    /// Pages start at 1; page 0 reads as page 1. A page past the last match is empty.
    /// Every call searches from the nearest match, so deep pages cost more.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn nearby(&self, category: &str, center: GeoPoint, radius_m: f64, page: usize, page_size: usize) -> Result<Vec<GeoMatch>> {
        if page_size == 0 {
            return Ok(Vec::new());
        }
        let skip = page.max(1).saturating_sub(1).saturating_mul(page_size);
        let limit = skip.saturating_add(page_size);

        let matches = self.store.geo_search(&keys::geo_key(category), center, radius_m, limit).await?;
        Ok(matches.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use rampart_memory::MemoryStore;
    use rampart_store::testing::{MockStore, StoreOp};
    use tick::Clock;

    use super::*;

    fn block_on<F: Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    const CENTER: GeoPoint = GeoPoint::new(120.150, 30.240);

    async fn index() -> GeoIndex<MockStore<MemoryStore>> {
        let index = GeoIndex::new(MockStore::new(MemoryStore::new(Clock::new_frozen())));
        // Roughly 111 m per 0.001 degree of latitude.
        for (member, offset) in [("a", 0.001), ("b", 0.002), ("c", 0.003), ("d", 0.004), ("e", 0.005)] {
            index.add("food", member, GeoPoint::new(120.150, 30.240 + offset)).await.unwrap();
        }
        index.add("bar", "z", CENTER).await.unwrap();
        index.store.clear_operations();
        index
    }

    fn members(page: &[GeoMatch]) -> Vec<&str> {
        page.iter().map(|m| m.member.as_str()).collect()
    }

    #[test]
    fn pages_walk_outward() {
        block_on(async {
            let index = index().await;

            let first = index.nearby("food", CENTER, 10_000.0, 1, 2).await.unwrap();
            let second = index.nearby("food", CENTER, 10_000.0, 2, 2).await.unwrap();
            let third = index.nearby("food", CENTER, 10_000.0, 3, 2).await.unwrap();
            let past = index.nearby("food", CENTER, 10_000.0, 4, 2).await.unwrap();

            assert_eq!(members(&first), ["a", "b"]);
            assert_eq!(members(&second), ["c", "d"]);
            assert_eq!(members(&third), ["e"]);
            assert!(past.is_empty());
            assert!(first[0].distance_m < first[1].distance_m);
        });
    }

    #[test]
    fn page_zero_is_first_page() {
        block_on(async {
            let index = index().await;
            let page = index.nearby("food", CENTER, 10_000.0, 0, 2).await.unwrap();
            assert_eq!(members(&page), ["a", "b"]);
        });
    }

    #[test]
    fn radius_and_category_filter() {
        block_on(async {
            let index = index().await;

            let near = index.nearby("food", CENTER, 250.0, 1, 10).await.unwrap();
            assert_eq!(members(&near), ["a", "b"]);

            let bars = index.nearby("bar", CENTER, 250.0, 1, 10).await.unwrap();
            assert_eq!(members(&bars), ["z"]);
        });
    }

    #[test]
    fn empty_page_size_skips_the_store() {
        block_on(async {
            let index = index().await;
            assert!(index.nearby("food", CENTER, 10_000.0, 1, 0).await.unwrap().is_empty());
            assert_eq!(index.store.count(|op| matches!(op, StoreOp::GeoSearch(_))), 0);
        });
    }
}
