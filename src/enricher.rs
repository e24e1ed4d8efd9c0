use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{Mutex, Semaphore};
use tracing::info;

use crate::config::SHIPPING_RETRY_JITTER;
use crate::fetcher::MarketClient;
use crate::types::{Listing, ShippingFeeType};

/// Per-run shipping-fee enrichment. The memo table lives for one coordinator
/// run and is shared across all keyword fetches in it; `paid` and `free`
/// outcomes are memoized, `unknown` and `error` are not, so a later keyword
/// in the same run gets another attempt.
pub struct ShippingEnricher<M> {
    fetcher: Arc<M>,
    memo: Mutex<HashMap<String, (i64, ShippingFeeType)>>,
    /// Per-listing locks so the same listing seen by two concurrent keyword
    /// fetches is still fetched only once.
    listing_locks: DashMap<String, Arc<Mutex<()>>>,
    semaphore: Arc<Semaphore>,
}

impl<M: MarketClient> ShippingEnricher<M> {
    pub fn new(fetcher: Arc<M>, concurrency: usize) -> Self {
        Self {
            fetcher,
            memo: Mutex::new(HashMap::new()),
            listing_locks: DashMap::new(),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Fill in `shipping_fee` / `shipping_fee_type` for every listing that
    /// carries a listing_id. Lookups run concurrently under the semaphore.
    pub async fn enrich(&self, listings: &mut [Listing]) {
        let futures: Vec<_> = listings
            .iter()
            .map(|l| self.lookup(l.listing_id.clone(), l.link.clone()))
            .collect();
        let results = futures_util::future::join_all(futures).await;

        let mut paid = 0usize;
        let mut free = 0usize;
        let mut unknown = 0usize;
        let mut errors = 0usize;
        for (listing, (fee, fee_type)) in listings.iter_mut().zip(results) {
            listing.shipping_fee = fee;
            listing.shipping_fee_type = fee_type;
            match fee_type {
                ShippingFeeType::Paid => paid += 1,
                ShippingFeeType::Free => free += 1,
                ShippingFeeType::Unknown => unknown += 1,
                ShippingFeeType::Error => errors += 1,
            }
        }
        info!(paid, free, unknown, errors, "shipping enrichment complete");
    }

    async fn lookup(&self, listing_id: String, url: String) -> (i64, ShippingFeeType) {
        if listing_id.is_empty() || url.is_empty() {
            return (0, ShippingFeeType::Unknown);
        }

        // Serialize per listing: the second arrival waits and then hits the memo.
        let lock = self
            .listing_locks
            .entry(listing_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(&hit) = self.memo.lock().await.get(&listing_id) {
            return hit;
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("shipping semaphore never closed");

        let mut result = self.fetcher.fetch_shipping(&url).await;
        if result.1 == ShippingFeeType::Error {
            tokio::time::sleep(retry_jitter()).await;
            result = self.fetcher.fetch_shipping(&url).await;
        }

        if matches!(result.1, ShippingFeeType::Paid | ShippingFeeType::Free) {
            self.memo.lock().await.insert(listing_id, result);
        }
        result
    }
}

fn retry_jitter() -> Duration {
    let (min, max) = SHIPPING_RETRY_JITTER;
    let secs = rand::thread_rng().gen_range(min..max);
    Duration::from_secs_f64(secs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
