//! In-memory store implementations.
//!
//! Used by the test suite and by embedders that want to run the service
//! without its backing systems. The catalog and image store can be toggled
//! offline to exercise the degrade-to-stale policy of the current-item
//! cache.

use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Mutex,
        PoisonError,
    },
};

use async_trait::async_trait;
use eyre::bail;
use gavel_core::{
    primitive::{
        AuctionId,
        ItemId,
    },
    representation::{
        BidRepresentation,
        ImageInfo,
        Item,
    },
};

use super::{
    BidArchive,
    ImageStore,
    ItemCatalog,
};

#[derive(Default)]
pub struct InMemoryBidArchive {
    bids: Mutex<HashMap<AuctionId, Vec<BidRepresentation>>>,
}

impl InMemoryBidArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, bid: BidRepresentation) {
        self.bids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(bid.auction_id)
            .or_default()
            .push(bid);
    }
}

#[async_trait]
impl BidArchive for InMemoryBidArchive {
    async fn bids_for_auction(
        &self,
        auction_id: AuctionId,
    ) -> eyre::Result<Vec<BidRepresentation>> {
        Ok(self
            .bids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&auction_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryItemCatalog {
    items: Mutex<HashMap<ItemId, Item>>,
    offline: AtomicBool,
}

impl InMemoryItemCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, item: Item) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.id, item);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl ItemCatalog for InMemoryItemCatalog {
    async fn item(&self, item_id: ItemId) -> eyre::Result<Option<Item>> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("item catalog is offline");
        }
        Ok(self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryImageStore {
    images: Mutex<HashMap<(String, u64), Vec<ImageInfo>>>,
    offline: AtomicBool,
}

impl InMemoryImageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, info: ImageInfo) {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((info.entity_type.clone(), info.entity_id))
            .or_default()
            .push(info);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn image_infos(
        &self,
        entity_type: &str,
        entity_id: u64,
    ) -> eyre::Result<Vec<ImageInfo>> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("image store is offline");
        }
        Ok(self
            .images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(entity_type.to_string(), entity_id))
            .cloned()
            .unwrap_or_default())
    }
}
