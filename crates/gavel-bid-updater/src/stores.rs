//! Seams to the platform's data-access collaborators.
//!
//! The bid updater core never talks to a database or an object store
//! directly: historical bids, item detail, and image metadata come through
//! the traits below. All of them may be called from any task.

use std::sync::Arc;

use async_trait::async_trait;
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

pub mod in_memory;

/// Read access to the persisted high bids of past and running auctions.
///
/// Queried once per auction when its bid updater is constructed, so that
/// delayed or duplicate requests arriving right after a restart are
/// answered from a correct baseline.
#[async_trait]
pub trait BidArchive: Send + Sync {
    async fn bids_for_auction(
        &self,
        auction_id: AuctionId,
    ) -> eyre::Result<Vec<BidRepresentation>>;
}

/// Read access to the item catalog.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    async fn item(&self, item_id: ItemId) -> eyre::Result<Option<Item>>;
}

/// Read access to the metadata of stored images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn image_infos(
        &self,
        entity_type: &str,
        entity_id: u64,
    ) -> eyre::Result<Vec<ImageInfo>>;
}

/// The bundle of collaborators a bid updater service is constructed over.
#[derive(Clone)]
pub struct Stores {
    pub bid_archive: Arc<dyn BidArchive>,
    pub item_catalog: Arc<dyn ItemCatalog>,
    pub image_store: Arc<dyn ImageStore>,
}
