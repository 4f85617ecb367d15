use serde::{
    Deserialize,
    Serialize,
};

use crate::primitive::{
    AuctionId,
    BiddingState,
    ItemId,
};

/// A snapshot of the latest known bid on one item, as delivered by the bid
/// feed and served to long-poll clients.
///
/// Snapshots for the same item are ordered by `last_bid_count`, the running
/// count of bids placed on the item.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRepresentation {
    pub auction_id: AuctionId,
    pub item_id: ItemId,
    pub last_bid_count: u64,
    /// The bid amount in cents.
    pub amount: u64,
    pub bidding_state: BiddingState,
    /// Absent for synthetic snapshots, for example the auto-sold record of
    /// an item that received no bids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidder_id: Option<u64>,
}

/// An item put up for auction. Owned and persisted by the item catalog;
/// read-only to the bid updater.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub auction_id: AuctionId,
    pub name: String,
    pub long_description: String,
}

/// Metadata of one stored image associated with an entity.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub id: String,
    pub entity_type: String,
    pub entity_id: u64,
}

/// The rich rendering of an item served to clients asking for the item
/// currently open for bidding.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRepresentation {
    pub id: ItemId,
    pub name: String,
    pub long_description: String,
    pub image_ids: Vec<String>,
}

impl ItemRepresentation {
    #[must_use]
    pub fn new(item: &Item, images: &[ImageInfo]) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            long_description: item.long_description.clone(),
            image_ids: images.iter().map(|info| info.id.clone()).collect(),
        }
    }
}
