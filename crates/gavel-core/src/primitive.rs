use serde::{
    Deserialize,
    Serialize,
};

pub type AuctionId = u64;
pub type ItemId = u64;

/// The entity-type key under which item images are filed in the image
/// store.
pub const ITEM_ENTITY_TYPE: &str = "Item";

/// The bidding state of an item as reported by the bid feed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BiddingState {
    /// The item is open for bidding.
    Open,
    /// The auctioneer has announced the last call for bids on the item.
    LastCall,
    /// Bidding on the item has concluded.
    Sold,
}

impl BiddingState {
    #[must_use]
    pub fn is_sold(self) -> bool {
        matches!(self, Self::Sold)
    }
}

impl std::fmt::Display for BiddingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open => "OPEN",
            Self::LastCall => "LASTCALL",
            Self::Sold => "SOLD",
        };
        f.write_str(name)
    }
}
