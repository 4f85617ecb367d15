//! The engine: one bid updater per active auction, plus the shared task
//! pool their completion rounds run on.

use std::{
    sync::Arc,
    time::Duration,
};

use eyre::WrapErr as _;
use gavel_core::{
    primitive::{
        AuctionId,
        ItemId,
    },
    representation::BidRepresentation,
};
use tokio_util::task::TaskTracker;
use tracing::{
    info,
    instrument,
    warn,
};

use crate::{
    stores::Stores,
    updater::{
        waiters::NextBidWaiter,
        BidUpdater,
        CurrentItem,
        NextBidOutcome,
        RequestError,
    },
};

pub(crate) struct Engine {
    updaters: papaya::HashMap<AuctionId, Arc<BidUpdater>>,
    stores: Stores,
    tasks: TaskTracker,
    shutdown_grace_period: Duration,
}

impl Engine {
    pub(crate) fn new(stores: Stores, shutdown_grace_period: Duration) -> Self {
        Self {
            updaters: papaya::HashMap::new(),
            stores,
            tasks: TaskTracker::new(),
            shutdown_grace_period,
        }
    }

    /// Routes one bid update from the feed, constructing the auction's
    /// updater if this is the first message seen for it.
    #[instrument(skip_all, fields(
        auction_id = bid.auction_id,
        item_id = bid.item_id,
        last_bid_count = bid.last_bid_count,
    ), err)]
    pub(crate) async fn dispatch(&self, bid: BidRepresentation) -> eyre::Result<()> {
        let updater = self.updater_for(bid.auction_id).await?;
        updater.handle_high_bid(bid);
        Ok(())
    }

    pub(crate) fn next_bid(
        &self,
        auction_id: AuctionId,
        item_id: ItemId,
        last_bid_count: u64,
        waiter: NextBidWaiter,
    ) -> Result<NextBidOutcome, RequestError> {
        self.existing(auction_id)?
            .next_bid(auction_id, item_id, last_bid_count, waiter)
    }

    pub(crate) async fn current_item(
        &self,
        auction_id: AuctionId,
    ) -> Result<Option<CurrentItem>, RequestError> {
        let updater = self.existing(auction_id)?;
        Ok(updater.current_item().await)
    }

    /// Flushes and permanently fast-paths one auction's updater ahead of an
    /// ownership handoff. The updater stays registered so that delayed
    /// polls keep getting immediate answers instead of an unknown-auction
    /// error.
    pub(crate) fn release_auction(&self, auction_id: AuctionId) -> Result<(), RequestError> {
        let updater = self.existing(auction_id)?;
        updater.release();
        Ok(())
    }

    /// Flushes every updater and waits for in-flight completion rounds,
    /// up to the configured grace period.
    pub(crate) async fn shutdown(&self) {
        let auction_ids: Vec<AuctionId> = {
            let guard = self.updaters.guard();
            self.updaters.keys(&guard).copied().collect()
        };
        info!(
            auctions = auction_ids.len(),
            "shutting down; flushing all bid updaters",
        );
        for auction_id in auction_ids {
            if let Some(updater) = self.updaters.pin().remove(&auction_id) {
                updater.shutdown();
            }
        }

        self.tasks.close();
        if tokio::time::timeout(self.shutdown_grace_period, self.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                grace_period = ?self.shutdown_grace_period,
                "completion rounds still running at the end of the grace period; abandoning them",
            );
        }
    }

    async fn updater_for(&self, auction_id: AuctionId) -> eyre::Result<Arc<BidUpdater>> {
        if let Some(updater) = self.updaters.pin().get(&auction_id) {
            return Ok(updater.clone());
        }

        let seed = self
            .stores
            .bid_archive
            .bids_for_auction(auction_id)
            .await
            .wrap_err_with(|| {
                format!("failed to read the persisted high bids of auction `{auction_id}`")
            })?;
        let fresh = Arc::new(BidUpdater::new(
            auction_id,
            seed,
            self.stores.item_catalog.clone(),
            self.stores.image_store.clone(),
            self.tasks.clone(),
        ));

        // Two feed messages may race here; the first insert wins and the
        // loser's freshly seeded updater is dropped.
        Ok(self.updaters.pin().get_or_insert(auction_id, fresh).clone())
    }

    fn existing(&self, auction_id: AuctionId) -> Result<Arc<BidUpdater>, RequestError> {
        self.updaters
            .pin()
            .get(&auction_id)
            .cloned()
            .ok_or(RequestError::UnknownAuction(auction_id))
    }
}
