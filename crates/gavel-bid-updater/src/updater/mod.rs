//! The per-auction bid updater.
//!
//! One updater exists per active auction. It tracks the latest accepted bid
//! for every item of the auction, the item currently open for bidding, and
//! the long-poll callers waiting for the next bid. Bid updates arrive from
//! the shared bid feed; waiting callers are resolved out-of-band by
//! completion rounds running on the shared task pool.
//!
//! Two independent locks guard the two shared resources: the high-bid table
//! and the waiter-registry reference. They are deliberately separate so
//! completion rounds never block bid ingestion and vice versa.

use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        PoisonError,
        RwLock,
    },
};

use eyre::WrapErr as _;
use gavel_core::{
    primitive::{
        AuctionId,
        BiddingState,
        ItemId,
        ITEM_ENTITY_TYPE,
    },
    representation::{
        BidRepresentation,
        ItemRepresentation,
    },
};
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

use crate::stores::{
    ImageStore,
    ItemCatalog,
};

pub(crate) mod waiters;

use waiters::{
    NextBidWaiter,
    WaiterRegistry,
};

/// An item that received no bids is auto-sold after this many bidding
/// rounds. Its relisted snapshot restarts the count at
/// [`RELIST_RESTART_BID_COUNT`], which is the one case where a lower count
/// replaces a higher one.
const RELIST_SOLD_BID_COUNT: u64 = 3;
const RELIST_RESTART_BID_COUNT: u64 = 1;

/// The result of a next-bid request that did not fail.
#[derive(Clone, Debug, PartialEq)]
pub enum NextBidOutcome {
    /// A snapshot (or, while draining, possibly none) is available right
    /// away; the caller responds immediately.
    Ready(Option<BidRepresentation>),
    /// The caller's waiter was registered. Do not respond now: a later
    /// completion round resolves the waiter directly.
    Pending,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error(
        "next-bid request for auction `{requested}` was routed to the updater for auction \
         `{actual}`"
    )]
    WrongAuction {
        requested: AuctionId,
        actual: AuctionId,
    },
    #[error("no active auction with id `{0}`")]
    UnknownAuction(AuctionId),
}

/// Whether a served current-item representation reflects the item the
/// auction is actually on, or is a stale fallback kept after a collaborator
/// failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// The rendered representation of the item currently open for bidding.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrentItem {
    pub item: ItemRepresentation,
    pub freshness: Freshness,
}

pub(crate) struct BidUpdater {
    auction_id: AuctionId,
    /// Latest accepted bid snapshot per item. The write guard is held only
    /// while the acceptance policy runs and while a release/shutdown flush
    /// collects its snapshots; `next_bid` holds the read guard across both
    /// its staleness check and waiter registration, so neither an
    /// acceptance nor a flush can slip between the two and strand the
    /// waiter.
    high_bids: RwLock<HashMap<ItemId, Arc<BidRepresentation>>>,
    current_item_id: RwLock<Option<ItemId>>,
    cached_item: Mutex<Option<ItemRepresentation>>,
    waiters: Arc<WaiterRegistry>,
    releasing: AtomicBool,
    shutting_down: AtomicBool,
    tasks: TaskTracker,
    item_catalog: Arc<dyn ItemCatalog>,
    image_store: Arc<dyn ImageStore>,
}

impl BidUpdater {
    /// Constructs an updater seeded from the auction's persisted high bids.
    ///
    /// Any seed whose state is not SOLD marks its item as the current one,
    /// so that delayed requests arriving right after a restart are answered
    /// from a correct baseline.
    pub(crate) fn new(
        auction_id: AuctionId,
        seed: Vec<BidRepresentation>,
        item_catalog: Arc<dyn ItemCatalog>,
        image_store: Arc<dyn ImageStore>,
        tasks: TaskTracker,
    ) -> Self {
        let mut high_bids = HashMap::new();
        let mut current_item_id = None;
        for bid in seed {
            if !bid.bidding_state.is_sold() {
                current_item_id = Some(bid.item_id);
            }
            high_bids.insert(bid.item_id, Arc::new(bid));
        }
        info!(
            auction_id,
            seeded_items = high_bids.len(),
            current_item_id,
            "created bid updater",
        );
        Self {
            auction_id,
            high_bids: RwLock::new(high_bids),
            current_item_id: RwLock::new(current_item_id),
            cached_item: Mutex::new(None),
            waiters: Arc::new(WaiterRegistry::new(auction_id)),
            releasing: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            tasks,
            item_catalog,
            image_store,
        }
    }

    /// Ingests one bid update from the feed.
    ///
    /// The snapshot that wins the acceptance policy (the incoming one if it
    /// is newer, otherwise the retained current one) is written to the
    /// table and handed to a completion round, so even a stale duplicate
    /// still answers waiters polling with an older count.
    #[instrument(skip_all, fields(
        auction_id = self.auction_id,
        item_id = incoming.item_id,
        last_bid_count = incoming.last_bid_count,
    ))]
    pub(crate) fn handle_high_bid(&self, incoming: BidRepresentation) {
        if incoming.auction_id != self.auction_id {
            warn!(
                misrouted_auction_id = incoming.auction_id,
                "dropping high-bid message for another auction",
            );
            return;
        }

        let item_id = incoming.item_id;
        let winner = {
            let mut table = self
                .high_bids
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match table.get(&item_id) {
                Some(current) if !Self::accepts(current, &incoming) => {
                    info!(
                        current_bid_count = current.last_bid_count,
                        "keeping existing high bid; incoming count is not newer",
                    );
                    current.clone()
                }
                _ => {
                    let accepted = Arc::new(incoming);
                    table.insert(item_id, accepted.clone());
                    accepted
                }
            }
        };

        self.note_winning_item(&winner);
        self.submit_completion(winner);
    }

    fn accepts(current: &BidRepresentation, incoming: &BidRepresentation) -> bool {
        incoming.last_bid_count > current.last_bid_count || Self::is_relist(current, incoming)
    }

    /// The narrow exception letting a relisted item restart its bid count:
    /// the retained snapshot must be the auto-sold record of a no-bid item.
    fn is_relist(current: &BidRepresentation, incoming: &BidRepresentation) -> bool {
        current.bidding_state.is_sold()
            && current.last_bid_count == RELIST_SOLD_BID_COUNT
            && incoming.last_bid_count == RELIST_RESTART_BID_COUNT
    }

    /// Advances `current_item_id` when the winning snapshot is for a new
    /// item. Items are assumed to open in increasing id order within an
    /// auction; this is an ordering heuristic, not a causal guarantee.
    fn note_winning_item(&self, winner: &BidRepresentation) {
        let mut current = self
            .current_item_id
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let moves_forward = match *current {
            None => true,
            Some(current_id) => {
                winner.bidding_state == BiddingState::Open && winner.item_id > current_id
            }
        };
        if moves_forward {
            info!(
                auction_id = self.auction_id,
                item_id = winner.item_id,
                "auction moved to a new item",
            );
            *current = Some(winner.item_id);
        }
    }

    /// Answers a long-poll request for the next bid on `item_id`.
    ///
    /// Returns [`NextBidOutcome::Ready`] when the table already holds a
    /// newer snapshot, bidding on the item is over, or the updater is
    /// draining. Otherwise the waiter is parked and a later completion
    /// round resolves it.
    #[instrument(skip(self, waiter), err)]
    pub(crate) fn next_bid(
        &self,
        auction_id: AuctionId,
        item_id: ItemId,
        last_bid_count: u64,
        waiter: NextBidWaiter,
    ) -> Result<NextBidOutcome, RequestError> {
        if auction_id != self.auction_id {
            warn!(
                requested = auction_id,
                actual = self.auction_id,
                "next-bid request was misrouted",
            );
            return Err(RequestError::WrongAuction {
                requested: auction_id,
                actual: self.auction_id,
            });
        }

        let table = self.high_bids.read().unwrap_or_else(PoisonError::into_inner);
        let high_bid = table.get(&item_id);

        if self.is_draining() {
            return Ok(NextBidOutcome::Ready(
                high_bid.map(|bid| BidRepresentation::clone(bid)),
            ));
        }

        if let Some(high_bid) = high_bid {
            if high_bid.last_bid_count > last_bid_count || high_bid.bidding_state.is_sold() {
                return Ok(NextBidOutcome::Ready(Some(BidRepresentation::clone(
                    high_bid,
                ))));
            }
        }

        // Registered while the table's read guard is still held: an
        // acceptance takes the write guard before submitting its completion
        // round, so that round cannot swap the registry ahead of this
        // append.
        debug!("no newer bid known; parking the caller");
        self.waiters.register(waiter);
        Ok(NextBidOutcome::Pending)
    }

    /// Serves the rendered representation of the item currently open for
    /// bidding.
    ///
    /// The cached representation is rebuilt whenever the current item has
    /// changed since the last computation. If the catalog or image store is
    /// unavailable the last cached representation is served instead,
    /// marked [`Freshness::Stale`]; availability is deliberately chosen
    /// over freshness here.
    #[instrument(skip(self), fields(auction_id = self.auction_id))]
    pub(crate) async fn current_item(&self) -> Option<CurrentItem> {
        let current_id = *self
            .current_item_id
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut cached = self.cached_item.lock().await;

        // The cache is only ever populated after an item id is set and the
        // id never reverts to unset, so there is nothing to fall back to
        // here.
        let Some(current_id) = current_id else {
            warn!("no item has opened for bidding yet");
            return None;
        };

        if let Some(item) = cached.as_ref() {
            if item.id == current_id {
                return Some(CurrentItem {
                    item: item.clone(),
                    freshness: Freshness::Fresh,
                });
            }
        }

        match self.render_item(current_id).await {
            Ok(Some(fresh)) => {
                *cached = Some(fresh.clone());
                Some(CurrentItem {
                    item: fresh,
                    freshness: Freshness::Fresh,
                })
            }
            Ok(None) => {
                warn!(
                    item_id = current_id,
                    "current item is missing from the catalog; serving the cached representation",
                );
                cached.clone().map(|item| CurrentItem {
                    item,
                    freshness: Freshness::Stale,
                })
            }
            Err(error) => {
                warn!(
                    item_id = current_id,
                    %error,
                    "failed to refresh the current item; serving the cached representation",
                );
                cached.clone().map(|item| CurrentItem {
                    item,
                    freshness: Freshness::Stale,
                })
            }
        }
    }

    async fn render_item(&self, item_id: ItemId) -> eyre::Result<Option<ItemRepresentation>> {
        let Some(item) = self
            .item_catalog
            .item(item_id)
            .await
            .wrap_err("item lookup failed")?
        else {
            return Ok(None);
        };
        let images = self
            .image_store
            .image_infos(ITEM_ENTITY_TYPE, item_id)
            .await
            .wrap_err("image metadata lookup failed")?;
        Ok(Some(ItemRepresentation::new(&item, &images)))
    }

    /// Hands off ownership of this auction's long polls: flushes every
    /// outstanding waiter with the last known snapshot of its auction and
    /// makes all further next-bid requests take the fast path. Idempotent.
    pub(crate) fn release(&self) {
        if self.releasing.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            auction_id = self.auction_id,
            "releasing; flushing outstanding next-bid waiters",
        );
        self.flush_all_items();
    }

    /// Same flush as [`Self::release`], on process shutdown. Idempotent.
    pub(crate) fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            auction_id = self.auction_id,
            "shutting down; flushing outstanding next-bid waiters",
        );
        self.flush_all_items();
    }

    fn is_draining(&self) -> bool {
        self.releasing.load(Ordering::SeqCst) || self.shutting_down.load(Ordering::SeqCst)
    }

    fn flush_all_items(&self) {
        // Takes the write guard for the same reason acceptance does: a
        // next-bid caller that saw the draining flags unset still holds the
        // table's read guard, so its registration lands before the final
        // rounds below are submitted. With only the read guard here, that
        // caller's waiter could be parked after the last round and hang.
        let snapshots: Vec<_> = self
            .high_bids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for snapshot in snapshots {
            self.submit_completion(snapshot);
        }
    }

    fn submit_completion(&self, snapshot: Arc<BidRepresentation>) {
        let waiters = self.waiters.clone();
        self.tasks.spawn(async move {
            waiters.complete_round(&snapshot);
        });
    }

    #[cfg(test)]
    fn high_bid(&self, item_id: ItemId) -> Option<BidRepresentation> {
        self.high_bids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item_id)
            .map(|bid| BidRepresentation::clone(bid))
    }

    #[cfg(test)]
    pub(crate) fn current_item_id(&self) -> Option<ItemId> {
        *self
            .current_item_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn waiting_waiters(&self) -> usize {
        self.waiters.waiting()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use gavel_core::{
        primitive::BiddingState,
        representation::{
            BidRepresentation,
            ImageInfo,
            Item,
        },
    };
    use tokio::time::timeout;
    use tokio_util::task::TaskTracker;

    use super::{
        waiters::NextBidWaiter,
        BidUpdater,
        Freshness,
        NextBidOutcome,
        RequestError,
    };
    use crate::stores::in_memory::{
        InMemoryImageStore,
        InMemoryItemCatalog,
    };

    const AUCTION: u64 = 1;

    fn bid(item_id: u64, last_bid_count: u64, state: BiddingState) -> BidRepresentation {
        BidRepresentation {
            auction_id: AUCTION,
            item_id,
            last_bid_count,
            amount: 100 * last_bid_count,
            bidding_state: state,
            bidder_id: Some(7),
        }
    }

    struct Fixture {
        updater: BidUpdater,
        catalog: Arc<InMemoryItemCatalog>,
        images: Arc<InMemoryImageStore>,
    }

    fn fixture(seed: Vec<BidRepresentation>) -> Fixture {
        let catalog = Arc::new(InMemoryItemCatalog::new());
        let images = Arc::new(InMemoryImageStore::new());
        let updater = BidUpdater::new(
            AUCTION,
            seed,
            catalog.clone(),
            images.clone(),
            TaskTracker::new(),
        );
        Fixture {
            updater,
            catalog,
            images,
        }
    }

    fn catalog_item(item_id: u64, name: &str) -> Item {
        Item {
            id: item_id,
            auction_id: AUCTION,
            name: name.into(),
            long_description: format!("{name}, described at length"),
        }
    }

    #[tokio::test]
    async fn newer_bid_count_replaces_older() {
        let Fixture {
            updater, ..
        } = fixture(vec![]);
        updater.handle_high_bid(bid(5, 1, BiddingState::Open));
        updater.handle_high_bid(bid(5, 3, BiddingState::Open));
        updater.handle_high_bid(bid(5, 2, BiddingState::Open));
        assert_eq!(updater.high_bid(5).unwrap().last_bid_count, 3);
    }

    #[tokio::test]
    async fn relist_exception_accepts_restarted_count() {
        let Fixture {
            updater, ..
        } = fixture(vec![]);
        updater.handle_high_bid(bid(5, 3, BiddingState::Sold));
        updater.handle_high_bid(bid(5, 1, BiddingState::Open));

        let retained = updater.high_bid(5).unwrap();
        assert_eq!(retained.last_bid_count, 1);
        assert_eq!(retained.bidding_state, BiddingState::Open);
    }

    #[tokio::test]
    async fn relist_exception_requires_exact_counts() {
        let Fixture {
            updater, ..
        } = fixture(vec![]);
        updater.handle_high_bid(bid(5, 3, BiddingState::Sold));
        updater.handle_high_bid(bid(5, 2, BiddingState::Open));

        let retained = updater.high_bid(5).unwrap();
        assert_eq!(retained.last_bid_count, 3);
        assert_eq!(retained.bidding_state, BiddingState::Sold);
    }

    #[tokio::test]
    async fn relist_exception_requires_sold_state() {
        let Fixture {
            updater, ..
        } = fixture(vec![]);
        updater.handle_high_bid(bid(5, 3, BiddingState::Open));
        updater.handle_high_bid(bid(5, 1, BiddingState::Open));
        assert_eq!(updater.high_bid(5).unwrap().last_bid_count, 3);
    }

    #[tokio::test]
    async fn misrouted_high_bid_is_dropped() {
        let Fixture {
            updater, ..
        } = fixture(vec![]);
        let mut misrouted = bid(5, 1, BiddingState::Open);
        misrouted.auction_id = 99;
        updater.handle_high_bid(misrouted);
        assert!(updater.high_bid(5).is_none());
    }

    #[tokio::test]
    async fn current_item_advances_only_to_higher_open_items() {
        let Fixture {
            updater, ..
        } = fixture(vec![]);
        updater.handle_high_bid(bid(5, 1, BiddingState::Open));
        assert_eq!(updater.current_item_id(), Some(5));

        updater.handle_high_bid(bid(7, 1, BiddingState::Open));
        assert_eq!(updater.current_item_id(), Some(7));

        // lower-id item opening late must not move the tracker back
        updater.handle_high_bid(bid(6, 1, BiddingState::Open));
        assert_eq!(updater.current_item_id(), Some(7));

        updater.handle_high_bid(bid(8, 3, BiddingState::Sold));
        assert_eq!(updater.current_item_id(), Some(7));
    }

    #[tokio::test]
    async fn seeding_sets_baseline_and_current_item() {
        let Fixture {
            updater, ..
        } = fixture(vec![
            bid(9, 3, BiddingState::Sold),
            bid(10, 2, BiddingState::Open),
        ]);
        assert_eq!(updater.current_item_id(), Some(10));
        assert_eq!(updater.high_bid(9).unwrap().last_bid_count, 3);
        assert_eq!(updater.high_bid(10).unwrap().last_bid_count, 2);
    }

    #[tokio::test]
    async fn next_bid_returns_immediately_when_a_newer_bid_is_known() {
        let Fixture {
            updater, ..
        } = fixture(vec![bid(10, 2, BiddingState::Open)]);
        let (waiter, _rx) = NextBidWaiter::channel();
        let outcome = updater.next_bid(AUCTION, 10, 1, waiter).unwrap();
        match outcome {
            NextBidOutcome::Ready(Some(snapshot)) => {
                assert_eq!(snapshot.last_bid_count, 2);
            }
            other => panic!("expected an immediate snapshot, got {other:?}"),
        }
        assert_eq!(updater.waiting_waiters(), 0);
    }

    #[tokio::test]
    async fn next_bid_returns_immediately_when_the_item_is_sold() {
        let Fixture {
            updater, ..
        } = fixture(vec![bid(10, 3, BiddingState::Sold)]);
        let (waiter, _rx) = NextBidWaiter::channel();
        let outcome = updater.next_bid(AUCTION, 10, 3, waiter).unwrap();
        assert!(matches!(outcome, NextBidOutcome::Ready(Some(_))));
    }

    #[tokio::test]
    async fn next_bid_rejects_misrouted_requests() {
        let Fixture {
            updater, ..
        } = fixture(vec![]);
        let (waiter, _rx) = NextBidWaiter::channel();
        assert_eq!(
            updater.next_bid(99, 10, 0, waiter),
            Err(RequestError::WrongAuction {
                requested: 99,
                actual: AUCTION,
            }),
        );
    }

    #[tokio::test]
    async fn parked_waiter_is_resolved_by_the_next_accepted_bid() {
        let Fixture {
            updater, ..
        } = fixture(vec![bid(10, 2, BiddingState::Open)]);

        let (waiter, rx) = NextBidWaiter::channel();
        let outcome = updater.next_bid(AUCTION, 10, 2, waiter).unwrap();
        assert_eq!(outcome, NextBidOutcome::Pending);
        assert_eq!(updater.waiting_waiters(), 1);

        updater.handle_high_bid(bid(10, 3, BiddingState::Open));

        let payload = timeout(Duration::from_secs(1), rx)
            .await
            .expect("waiter must be resolved promptly")
            .expect("waiter must receive a payload");
        let delivered: BidRepresentation = serde_json::from_slice(&payload).unwrap();
        assert_eq!(delivered.last_bid_count, 3);
        assert_eq!(updater.current_item_id(), Some(10));
    }

    #[tokio::test]
    async fn stale_duplicate_still_answers_waiters_with_the_retained_bid() {
        let Fixture {
            updater, ..
        } = fixture(vec![bid(10, 5, BiddingState::Open)]);

        // A waiter polling with an old count slips in while the table is
        // already at 5; the duplicate delivery of count 4 must still wake
        // it with the retained count-5 snapshot.
        let (waiter, rx) = NextBidWaiter::channel();
        updater.waiters.register(waiter);

        updater.handle_high_bid(bid(10, 4, BiddingState::Open));

        let payload = timeout(Duration::from_secs(1), rx)
            .await
            .expect("waiter must be resolved promptly")
            .expect("waiter must receive a payload");
        let delivered: BidRepresentation = serde_json::from_slice(&payload).unwrap();
        assert_eq!(delivered.last_bid_count, 5);
    }

    #[tokio::test]
    async fn concurrent_registrations_are_never_lost() {
        const WAITERS: usize = 32;

        let fixture = Arc::new(fixture(vec![bid(10, 2, BiddingState::Open)]));

        let mut receivers = Vec::new();
        let mut registrations = Vec::new();
        for _ in 0..WAITERS {
            let (waiter, rx) = NextBidWaiter::channel();
            receivers.push(rx);
            let fixture = fixture.clone();
            registrations.push(tokio::spawn(async move {
                fixture.updater.next_bid(AUCTION, 10, 2, waiter).unwrap()
            }));
        }

        // Fires while registrations are still in flight; stragglers are
        // picked up by the second round below.
        fixture.updater.handle_high_bid(bid(10, 3, BiddingState::Open));

        for registration in registrations {
            let outcome = registration.await.unwrap();
            assert!(matches!(
                outcome,
                NextBidOutcome::Pending | NextBidOutcome::Ready(Some(_))
            ));
        }

        fixture.updater.handle_high_bid(bid(10, 4, BiddingState::Open));

        for rx in receivers {
            match timeout(Duration::from_secs(1), rx).await {
                Ok(Ok(payload)) => {
                    let delivered: BidRepresentation = serde_json::from_slice(&payload).unwrap();
                    assert!(delivered.last_bid_count >= 3);
                }
                // A registration that raced the first acceptance got its
                // snapshot synchronously and dropped the waiter.
                Ok(Err(_)) => {}
                Err(_) => panic!("a registered waiter was never resolved"),
            }
        }
    }

    #[tokio::test]
    async fn release_flushes_waiters_and_forces_the_fast_path() {
        let Fixture {
            updater, ..
        } = fixture(vec![bid(10, 2, BiddingState::Open)]);

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (waiter, rx) = NextBidWaiter::channel();
            assert_eq!(
                updater.next_bid(AUCTION, 10, 2, waiter).unwrap(),
                NextBidOutcome::Pending,
            );
            receivers.push(rx);
        }

        updater.release();
        updater.release();

        for rx in receivers {
            let payload = timeout(Duration::from_secs(1), rx)
                .await
                .expect("released waiter must be resolved promptly")
                .expect("released waiter must receive a payload");
            let delivered: BidRepresentation = serde_json::from_slice(&payload).unwrap();
            assert_eq!(delivered.last_bid_count, 2);
        }

        // Draining: same count as the table, still answered immediately.
        let (waiter, _rx) = NextBidWaiter::channel();
        let outcome = updater.next_bid(AUCTION, 10, 2, waiter).unwrap();
        assert!(matches!(outcome, NextBidOutcome::Ready(Some(_))));
        assert_eq!(updater.waiting_waiters(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn waiter_registered_during_a_release_flush_is_still_resolved() {
        let fixture = Arc::new(fixture(vec![bid(10, 2, BiddingState::Open)]));

        // Replays a next-bid caller caught mid-flight by a release: it has
        // observed the draining flags unset and still holds the table's
        // read guard, but has not registered yet.
        let table = fixture.updater.high_bids.read().unwrap();
        assert!(!fixture.updater.is_draining());

        let release = tokio::spawn({
            let fixture = fixture.clone();
            async move { fixture.updater.release() }
        });

        // The flush must block on the table's write guard until the caller
        // is done, so its final rounds cannot run before the registration.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!release.is_finished());

        let (waiter, rx) = NextBidWaiter::channel();
        fixture.updater.waiters.register(waiter);
        drop(table);

        release.await.unwrap();
        let payload = timeout(Duration::from_secs(1), rx)
            .await
            .expect("the flush must resolve the late-registered waiter")
            .expect("resolved waiter must receive a payload");
        let delivered: BidRepresentation = serde_json::from_slice(&payload).unwrap();
        assert_eq!(delivered.last_bid_count, 2);
    }

    #[tokio::test]
    async fn draining_poll_for_an_unknown_item_returns_no_snapshot() {
        let Fixture {
            updater, ..
        } = fixture(vec![]);
        updater.shutdown();

        let (waiter, _rx) = NextBidWaiter::channel();
        let outcome = updater.next_bid(AUCTION, 77, 0, waiter).unwrap();
        assert_eq!(outcome, NextBidOutcome::Ready(None));
        assert_eq!(updater.waiting_waiters(), 0);
    }

    #[tokio::test]
    async fn current_item_is_rendered_from_catalog_and_image_store() {
        let Fixture {
            updater,
            catalog,
            images,
        } = fixture(vec![bid(10, 2, BiddingState::Open)]);
        catalog.put(catalog_item(10, "walnut side table"));
        images.put(ImageInfo {
            id: "img-10-front".into(),
            entity_type: "Item".into(),
            entity_id: 10,
        });

        let current = updater.current_item().await.unwrap();
        assert_eq!(current.freshness, Freshness::Fresh);
        assert_eq!(current.item.id, 10);
        assert_eq!(current.item.image_ids, vec!["img-10-front"]);
    }

    #[tokio::test]
    async fn current_item_degrades_to_the_cached_representation() {
        let Fixture {
            updater,
            catalog,
            ..
        } = fixture(vec![bid(10, 2, BiddingState::Open)]);
        catalog.put(catalog_item(10, "walnut side table"));
        catalog.put(catalog_item(11, "brass desk lamp"));

        let first = updater.current_item().await.unwrap();
        assert_eq!(first.freshness, Freshness::Fresh);
        assert_eq!(first.item.id, 10);

        // The auction moves on while the catalog is unreachable.
        updater.handle_high_bid(bid(11, 1, BiddingState::Open));
        catalog.set_offline(true);

        let degraded = updater.current_item().await.unwrap();
        assert_eq!(degraded.freshness, Freshness::Stale);
        assert_eq!(degraded.item.id, 10);

        catalog.set_offline(false);
        let recovered = updater.current_item().await.unwrap();
        assert_eq!(recovered.freshness, Freshness::Fresh);
        assert_eq!(recovered.item.id, 11);
    }

    #[tokio::test]
    async fn current_item_is_none_before_any_bid_or_seed() {
        let Fixture {
            updater, ..
        } = fixture(vec![]);
        assert!(updater.current_item().await.is_none());
    }
}
