//! Gavel's bid updater fans real-time bid updates out to the bidders
//! watching an auction.
//!
//! The service consumes a feed of high-bid snapshots and maintains, per
//! active auction, the latest accepted bid for every item plus the item
//! currently open for bidding. Bidders follow along with long polls: a
//! next-bid request carrying the count of the last bid the caller has seen
//! is answered immediately if a newer bid is already known, and parked
//! otherwise. Accepted bids resolve parked callers out-of-band, so the
//! feed-consuming path never waits on slow clients.
//!
//! # Usage
//!
//! [`BidUpdaterService::spawn`] starts the service over a bid feed and the
//! platform's data-access collaborators and returns a cheaply clonable
//! [`Handle`] for serving requests:
//!
//! ```no_run
//! # async fn docs() {
//! use std::sync::Arc;
//!
//! use gavel_bid_updater::{
//!     stores::{
//!         in_memory,
//!         Stores,
//!     },
//!     BidUpdaterService,
//!     Config,
//! };
//!
//! let cfg = Config::from_environment().expect("configuration must be set");
//! let (feed_tx, feed_rx) = tokio::sync::mpsc::channel(256);
//! let stores = Stores {
//!     bid_archive: Arc::new(in_memory::InMemoryBidArchive::new()),
//!     item_catalog: Arc::new(in_memory::InMemoryItemCatalog::new()),
//!     image_store: Arc::new(in_memory::InMemoryImageStore::new()),
//! };
//! let (mut service, handle) = BidUpdaterService::spawn(&cfg, feed_rx, stores);
//! # let _ = (feed_tx, handle);
//! service.shutdown().await.expect("service must shut down cleanly");
//! # }
//! ```

use std::{
    future::Future,
    sync::Arc,
    task::Poll,
    time::Duration,
};

pub mod config;
mod engine;
mod inner;
pub mod stores;
mod updater;

use bytes::Bytes;
pub use config::Config;
use eyre::WrapErr as _;
use gavel_core::{
    primitive::{
        AuctionId,
        ItemId,
    },
    representation::BidRepresentation,
};
use tokio::{
    sync::{
        mpsc,
        oneshot,
    },
    task::{
        JoinError,
        JoinHandle,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
pub use updater::{
    CurrentItem,
    Freshness,
    RequestError,
};

use crate::{
    engine::Engine,
    stores::Stores,
    updater::{
        waiters::NextBidWaiter,
        NextBidOutcome,
    },
};

/// The bid updater service returned by [`BidUpdaterService::spawn`].
pub struct BidUpdaterService {
    shutdown_token: CancellationToken,
    task: Option<JoinHandle<eyre::Result<()>>>,
}

impl BidUpdaterService {
    /// Spawns the service over `feed` and returns it together with the
    /// [`Handle`] used to serve bidder requests.
    #[must_use]
    pub fn spawn(
        cfg: &Config,
        feed: mpsc::Receiver<BidRepresentation>,
        stores: Stores,
    ) -> (Self, Handle) {
        let engine = Arc::new(Engine::new(
            stores,
            Duration::from_millis(cfg.shutdown_grace_period_ms),
        ));
        let shutdown_token = CancellationToken::new();
        let inner = inner::Inner::new(engine.clone(), feed, shutdown_token.child_token());
        let task = tokio::spawn(inner.run());

        (
            Self {
                shutdown_token,
                task: Some(task),
            },
            Handle {
                engine,
            },
        )
    }

    /// Shuts down the service: flushes every parked waiter and waits for
    /// in-flight completion rounds up to the configured grace period.
    ///
    /// # Errors
    /// Returns an error if the run loop exited with an error.
    ///
    /// # Panics
    /// Panics if called twice.
    #[instrument(skip_all, err)]
    pub async fn shutdown(&mut self) -> eyre::Result<()> {
        self.shutdown_token.cancel();
        flatten_join_result(
            self.task
                .take()
                .expect("shutdown must not be called twice")
                .await,
        )
    }
}

impl Future for BidUpdaterService {
    type Output = eyre::Result<()>;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Self::Output> {
        use futures::future::FutureExt as _;

        let task = self
            .task
            .as_mut()
            .expect("bid updater service must not be polled after shutdown");
        task.poll_unpin(cx).map(flatten_join_result)
    }
}

/// The answer to a next-bid request.
#[derive(Debug)]
pub enum NextBid {
    /// A snapshot (or, while the auction's updater is draining, possibly
    /// none) is available right away.
    Ready(Option<BidRepresentation>),
    /// No bid newer than the caller's is known yet. The receiver yields
    /// the serialized snapshot of the bid that ends the wait; it is closed
    /// without a value only if the service is torn down mid-wait.
    Wait(oneshot::Receiver<Bytes>),
}

/// A cheaply clonable handle serving bidder requests against the running
/// service.
#[derive(Clone)]
pub struct Handle {
    engine: Arc<Engine>,
}

impl Handle {
    /// Requests the next bid on `item_id` after the one numbered
    /// `last_bid_count`.
    ///
    /// # Errors
    /// Returns an error if `auction_id` does not name an active auction.
    pub fn next_bid(
        &self,
        auction_id: AuctionId,
        item_id: ItemId,
        last_bid_count: u64,
    ) -> Result<NextBid, RequestError> {
        let (waiter, rx) = NextBidWaiter::channel();
        match self
            .engine
            .next_bid(auction_id, item_id, last_bid_count, waiter)?
        {
            NextBidOutcome::Ready(snapshot) => Ok(NextBid::Ready(snapshot)),
            NextBidOutcome::Pending => Ok(NextBid::Wait(rx)),
        }
    }

    /// Serves the representation of the item currently open for bidding in
    /// `auction_id`, or `None` if no item has opened yet.
    ///
    /// # Errors
    /// Returns an error if `auction_id` does not name an active auction.
    pub async fn current_item(
        &self,
        auction_id: AuctionId,
    ) -> Result<Option<CurrentItem>, RequestError> {
        self.engine.current_item(auction_id).await
    }

    /// Hands off ownership of `auction_id`'s long polls: resolves every
    /// parked waiter and makes all further next-bid requests return
    /// immediately.
    ///
    /// # Errors
    /// Returns an error if `auction_id` does not name an active auction.
    pub fn release_auction(&self, auction_id: AuctionId) -> Result<(), RequestError> {
        self.engine.release_auction(auction_id)
    }
}

fn flatten_join_result<T>(res: Result<eyre::Result<T>, JoinError>) -> eyre::Result<T> {
    match res {
        Ok(Ok(val)) => Ok(val),
        Ok(Err(err)) => Err(err).wrap_err("task returned with error"),
        Err(err) => Err(err).wrap_err("task panicked"),
    }
}
