//! The waiter registry: suspended long-poll callers and the swap-and-drain
//! protocol that resolves them.

use std::{
    mem,
    sync::{
        PoisonError,
        RwLock,
    },
};

use bytes::Bytes;
use crossbeam::queue::SegQueue;
use gavel_core::{
    primitive::AuctionId,
    representation::BidRepresentation,
};
use tokio::sync::oneshot;
use tracing::{
    debug,
    error,
    info,
};

/// A single-use capability representing one suspended next-bid caller.
///
/// The transport layer creates a waiter via [`NextBidWaiter::channel`],
/// keeps the receiving half, and hands the waiter to the bid updater. The
/// updater resolves it at most once with the serialized snapshot of the bid
/// that woke it; resolution consumes the waiter.
pub struct NextBidWaiter {
    reply: oneshot::Sender<Bytes>,
}

impl NextBidWaiter {
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<Bytes>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                reply,
            },
            rx,
        )
    }

    /// Reports whether the owning caller has gone away, for example because
    /// the underlying connection was closed while the waiter was parked.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    fn resolve(self, payload: Bytes) -> Result<(), Bytes> {
        self.reply.send(payload)
    }
}

/// All waiters parked on one auction.
///
/// The queue accepts concurrent appends; the lock around it guards only the
/// *reference*: registration takes the read half (many callers may append
/// at once), while a completion round takes the write half just long enough
/// to swap in a fresh empty queue. A waiter being registered concurrently
/// with a swap lands in exactly one of the two queues.
pub(crate) struct WaiterRegistry {
    auction_id: AuctionId,
    queue: RwLock<SegQueue<NextBidWaiter>>,
}

impl WaiterRegistry {
    pub(crate) fn new(auction_id: AuctionId) -> Self {
        Self {
            auction_id,
            queue: RwLock::new(SegQueue::new()),
        }
    }

    pub(crate) fn register(&self, waiter: NextBidWaiter) {
        self.queue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .push(waiter);
    }

    fn swap(&self) -> SegQueue<NextBidWaiter> {
        let mut queue = self.queue.write().unwrap_or_else(PoisonError::into_inner);
        mem::take(&mut *queue)
    }

    /// Runs one completion round: detaches the current queue and resolves
    /// every waiter in it with the serialized `snapshot`.
    ///
    /// Waiters whose callers are gone are skipped. A round that finds the
    /// registry empty is a no-op.
    pub(crate) fn complete_round(&self, snapshot: &BidRepresentation) {
        if self
            .queue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
        {
            debug!(
                auction_id = self.auction_id,
                "no waiters registered; completion round is a no-op",
            );
            return;
        }

        let drained = self.swap();
        let payload = match serde_json::to_vec(snapshot) {
            Ok(serialized) => Bytes::from(serialized),
            Err(error) => {
                error!(
                    auction_id = self.auction_id,
                    %error,
                    "failed to serialize bid snapshot; resolving waiters with an empty payload",
                );
                Bytes::new()
            }
        };

        let mut resolved = 0_usize;
        let mut abandoned = 0_usize;
        while let Some(waiter) = drained.pop() {
            if waiter.is_abandoned() {
                debug!(
                    auction_id = self.auction_id,
                    "skipping a waiter whose caller has gone away",
                );
                abandoned = abandoned.saturating_add(1);
                continue;
            }
            match waiter.resolve(payload.clone()) {
                Ok(()) => resolved = resolved.saturating_add(1),
                Err(_) => abandoned = abandoned.saturating_add(1),
            }
        }
        info!(
            auction_id = self.auction_id,
            item_id = snapshot.item_id,
            last_bid_count = snapshot.last_bid_count,
            resolved,
            abandoned,
            "completion round finished",
        );
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        self.queue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
