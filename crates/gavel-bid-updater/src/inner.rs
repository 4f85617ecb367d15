//! The service's long running loop: consumes the bid feed and routes each
//! update into the engine until shut down.

use std::sync::Arc;

use eyre::eyre;
use gavel_core::representation::BidRepresentation;
use tokio::{
    select,
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    error,
    info,
    warn,
};

use crate::engine::Engine;

pub(super) struct Inner {
    engine: Arc<Engine>,
    feed: mpsc::Receiver<BidRepresentation>,
    shutdown_token: CancellationToken,
}

impl Inner {
    pub(super) fn new(
        engine: Arc<Engine>,
        feed: mpsc::Receiver<BidRepresentation>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            engine,
            feed,
            shutdown_token,
        }
    }

    pub(super) async fn run(mut self) -> eyre::Result<()> {
        let reason: eyre::Result<&str> = {
            // This is a long running loop. Dispatch errors are logged and
            // the offending update dropped; only a closed feed or a
            // shutdown signal exits it.
            loop {
                select! {
                    biased;

                    () = self.shutdown_token.clone().cancelled_owned() => {
                        break Ok("received shutdown signal");
                    },

                    bid = self.feed.recv() => match bid {
                        Some(bid) => self.handle_high_bid(bid).await,
                        None => break Err(eyre!("bid feed channel was closed by the sender")),
                    },
                }
            }
        };

        self.engine.shutdown().await;

        match reason {
            Ok(reason) => {
                info!(reason, "shutting down");
                Ok(())
            }
            Err(error) => {
                error!(%error, "shutting down");
                Err(error)
            }
        }
    }

    async fn handle_high_bid(&self, bid: BidRepresentation) {
        if let Err(error) = self.engine.dispatch(bid).await {
            warn!(%error, "failed to dispatch a bid update; dropping it");
        }
    }
}
