//! Shared domain model of the gavel live-auction platform.
//!
//! The types here are the lingua franca between the bid updater core and
//! its collaborators: the bid feed delivers
//! [`BidRepresentation`](representation::BidRepresentation)s, the item
//! catalog serves [`Item`](representation::Item)s, and the transport layer
//! hands rendered
//! [`ItemRepresentation`](representation::ItemRepresentation)s and
//! serialized bid snapshots to clients.
//!
//! Wire naming is camelCase to stay compatible with the JSON payloads the
//! platform has always emitted.

pub mod primitive;
pub mod representation;
