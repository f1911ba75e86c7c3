//! Non-blocking buffers used between pipeline stages
//!
//! - `bounded`: drop-oldest FIFO (priority lanes, subscriber buffers)
//! - `broadcast`: fan-out stream with a single-slot replay cache

pub mod bounded;
pub mod broadcast;
mod bounded_proptest;

pub use bounded::{DropOldestQueue, PushOutcome};
pub use broadcast::{
    BroadcastStream, Delivery, PublishReport, ReplayCache, Resubscribed, SubscriberId,
    Subscription,
};
