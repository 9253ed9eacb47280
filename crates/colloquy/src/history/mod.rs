//! Observer fan-out for the conversation transcript.
//!
//! The [`HistoryHub`] is the only path by which messages reach observers.
//! The driver publishes every appended message; observers hold a
//! [`Subscription`] and choose at subscribe time whether to replay what was
//! already published.

pub mod hub;

pub use hub::{DEFAULT_BUFFER_CAPACITY, HistoryHub, HubConfig, SubscriberId, Subscription};
