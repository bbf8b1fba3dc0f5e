//! Vitrine Live: keeping hydrated views current.
//!
//! # Key Abstractions
//!
//! - [`LiveQueryStore`]: per-page-view owner of live subscriptions
//! - [`LiveQuery`]: one subscription, seeded with the server-rendered value
//! - [`VisualEditingBridge`]: one-shot bootstrap for editing overlays

pub mod bridge;
pub mod store;

pub use bridge::{BridgeState, OverlayActivator, VisualEditingBridge};
pub use store::{LiveConfig, LiveQuery, LiveQueryStore, LiveState, LiveStatus};
