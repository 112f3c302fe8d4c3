//! Read-side projections for the marketplace engine.
//!
//! This module shapes canonical [`Order`](market_types::Order) aggregates
//! for consumers: role-scoped visibility filtering, the flat legacy order
//! shape older clients still consume, and the card shape UI lists render.
//! Everything here is a pure function over snapshots; no I/O, no writes.

pub mod card;
pub mod legacy;
pub mod visibility;

pub use card::{to_order_card, OrderCard};
pub use legacy::{to_order_model, LegacyOrderStatus, OrderModel};
pub use visibility::filter_for_user;
