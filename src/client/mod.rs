//! Embeddable consumer-side state machine for one open conversation.
//!
//! The delivery layer (WebSocket or polling) produces `DeliveryEvent`s; the
//! controller owns the ordered visible list, optimistic sends, and the
//! composing/teardown bookkeeping, independent of any UI toolkit.

pub mod controller;

pub use controller::{ChatController, CloseOutcome, DeliveryEvent, PendingSend, ViewEffect};
