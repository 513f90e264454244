//! # Event Bus Module
//!
//! Publish/subscribe dispatcher connecting the communicators, the device,
//! the updater, the procedure controller and the script sequencer.
//!
//! - Publishers emit typed events without knowing subscribers
//! - Subscribers register by event kind or by property name
//! - Async consumers can poll a broadcast receiver instead
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sonicamp_core::event_bus::{EventBus, EventKind, SonicEvent};
//!
//! let bus = EventBus::new();
//! let subscription = bus.subscribe(EventKind::Disconnected, |event| {
//!     println!("{}", event.description());
//! });
//! bus.unsubscribe(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
