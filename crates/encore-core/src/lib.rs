//! Client-side coordination core for encore: optimistic subscription
//! toggling against a remote authority, a process-wide refresh signal bus,
//! and reactive settings-driven projections.
//!
//! The settings store, remote transport, persistence, and UI all live
//! outside this crate and are reached through the seams in [`remote`] and
//! [`settings`].

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod projection;
pub mod remote;
pub mod settings;
pub mod signal;
pub mod types;

pub use cache::SubscriptionCache;
pub use coordinator::{Ack, RetryPolicy, ToggleCoordinator, ToggleStart};
pub use error::{EncoreError, Result};
pub use projection::Projection;
pub use remote::{RemoteAuthority, RemoteError};
pub use settings::Flags;
pub use signal::{RefreshBus, RefreshListener};
pub use types::{EntityId, Song, SongPage};
