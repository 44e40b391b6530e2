//! Client notification for readiness events.
//!
//! A user-space client can ask to be told about events instead of reading
//! the device. It does so with a configuration call carrying its process id,
//! which is stored in a [`ClientRegistration`]. On every firing the event
//! source hands that id to a [`ClientNotifier`].
//!
//! ```text
//! ┌────────────┐ REGISTER_CLIENT(pid) ┌────────────────────┐
//! │   client   │ ───────────────────> │ ClientRegistration │
//! └────────────┘                      └─────────┬──────────┘
//!       ▲                                       │ get()
//!       │ signal                                ▼
//! ┌─────┴────────┐  notify(pid)        ┌────────────────┐
//! │ host transport│ <───────────────── │  event source  │
//! └──────────────┘                     └────────────────┘
//! ```
//!
//! The transport itself belongs to the host. [`SignalFlags`] is a simple
//! transport that records deliveries as per-client pending counts.

mod notifier;
mod registration;

pub use notifier::{ClientNotifier, NullNotifier, SignalFlags};
pub use registration::{ClientId, ClientRegistration};
