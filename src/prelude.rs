//! Pyre public prelude (curated stable-intent exports).
//! Import with: `use pyre::prelude::*;`
//!
//! Items here are considered *stable-intent* prior to 1.0.0. Their shape may
//! still adjust minimally until the first tagged release, but we aim to avoid
//! breaking renames or removals. Exclusions are deliberate.

pub use crate::config::{Config, ListenerSpec};
pub use crate::connections::{ConnectionManager, TrackedConnection};
pub use crate::error::{Error, Result};
pub use crate::hub::{ServiceBridge, WsHub};
pub use crate::listeners::{AbstractFactory, Listener, ListenerManager};
pub use crate::protocol::ProtocolKind;
pub use crate::registry::ConnectionRegistry;
pub use crate::service::ListenerService;
