//! faces-player library interface
//!
//! Plays a "guess the person in the photo" quiz from a persistent memory of
//! faces. Photos arrive out of band from the driver's network layer, are
//! hashed into a stable identity and joined with the question being shown
//! through its sequence index. The hash -> name table survives across runs
//! and only ever learns a name once.

pub mod driver;
pub mod error;
pub mod identifier;
pub mod observer;
pub mod player;
pub mod replay;
pub mod resolver;
pub mod session;
pub mod store;
pub mod types;

pub use crate::error::{Error, Result};
pub use crate::player::{PlayReport, Player};
pub use crate::types::{HashTable, ImageHash, ImageObserved, NameEntry, Round, RoundOutcome};
