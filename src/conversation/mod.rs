//! Per-user conversation flow
//!
//! Each sender moves through a small state machine:
//!
//! ```text
//! IDLE --any--> WAITING_FOR_PERMISSION --yes/כן--> WAITING_FOR_PAIRING --done/סיימתי--> CONNECTED
//!                        |                                 |                              |
//!                        +--other--> IDLE                  +--other--> (reminder)         +--any--> (group count)
//! ```
//!
//! Sessions live in a [`SessionStore`] keyed by sender digits and are only
//! updated once the reply for the transition has been delivered.

mod engine;
pub mod replies;
mod state;
mod store;

pub use engine::ConversationEngine;
pub use state::{Action, Step, UserSession, UserState, is_affirmative, is_done, step};
pub use store::{InMemorySessionStore, SessionStore};
