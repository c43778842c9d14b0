//! Per-user conversation state and the transition table.

use crate::pairing::SessionHandle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    #[default]
    Idle,
    WaitingForPermission,
    WaitingForPairing,
    Connected,
}

/// Conversation record for one sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// Sender digits; the store key.
    pub phone_number: String,
    pub state: UserState,
    pub pairing_code: Option<String>,
    /// Device session issued when this sender paired. Kept for reference only;
    /// group lookups go through the connector's shared device.
    pub handle: Option<SessionHandle>,
}

impl UserSession {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            state: UserState::Idle,
            pairing_code: None,
            handle: None,
        }
    }
}

/// What to do in response to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AskPermission,
    StartPairing,
    Decline,
    RemindPairing,
    ReportGroups,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub next: UserState,
}

const AFFIRMATIVE: &[&str] = &["yes", "כן"];
const DONE: &[&str] = &["done", "סיימתי"];

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

pub fn is_affirmative(text: &str) -> bool {
    AFFIRMATIVE.contains(&normalize(text).as_str())
}

pub fn is_done(text: &str) -> bool {
    DONE.contains(&normalize(text).as_str())
}

/// Transition table. Every step sends exactly one reply.
pub fn step(state: UserState, text: &str) -> Step {
    use Action::*;
    use UserState::*;

    let (action, next) = match state {
        Idle => (AskPermission, WaitingForPermission),
        WaitingForPermission if is_affirmative(text) => (StartPairing, WaitingForPairing),
        WaitingForPermission => (Decline, Idle),
        WaitingForPairing if is_done(text) => (ReportGroups, Connected),
        WaitingForPairing => (RemindPairing, WaitingForPairing),
        Connected => (ReportGroups, Connected),
    };
    Step { action, next }
}
