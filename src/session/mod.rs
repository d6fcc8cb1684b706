//! Observable recovery sessions.
//!
//! Every workflow run gets a session tracking its status, stage, and
//! progress. Sessions are queryable by id or by artifact, mutations are
//! broadcast to subscribers, and terminal sessions are swept out after a
//! retention period.

mod manager;
mod types;

pub use manager::RecoveryStateManager;
pub use types::{RecoverySession, SessionEvent, SessionStatus, SessionUpdate};
