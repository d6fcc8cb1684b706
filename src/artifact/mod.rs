//! Core value types for recovery requests.
//!
//! A [`RecoveryRequest`] captures one artifact-execution failure: the failing
//! source, the error that triggered recovery, and the surrounding message text
//! that may contain [`AuxiliaryBlock`]s able to supply the missing dependency.
//! Requests are immutable once created; the [`RecoveryRequest::fingerprint`]
//! keys the resolution memo.

mod block;
mod request;

pub use block::{AuxiliaryBlock, BlockKind};
pub use request::{ArtifactLanguage, RecoveryRequest};
