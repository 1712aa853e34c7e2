use thiserror::Error;

/// Errors surfaced by the lookup core's public entry points.
///
/// The core never propagates per-query failures (timeouts, protocol
/// errors) as errors — those are ordinary control flow handled by
/// [`crate::session::LookupSession`]'s callbacks and only ever observed
/// indirectly through its counters. This enum covers caller-protocol
/// violations and setup failures only.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup session was already started")]
    AlreadyStarted,
    #[error("lookup manager has no bootstrap candidates for this target")]
    NoBootstrapNodes,
}
