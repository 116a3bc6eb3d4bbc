mod subscriber;

pub use subscriber::{init, init_with_level};

/// Target for security-relevant events (rejected signatures, unknown
/// correlation ids, evicted work). Events logged with this target go to the
/// audit stream only.
///
/// ```rust,ignore
/// tracing::warn!(target: logger::AUDIT_TARGET, peer = %key, "Signup signature rejected");
/// ```
pub const AUDIT_TARGET: &str = "uppe::audit";
