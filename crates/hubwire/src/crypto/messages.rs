//! Canonical signed-message strings.
//!
//! Both sides rebuild these locally from the request id (and, for signup,
//! the claimed key). A transmitted copy of the message is never trusted.

use uuid::Uuid;

/// Message a validator signs to prove ownership of `public_key`
pub fn signup_message(request_id: &Uuid, public_key: &str) -> String {
    format!("Signed message for {request_id}, {public_key}")
}

/// Message a validator signs when answering the check `request_id`
pub fn validate_reply_message(request_id: &Uuid) -> String {
    format!("Replying to {request_id}")
}
