//! Wire-level message types for the Live API.
//!
//! Every frame on the wire is a JSON object with a single top-level key that
//! names the message kind. [`client_messages`] covers the client→service
//! direction, [`server_messages`] the service→client direction, and
//! [`models`] the payload types shared by both.

pub mod client_messages;
pub mod models;
pub mod server_messages;
