//! Shared building blocks for the WebSocket client workspace.
//!
//! Kept dependency-light so every crate in the workspace can use it:
//!
//! - [`ErrorLocation`]: the caller location attached to every error variant
//! - [`HttpStatusCode`]: status classification for rejected upgrades

pub mod error;
pub mod http_status;

pub use error::error_location::ErrorLocation;
pub use http_status::HttpStatusCode;

#[cfg(test)]
mod tests;
