pub mod api;
pub mod events;
pub mod models;

/// Display name used for connections that never sent `set username`.
pub const ANONYMOUS: &str = "Anonymous";
