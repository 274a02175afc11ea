// Blockfrost API module.
// Provides the HTTP client, retry policy, typed endpoints and response types.

pub mod client;
pub mod endpoints;
pub mod retry;
pub mod types;

pub use client::BlockfrostClient;
pub use endpoints::PAGE_SIZE;
pub use retry::RetryPolicy;
pub use types::*;
