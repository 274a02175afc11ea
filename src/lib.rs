// Agent registry indexer.
// Cached, scope-aware access to Blockfrost for a Cardano agent registry dashboard.

pub mod app;
pub mod blockfrost;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod network;
pub mod registry;

pub use app::App;
pub use cache::{ResponseCache, Upstream};
pub use config::Config;
pub use error::{IndexerError, Result};
pub use network::{Network, NetworkConfig};
