pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod projector;
pub mod roster;
pub mod window;
pub mod writer;

// Re-export the entry points used by the binary
pub use config::ExportConfig;
pub use error::{ExportError, Result};
pub use fetcher::{BalanceApi, StripeClient};
pub use pipeline::{run_export, RunSummary};
