//! Query OAuth usage windows for accounts held by a proxy management API.
//!
//! Auth entries are listed from `/v0/management/auth-files`, filtered by
//! provider and index, and each entry's usage is fetched by relaying
//! `GET https://api.anthropic.com/api/oauth/usage` through
//! `/v0/management/api-call`.

pub mod app;
pub mod config;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod models;
pub mod render;
pub mod transport;
pub mod usage;

pub use app::run;
pub use config::{CliOverrides, Config, FileConfig};
pub use error::{TransportError, UsageError};
pub use transport::{ReqwestTransport, Transport};
