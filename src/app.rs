use crate::config::{Config, MANAGEMENT_KEY_ENV};
use crate::discovery::discover;
use crate::error::UsageError;
use crate::filter::{parse_auth_indices, select_entries};
use crate::render::{write_json, write_summary};
use crate::transport::Transport;
use crate::usage::fetch_all;
use chrono::Utc;
use std::io::Write;
use tracing::info;

/// Discover, filter, fetch, print. Output is written only once every entry
/// has been fetched successfully.
pub async fn run<W: Write>(
    config: &Config,
    transport: &dyn Transport,
    out: &mut W,
) -> Result<(), UsageError> {
    if config.management_key.is_empty() {
        return Err(UsageError::MissingCredential {
            var: MANAGEMENT_KEY_ENV,
        });
    }
    let headers = config.management_headers()?;
    info!(base_url = %config.base_url, provider = %config.provider, "querying proxy");

    let entries = discover(transport, &config.base_url, &headers).await?;
    let wanted = parse_auth_indices(&config.auth_indices);
    let selected = select_entries(entries, &config.provider, &wanted)?;

    let results = fetch_all(transport, &config.base_url, &headers, &selected).await?;

    if config.json {
        write_json(out, &results)?;
    } else {
        write_summary(out, &config.provider, &results, config.pretty_body, Utc::now())?;
    }
    out.flush()?;
    Ok(())
}
