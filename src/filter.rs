use crate::error::UsageError;
use crate::models::AuthEntry;
use std::collections::BTreeSet;
use tracing::debug;

/// Build the requested index set from repeatable, comma-separated tokens.
/// An empty set means no index filtering.
pub fn parse_auth_indices<S: AsRef<str>>(raw: &[S]) -> BTreeSet<String> {
    raw.iter()
        .flat_map(|token| token.as_ref().split(','))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keep entries for `provider` (trimmed, case-insensitive) whose index is in
/// `wanted`, preserving discovery order. Never returns an empty list.
pub fn select_entries(
    entries: Vec<AuthEntry>,
    provider: &str,
    wanted: &BTreeSet<String>,
) -> Result<Vec<AuthEntry>, UsageError> {
    let wanted_provider = provider.trim().to_lowercase();
    let selected: Vec<AuthEntry> = entries
        .into_iter()
        .filter(|entry| entry.provider == wanted_provider)
        .filter(|entry| wanted.is_empty() || wanted.contains(&entry.index))
        .collect();

    debug!(provider, selected = selected.len(), "filtered auth entries");

    if !selected.is_empty() {
        return Ok(selected);
    }
    if wanted.is_empty() {
        Err(UsageError::NoProviderMatch {
            provider: provider.to_string(),
        })
    } else {
        Err(UsageError::NoIndexMatch {
            provider: provider.to_string(),
            indices: wanted.clone(),
        })
    }
}
