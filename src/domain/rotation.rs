//! Usage: Account selection rules (next rotation candidate, effective active account).
//!
//! Both functions are pure over a registry snapshot and return indices so callers can mutate
//! the chosen entry in place before persisting the list.

use crate::domain::accounts::Account;

/// Oldest non-banned account other than `current_active`.
///
/// Missing timestamps sort before any real timestamp; ties keep registry order. Token presence
/// is not checked: a token-less candidate is returned and the caller refuses the switch.
pub fn select_next(accounts: &[Account], current_active: Option<&str>) -> Option<usize> {
    let current = current_active.unwrap_or("");
    accounts
        .iter()
        .enumerate()
        .filter(|(_, acc)| !acc.is_banned() && acc.email != current)
        .min_by_key(|(_, acc)| acc.last_updated)
        .map(|(idx, _)| idx)
}

/// The pointed-at account when it is still eligible, else the first non-banned account.
pub fn resolve_active(accounts: &[Account], active_email: Option<&str>) -> Option<usize> {
    if let Some(active) = active_email.filter(|v| !v.is_empty()) {
        if let Some(idx) = accounts
            .iter()
            .position(|acc| acc.email == active && !acc.is_banned())
        {
            return Some(idx);
        }
    }
    accounts.iter().position(|acc| !acc.is_banned())
}
