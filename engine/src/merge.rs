//! Merge policy for pulled documents.
//!
//! The vault is synchronized as one atomic document. On pull the remote
//! content is authoritative for every key it carries; keys that only exist
//! locally (for example state introduced by a newer client build) are kept.
//! The merge is shallow: nested values are replaced wholesale.

use crate::PersistedState;

/// Merge `remote` into `local`.
///
/// Remote values overwrite matching local keys. Local keys absent from the
/// remote document are preserved.
pub fn merge_remote(local: &PersistedState, remote: &PersistedState) -> PersistedState {
    let mut merged = local.clone();
    for (key, value) in remote {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Check whether `state` is semantically identical to the last pushed
/// state.
///
/// Compares JSON values structurally, so key order never matters.
pub fn is_unchanged(state: &PersistedState, last_pushed: Option<&PersistedState>) -> bool {
    last_pushed.is_some_and(|pushed| pushed == state)
}

/// Keys present locally but unknown to the remote document.
pub fn local_only_keys<'a>(
    local: &'a PersistedState,
    remote: &'a PersistedState,
) -> impl Iterator<Item = &'a String> + 'a {
    local.keys().filter(move |key| !remote.contains_key(*key))
}
