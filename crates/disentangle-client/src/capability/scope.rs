//! Scope coverage and attenuation checks.
//!
//! Scopes use the `action:resource` convention with wildcards:
//!   - `read`: exactly `read`
//!   - `read:*`: `read` and anything under `read:`
//!   - `storage/*`: `storage` and anything under `storage/`
//!   - `*`: everything

use super::types::Capability;

/// Check whether a granted scope covers a requested scope.
///
/// Matching rules:
/// - `*` matches everything
/// - exact match
/// - `p:*` matches `p` and anything under `p:`
/// - `p/*` matches `p` and anything under `p/`
pub fn scope_covers(granted: &str, requested: &str) -> bool {
    if granted == "*" || granted == requested {
        return true;
    }

    for sep in [':', '/'] {
        let Some(prefix) = granted
            .strip_suffix('*')
            .and_then(|rest| rest.strip_suffix(sep))
        else {
            continue;
        };
        if requested == prefix {
            return true;
        }
        if requested.starts_with(prefix) && requested[prefix.len()..].starts_with(sep) {
            return true;
        }
    }

    false
}

/// A child may only narrow its parent: same subject type, scope covered.
pub fn is_attenuation(parent: &Capability, child: &Capability) -> bool {
    parent.subject_type == child.subject_type && scope_covers(&parent.scope, &child.scope)
}
