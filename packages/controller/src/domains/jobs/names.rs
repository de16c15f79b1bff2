//! Derivation of upstream object names from the job's external id.
//!
//! The fabric manager caps contract names at 20 characters. Truncation must
//! be deterministic (replays and deprovision derive the same name) and
//! collision-resistant, so over-long names keep their prefix and replace the
//! tail with a stable digest of the full name.

use sha2::{Digest, Sha256};

/// Upstream cap on contract names.
pub const CONTRACT_NAME_MAX: usize = 20;

const DIGEST_SUFFIX_LEN: usize = 6;

/// `sg_<external_id>`, restricted to name-safe characters.
pub fn group_name(external_id: &str) -> String {
    format!("sg_{}", sanitize(external_id))
}

/// `<prefix><external_id>` truncated deterministically to the upstream cap.
pub fn contract_name(prefix: &str, external_id: &str) -> String {
    truncate_name(
        &format!("{}{}", sanitize(prefix), sanitize(external_id)),
        CONTRACT_NAME_MAX,
    )
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn truncate_name(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let mut digest = hex::encode(Sha256::digest(name.as_bytes()));
    digest.truncate(DIGEST_SUFFIX_LEN);
    let keep = max - DIGEST_SUFFIX_LEN;
    format!("{}{}", &name[..keep], digest)
}
