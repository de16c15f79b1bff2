//! API namespace registry and path composition.
//!
//! NDFC exposes two generations of API roots: the legacy appcenter tree and
//! the newer `/api/v1` tree. Operations name a logical namespace and the
//! registry resolves it to a base prefix; an unknown namespace is an error
//! rather than a guessed path. Every path segment is URL-escaped before
//! joining, since fabric and group names come from user input.

use crate::error::NdfcError;

/// Legacy security API (groups, contracts, associations, protocols).
pub const SECURITY_V1: &str = "security-v1";
/// Legacy LAN fabric API (fabrics, inventory, interfaces, links, deploy).
pub const LAN_FABRIC_V1: &str = "lan-fabric-v1";
/// Legacy image management API.
pub const IMAGE_MANAGEMENT_V1: &str = "image-management-v1";
/// Newer management API root.
pub const MANAGE_V1: &str = "manage-v1";

fn namespace_prefix(namespace: &str) -> Option<&'static str> {
    match namespace {
        SECURITY_V1 => Some("/appcenter/cisco/ndfc/api/v1/security"),
        LAN_FABRIC_V1 => Some("/appcenter/cisco/ndfc/api/v1/lan-fabric"),
        IMAGE_MANAGEMENT_V1 => Some("/appcenter/cisco/ndfc/api/v1/imagemanagement"),
        MANAGE_V1 => Some("/api/v1/manage"),
        _ => None,
    }
}

/// Build the path for an operation under a logical namespace.
///
/// Segments are escaped individually; literal path components containing `/`
/// must be passed as separate segments.
pub fn api_path(namespace: &str, segments: &[&str]) -> Result<String, NdfcError> {
    let prefix = namespace_prefix(namespace)
        .ok_or_else(|| NdfcError::UnknownNamespace(namespace.to_string()))?;

    let mut path = String::from(prefix);
    for segment in segments {
        path.push('/');
        path.push_str(&urlencoding::encode(segment));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_paths() {
        let path = api_path(SECURITY_V1, &["fabrics", "compute", "groups"]).unwrap();
        assert_eq!(
            path,
            "/appcenter/cisco/ndfc/api/v1/security/fabrics/compute/groups"
        );
    }

    #[test]
    fn segments_are_escaped() {
        let path = api_path(SECURITY_V1, &["fabrics", "my fabric/1", "groups"]).unwrap();
        assert_eq!(
            path,
            "/appcenter/cisco/ndfc/api/v1/security/fabrics/my%20fabric%2F1/groups"
        );
    }

    #[test]
    fn manage_namespace() {
        let path = api_path(MANAGE_V1, &["fabrics"]).unwrap();
        assert_eq!(path, "/api/v1/manage/fabrics");
    }

    #[test]
    fn unknown_namespace_fails_fast() {
        let err = api_path("security-v9", &["fabrics"]).unwrap_err();
        assert!(matches!(err, NdfcError::UnknownNamespace(ns) if ns == "security-v9"));
    }
}
