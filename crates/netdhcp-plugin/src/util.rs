//! Small shared helpers.

use std::sync::LazyLock;

use regex::Regex;

/// Matches the driver name Docker stores for networks created through this
/// plugin (the plugin image reference).
static DRIVER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ghcr\.io/devplayer0/docker-net-dhcp:.+$").expect("static regex"));

/// Whether a Docker network driver string is an instance of this plugin.
pub fn is_dhcp_plugin(driver: &str) -> bool {
    DRIVER_PATTERN.is_match(driver)
}

/// Deterministic veth pair names for an endpoint ID.
///
/// Returns `(host_side, container_side)`.
pub fn veth_pair_names(endpoint_id: &str) -> (String, String) {
    let prefix = &endpoint_id[..12];
    (format!("dh-{prefix}"), format!("{prefix}-dh"))
}

/// Truncated ID for log fields.
pub fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn veth_names_derive_from_the_first_twelve_characters() {
        let id = "abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789";
        let (host, container) = veth_pair_names(id);
        assert_eq!(host, "dh-abcdef012345");
        assert_eq!(container, "abcdef012345-dh");
    }

    #[test]
    fn plugin_driver_names_are_recognized() {
        assert!(is_dhcp_plugin("ghcr.io/devplayer0/docker-net-dhcp:release-0.3"));
        assert!(is_dhcp_plugin("ghcr.io/devplayer0/docker-net-dhcp:latest"));
        assert!(!is_dhcp_plugin("ghcr.io/devplayer0/docker-net-dhcp:"));
        assert!(!is_dhcp_plugin("bridge"));
        assert!(!is_dhcp_plugin("overlay"));
    }

    #[test]
    fn short_id_handles_short_inputs() {
        assert_eq!(short_id("abcdef0123456789"), "abcdef012345");
        assert_eq!(short_id("abc"), "abc");
    }
}
