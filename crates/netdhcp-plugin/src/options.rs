//! Decoding of the driver-generic option bag.
//!
//! The options map is the only place untyped data enters the plugin. It is
//! decoded strictly (unknown keys are rejected) with weak coercion for the
//! value types the Docker CLI delivers as strings.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{PluginError, Result};

/// Key under which the daemon nests the driver-specific options.
pub const GENERIC_OPTIONS_KEY: &str = "com.docker.network.generic";

/// Lease wait applied when no `lease_timeout` option is given.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Options of one driver-managed network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkOptions {
    /// Name of the user-managed bridge to attach endpoints to.
    pub bridge: String,
    /// Also acquire DHCPv6 leases.
    pub ipv6: bool,
    /// How long a one-shot lease may take.
    pub lease_timeout: Duration,
    /// Skip the bridge/subnet conflict checks in CreateNetwork.
    pub ignore_conflicts: bool,
    /// Do not mirror non-default bridge routes into Join responses.
    pub skip_routes: bool,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            bridge: String::new(),
            ipv6: false,
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            ignore_conflicts: false,
            skip_routes: false,
        }
    }
}

/// Decodes the generic option bag of a network.
///
/// # Errors
///
/// Returns an error for unknown keys or uncoercible values.
pub fn decode_options(bag: &Map<String, Value>) -> Result<NetworkOptions> {
    let mut opts = NetworkOptions::default();
    for (key, value) in bag {
        match key.as_str() {
            "bridge" => opts.bridge = string_value("bridge", value)?,
            "ipv6" => opts.ipv6 = bool_value("ipv6", value)?,
            "lease_timeout" => {
                let timeout = duration_value("lease_timeout", value)?;
                if !timeout.is_zero() {
                    opts.lease_timeout = timeout;
                }
            }
            "ignore_conflicts" => opts.ignore_conflicts = bool_value("ignore_conflicts", value)?,
            "skip_routes" => opts.skip_routes = bool_value("skip_routes", value)?,
            _ => return Err(PluginError::UnknownOption(key.clone())),
        }
    }
    Ok(opts)
}

/// Decodes the string-valued options map stored by the daemon.
///
/// # Errors
///
/// Returns an error for unknown keys or uncoercible values.
pub fn decode_options_map(map: &HashMap<String, String>) -> Result<NetworkOptions> {
    let bag: Map<String, Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    decode_options(&bag)
}

/// Extracts the generic sub-bag from a CreateNetwork options map.
///
/// A missing or null entry decodes as an empty bag, like the original
/// driver; the bridge-required check catches it afterwards.
///
/// # Errors
///
/// Returns an error when the entry exists but is not an object.
pub fn generic_options(options: &Map<String, Value>) -> Result<Map<String, Value>> {
    match options.get(GENERIC_OPTIONS_KEY) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(bag)) => Ok(bag.clone()),
        Some(other) => Err(PluginError::BadRequest(format!(
            "expected an object under {GENERIC_OPTIONS_KEY}, got {other}"
        ))),
    }
}

fn string_value(key: &'static str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(PluginError::OptionValue {
            key,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn bool_value(key: &'static str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => Ok(true),
            "0" | "f" | "false" => Ok(false),
            _ => Err(PluginError::OptionValue {
                key,
                reason: format!("{s:?} is not a boolean"),
            }),
        },
        Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
        other => Err(PluginError::OptionValue {
            key,
            reason: format!("expected a boolean, got {other}"),
        }),
    }
}

fn duration_value(key: &'static str, value: &Value) -> Result<Duration> {
    match value {
        Value::String(s) => humantime::parse_duration(s).map_err(|e| PluginError::OptionValue {
            key,
            reason: e.to_string(),
        }),
        // Bare numbers are taken as seconds.
        Value::Number(n) => match n.as_u64() {
            Some(secs) => Ok(Duration::from_secs(secs)),
            None => Err(PluginError::OptionValue {
                key,
                reason: format!("{n} is not a valid duration"),
            }),
        },
        other => Err(PluginError::OptionValue {
            key,
            reason: format!("expected a duration, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn empty_bag_yields_defaults() {
        let opts = decode_options(&Map::new()).unwrap();
        assert_eq!(opts, NetworkOptions::default());
        assert_eq!(opts.lease_timeout, DEFAULT_LEASE_TIMEOUT);
    }

    #[test]
    fn full_bag_decodes_with_string_coercion() {
        let opts = decode_options(&bag(json!({
            "bridge": "br0",
            "ipv6": "true",
            "lease_timeout": "15s",
            "ignore_conflicts": "1",
            "skip_routes": true,
        })))
        .unwrap();

        assert_eq!(opts.bridge, "br0");
        assert!(opts.ipv6);
        assert_eq!(opts.lease_timeout, Duration::from_secs(15));
        assert!(opts.ignore_conflicts);
        assert!(opts.skip_routes);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = decode_options(&bag(json!({"bridge": "br0", "mtu": 1500}))).unwrap_err();
        assert!(matches!(err, PluginError::UnknownOption(key) if key == "mtu"));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(decode_options(&bag(json!({"ipv6": "maybe"}))).is_err());
        assert!(decode_options(&bag(json!({"lease_timeout": "soon"}))).is_err());
    }

    #[test]
    fn zero_lease_timeout_falls_back_to_the_default() {
        let opts = decode_options(&bag(json!({"lease_timeout": "0s"}))).unwrap();
        assert_eq!(opts.lease_timeout, DEFAULT_LEASE_TIMEOUT);
    }

    #[test]
    fn stored_string_map_decodes() {
        let mut map = HashMap::new();
        map.insert("bridge".to_string(), "br0".to_string());
        map.insert("ipv6".to_string(), "false".to_string());
        let opts = decode_options_map(&map).unwrap();
        assert_eq!(opts.bridge, "br0");
        assert!(!opts.ipv6);
    }

    #[test]
    fn generic_bag_extraction() {
        let options = bag(json!({
            "com.docker.network.generic": {"bridge": "br0"},
            "com.docker.network.enable_ipv6": false,
        }));
        let generic = generic_options(&options).unwrap();
        assert_eq!(generic.get("bridge"), Some(&json!("br0")));

        assert!(generic_options(&Map::new()).unwrap().is_empty());
        assert!(generic_options(&bag(json!({"com.docker.network.generic": 42}))).is_err());
    }
}
