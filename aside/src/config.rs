use std::time::Duration;

use serde::Deserialize;

/// Settings loadable from a configuration file.
///
/// Every field is optional; unset fields keep whatever the builder already
/// holds. Durations use humantime notation (`"90s"`, `"1h 30m"`).
///
/// ```
/// use fibre_aside::AsideConfig;
///
/// let config: AsideConfig =
///   serde_json::from_str(r#"{ "remote_ttl": "30m", "not_found_ttl": "15s" }"#).unwrap();
/// assert_eq!(config.remote_ttl, Some(std::time::Duration::from_secs(1800)));
/// assert!(config.placeholder.is_none());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AsideConfig {
  /// Lifetime of stored values.
  #[serde(with = "humantime_serde")]
  pub remote_ttl: Option<Duration>,

  /// Lifetime of not-found placeholders.
  #[serde(with = "humantime_serde")]
  pub not_found_ttl: Option<Duration>,

  /// Marker stored for confirmed-absent keys.
  pub placeholder: Option<String>,
}
