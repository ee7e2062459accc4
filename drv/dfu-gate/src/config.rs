// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

/// What to do with a staged image when its digest can't be compared: the
/// area is unknown, the image is unreadable or malformed, or there is no
/// reference digest yet.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Let the update proceed.
    FailOpen,
    /// Abandon the staged image.
    FailClosed,
}

/// Gate configuration, as found in the `dfu-gate` section of an app's
/// config.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GateConfig {
    #[serde(default = "GateConfig::default_policy")]
    pub on_inconclusive: FailurePolicy,
    /// Retry count handed to the abort action when abandoning an image.
    #[serde(default = "GateConfig::default_retries")]
    pub abort_retries: u8,
}

impl GateConfig {
    #[cfg(not(feature = "fail-closed"))]
    pub const DEFAULT: Self = Self {
        on_inconclusive: FailurePolicy::FailOpen,
        abort_retries: 1,
    };

    #[cfg(feature = "fail-closed")]
    pub const DEFAULT: Self = Self {
        on_inconclusive: FailurePolicy::FailClosed,
        abort_retries: 1,
    };

    fn default_policy() -> FailurePolicy {
        Self::DEFAULT.on_inconclusive
    }

    fn default_retries() -> u8 {
        Self::DEFAULT.abort_retries
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The subset of an app config we care about.
    #[derive(Deserialize)]
    #[serde(rename_all = "kebab-case")]
    struct AppConfig {
        dfu_gate: GateConfig,
    }

    #[test]
    fn parses_full_section() {
        let cfg: AppConfig = toml::from_str(
            r#"
            name = "ignored"

            [dfu-gate]
            on-inconclusive = "fail-closed"
            abort-retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.dfu_gate,
            GateConfig {
                on_inconclusive: FailurePolicy::FailClosed,
                abort_retries: 3,
            }
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: GateConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, GateConfig::DEFAULT);
        assert_eq!(cfg.abort_retries, 1);
    }

    #[cfg(not(feature = "fail-closed"))]
    #[test]
    fn default_is_fail_open() {
        assert_eq!(
            GateConfig::default().on_inconclusive,
            FailurePolicy::FailOpen
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(toml::from_str::<GateConfig>("retries = 2").is_err());
        assert!(
            toml::from_str::<GateConfig>(r#"on-inconclusive = "maybe""#)
                .is_err()
        );
    }
}
