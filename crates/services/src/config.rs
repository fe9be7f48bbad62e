use std::env;

use quiz_core::model::{AppSettings, AppSettingsDraft};

use crate::error::ConfigError;

pub const API_URL_VAR: &str = "QUIZ_API_URL";
pub const MIRROR_TIMEOUT_VAR: &str = "QUIZ_MIRROR_TIMEOUT_SECS";
pub const SHUFFLE_VAR: &str = "QUIZ_SHUFFLE";

/// Where and how to mirror results; only exists when a base URL is set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorConfig {
    pub base_url: String,
    pub timeout_secs: u32,
}

impl MirrorConfig {
    #[must_use]
    pub fn from_settings(settings: &AppSettings) -> Option<Self> {
        settings.api_base_url().map(|base_url| Self {
            base_url: base_url.to_string(),
            timeout_secs: settings.mirror_timeout_secs(),
        })
    }

    /// # Errors
    ///
    /// Returns `ConfigError` if the environment holds invalid values.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Ok(Self::from_settings(&settings_from_env()?))
    }
}

/// Validated settings from the process environment.
///
/// # Errors
///
/// Returns `ConfigError` if a variable is malformed or fails validation.
pub fn settings_from_env() -> Result<AppSettings, ConfigError> {
    settings_from_lookup(|name| env::var(name).ok())
}

/// Validated settings from an arbitrary variable source.
///
/// # Errors
///
/// Returns `ConfigError` if a variable is malformed or fails validation.
pub fn settings_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppSettings, ConfigError> {
    let mirror_timeout_secs = match lookup(MIRROR_TIMEOUT_VAR) {
        Some(raw) if !raw.trim().is_empty() => {
            Some(raw.trim().parse::<u32>().map_err(|_| ConfigError::NotANumber {
                var: MIRROR_TIMEOUT_VAR,
                raw,
            })?)
        }
        _ => None,
    };

    let draft = AppSettingsDraft {
        api_base_url: lookup(API_URL_VAR),
        shuffle_questions: lookup(SHUFFLE_VAR).is_some_and(|raw| is_truthy(&raw)),
        mirror_timeout_secs,
    };
    Ok(draft.validate()?)
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
