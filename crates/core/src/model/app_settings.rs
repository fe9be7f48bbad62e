use thiserror::Error;
use url::Url;

/// Default time budget for a single remote mirror request.
pub const DEFAULT_MIRROR_TIMEOUT_SECS: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppSettings {
    api_base_url: Option<String>,
    shuffle_questions: bool,
    mirror_timeout_secs: u32,
}

#[derive(Clone, Debug, Default)]
pub struct AppSettingsDraft {
    pub api_base_url: Option<String>,
    pub shuffle_questions: bool,
    pub mirror_timeout_secs: Option<u32>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AppSettingsError {
    #[error("invalid base URL")]
    InvalidBaseUrl,

    #[error("mirror timeout must be between 1 and 120 seconds")]
    InvalidTimeout,
}

impl AppSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and normalize the draft into settings.
    ///
    /// # Errors
    ///
    /// Returns `AppSettingsError` if the base URL is present but invalid, or
    /// the timeout is out of range.
    pub fn validate(self) -> Result<AppSettings, AppSettingsError> {
        let api_base_url = normalize_optional(self.api_base_url)
            .map(|raw| raw.trim_end_matches('/').to_string());

        if let Some(url) = api_base_url.as_ref() {
            let parsed = Url::parse(url).map_err(|_| AppSettingsError::InvalidBaseUrl)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppSettingsError::InvalidBaseUrl);
            }
        }

        let mirror_timeout_secs = self
            .mirror_timeout_secs
            .unwrap_or(DEFAULT_MIRROR_TIMEOUT_SECS);
        if !(1..=120).contains(&mirror_timeout_secs) {
            return Err(AppSettingsError::InvalidTimeout);
        }

        Ok(AppSettings {
            api_base_url,
            shuffle_questions: self.shuffle_questions,
            mirror_timeout_secs,
        })
    }
}

impl AppSettings {
    /// Base URL of the remote result store; `None` disables mirroring.
    #[must_use]
    pub fn api_base_url(&self) -> Option<&str> {
        self.api_base_url.as_deref()
    }

    #[must_use]
    pub fn mirror_enabled(&self) -> bool {
        self.api_base_url.is_some()
    }

    #[must_use]
    pub fn shuffle_questions(&self) -> bool {
        self.shuffle_questions
    }

    #[must_use]
    pub fn mirror_timeout_secs(&self) -> u32 {
        self.mirror_timeout_secs
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: None,
            shuffle_questions: false,
            mirror_timeout_secs: DEFAULT_MIRROR_TIMEOUT_SECS,
        }
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_url_disables_mirroring() {
        let settings = AppSettingsDraft {
            api_base_url: Some("   ".into()),
            ..AppSettingsDraft::new()
        }
        .validate()
        .unwrap();
        assert!(!settings.mirror_enabled());
        assert_eq!(settings.mirror_timeout_secs(), DEFAULT_MIRROR_TIMEOUT_SECS);
    }

    #[test]
    fn url_is_trimmed_of_trailing_slash() {
        let settings = AppSettingsDraft {
            api_base_url: Some("http://localhost:3000/".into()),
            ..AppSettingsDraft::new()
        }
        .validate()
        .unwrap();
        assert_eq!(settings.api_base_url(), Some("http://localhost:3000"));
    }

    #[test]
    fn rejects_non_http_urls_and_bad_timeouts() {
        let err = AppSettingsDraft {
            api_base_url: Some("ftp://example.com".into()),
            ..AppSettingsDraft::new()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err, AppSettingsError::InvalidBaseUrl);

        let err = AppSettingsDraft {
            mirror_timeout_secs: Some(0),
            ..AppSettingsDraft::new()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err, AppSettingsError::InvalidTimeout);
    }
}
