//! Settings resolution.
//!
//! Priority, highest first:
//! 1. Command-line flag (clap also fills flags from their `LLMGRADER_*` env var)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Built-in default

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use services::OpenAiGraderConfig;
use url::Url;

pub const DEFAULT_DB_URL: &str = "sqlite://llmgrader.sqlite3";
pub const DEFAULT_UNITS_ROOT: &str = "questions";
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Slack added on top of the grading timeout for connection setup.
pub const HTTP_TIMEOUT_BUFFER: Duration = Duration::from_secs(5);

const API_KEY_ENVS: [&str; 2] = ["LLMGRADER_API_KEY", "OPENAI_API_KEY"];

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub db_url: Option<String>,
    pub session_dir: Option<PathBuf>,
    pub units_root: Option<PathBuf>,
    pub api_base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_key: Option<String>,
}

/// Values given on the command line (or through clap's env fallback).
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub db_url: Option<String>,
    pub session_dir: Option<PathBuf>,
    pub units_root: Option<PathBuf>,
    pub api_base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_url: String,
    /// Directory for session blobs; `None` keeps them in the database.
    pub session_dir: Option<PathBuf>,
    pub units_root: PathBuf,
    pub api_base_url: Url,
    /// `None` lets each question's preferred model apply.
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Settings {
    /// Merge overrides, environment, and file values.
    ///
    /// `env` looks up an environment variable; tests pass a closure over a
    /// fixed map.
    ///
    /// # Errors
    ///
    /// Returns an error if the API base URL does not parse or is not http(s).
    pub fn resolve(
        overrides: Overrides,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let api_key = overrides
            .api_key
            .or_else(|| API_KEY_ENVS.into_iter().find_map(|name| env(name)))
            .or(file.api_key)
            .filter(|key| !key.trim().is_empty());

        let raw_base = overrides
            .api_base_url
            .or(file.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = Url::parse(&raw_base)
            .with_context(|| format!("invalid api_base_url: {raw_base}"))?;
        if !matches!(api_base_url.scheme(), "http" | "https") {
            bail!("api_base_url must use http or https: {raw_base}");
        }

        Ok(Self {
            db_url: overrides
                .db_url
                .or(file.db_url)
                .unwrap_or_else(|| DEFAULT_DB_URL.to_string()),
            session_dir: overrides.session_dir.or(file.session_dir),
            units_root: overrides
                .units_root
                .or(file.units_root)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UNITS_ROOT)),
            api_base_url,
            model: overrides.model.or(file.model),
            timeout_secs: overrides
                .timeout_secs
                .or(file.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            api_key,
        })
    }

    /// Request timeout handed to the HTTP client.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs) + HTTP_TIMEOUT_BUFFER
    }

    #[must_use]
    pub fn grader_config(&self) -> OpenAiGraderConfig {
        OpenAiGraderConfig {
            base_url: self.api_base_url.as_str().trim_end_matches('/').to_string(),
            api_key: self.api_key.clone(),
        }
    }
}

/// Locate the config file: explicit path (`--config` or `LLMGRADER_CONFIG`),
/// then `<config_dir>/llmgrader/config.toml` if it exists.
#[must_use]
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    dirs::config_dir()
        .map(|dir| dir.join("llmgrader").join("config.toml"))
        .filter(|path| path.exists())
}

/// Read and parse the config file; no path means an empty config.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_file(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = Settings::resolve(Overrides::default(), FileConfig::default(), no_env).unwrap();
        assert_eq!(settings.db_url, DEFAULT_DB_URL);
        assert_eq!(settings.units_root, PathBuf::from("questions"));
        assert_eq!(settings.api_base_url.as_str(), "https://api.openai.com/v1");
        assert_eq!(settings.model, None);
        assert_eq!(settings.session_dir, None);
        assert_eq!(settings.http_timeout(), Duration::from_secs(25));
        assert!(settings.api_key.is_none());
        assert_eq!(settings.grader_config().base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn overrides_beat_file_values() {
        let file = FileConfig {
            db_url: Some("sqlite://file.db".into()),
            model: Some("gpt-4o".into()),
            timeout_secs: Some(60),
            ..FileConfig::default()
        };
        let overrides = Overrides {
            db_url: Some("sqlite://cli.db".into()),
            session_dir: Some(PathBuf::from("/var/lib/llmgrader/sessions")),
            ..Overrides::default()
        };
        let settings = Settings::resolve(overrides, file, no_env).unwrap();
        assert_eq!(settings.db_url, "sqlite://cli.db");
        assert_eq!(
            settings.session_dir,
            Some(PathBuf::from("/var/lib/llmgrader/sessions"))
        );
        assert_eq!(settings.model.as_deref(), Some("gpt-4o"));
        assert_eq!(settings.timeout_secs, 60);
    }

    #[test]
    fn api_key_prefers_environment_over_file() {
        let env: HashMap<&str, &str> = HashMap::from([("OPENAI_API_KEY", "sk-env")]);
        let lookup = |name: &str| env.get(name).map(|v| (*v).to_string());
        let file = FileConfig {
            api_key: Some("sk-file".into()),
            ..FileConfig::default()
        };
        let settings = Settings::resolve(Overrides::default(), file, lookup).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("sk-env"));

        let overrides = Overrides {
            api_key: Some("sk-cli".into()),
            ..Overrides::default()
        };
        let settings = Settings::resolve(overrides, FileConfig::default(), lookup).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("sk-cli"));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let overrides = Overrides {
            api_key: Some("   ".into()),
            ..Overrides::default()
        };
        let settings = Settings::resolve(overrides, FileConfig::default(), no_env).unwrap();
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        for raw in ["not a url", "ftp://example.com"] {
            let overrides = Overrides {
                api_base_url: Some(raw.into()),
                ..Overrides::default()
            };
            assert!(Settings::resolve(overrides, FileConfig::default(), no_env).is_err());
        }
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "db_url = \"sqlite://graded.db\"\nsession_dir = \"sessions\"\nunits_root = \"/srv/units\"\ntimeout_secs = 45\n",
        )
        .unwrap();

        let file = load_file(Some(&path)).unwrap();
        assert_eq!(file.db_url.as_deref(), Some("sqlite://graded.db"));
        assert_eq!(file.units_root, Some(PathBuf::from("/srv/units")));
        assert_eq!(file.session_dir, Some(PathBuf::from("sessions")));
        assert_eq!(file.timeout_secs, Some(45));
        assert_eq!(load_file(None).unwrap(), FileConfig::default());
    }

    #[test]
    fn unknown_toml_keys_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "db = \"typo\"\n").unwrap();
        assert!(load_file(Some(&path)).is_err());
        assert!(load_file(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn explicit_config_path_wins() {
        let explicit = PathBuf::from("/tmp/custom.toml");
        assert_eq!(config_path(Some(&explicit)), Some(explicit));
    }
}
