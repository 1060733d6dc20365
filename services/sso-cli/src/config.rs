//! Configuration types and loading
//!
//! Config path precedence: `--config` flag > `CONFIG_PATH` env var >
//! `sesame-sso.toml`. The client secret is loaded from the
//! `SESAME_CLIENT_SECRET` env var or `client_secret_file`, never from the
//! TOML body, so config files can be shared without leaking it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use sesame_sso::{EvictionPolicy, SsoConfig, StoreConfig};

/// Env var holding the client secret (takes precedence over the file).
pub const CLIENT_SECRET_ENV: &str = "SESAME_CLIENT_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub sso: SsoSection,
    #[serde(default)]
    pub state_store: StateStoreSection,
}

/// Provider and client registration
#[derive(Debug, Deserialize)]
pub struct SsoSection {
    pub base_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Path to a file containing the client secret
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
}

/// In-memory state store tuning
#[derive(Debug, Deserialize)]
pub struct StateStoreSection {
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default)]
    pub eviction: Eviction,
}

impl Default for StateStoreSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval(),
            eviction: Eviction::default(),
        }
    }
}

/// Overflow policy as spelled in TOML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eviction {
    #[default]
    Lenient,
    Fifo,
}

fn default_timeout() -> u64 {
    10
}

fn default_ttl() -> u64 {
    600
}

fn default_max_entries() -> usize {
    10_000
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Config {
    /// Load configuration from a TOML file, then resolve the client secret.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.sso.base_url.starts_with("http://")
            && !config.sso.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.sso.base_url
            )));
        }

        let positive = [
            ("timeout_secs", config.sso.timeout_secs),
            ("ttl_secs", config.state_store.ttl_secs),
            ("cleanup_interval_secs", config.state_store.cleanup_interval_secs),
            ("max_entries", config.state_store.max_entries as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        // Env var takes precedence over file
        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            config.sso.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.sso.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            config.sso.client_secret = Some(Secret::new(secret.trim().to_owned()));
        }

        if config
            .sso
            .client_secret
            .as_ref()
            .is_none_or(Secret::<String>::is_empty)
        {
            return Err(common::Error::Config(format!(
                "client secret missing: set {CLIENT_SECRET_ENV} or client_secret_file"
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("sesame-sso.toml")
    }

    /// Translate into the library's client configuration.
    pub fn sso_config(&self) -> common::Result<SsoConfig> {
        let secret = self
            .sso
            .client_secret
            .clone()
            .ok_or_else(|| common::Error::Config("client secret not loaded".into()))?;

        let store = StoreConfig {
            ttl: Duration::from_secs(self.state_store.ttl_secs),
            max_entries: self.state_store.max_entries,
            cleanup_interval: Duration::from_secs(self.state_store.cleanup_interval_secs),
            eviction: match self.state_store.eviction {
                Eviction::Lenient => EvictionPolicy::Lenient,
                Eviction::Fifo => EvictionPolicy::Fifo,
            },
        };

        let mut sso = SsoConfig::new(
            self.sso.base_url.clone(),
            self.sso.client_id.clone(),
            secret,
            self.sso.redirect_uri.clone(),
        )
        .with_timeout(Duration::from_secs(self.sso.timeout_secs))
        .with_store_config(store);
        if let Some(scope) = &self.sso.scope {
            sso = sso.with_scope(scope.clone());
        }
        Ok(sso)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[sso]
base_url = "https://sso.example.com"
client_id = "client-1"
redirect_uri = "https://app.example.com/callback"
scope = "openid profile"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("sesame-sso.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_valid_config_with_env_secret() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());
        unsafe { set_env(CLIENT_SECRET_ENV, "env-secret") };

        let config = Config::load(&path).unwrap();
        unsafe { remove_env(CLIENT_SECRET_ENV) };

        assert_eq!(config.sso.client_id, "client-1");
        assert_eq!(config.sso.scope.as_deref(), Some("openid profile"));
        assert_eq!(config.sso.timeout_secs, 10);
        assert_eq!(config.state_store.ttl_secs, 600);
        assert_eq!(config.state_store.max_entries, 10_000);
        assert_eq!(config.state_store.eviction, Eviction::Lenient);
        assert_eq!(
            config.sso.client_secret.as_ref().unwrap().expose(),
            "env-secret"
        );
    }

    #[test]
    fn test_secret_file_used_when_env_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("secret");
        std::fs::write(&secret_path, "file-secret\n").unwrap();
        let toml = format!(
            "{}client_secret_file = \"{}\"\n",
            valid_toml(),
            secret_path.display()
        );
        let path = write_config(&dir, &toml);
        unsafe { remove_env(CLIENT_SECRET_ENV) };

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.sso.client_secret.as_ref().unwrap().expose(),
            "file-secret"
        );
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());
        unsafe { remove_env(CLIENT_SECRET_ENV) };

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains(CLIENT_SECRET_ENV), "got: {err}");
    }

    #[test]
    fn test_empty_env_secret_is_config_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());
        unsafe { set_env(CLIENT_SECRET_ENV, "") };

        let result = Config::load(&path);
        unsafe { remove_env(CLIENT_SECRET_ENV) };

        let err = result.unwrap_err();
        assert!(err.to_string().contains("client secret missing"), "got: {err}");
    }

    #[test]
    fn test_blank_secret_file_is_config_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("secret");
        std::fs::write(&secret_path, "  \n").unwrap();
        let toml = format!(
            "{}client_secret_file = \"{}\"\n",
            valid_toml(),
            secret_path.display()
        );
        let path = write_config(&dir, &toml);
        unsafe { remove_env(CLIENT_SECRET_ENV) };

        assert!(matches!(
            Config::load(&path),
            Err(common::Error::Config(_))
        ));
    }

    #[test]
    fn test_state_store_section_parses() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "{}\n[state_store]\nttl_secs = 120\nmax_entries = 50\ncleanup_interval_secs = 30\neviction = \"fifo\"\n",
            valid_toml()
        );
        let path = write_config(&dir, &toml);
        unsafe { set_env(CLIENT_SECRET_ENV, "s") };

        let config = Config::load(&path).unwrap();
        unsafe { remove_env(CLIENT_SECRET_ENV) };

        let sso = config.sso_config().unwrap();
        assert_eq!(sso.store.ttl, Duration::from_secs(120));
        assert_eq!(sso.store.max_entries, 50);
        assert_eq!(sso.store.cleanup_interval, Duration::from_secs(30));
        assert_eq!(sso.store.eviction, EvictionPolicy::Fifo);
        assert_eq!(sso.scope.as_deref(), Some("openid profile"));
    }

    #[test]
    fn test_zero_values_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml = format!("{}timeout_secs = 0\n", valid_toml());
        let path = write_config(&dir, &toml);
        unsafe { set_env(CLIENT_SECRET_ENV, "s") };

        let err = Config::load(&path).unwrap_err();
        unsafe { remove_env(CLIENT_SECRET_ENV) };
        assert!(err.to_string().contains("timeout_secs"), "got: {err}");
    }

    #[test]
    fn test_bad_scheme_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[sso]\nbase_url = \"sso.example.com\"\nclient_id = \"c\"\nredirect_uri = \"https://a/cb\"\n",
        );
        assert!(matches!(
            Config::load(&path),
            Err(common::Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/sesame-sso.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(Config::load(&path), Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_resolve_path_prefers_cli() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/etc/from-env.toml") };
        assert_eq!(
            Config::resolve_path(Some("/tmp/cli.toml")),
            PathBuf::from("/tmp/cli.toml")
        );
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("/etc/from-env.toml")
        );
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("sesame-sso.toml"));
    }
}
