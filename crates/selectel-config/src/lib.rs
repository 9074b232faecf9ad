//! Provider configuration
//!
//! Settings come from environment variables and an optional YAML file and
//! are validated once into a [`ProviderConfig`] before any API call.

pub mod error;
pub mod region;

pub use error::*;
pub use region::Region;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identity (Keystone v3) endpoint
pub const DEFAULT_OS_ENDPOINT: &str = "https://api.selvpc.ru/identity/v3";

/// Resell v2 API endpoint
pub const DEFAULT_RESELL_ENDPOINT: &str = "https://api.selectel.ru/vpc/resell/v2";

const CONFIG_FILE_NAME: &str = "provider.yaml";

/// Unvalidated settings as declared by the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub token: Option<String>,
    pub endpoint: Option<String>,
    pub os_endpoint: Option<String>,
    pub project_id: Option<String>,
    pub domain_name: Option<String>,
    pub region: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl RawConfig {
    /// Read settings from `SEL_*` / `OS_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            token: env("SEL_TOKEN"),
            endpoint: env("SEL_ENDPOINT"),
            os_endpoint: env("OS_AUTH_URL"),
            project_id: env("SEL_PROJECT_ID"),
            domain_name: env("OS_DOMAIN_NAME"),
            region: env("SEL_REGION"),
            user: env("OS_USERNAME"),
            password: env("OS_PASSWORD"),
        }
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: RawConfig) -> Self {
        Self {
            token: self.token.or(fallback.token),
            endpoint: self.endpoint.or(fallback.endpoint),
            os_endpoint: self.os_endpoint.or(fallback.os_endpoint),
            project_id: self.project_id.or(fallback.project_id),
            domain_name: self.domain_name.or(fallback.domain_name),
            region: self.region.or(fallback.region),
            user: self.user.or(fallback.user),
            password: self.password.or(fallback.password),
        }
    }

    /// User, password and domain name are all set.
    pub fn has_keystone_credentials(&self) -> bool {
        non_empty(&self.user).is_some()
            && non_empty(&self.password).is_some()
            && non_empty(&self.domain_name).is_some()
    }

    /// Check credentials and region, and apply endpoint defaults.
    pub fn validate(self) -> Result<ProviderConfig> {
        let token = non_empty(&self.token);
        let keystone = if self.has_keystone_credentials() {
            Some(KeystoneCredentials {
                user: self.user.clone().unwrap_or_default(),
                password: self.password.clone().unwrap_or_default(),
                domain_name: self.domain_name.clone().unwrap_or_default(),
            })
        } else {
            None
        };

        if token.is_none() && keystone.is_none() {
            return Err(ConfigError::MissingCredentials);
        }

        let region = match non_empty(&self.region) {
            Some(region) => Some(region.parse::<Region>()?),
            None => None,
        };

        Ok(ProviderConfig {
            token,
            keystone,
            endpoint: non_empty(&self.endpoint)
                .unwrap_or_else(|| DEFAULT_RESELL_ENDPOINT.to_string()),
            os_endpoint: non_empty(&self.os_endpoint)
                .unwrap_or_else(|| DEFAULT_OS_ENDPOINT.to_string()),
            project_id: non_empty(&self.project_id),
            region,
        })
    }
}

/// Keystone password credentials
#[derive(Clone, PartialEq, Eq)]
pub struct KeystoneCredentials {
    pub user: String,
    pub password: String,
    pub domain_name: String,
}

impl std::fmt::Debug for KeystoneCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoneCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .field("domain_name", &self.domain_name)
            .finish()
    }
}

/// Validated provider configuration
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub token: Option<String>,
    pub keystone: Option<KeystoneCredentials>,
    pub endpoint: String,
    pub os_endpoint: String,
    pub project_id: Option<String>,
    pub region: Option<Region>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("keystone", &self.keystone)
            .field("endpoint", &self.endpoint)
            .field("os_endpoint", &self.os_endpoint)
            .field("project_id", &self.project_id)
            .field("region", &self.region)
            .finish()
    }
}

impl ProviderConfig {
    /// Project tokens are issued through Keystone when credentials are set,
    /// otherwise through the resell API with the Selectel token.
    pub fn uses_keystone(&self) -> bool {
        self.keystone.is_some()
    }
}

/// Load configuration from the YAML file (if any) overlaid by environment
/// variables, then validate it.
pub fn load() -> Result<ProviderConfig> {
    let env = RawConfig::from_env();
    let raw = match find_config_file() {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading provider config file");
            env.or(RawConfig::from_yaml_file(&path)?)
        }
        None => env,
    };
    raw.validate()
}

/// Selectel provider config directory
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("selectel"))
}

/// Locate the provider config file
///
/// 1. `SEL_CONFIG_PATH` environment variable
/// 2. `<config dir>/selectel/provider.yaml`
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(config_path) = std::env::var("SEL_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Some(path);
        }
    }

    let path = get_config_dir().ok()?.join(CONFIG_FILE_NAME);
    path.exists().then_some(path)
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn raw(token: &str, region: &str, user: &str, password: &str, domain: &str) -> RawConfig {
        let set = |v: &str| (!v.is_empty()).then(|| v.to_string());
        RawConfig {
            token: set(token),
            region: set(region),
            user: set(user),
            password: set(password),
            domain_name: set(domain),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_ok() {
        let configs = [
            raw("secret", "ru-3", "", "", ""),
            raw("secret", "ru-3", "user", "", ""),
            raw("secret", "ru-3", "user", "password", ""),
            raw("secret", "ru-3", "user", "password", "domain"),
            raw("", "ru-3", "user", "password", "domain"),
            raw("", "", "user", "password", "domain"),
        ];

        for config in configs {
            assert!(config.clone().validate().is_ok(), "{config:?}");
        }
    }

    #[test]
    fn test_validate_missing_credentials() {
        let configs = [
            raw("", "ru-3", "", "", ""),
            raw("", "ru-3", "user", "password", ""),
            raw("", "ru-3", "user", "", "domain"),
            raw("", "", "", "password", "domain"),
        ];

        for config in configs {
            let err = config.validate().unwrap_err();
            assert_eq!(
                err.to_string(),
                "token or credentials with domain name must be specified"
            );
        }
    }

    #[test]
    fn test_validate_invalid_region() {
        let err = raw("secret", "unknown region", "", "", "")
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "region is invalid: unknown region");
    }

    #[test]
    fn test_validate_defaults() {
        let config = raw("secret", "", "", "", "").validate().unwrap();
        assert_eq!(config.endpoint, DEFAULT_RESELL_ENDPOINT);
        assert_eq!(config.os_endpoint, DEFAULT_OS_ENDPOINT);
        assert_eq!(config.region, None);
        assert!(!config.uses_keystone());
    }

    #[test]
    fn test_keystone_preferred_when_complete() {
        let config = raw("secret", "ru-1", "user", "password", "domain")
            .validate()
            .unwrap();
        assert!(config.uses_keystone());
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.region, Some(Region::Ru1));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = raw("secret", "", "user", "hunter2", "domain")
            .validate()
            .unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("secret"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("SEL_TOKEN", Some("env-token")),
                ("SEL_REGION", Some("ru-9")),
                ("SEL_PROJECT_ID", Some("p-1")),
                ("OS_USERNAME", Some("")),
            ],
            || {
                let raw = RawConfig::from_env();
                assert_eq!(raw.token.as_deref(), Some("env-token"));
                assert_eq!(raw.region.as_deref(), Some("ru-9"));
                assert_eq!(raw.project_id.as_deref(), Some("p-1"));
                assert_eq!(raw.user, None);
            },
        );
    }

    #[test]
    #[serial]
    fn test_load_env_overrides_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("provider.yaml");
        fs::write(
            &path,
            "token: file-token\nregion: ru-2\nproject_id: file-project\n",
        )
        .unwrap();

        temp_env::with_vars(
            [
                ("SEL_CONFIG_PATH", Some(path.to_str().unwrap())),
                ("SEL_TOKEN", None),
                ("SEL_REGION", Some("ru-7")),
                ("SEL_PROJECT_ID", None),
            ],
            || {
                let config = load().unwrap();
                assert_eq!(config.token.as_deref(), Some("file-token"));
                assert_eq!(config.region, Some(Region::Ru7));
                assert_eq!(config.project_id.as_deref(), Some("file-project"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_load_bad_yaml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("provider.yaml");
        fs::write(&path, "token: [unterminated").unwrap();

        temp_env::with_var("SEL_CONFIG_PATH", Some(path.to_str().unwrap()), || {
            let err = load().unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }));
        });
    }

    #[test]
    fn test_get_config_dir() {
        if let Ok(dir) = get_config_dir() {
            assert!(dir.ends_with("selectel"));
        }
    }
}
