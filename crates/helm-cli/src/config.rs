//! Configuration vault – reads/writes `~/.helm/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Persisted user configuration stored in `~/.helm/config.toml`.
///
/// The API key is held in plain text on disk, so the file is written with
/// owner-only permissions and the in-memory copy is zeroized on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Config {
    /// HTTP base URL of the remote actuator orchestrator.
    #[serde(default = "default_orchestrator_url")]
    pub orchestrator_url: String,

    /// Model used for planning, judging, vision, and semantics.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the structured-completion endpoint.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    /// API key for the completion service. When empty every LLM-backed
    /// call degrades to its documented safe default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("orchestrator_url", &self.orchestrator_url)
            .field("model", &self.model)
            .field("llm_base_url", &self.llm_base_url)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .finish()
    }
}

fn default_orchestrator_url() -> String {
    "http://127.0.0.1:5055".to_string()
}
fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator_url: default_orchestrator_url(),
            model: default_model(),
            llm_base_url: default_llm_base_url(),
            api_key: String::new(),
        }
    }
}

/// Return the path to `~/.helm/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".helm").join("config.toml")
}

/// Load the config from disk with env overrides applied. Returns the
/// defaults (still env-overridden) when the file does not exist.
pub fn load() -> Result<Config, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Config, String> {
    let mut cfg = if path.exists() {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `HELM_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `HELM_ORCHESTRATOR_URL` | `orchestrator_url` |
/// | `HELM_MODEL` | `model` |
/// | `HELM_LLM_BASE_URL` | `llm_base_url` |
/// | `HELM_API_KEY` / `OPENAI_API_KEY` | `api_key` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("HELM_ORCHESTRATOR_URL") {
        cfg.orchestrator_url = v;
    }
    if let Ok(v) = std::env::var("HELM_MODEL") {
        cfg.model = v;
    }
    if let Ok(v) = std::env::var("HELM_LLM_BASE_URL") {
        cfg.llm_base_url = v;
    }
    for key in ["HELM_API_KEY", "OPENAI_API_KEY"] {
        if let Ok(v) = std::env::var(key) {
            if !v.trim().is_empty() {
                cfg.api_key = v;
                break;
            }
        }
    }
}

/// Save the config to disk, creating `~/.helm/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Write the file with owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_api_key() {
        let mut cfg = Config::default();
        cfg.api_key = "sk-super-secret".to_string();
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("sk-super-secret"), "api key must not appear in debug output");
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn config_debug_shows_not_set_for_empty_key() {
        let cfg = Config::default();
        assert!(format!("{:?}", cfg).contains("<not set>"));
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        // Parse the file directly so concurrent env-override tests cannot
        // interfere with the assertion.
        let raw = std::fs::read_to_string(&path).expect("read");
        let loaded: Config = toml::from_str(&raw).expect("parse");
        assert_eq!(loaded.orchestrator_url, "http://127.0.0.1:5055");
        assert_eq!(loaded.model, "gpt-4.1-mini");
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn config_path_points_to_helm_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".helm"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let cfg = load_from(&path).expect("no error");
        // llm_base_url has no env-override test touching it concurrently.
        assert_eq!(cfg.llm_base_url, Config::default().llm_base_url);
    }

    #[test]
    fn apply_env_overrides_changes_orchestrator_url() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("HELM_ORCHESTRATOR_URL", "http://robot-host:5055") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.orchestrator_url, "http://robot-host:5055");
        unsafe { std::env::remove_var("HELM_ORCHESTRATOR_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_model() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("HELM_MODEL", "gpt-4.1") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.model, "gpt-4.1");
        unsafe { std::env::remove_var("HELM_MODEL") };
    }

    #[test]
    fn api_key_env_precedence_and_blank_handling() {
        // SAFETY: single test owns these env vars; no data races.
        unsafe {
            std::env::set_var("HELM_API_KEY", "helm-key");
            std::env::set_var("OPENAI_API_KEY", "openai-key");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.api_key, "helm-key");

        // A blank primary key falls through to the secondary.
        unsafe { std::env::set_var("HELM_API_KEY", "   ") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.api_key, "openai-key");

        unsafe {
            std::env::remove_var("HELM_API_KEY");
            std::env::remove_var("OPENAI_API_KEY");
        }
    }
}
