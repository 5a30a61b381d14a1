use crate::error::{PipeError, Result};
use crate::flags::{
    Flags, LEAKLESS, PROFILE_DIRECTORY, REMOTE_DEBUGGING_PIPE, REMOTE_DEBUGGING_PORT,
    USER_DATA_DIR,
};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Executable names probed on `PATH` when no binary is configured.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "msedge",
];

/// Everything needed to start one browser process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into, strip_option))]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Browser executable. Looked up on `PATH` when unset.
    #[builder(default)]
    pub bin: Option<PathBuf>,
    #[builder(default = "Flags::default_browser()")]
    #[builder(setter(custom))]
    pub flags: Flags,
    #[builder(default)]
    pub working_dir: Option<PathBuf>,
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
    /// Written to the profile's `Preferences` file before launch.
    #[builder(default)]
    pub preferences: Option<serde_json::Value>,
    /// Inherit the child's stdout/stderr instead of discarding them.
    #[builder(default)]
    pub forward_output: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            bin: None,
            flags: Flags::default_browser(),
            working_dir: None,
            env: HashMap::new(),
            preferences: None,
            forward_output: false,
        }
    }
}

impl LaunchConfig {
    pub fn builder() -> LaunchConfigBuilder {
        LaunchConfigBuilder::default()
    }

    /// Default configuration switched over to pipe transport.
    pub fn pipe_mode() -> Self {
        let mut config = Self::default();
        config.use_pipe();
        config
    }

    /// Drop the port and leakless flags and ask for the debugging pipe.
    pub fn use_pipe(&mut self) -> &mut Self {
        self.flags.delete(REMOTE_DEBUGGING_PORT);
        self.flags.delete(LEAKLESS);
        self.flags.enable(REMOTE_DEBUGGING_PIPE);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.flags.has(REMOTE_DEBUGGING_PIPE) && self.flags.has(REMOTE_DEBUGGING_PORT) {
            return Err(PipeError::Configuration(format!(
                "--{REMOTE_DEBUGGING_PIPE} cannot be combined with --{REMOTE_DEBUGGING_PORT}"
            )));
        }

        if let Some(bin) = &self.bin {
            if bin.as_os_str().is_empty() {
                return Err(PipeError::Configuration("bin must not be empty".to_string()));
            }
        }

        Ok(())
    }

    pub fn user_data_dir(&self) -> Option<&Path> {
        self.flags
            .get(USER_DATA_DIR)
            .and_then(|values| values.first())
            .map(Path::new)
    }

    /// The configured binary, or the first well-known browser found on `PATH`.
    pub fn resolve_bin(&self) -> Result<PathBuf> {
        if let Some(bin) = &self.bin {
            return Ok(bin.clone());
        }

        let path = std::env::var_os("PATH").ok_or(PipeError::MissingBinary)?;
        for dir in std::env::split_paths(&path) {
            for name in BROWSER_CANDIDATES {
                let candidate = dir.join(name).with_extension(std::env::consts::EXE_EXTENSION);
                if candidate.is_file() {
                    debug!(bin = %candidate.display(), "Resolved browser executable from PATH");
                    return Ok(candidate);
                }
            }
        }

        Err(PipeError::MissingBinary)
    }

    /// Write the preferences file into the profile directory.
    ///
    /// Does nothing unless both preferences and a user data dir are set.
    pub fn write_preferences(&self) -> Result<()> {
        let (Some(preferences), Some(user_dir)) = (&self.preferences, self.user_data_dir()) else {
            return Ok(());
        };

        let profile = self
            .flags
            .get(PROFILE_DIRECTORY)
            .and_then(|values| values.first())
            .map(String::as_str)
            .unwrap_or("Default");

        let profile_dir = user_dir.join(profile);
        std::fs::create_dir_all(&profile_dir)
            .map_err(|e| PipeError::Preferences(format!("{}: {e}", profile_dir.display())))?;

        let path = profile_dir.join("Preferences");
        let body = serde_json::to_vec(preferences)
            .map_err(|e| PipeError::Preferences(e.to_string()))?;
        std::fs::write(&path, body)
            .map_err(|e| PipeError::Preferences(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), "Wrote browser preferences");
        Ok(())
    }
}

impl LaunchConfigBuilder {
    /// Replace the whole flag set.
    pub fn flags(&mut self, flags: Flags) -> &mut Self {
        self.flags = Some(flags);
        self
    }

    pub fn flag(&mut self, name: &str) -> &mut Self {
        self.flags
            .get_or_insert_with(Flags::default_browser)
            .enable(name);
        self
    }

    pub fn flag_values<S: ToString, I: IntoIterator<Item = S>>(
        &mut self,
        name: &str,
        values: I,
    ) -> &mut Self {
        self.flags
            .get_or_insert_with(Flags::default_browser)
            .set(name, values);
        self
    }

    pub fn remove_flag(&mut self, name: &str) -> &mut Self {
        self.flags
            .get_or_insert_with(Flags::default_browser)
            .delete(name);
        self
    }

    pub fn argument<S: ToString>(&mut self, argument: S) -> &mut Self {
        self.flags
            .get_or_insert_with(Flags::default_browser)
            .push_argument(argument);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());
        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::HEADLESS;

    #[test]
    fn test_default_config() {
        let config = LaunchConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.flags.has(REMOTE_DEBUGGING_PORT));
        assert!(!config.forward_output);
    }

    #[test]
    fn test_pipe_mode_config() {
        let config = LaunchConfig::pipe_mode();
        assert!(config.validate().is_ok());
        assert!(config.flags.has(REMOTE_DEBUGGING_PIPE));
        assert!(!config.flags.has(REMOTE_DEBUGGING_PORT));
        assert!(!config.flags.has(LEAKLESS));
        assert!(config.flags.has(HEADLESS));
    }

    #[test]
    fn test_port_and_pipe_conflict() {
        let mut config = LaunchConfig::default();
        config.flags.enable(REMOTE_DEBUGGING_PIPE);
        assert!(matches!(config.validate(), Err(PipeError::Configuration(_))));
    }

    #[test]
    fn test_builder() {
        let config = LaunchConfig::builder()
            .bin("/usr/bin/chromium")
            .flag("incognito")
            .remove_flag(HEADLESS)
            .argument("about:blank")
            .env("LANG", "C")
            .forward_output(true)
            .build()
            .unwrap();

        assert_eq!(config.bin.as_deref(), Some(Path::new("/usr/bin/chromium")));
        assert!(config.flags.has("incognito"));
        assert!(!config.flags.has(HEADLESS));
        assert_eq!(config.flags.arguments(), ["about:blank".to_string()]);
        assert_eq!(config.env.get("LANG").map(String::as_str), Some("C"));
        assert!(config.forward_output);
    }

    #[test]
    fn test_builder_env_multi_merges_with_env() {
        let config = LaunchConfig::builder()
            .env("LANG", "C")
            .env_multi([("TZ", "UTC"), ("LANG", "en_US.UTF-8")])
            .build()
            .unwrap();

        assert_eq!(config.env.len(), 2);
        assert_eq!(config.env.get("TZ").map(String::as_str), Some("UTC"));
        assert_eq!(config.env.get("LANG").map(String::as_str), Some("en_US.UTF-8"));
    }

    #[test]
    fn test_builder_with_explicit_flags() {
        let config = LaunchConfig::builder()
            .bin("sh")
            .flags(Flags::new())
            .argument("-c")
            .argument("exit 0")
            .build()
            .unwrap();

        assert_eq!(config.flags.format().unwrap(), vec!["-c", "exit 0"]);
    }

    #[test]
    fn test_resolve_configured_bin() {
        let config = LaunchConfig::builder().bin("/opt/browser").build().unwrap();
        assert_eq!(config.resolve_bin().unwrap(), PathBuf::from("/opt/browser"));
    }

    #[test]
    fn test_write_preferences() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LaunchConfig::default();
        config.flags.set(USER_DATA_DIR, [dir.path().display()]);
        config.flags.set(PROFILE_DIRECTORY, ["Work"]);
        config.preferences = Some(serde_json::json!({ "intl": { "accept_languages": "en" } }));

        config.write_preferences().unwrap();

        let written = std::fs::read_to_string(dir.path().join("Work").join("Preferences")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["intl"]["accept_languages"], "en");
    }

    #[test]
    fn test_write_preferences_without_user_dir_is_noop() {
        let config = LaunchConfig {
            preferences: Some(serde_json::json!({})),
            ..Default::default()
        };
        assert!(config.write_preferences().is_ok());
    }

    #[test]
    fn test_serialization() {
        let config = LaunchConfig::pipe_mode();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: LaunchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);

        let partial: LaunchConfig = serde_json::from_str(r#"{"bin":"/bin/true"}"#).unwrap();
        assert_eq!(partial.bin, Some(PathBuf::from("/bin/true")));
        assert!(partial.flags.has(HEADLESS));
    }
}
