use crate::error::{PipeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Random port debugging endpoint. Meaningless once the pipe is in use.
pub const REMOTE_DEBUGGING_PORT: &str = "remote-debugging-port";
/// Tells the browser to speak the protocol over fds 3/4 (or the handles below).
pub const REMOTE_DEBUGGING_PIPE: &str = "remote-debugging-pipe";
/// Windows only: `<read handle>,<write handle>` of the child's pipe ends.
pub const REMOTE_DEBUGGING_IO_PIPES: &str = "remote-debugging-io-pipes";
/// Internal marker for the zombie-reaping helper. Never reaches the command line.
pub const LEAKLESS: &str = "launcher-leakless";
pub const USER_DATA_DIR: &str = "user-data-dir";
pub const PROFILE_DIRECTORY: &str = "profile-directory";
pub const HEADLESS: &str = "headless";
pub const NO_SANDBOX: &str = "no-sandbox";

/// Flags with this prefix configure the launcher itself and are skipped by
/// [`Flags::format`].
pub const INTERNAL_PREFIX: &str = "launcher-";

/// Command-line flags for the browser process.
///
/// Flags are kept sorted by name so the formatted argument list is stable.
/// Positional arguments keep their insertion order and always come last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flags {
    #[serde(default)]
    flags: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    arguments: Vec<String>,
}

fn normalize(name: &str) -> String {
    name.trim_start_matches('-').to_string()
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    /// The flag set a headless automation browser is normally started with.
    pub fn default_browser() -> Self {
        let mut flags = Self::new();
        flags.set(REMOTE_DEBUGGING_PORT, ["0"]);
        flags.enable(LEAKLESS);
        flags.enable(HEADLESS);
        for name in [
            "no-first-run",
            "no-startup-window",
            "disable-dev-shm-usage",
            "disable-background-networking",
            "disable-background-timer-throttling",
            "disable-backgrounding-occluded-windows",
            "disable-breakpad",
            "disable-client-side-phishing-detection",
            "disable-component-extensions-with-background-pages",
            "disable-default-apps",
            "disable-hang-monitor",
            "disable-ipc-flooding-protection",
            "disable-popup-blocking",
            "disable-prompt-on-repost",
            "disable-renderer-backgrounding",
            "disable-site-isolation-trials",
            "disable-sync",
            "enable-automation",
            "metrics-recording-only",
            "use-mock-keychain",
        ] {
            flags.enable(name);
        }
        flags.set("disable-features", ["site-per-process", "TranslateUI"]);
        flags.set("enable-features", ["NetworkService", "NetworkServiceInProcess"]);
        flags.set("force-color-profile", ["srgb"]);

        if in_container() {
            flags.enable(NO_SANDBOX);
        }
        flags
    }

    /// Set a flag, replacing any previous values.
    pub fn set<S: ToString, I: IntoIterator<Item = S>>(&mut self, name: &str, values: I) -> &mut Self {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.flags.insert(normalize(name), values);
        self
    }

    /// Set a flag that carries no value.
    pub fn enable(&mut self, name: &str) -> &mut Self {
        self.flags.insert(normalize(name), Vec::new());
        self
    }

    /// Add values to a flag, creating it if needed.
    pub fn append<S: ToString, I: IntoIterator<Item = S>>(&mut self, name: &str, values: I) -> &mut Self {
        self.flags
            .entry(normalize(name))
            .or_default()
            .extend(values.into_iter().map(|v| v.to_string()));
        self
    }

    /// Remove a flag. Returns whether it was present.
    pub fn delete(&mut self, name: &str) -> bool {
        self.flags.remove(&normalize(name)).is_some()
    }

    pub fn has(&self, name: &str) -> bool {
        self.flags.contains_key(&normalize(name))
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.flags.get(&normalize(name)).map(Vec::as_slice)
    }

    pub fn push_argument<S: ToString>(&mut self, argument: S) -> &mut Self {
        self.arguments.push(argument.to_string());
        self
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    /// Render the argument list handed to the browser.
    ///
    /// Must only run once every flag for the launch is in place; on Windows
    /// that includes the handle pair added while binding the child pipes.
    pub fn format(&self) -> Result<Vec<String>> {
        let mut args = Vec::with_capacity(self.flags.len() + self.arguments.len());

        for (name, values) in &self.flags {
            if name.starts_with(INTERNAL_PREFIX) {
                continue;
            }

            // Chromium hangs on a relative profile path.
            if name == USER_DATA_DIR {
                if let Some(dir) = values.first() {
                    let abs = std::path::absolute(dir).map_err(|e| {
                        PipeError::Configuration(format!("invalid {USER_DATA_DIR} {dir}: {e}"))
                    })?;
                    args.push(format!("--{name}={}", abs.display()));
                    continue;
                }
            }

            if values.is_empty() {
                args.push(format!("--{name}"));
            } else {
                args.push(format!("--{name}={}", values.join(",")));
            }
        }

        args.extend(self.arguments.iter().cloned());
        Ok(args)
    }
}

/// Best-effort detection of a container runtime, where the sandbox can't start.
pub fn in_container() -> bool {
    Path::new("/.dockerenv").exists() || Path::new("/run/.containerenv").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sorted_with_values() {
        let mut flags = Flags::new();
        flags
            .enable("headless")
            .set("window-size", [800, 600])
            .enable("disable-gpu");

        assert_eq!(
            flags.format().unwrap(),
            vec!["--disable-gpu", "--headless", "--window-size=800,600"]
        );
    }

    #[test]
    fn test_internal_flags_are_not_formatted() {
        let mut flags = Flags::new();
        flags.enable(LEAKLESS).enable(REMOTE_DEBUGGING_PIPE);

        assert_eq!(flags.format().unwrap(), vec!["--remote-debugging-pipe"]);
    }

    #[test]
    fn test_arguments_follow_flags_in_order() {
        let mut flags = Flags::new();
        flags
            .enable("incognito")
            .push_argument("about:blank")
            .push_argument("-c");

        assert_eq!(
            flags.format().unwrap(),
            vec!["--incognito", "about:blank", "-c"]
        );
    }

    #[test]
    fn test_user_data_dir_is_absolute() {
        let mut flags = Flags::new();
        flags.set(USER_DATA_DIR, ["profile"]);

        let args = flags.format().unwrap();
        let value = args[0].strip_prefix("--user-data-dir=").unwrap();
        assert!(Path::new(value).is_absolute());
        assert!(value.ends_with("profile"));
    }

    #[test]
    fn test_names_are_normalized() {
        let mut flags = Flags::new();
        flags.enable("--headless");

        assert!(flags.has("headless"));
        assert!(flags.delete("--headless"));
        assert!(!flags.delete("headless"));
    }

    #[test]
    fn test_names_are_sorted_and_include_internal_flags() {
        let mut flags = Flags::new();
        flags
            .enable("--window-size")
            .enable(LEAKLESS)
            .enable(HEADLESS)
            .push_argument("about:blank");

        assert_eq!(
            flags.names().collect::<Vec<_>>(),
            vec![HEADLESS, LEAKLESS, "window-size"]
        );
    }

    #[test]
    fn test_append_extends_values() {
        let mut flags = Flags::new();
        flags.append("disable-features", ["A"]).append("disable-features", ["B"]);

        assert_eq!(
            flags.get("disable-features").unwrap(),
            ["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn test_default_browser_flags() {
        let flags = Flags::default_browser();
        assert!(flags.has(HEADLESS));
        assert!(flags.has(LEAKLESS));
        assert_eq!(flags.get(REMOTE_DEBUGGING_PORT).unwrap(), ["0".to_string()]);
        assert!(!flags.has(REMOTE_DEBUGGING_PIPE));

        let args = flags.format().unwrap();
        assert!(args.iter().all(|a| !a.contains(INTERNAL_PREFIX)));
        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
    }
}
