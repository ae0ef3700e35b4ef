use std::path::PathBuf;

/// Where afkbot keeps its files.
///
/// On macOS and Linux this follows the XDG base directories:
/// - Config: $XDG_CONFIG_HOME/{name} (default: ~/.config/{name})
/// - Data: $XDG_DATA_HOME/{name} (default: ~/.local/share/{name})
///
/// On Windows both live under %APPDATA%\{name}.
pub struct ProjectPaths {
    name: String,
}

impl ProjectPaths {
    /// Returns `None` when no home directory can be determined.
    pub fn new(name: &str) -> Option<Self> {
        home_dir()?;
        Some(ProjectPaths {
            name: name.to_string(),
        })
    }

    pub fn config_dir(&self) -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            self.windows_dir()
        }

        #[cfg(not(target_os = "windows"))]
        {
            xdg_dir("XDG_CONFIG_HOME", &[".config"]).join(&self.name)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            self.windows_dir()
        }

        #[cfg(not(target_os = "windows"))]
        {
            xdg_dir("XDG_DATA_HOME", &[".local", "share"]).join(&self.name)
        }
    }

    /// Directory for rotated log files, inside the data directory.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    #[cfg(target_os = "windows")]
    fn windows_dir(&self) -> PathBuf {
        std::env::var("APPDATA")
            .ok()
            .map(|p| PathBuf::from(p).join(&self.name))
            .unwrap_or_else(|| PathBuf::from(format!(".{}", self.name)))
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}

/// Resolve an XDG directory: the env var if set, else `$HOME/<fallback>`,
/// else `<fallback>` relative to the working directory.
#[cfg(not(target_os = "windows"))]
fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    let relative: PathBuf = fallback.iter().collect();
    std::env::var(var)
        .ok()
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|h| h.join(&relative)))
        .unwrap_or(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_contain_name() {
        if let Some(paths) = ProjectPaths::new("afkbot") {
            assert!(paths.config_dir().to_string_lossy().contains("afkbot"));
            assert!(paths.data_dir().to_string_lossy().contains("afkbot"));
        }
    }

    #[test]
    fn test_log_dir_is_under_data_dir() {
        if let Some(paths) = ProjectPaths::new("afkbot") {
            assert!(paths.log_dir().starts_with(paths.data_dir()));
            assert!(paths.log_dir().ends_with("logs"));
        }
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn test_xdg_fallback_joins_segments() {
        let dir = xdg_dir("AFKBOT_TEST_UNSET_XDG_VAR", &[".local", "share"]);
        let dir_str = dir.to_string_lossy();
        assert!(dir_str.ends_with(".local/share"));
    }
}
