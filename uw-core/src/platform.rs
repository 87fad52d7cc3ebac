//! Platform detection and OS-specific directories.

use std::path::PathBuf;

use crate::constants::APP_NAME;
use crate::error::{UwError, UwResult};

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Detect the current platform at compile time.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Get the platform-specific application data directory.
    ///
    /// - Windows: `%APPDATA%/uWave`
    /// - macOS: `~/Library/Application Support/uWave`
    /// - Linux: `~/.local/share/uWave`
    pub fn data_dir() -> UwResult<PathBuf> {
        let base = dirs::data_dir()
            .ok_or_else(|| UwError::Config("could not determine data directory".into()))?;
        Ok(base.join(APP_NAME))
    }

    /// Get the platform-specific configuration directory.
    ///
    /// - Windows: `%APPDATA%/uWave`
    /// - macOS: `~/Library/Application Support/uWave`
    /// - Linux: `~/.config/uWave`
    pub fn config_dir() -> UwResult<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| UwError::Config("could not determine config directory".into()))?;
        Ok(base.join(APP_NAME))
    }

    /// Human-readable platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_platform_has_name() {
        let platform = Platform::current();
        assert!(!platform.to_string().is_empty());
    }

    #[test]
    fn test_dirs_end_with_app_name() {
        if let Ok(dir) = Platform::config_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
        if let Ok(dir) = Platform::data_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }
}
