//! Platform detection and native binary naming.

use crate::error::{Error, Result};

/// OS families a native binary is shipped for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Every supported platform.
    pub const ALL: [Platform; 3] = [Self::Linux, Self::MacOs, Self::Windows];

    /// Maps an OS name ("linux", "Mac OS X", "Windows 10", ...) to a platform.
    ///
    /// Matching is case-insensitive. Names outside the three families are
    /// rejected rather than guessed.
    pub fn from_os_name(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        if lower.contains("nux") || lower.contains("nix") {
            Ok(Self::Linux)
        } else if lower.contains("mac") || lower.contains("darwin") {
            Ok(Self::MacOs)
        } else if lower.contains("windows") {
            Ok(Self::Windows)
        } else {
            Err(Error::UnsupportedPlatform(name.to_string()))
        }
    }

    /// Returns the platform of the running process.
    pub fn current() -> Result<Self> {
        Self::from_os_name(std::env::consts::OS)
    }

    /// File name of the native binary for this platform.
    pub fn library_name(self) -> &'static str {
        match self {
            Self::Linux => "libopus-jni-native.so",
            Self::MacOs => "libopus-jni-native.dylib",
            Self::Windows => "opus-jni-native.dll",
        }
    }
}

/// Returns the native binary name for the running platform.
pub fn resolve_library_name() -> Result<&'static str> {
    Platform::current().map(Platform::library_name)
}

/// Returns the native binary name for an OS name.
pub fn resolve_library_name_for(os_name: &str) -> Result<&'static str> {
    Platform::from_os_name(os_name).map(Platform::library_name)
}
