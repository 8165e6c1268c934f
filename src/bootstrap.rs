//! Startup environment: the per-user directory and its `.env` file.

use std::path::{Path, PathBuf};

/// `~/.wallet-session`
pub fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wallet-session")
}

pub fn env_path() -> PathBuf {
    base_dir().join(".env")
}

/// Load env vars from `~/.wallet-session/.env`.
///
/// Call this **after** `dotenvy::dotenv()` so that `./.env` takes priority.
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.wallet-session/.env`
pub fn load_env() {
    load_env_from(&env_path());
}

/// Returns whether the file existed and was loaded.
pub fn load_env_from(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match dotenvy::from_path(path) {
        Ok(()) => {
            tracing::debug!("Loaded environment from {}", path.display());
            true
        }
        Err(e) => {
            tracing::warn!("Failed to load {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn env_file_fills_unset_vars_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "WALLET_SESSION_BOOTSTRAP_A=\"from file\"\nWALLET_SESSION_BOOTSTRAP_B=file\n",
        )
        .unwrap();

        // SAFETY: Only this test touches these variables.
        unsafe {
            std::env::remove_var("WALLET_SESSION_BOOTSTRAP_A");
            std::env::set_var("WALLET_SESSION_BOOTSTRAP_B", "explicit");
        }

        assert!(load_env_from(&path));
        assert_eq!(
            std::env::var("WALLET_SESSION_BOOTSTRAP_A").unwrap(),
            "from file"
        );
        assert_eq!(
            std::env::var("WALLET_SESSION_BOOTSTRAP_B").unwrap(),
            "explicit"
        );
        assert!(!load_env_from(&dir.path().join("missing.env")));
    }

    #[test]
    fn paths_live_under_the_home_directory() {
        assert!(base_dir().ends_with(".wallet-session"));
        assert_eq!(env_path().file_name().unwrap(), ".env");
    }
}
