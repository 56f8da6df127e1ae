//! Utility functions for directory management and input loading
//!
//! Directories follow the XDG Base Directory specification:
//!
//! - Data: `~/.local/share/chainfold/` - config and saved snapshots
//! - State: `~/.local/state/chainfold/` - log file
//!
//! # Example
//!
//! ```
//! use chainfold::utils::{get_data_dir, ensure_dirs};
//!
//! ensure_dirs().expect("Failed to create directories");
//!
//! if let Some(data_path) = get_data_dir() {
//!     // Load snapshots from data_path
//! }
//! ```

use directories::ProjectDirs;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

/// Environment variable overriding the data directory (used by tests and
/// containerized runs without a home directory)
pub const DATA_DIR_ENV: &str = "CHAINFOLD_DATA_DIR";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "chainfold", "chainfold")
}

pub fn get_data_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    project_dirs().map(|pd| pd.data_dir().to_path_buf())
}

pub fn get_state_dir() -> Option<PathBuf> {
    project_dirs().and_then(|pd| pd.state_dir().map(std::path::Path::to_path_buf))
}

pub fn ensure_dirs() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        let mut builder = DirBuilder::new();
        builder.mode(0o700); // User read/write/execute only
        builder.recursive(true);

        if let Some(dir) = get_data_dir() {
            builder.create(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            builder.create(dir)?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(dir) = get_data_dir() {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            std::fs::create_dir_all(dir)?;
        }
    }

    Ok(())
}

/// Reads a whole input file, or stdin when `path` is `-`.
pub async fn read_input(path: &str) -> std::io::Result<String> {
    if path == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        Ok(text)
    } else {
        tokio::fs::read_to_string(path).await
    }
}
