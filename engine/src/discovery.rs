//! Locating the Stockfish binary.
//!
//! Lookup order:
//! 1. `STOCKFISH_PATH` environment variable, if it names an existing file
//! 2. Well-known install locations
//! 3. `stockfish` on `PATH`

use std::path::{Path, PathBuf};

/// Environment variable naming an explicit engine binary.
pub const STOCKFISH_PATH_ENV: &str = "STOCKFISH_PATH";

const BINARY_NAME: &str = "stockfish";

/// Find Stockfish, honouring `STOCKFISH_PATH` first.
pub fn find_stockfish_path() -> Option<PathBuf> {
    let env_override = std::env::var_os(STOCKFISH_PATH_ENV).map(PathBuf::from);
    find_stockfish_path_with(env_override.as_deref())
}

/// Same as [`find_stockfish_path`] with the override passed in explicitly.
pub fn find_stockfish_path_with(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        tracing::warn!("Engine override {:?} is not a file, falling back to search", path);
    }

    if let Some(path) = known_locations().into_iter().find(|p| p.is_file()) {
        return Some(path);
    }

    which::which(BINARY_NAME).ok()
}

/// Common install locations, checked in order.
fn known_locations() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = if cfg!(windows) {
        vec![
            r"C:\Program Files\Stockfish\stockfish.exe".into(),
            r"C:\Program Files (x86)\Stockfish\stockfish.exe".into(),
            r"C:\stockfish\stockfish.exe".into(),
        ]
    } else {
        vec![
            "/usr/bin/stockfish".into(),
            "/usr/local/bin/stockfish".into(),
            "/opt/homebrew/bin/stockfish".into(),
            "/usr/games/stockfish".into(),
        ]
    };

    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    if let Some(home) = home {
        let exe = if cfg!(windows) { "stockfish.exe" } else { "stockfish" };
        paths.push(PathBuf::from(home).join("stockfish").join(exe));
    }

    paths
}
