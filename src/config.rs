use std::path::{Path, PathBuf};

/// Explicit database file.
pub const DB_ENV: &str = "REQLOGSTATS_DB";
/// Directory holding one `reqlogstats-<year>.db` per year.
pub const DB_DIR_ENV: &str = "REQLOGSTATS_DB_DIR";

pub fn db_file_name(year: i32) -> String {
    format!("reqlogstats-{year}.db")
}

pub fn default_db_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reqlogstats")
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(stripped) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(raw)
}

/// Database for a report on `year`, from flags first, then the environment.
pub fn resolve_db_path(db_path: Option<&Path>, db_dir: Option<&Path>, year: i32) -> PathBuf {
    resolve_db_path_with(db_path, db_dir, year, |key| std::env::var(key).ok())
}

fn resolve_db_path_with(
    db_path: Option<&Path>,
    db_dir: Option<&Path>,
    year: i32,
    env: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(path) = db_path {
        return path.to_path_buf();
    }
    if let Some(path) = env(DB_ENV) {
        return expand_home(&path);
    }
    let dir = match db_dir {
        Some(dir) => dir.to_path_buf(),
        None => env(DB_DIR_ENV)
            .map(|dir| expand_home(&dir))
            .unwrap_or_else(default_db_dir),
    };
    dir.join(db_file_name(year))
}
