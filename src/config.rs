use std::path::PathBuf;

/// Runtime configuration, read once at startup from the environment
/// (with `.env` support via `dotenv`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of all served media. Users live under `<data_dir>/users`,
    /// shared pools under `<data_dir>/interfaith` and `<data_dir>/videos`.
    pub data_dir: PathBuf,
    pub database_url: String,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            data_dir: dotenv::var("TIDEPOOL_DATA_DIR")
                .unwrap_or_else(|_| "data".to_owned())
                .into(),
            database_url: dotenv::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:appdata.sqlite3?mode=rwc".to_owned()),
            bind_addr: dotenv::var("TIDEPOOL_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
        }
    }

    pub fn users_dir(&self) -> PathBuf {
        self.data_dir.join("users")
    }

    pub fn interfaith_dir(&self) -> PathBuf {
        self.data_dir.join("interfaith")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.data_dir.join("videos")
    }
}

#[cfg(test)]
impl Config {
    pub(crate) fn for_tests(data_dir: &std::path::Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            database_url: "sqlite::memory:".to_owned(),
            bind_addr: "127.0.0.1:0".to_owned(),
        }
    }
}
