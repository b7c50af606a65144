use std::env;
use std::path::PathBuf;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_DELAY_MIN_SECS: f64 = 5.0;
const DEFAULT_DELAY_MAX_SECS: f64 = 10.0;
const DEFAULT_DETAIL_DELAY_SECS: f64 = 0.5;
const DB_FILE_NAME: &str = "standings.sqlite";
const APP_DIR_NAME: &str = "league_standings";

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlConfig {
    /// Total feed attempts, the first one included.
    pub max_attempts: u32,
    pub retry_delay_min_secs: f64,
    pub retry_delay_max_secs: f64,
    pub task_delay_secs: f64,
    /// Fetch each new match's analysis page after its task is saved.
    pub match_details: bool,
    pub match_detail_delay_secs: f64,
    pub db_path: PathBuf,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_min_secs: DEFAULT_DELAY_MIN_SECS,
            retry_delay_max_secs: DEFAULT_DELAY_MAX_SECS,
            task_delay_secs: 0.0,
            match_details: false,
            match_detail_delay_secs: DEFAULT_DETAIL_DELAY_SECS,
            db_path: default_db_path(),
        }
    }
}

impl CrawlConfig {
    pub fn from_env() -> Self {
        let max_attempts = env::var("FEED_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
            .clamp(1, 10);
        let mut delay_min = env_secs("FEED_RETRY_DELAY_MIN_SECS", DEFAULT_DELAY_MIN_SECS);
        let mut delay_max = env_secs("FEED_RETRY_DELAY_MAX_SECS", DEFAULT_DELAY_MAX_SECS);
        if delay_max < delay_min {
            std::mem::swap(&mut delay_min, &mut delay_max);
        }
        let db_path = env::var("LEAGUE_DB_PATH")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        Self {
            max_attempts,
            retry_delay_min_secs: delay_min,
            retry_delay_max_secs: delay_max,
            task_delay_secs: env_secs("TASK_DELAY_SECS", 0.0),
            match_details: env_flag("MATCH_DETAILS"),
            match_detail_delay_secs: env_secs("MATCH_DETAIL_DELAY_SECS", DEFAULT_DETAIL_DELAY_SECS),
            db_path,
        }
    }
}

/// Non-negative, finite seconds; anything else falls back to `default`.
fn env_secs(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("XDG_DATA_HOME")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir).join(APP_DIR_NAME);
    }
    if let Ok(home) = env::var("HOME")
        && !home.trim().is_empty()
    {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR_NAME);
    }
    PathBuf::from(".").join(APP_DIR_NAME)
}

pub fn default_db_path() -> PathBuf {
    app_data_dir().join(DB_FILE_NAME)
}
