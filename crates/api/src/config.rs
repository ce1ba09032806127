//! Server configuration loaded from environment variables.
//!
//! All settings have defaults suitable for a local ComfyUI instance;
//! production deployments override via environment (or a `.env` file
//! loaded in `main`).

use std::path::PathBuf;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, comma-separated in `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// ComfyUI HTTP base URL (default: `http://localhost:8188`).
    pub api_base: String,
    /// ComfyUI event-channel URL (default: `ws://localhost:8188/ws`).
    pub ws_url: String,
    /// Path of the workflow template JSON.
    pub workflow_path: PathBuf,
    /// Selectable output widths.
    pub width_list: Vec<u32>,
    /// Selectable output heights.
    pub height_list: Vec<u32>,
    /// Max running jobs per client (default: 1).
    pub per_user_limit: u32,
    /// Max running jobs across all clients; 0 disables the cap.
    pub global_max_running: u32,
    /// Overall deadline for one generation round trip.
    pub request_timeout: Duration,
    /// Deadline for the fast history fetch during reconciliation.
    pub reconcile_timeout: Duration,
    /// Retention window for terminal history entries; zero keeps them.
    pub history_ttl: Duration,
    /// Optional tag dictionary JSON file for the prompt helper.
    pub tag_dictionary_path: Option<PathBuf>,
    /// Root directory for queue/history snapshots.
    pub snapshot_dir: PathBuf,
    /// Default log verbosity when `RUST_LOG` is not set.
    pub log_level: String,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `HOST`                      | `0.0.0.0`                |
    /// | `PORT`                      | `3000`                   |
    /// | `CORS_ORIGINS`              | `http://localhost:5173`  |
    /// | `COMFYUI_BASE_URL`          | `http://localhost:8188`  |
    /// | `COMFYUI_WS_URL`            | `ws://localhost:8188/ws` |
    /// | `WORKFLOW_JSON_PATH`        | `workflows/example.json` |
    /// | `WIDTH_LIST`                | `512`                    |
    /// | `HEIGHT_LIST`               | `512`                    |
    /// | `MAX_ACTIVE_REQUESTS`       | `1`                      |
    /// | `GLOBAL_MAX_ACTIVE_REQUESTS`| `0` (unlimited)          |
    /// | `REQUEST_TIMEOUT_SECS`      | `120`                    |
    /// | `RECONCILE_TIMEOUT_MS`      | `1500`                   |
    /// | `HISTORY_TTL_SECS`          | `0` (keep forever)       |
    /// | `TAG_DICTIONARY_PATH`       | unset                    |
    /// | `SNAPSHOT_DIR`              | `data/snapshots`         |
    /// | `LOG_LEVEL`                 | `info`                   |
    pub fn from_env() -> Self {
        let host = env_or("HOST", "0.0.0.0");
        let port: u16 = env_or("PORT", "3000")
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins = parse_origin_list(&env_or("CORS_ORIGINS", "http://localhost:5173"));

        let api_base = trim_url(&env_or("COMFYUI_BASE_URL", "http://localhost:8188"));
        let ws_url = trim_url(&env_or("COMFYUI_WS_URL", "ws://localhost:8188/ws"));

        let workflow_path = PathBuf::from(env_or("WORKFLOW_JSON_PATH", "workflows/example.json"));

        let width_list = parse_size_list(&env_or("WIDTH_LIST", "512"))
            .expect("WIDTH_LIST must be comma-separated positive integers");
        let height_list = parse_size_list(&env_or("HEIGHT_LIST", "512"))
            .expect("HEIGHT_LIST must be comma-separated positive integers");

        let per_user_limit: u32 = env_or("MAX_ACTIVE_REQUESTS", "1")
            .parse()
            .expect("MAX_ACTIVE_REQUESTS must be a valid u32");
        let global_max_running: u32 = env_or("GLOBAL_MAX_ACTIVE_REQUESTS", "0")
            .parse()
            .expect("GLOBAL_MAX_ACTIVE_REQUESTS must be a valid u32");

        let request_timeout = Duration::from_secs(
            env_or("REQUEST_TIMEOUT_SECS", "120")
                .parse()
                .expect("REQUEST_TIMEOUT_SECS must be a valid u64"),
        );
        let reconcile_timeout = Duration::from_millis(
            env_or("RECONCILE_TIMEOUT_MS", "1500")
                .parse()
                .expect("RECONCILE_TIMEOUT_MS must be a valid u64"),
        );
        let history_ttl = Duration::from_secs(
            env_or("HISTORY_TTL_SECS", "0")
                .parse()
                .expect("HISTORY_TTL_SECS must be a valid u64"),
        );

        let tag_dictionary_path = std::env::var("TAG_DICTIONARY_PATH")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);

        let snapshot_dir = PathBuf::from(env_or("SNAPSHOT_DIR", "data/snapshots"));
        let log_level = env_or("LOG_LEVEL", "info").to_lowercase();

        Self {
            host,
            port,
            cors_origins,
            api_base,
            ws_url,
            workflow_path,
            width_list,
            height_list,
            per_user_limit,
            global_max_running,
            request_timeout,
            reconcile_timeout,
            history_ttl,
            tag_dictionary_path,
            snapshot_dir,
            log_level,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Trim trailing slashes so URL joins stay predictable.
fn trim_url(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}

/// Parse a comma-separated list of positive integers. `None` when the
/// list is empty or any entry fails to parse.
fn parse_size_list(raw: &str) -> Option<Vec<u32>> {
    let values: Vec<u32> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.parse().ok().filter(|v| *v > 0))
        .collect::<Option<Vec<u32>>>()?;
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// Split a comma-separated origin list, dropping empty entries.
fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}
