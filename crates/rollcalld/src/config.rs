use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the embedding encryption key file (created on first run).
    pub key_path: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Whether to run the anti-spoof check on the primary model.
    pub antispoof: bool,
    /// Whether the fallback-model retry also runs the anti-spoof check.
    /// Off by default: the fallback path historically skipped it, and
    /// the switch makes that behavior an explicit operator choice.
    pub spoof_check_on_fallback: bool,
    /// Name of the primary embedding model.
    pub primary_model: String,
    /// Provider helper command for the primary model.
    pub primary_command: String,
    /// Name of the fallback embedding model, when one is configured.
    pub fallback_model: Option<String>,
    /// Provider helper command for the fallback model.
    pub fallback_command: Option<String>,
    /// Upper bound on batch-extraction workers (also capped by cores).
    pub batch_workers: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let key_path = std::env::var("ROLLCALL_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("embedding.key"));

        let fallback_command = std::env::var("ROLLCALL_FALLBACK_CMD").ok();

        Self {
            db_path,
            key_path,
            similarity_threshold: env_f32("ROLLCALL_SIMILARITY_THRESHOLD", 0.40),
            antispoof: env_bool("ROLLCALL_ANTISPOOF", true),
            spoof_check_on_fallback: env_bool("ROLLCALL_SPOOF_ON_FALLBACK", false),
            primary_model: std::env::var("ROLLCALL_PRIMARY_MODEL")
                .unwrap_or_else(|_| "insightface".to_string()),
            primary_command: std::env::var("ROLLCALL_PRIMARY_CMD")
                .unwrap_or_else(|_| "/usr/libexec/rollcall-provider-insightface".to_string()),
            fallback_model: fallback_command.is_some().then(|| {
                std::env::var("ROLLCALL_FALLBACK_MODEL")
                    .unwrap_or_else(|_| "deepface".to_string())
            }),
            fallback_command,
            batch_workers: env_usize("ROLLCALL_BATCH_WORKERS", 8),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}
