// src/config.rs

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

/// Question-bank sets in the order they are scanned when a mock exam is assembled.
pub const DEFAULT_QUESTION_SETS: [&str; 6] = [
    "questions",
    "questions1",
    "questions2",
    "questions3",
    "questions4",
    "questions6",
];

/// Number of questions in a mock exam.
pub const MOCK_QUESTION_COUNT: usize = 57;

/// Mock exam time budget: 90 minutes.
pub const MOCK_DURATION_SECS: u32 = 90 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub bind_addr: String,
    pub question_bank_dir: PathBuf,
    pub question_sets: Vec<String>,
    pub mock_question_count: usize,
    pub mock_duration_secs: u32,
    pub mock_test_name: String,
    pub session_ttl_secs: i64,
    /// How long a finished exam stays in memory after its result was saved.
    pub finished_exam_ttl_secs: u64,
    /// When set, the local session cache survives restarts in this JSON file.
    pub local_cache_path: Option<PathBuf>,
    /// How often pending cache changes are written to `local_cache_path`.
    pub local_cache_flush_ms: u64,
    pub admin_register_no: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            rust_log: "info".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            question_bank_dir: PathBuf::from("data"),
            question_sets: DEFAULT_QUESTION_SETS.iter().map(|s| s.to_string()).collect(),
            mock_question_count: MOCK_QUESTION_COUNT,
            mock_duration_secs: MOCK_DURATION_SECS,
            mock_test_name: "Oracle SQL Mock Test".to_string(),
            session_ttl_secs: 7 * 24 * 60 * 60,
            finished_exam_ttl_secs: 30 * 60,
            local_cache_path: None,
            local_cache_flush_ms: 1000,
            admin_register_no: None,
            admin_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let defaults = Self::default();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let question_sets = env::var("QUESTION_SETS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|sets| !sets.is_empty())
            .unwrap_or(defaults.question_sets);

        Self {
            database_url,
            rust_log: env::var("RUST_LOG").unwrap_or(defaults.rust_log),
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            question_bank_dir: env::var("QUESTION_BANK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.question_bank_dir),
            question_sets,
            mock_question_count: parse_var("MOCK_QUESTION_COUNT", defaults.mock_question_count),
            mock_duration_secs: parse_var("MOCK_DURATION_SECS", defaults.mock_duration_secs),
            mock_test_name: env::var("MOCK_TEST_NAME").unwrap_or(defaults.mock_test_name),
            session_ttl_secs: parse_var("SESSION_TTL_SECS", defaults.session_ttl_secs),
            finished_exam_ttl_secs: parse_var(
                "FINISHED_EXAM_TTL_SECS",
                defaults.finished_exam_ttl_secs,
            ),
            local_cache_path: env::var("LOCAL_CACHE_PATH").ok().map(PathBuf::from),
            local_cache_flush_ms: parse_var("LOCAL_CACHE_FLUSH_MS", defaults.local_cache_flush_ms),
            admin_register_no: env::var("ADMIN_REGISTER_NO").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        }
    }

    /// Display label of a practice set, e.g. `questions1` -> "Practice Set 2".
    pub fn practice_label(&self, set: &str) -> Option<String> {
        self.question_sets
            .iter()
            .position(|s| s == set)
            .map(|idx| format!("Practice Set {}", idx + 1))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
