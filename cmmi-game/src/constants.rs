//! Centralized constants for the CMMI game suite.
//!
//! Storage keys, timing defaults and identity limits live here so the
//! persisted layout can only change through reviewed code.

// Storage keys -------------------------------------------------------------
pub const DEFAULT_STORAGE_PREFIX: &str = "cmmi";
pub(crate) const SCORES_KEY_SUFFIX: &str = "scores";
pub(crate) const PLAYERS_KEY_SUFFIX: &str = "players";
pub(crate) const PLAYER_NAME_KEY_SUFFIX: &str = "player_name";
pub(crate) const PLAYER_ID_KEY_SUFFIX: &str = "player_id";

// Timing -------------------------------------------------------------------
/// Upper bound on cross-context staleness for the local store.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 300;
pub const TIMER_WARNING_SECS: u32 = 60;
pub const TIMER_CRITICAL_SECS: u32 = 30;

// Identity -----------------------------------------------------------------
pub const MAX_PLAYER_NAME_LEN: usize = 20;

// Admin --------------------------------------------------------------------
pub const DEFAULT_ADMIN_SECRET: &str = "admin123";
pub const DEFAULT_LEADERBOARD_SIZE: usize = 3;

// Durable backend ----------------------------------------------------------
pub(crate) const PLACEHOLDER_PROJECT_ID: &str = "your-project-id";
pub(crate) const PLACEHOLDER_API_KEY: &str = "your-api-key";

// Environment overrides ----------------------------------------------------
pub const ENV_PROJECT_ID: &str = "CMMI_PROJECT_ID";
pub const ENV_API_KEY: &str = "CMMI_API_KEY";
pub const ENV_ADMIN_SECRET: &str = "CMMI_ADMIN_SECRET";
pub const ENV_GATING_POLICY: &str = "CMMI_GATING_POLICY";
pub const ENV_POLL_INTERVAL_MS: &str = "CMMI_POLL_INTERVAL_MS";

// Progression --------------------------------------------------------------
pub const MAX_LEVEL: u8 = 5;
