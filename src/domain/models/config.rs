use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::features::FEATURE_DIM;

/// Main configuration structure for the decision engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Number of feature slots the bandit operates on
    #[serde(default = "default_feature_dim")]
    pub feature_dim: usize,

    /// Bandit algorithm used for selection
    #[serde(default)]
    pub algorithm: BanditAlgorithmKind,

    /// Selections that receive an exploration bonus after an arm appears
    #[serde(default = "default_exploration_boost_rounds")]
    pub exploration_boost_rounds: u32,

    /// Success rate below which an arm is watched for culling
    #[serde(default = "default_culling_threshold")]
    pub culling_threshold: f64,

    /// Activations required before culling is considered
    #[serde(default = "default_culling_min_samples")]
    pub culling_min_samples: u64,

    /// Lifetime success rate required for promotion
    #[serde(default = "default_golden_success_rate_threshold")]
    pub golden_success_rate_threshold: f64,

    /// Activations required for promotion
    #[serde(default = "default_golden_min_samples")]
    pub golden_min_samples: u64,

    /// Template registry capacity
    #[serde(default = "default_max_golden_templates")]
    pub max_golden_templates: usize,

    /// Resource name to capacity
    #[serde(default = "default_global_budget")]
    pub global_budget: BTreeMap<String, f64>,

    /// Bandit tuning
    #[serde(default)]
    pub bandit: BanditConfig,

    /// Trial ground tuning
    #[serde(default)]
    pub trial: TrialConfig,

    /// Golden template tuning
    #[serde(default)]
    pub golden: GoldenConfig,

    /// Contract verification tuning
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_feature_dim() -> usize {
    FEATURE_DIM
}

const fn default_exploration_boost_rounds() -> u32 {
    10
}

const fn default_culling_threshold() -> f64 {
    0.30
}

const fn default_culling_min_samples() -> u64 {
    15
}

const fn default_golden_success_rate_threshold() -> f64 {
    0.90
}

const fn default_golden_min_samples() -> u64 {
    20
}

const fn default_max_golden_templates() -> usize {
    50
}

fn default_global_budget() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("time_seconds".to_string(), 300.0),
        ("cost_dollars".to_string(), 5.0),
        ("api_calls".to_string(), 100.0),
        ("memory_mb".to_string(), 1024.0),
    ])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feature_dim: default_feature_dim(),
            algorithm: BanditAlgorithmKind::default(),
            exploration_boost_rounds: default_exploration_boost_rounds(),
            culling_threshold: default_culling_threshold(),
            culling_min_samples: default_culling_min_samples(),
            golden_success_rate_threshold: default_golden_success_rate_threshold(),
            golden_min_samples: default_golden_min_samples(),
            max_golden_templates: default_max_golden_templates(),
            global_budget: default_global_budget(),
            bandit: BanditConfig::default(),
            trial: TrialConfig::default(),
            golden: GoldenConfig::default(),
            verification: VerificationConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which contextual bandit drives selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BanditAlgorithmKind {
    #[default]
    Linucb,
    Thompson,
}

impl BanditAlgorithmKind {
    /// Key under which parameters are persisted
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linucb => "linucb",
            Self::Thompson => "thompson",
        }
    }
}

/// Bandit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BanditConfig {
    /// LinUCB exploration coefficient
    #[serde(default = "default_linucb_alpha")]
    pub linucb_alpha: f64,

    /// Thompson prior precision scale
    #[serde(default = "default_thompson_alpha")]
    pub thompson_alpha: f64,

    /// Thompson observation precision
    #[serde(default = "default_thompson_beta")]
    pub thompson_beta: f64,

    /// Fixed RNG seed for reproducible sampling
    #[serde(default)]
    pub seed: Option<u64>,

    /// Rewards kept for the rolling average in bandit statistics
    #[serde(default = "default_recent_reward_window")]
    pub recent_reward_window: usize,
}

const fn default_linucb_alpha() -> f64 {
    1.0
}

const fn default_thompson_alpha() -> f64 {
    1.0
}

const fn default_thompson_beta() -> f64 {
    1.0
}

const fn default_recent_reward_window() -> usize {
    100
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            linucb_alpha: default_linucb_alpha(),
            thompson_alpha: default_thompson_alpha(),
            thompson_beta: default_thompson_beta(),
            seed: None,
            recent_reward_window: default_recent_reward_window(),
        }
    }
}

/// Trial ground configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrialConfig {
    /// Peak exploration bonus, decayed over the boost rounds
    #[serde(default = "default_learned_path_bonus")]
    pub learned_path_bonus: f64,

    /// Bonus learned strategies keep after their boost runs out
    #[serde(default = "default_learned_path_permanent_bonus")]
    pub learned_path_permanent_bonus: f64,

    /// Multiple of the culling threshold that clears the watch list
    #[serde(default = "default_recovery_factor")]
    pub recovery_factor: f64,

    /// Multiple of the culling threshold counted as severe underperformance
    #[serde(default = "default_severe_factor")]
    pub severe_factor: f64,

    /// Seconds of severe underperformance on the watch list before culling
    #[serde(default = "default_watch_duration_secs")]
    pub watch_duration_secs: i64,

    /// Seconds after entering trial during which an arm cannot be culled
    #[serde(default = "default_protection_window_secs")]
    pub protection_window_secs: i64,

    /// Trailing failures that cull an arm outright
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,

    /// Activations after which a still-underperforming arm is culled
    #[serde(default = "default_max_activations_below_threshold")]
    pub max_activations_below_threshold: u64,

    /// Culled arms kept for analytics
    #[serde(default = "default_max_culled_history")]
    pub max_culled_history: usize,
}

const fn default_learned_path_bonus() -> f64 {
    0.2
}

const fn default_learned_path_permanent_bonus() -> f64 {
    0.05
}

const fn default_recovery_factor() -> f64 {
    1.2
}

const fn default_severe_factor() -> f64 {
    0.8
}

const fn default_watch_duration_secs() -> i64 {
    1800
}

const fn default_protection_window_secs() -> i64 {
    3600
}

const fn default_max_consecutive_failures() -> usize {
    10
}

const fn default_max_activations_below_threshold() -> u64 {
    50
}

const fn default_max_culled_history() -> usize {
    100
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            learned_path_bonus: default_learned_path_bonus(),
            learned_path_permanent_bonus: default_learned_path_permanent_bonus(),
            recovery_factor: default_recovery_factor(),
            severe_factor: default_severe_factor(),
            watch_duration_secs: default_watch_duration_secs(),
            protection_window_secs: default_protection_window_secs(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_activations_below_threshold: default_max_activations_below_threshold(),
            max_culled_history: default_max_culled_history(),
        }
    }
}

/// Golden template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GoldenConfig {
    /// Most recent results inspected by the stability check
    #[serde(default = "default_stability_window")]
    pub stability_window: usize,

    /// Required ratio of recent to lifetime success rate
    #[serde(default = "default_stability_ratio")]
    pub stability_ratio: f64,

    /// Minimum stability score at promotion
    #[serde(default = "default_min_stability_score")]
    pub min_stability_score: f64,

    /// Match score a template needs to short-circuit selection
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    /// Trailing failures after promotion that revoke a template
    #[serde(default = "default_revoke_after_failures")]
    pub revoke_after_failures: usize,

    /// Drop below the promotion rate by this margin revokes a template
    #[serde(default = "default_revoke_margin")]
    pub revoke_margin: f64,
}

const fn default_stability_window() -> usize {
    20
}

const fn default_stability_ratio() -> f64 {
    0.95
}

const fn default_min_stability_score() -> f64 {
    0.5
}

const fn default_match_threshold() -> f64 {
    0.85
}

const fn default_revoke_after_failures() -> usize {
    3
}

const fn default_revoke_margin() -> f64 {
    0.10
}

impl Default for GoldenConfig {
    fn default() -> Self {
        Self {
            stability_window: default_stability_window(),
            stability_ratio: default_stability_ratio(),
            min_stability_score: default_min_stability_score(),
            match_threshold: default_match_threshold(),
            revoke_after_failures: default_revoke_after_failures(),
            revoke_margin: default_revoke_margin(),
        }
    }
}

/// Contract verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VerificationConfig {
    /// Seconds a tool health probe result stays fresh
    #[serde(default = "default_health_cache_ttl_secs")]
    pub health_cache_ttl_secs: i64,

    /// Cost charged when a candidate declares none
    #[serde(default = "default_budget_cost")]
    pub default_budget_cost: f64,

    /// Time charged when a candidate declares none
    #[serde(default = "default_time_estimate")]
    pub default_time_estimate: f64,

    /// Confidence attached to applicability claims
    #[serde(default = "default_claim_confidence")]
    pub claim_confidence: f64,
}

const fn default_health_cache_ttl_secs() -> i64 {
    300
}

const fn default_budget_cost() -> f64 {
    0.1
}

const fn default_time_estimate() -> f64 {
    10.0
}

const fn default_claim_confidence() -> f64 {
    0.8
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            health_cache_ttl_secs: default_health_cache_ttl_secs(),
            default_budget_cost: default_budget_cost(),
            default_time_estimate: default_time_estimate(),
            claim_confidence: default_claim_confidence(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".strategos/strategos.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation policy for file output: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Also log to stdout when writing files
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_enable_stdout() -> bool {
    true
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            enable_stdout: default_enable_stdout(),
            retention_days: default_retention_days(),
        }
    }
}
