//! Application-level configuration loading: fan-out ticks, janitor periods and player defaults.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ROOMS_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Interval between two position batch flushes.
    pub position_flush: Duration,
    /// Interval between two chat batch flushes.
    pub chat_flush: Duration,
    /// Period of the inactive-room sweep.
    pub inactivity_sweep: Duration,
    /// Idle time after which a room is reaped.
    pub inactivity_threshold: Duration,
    /// How long a disconnected player's record survives for reconnection.
    pub player_grace_period: Duration,
    /// Lifetime of the one-shot `Kicked` marker.
    pub kick_marker_ttl: Duration,
    /// Countdown between the start of a round and its first question.
    pub round_countdown: Duration,
    /// Pause between the end of a question and the next one.
    pub quiz_intermission: Duration,
    /// Points a correct answer adds to the leaderboard.
    pub correct_answer_points: u32,
    /// Quiz count assigned to freshly created rooms.
    pub default_quiz_count: u32,
    /// Display name given to players that joined without one.
    pub default_player_name: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    position_flush_ms: u64,
    chat_flush_ms: u64,
    inactivity_sweep_secs: u64,
    inactivity_threshold_secs: u64,
    player_grace_period_secs: u64,
    kick_marker_ttl_secs: u64,
    round_countdown_secs: u64,
    quiz_intermission_secs: u64,
    correct_answer_points: u32,
    default_quiz_count: u32,
    default_player_name: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            position_flush_ms: 100,
            chat_flush_ms: 50,
            inactivity_sweep_secs: 60,
            inactivity_threshold_secs: 30 * 60,
            player_grace_period_secs: 10,
            kick_marker_ttl_secs: 5,
            round_countdown_secs: 3,
            quiz_intermission_secs: 5,
            correct_answer_points: 1000,
            default_quiz_count: 2,
            default_player_name: "Unnamed player".to_string(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            position_flush: Duration::from_millis(value.position_flush_ms.max(1)),
            chat_flush: Duration::from_millis(value.chat_flush_ms.max(1)),
            inactivity_sweep: Duration::from_secs(value.inactivity_sweep_secs.max(1)),
            inactivity_threshold: Duration::from_secs(value.inactivity_threshold_secs),
            player_grace_period: Duration::from_secs(value.player_grace_period_secs.max(1)),
            kick_marker_ttl: Duration::from_secs(value.kick_marker_ttl_secs.max(1)),
            round_countdown: Duration::from_secs(value.round_countdown_secs.max(1)),
            quiz_intermission: Duration::from_secs(value.quiz_intermission_secs.max(1)),
            correct_answer_points: value.correct_answer_points,
            default_quiz_count: value.default_quiz_count.max(1),
            default_player_name: value.default_player_name,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
