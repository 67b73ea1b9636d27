//! Harness-wide settings. Every field has a default, so a host may pass
//! `{}` or only the keys it wants to change.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::script::Limits;

/// Selects the pause between plies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Interactive,
    Tournament,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HarnessConfig {
    /// Per player, per game.
    pub time_budget_ms: u64,
    pub fallback_penalty_ms: u64,
    pub analysis_timeout_ms: u64,
    pub interactive_delay_ms: u64,
    pub tournament_delay_ms: u64,
    pub mode: Mode,
    pub rng_seed: u64,
    pub script_limits: Limits,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 10_000,
            fallback_penalty_ms: 100,
            analysis_timeout_ms: 60_000,
            interactive_delay_ms: 30,
            tournament_delay_ms: 0,
            mode: Mode::Interactive,
            rng_seed: 0x5eed_2357,
            script_limits: Limits::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_json(text: &str) -> Result<Self, SessionError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text).map_err(|e| SessionError::Config(e.to_string()))
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    pub fn fallback_penalty(&self) -> Duration {
        Duration::from_millis(self.fallback_penalty_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn ply_delay_ms(&self) -> u64 {
        match self.mode {
            Mode::Interactive => self.interactive_delay_ms,
            Mode::Tournament => self.tournament_delay_ms,
        }
    }

    /// Copy of this config for headless play.
    pub fn for_tournament(&self) -> Self {
        Self {
            mode: Mode::Tournament,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_harness_constants() {
        let config = HarnessConfig::default();

        assert_eq!(config.time_budget_ms, 10_000);
        assert_eq!(config.fallback_penalty_ms, 100);
        assert_eq!(config.analysis_timeout_ms, 60_000);
        assert_eq!(config.ply_delay_ms(), 30);
        assert_eq!(config.for_tournament().ply_delay_ms(), 0);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config =
            HarnessConfig::from_json(r#"{"timeBudgetMs": 500, "scriptLimits": {"maxCallDepth": 8}}"#)
                .unwrap();

        assert_eq!(config.time_budget_ms, 500);
        assert_eq!(config.fallback_penalty_ms, 100);
        assert_eq!(config.script_limits.max_call_depth, 8);
        assert_eq!(config.script_limits.max_output_lines, 200);
    }

    #[test]
    fn empty_text_means_defaults_and_garbage_is_rejected() {
        assert_eq!(HarnessConfig::from_json("  ").unwrap(), HarnessConfig::default());
        assert_eq!(
            HarnessConfig::from_json("{").unwrap_err().code(),
            "E_CONFIG"
        );
    }
}
