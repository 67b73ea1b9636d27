//! Headless round robin. Sessions run one at a time with no inter-ply delay.

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::HarnessConfig;
use crate::error::SessionError;
use crate::game::{Controller, GameSession};
use crate::record::GameRecord;
use crate::registry::StrategyRegistry;
use crate::stage::StageConfig;
use crate::types::{Player, Winner};

const WIN_POINTS: u32 = 2;
const DRAW_POINTS: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub name: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub points: u32,
    /// Own discs minus opponent discs, summed over all games.
    pub disc_diff: i32,
}

impl Standing {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            wins: 0,
            losses: 0,
            draws: 0,
            points: 0,
            disc_diff: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TournamentReport {
    pub standings: Vec<Standing>,
    pub games: Vec<GameRecord>,
}

pub struct Tournament<'a> {
    registry: &'a mut StrategyRegistry,
    config: HarnessConfig,
}

impl<'a> Tournament<'a> {
    pub fn new(registry: &'a mut StrategyRegistry, config: &HarnessConfig) -> Self {
        Self {
            registry,
            config: config.for_tournament(),
        }
    }

    /// Plays every pair twice with colours swapped. Standings are sorted
    /// by points, then disc difference.
    #[instrument(skip(self, stage), fields(stage = %stage.name))]
    pub fn run(
        &mut self,
        stage: &StageConfig,
        names: &[String],
    ) -> Result<TournamentReport, SessionError> {
        let mut standings: Vec<Standing> = names.iter().map(|n| Standing::new(n)).collect();
        let mut games = Vec::new();

        for i in 0..names.len() {
            for j in 0..names.len() {
                if i == j {
                    continue;
                }
                let mut session = GameSession::new(
                    stage.clone(),
                    Controller::Strategy(names[i].clone()),
                    Controller::Strategy(names[j].clone()),
                    &mut *self.registry,
                    self.config.clone(),
                )?;
                let result = match session.run_to_end() {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(black = %names[i], white = %names[j], error = %err, "game aborted");
                        return Err(err);
                    }
                };
                let diff = i32::from(result.black_count) - i32::from(result.white_count);
                standings[i].disc_diff += diff;
                standings[j].disc_diff -= diff;
                match result.winner {
                    Winner::Draw => {
                        standings[i].draws += 1;
                        standings[j].draws += 1;
                    }
                    winner => {
                        let (w, l) = if winner.player() == Some(Player::Black) {
                            (i, j)
                        } else {
                            (j, i)
                        };
                        standings[w].wins += 1;
                        standings[l].losses += 1;
                    }
                }
                games.push(session.record().clone());
            }
        }

        for s in &mut standings {
            s.points = s.wins * WIN_POINTS + s.draws * DRAW_POINTS;
        }
        standings.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then(b.disc_diff.cmp(&a.disc_diff))
        });
        info!(games = games.len(), "tournament finished");
        Ok(TournamentReport { standings, games })
    }
}
