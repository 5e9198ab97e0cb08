use anyhow::{Context, Result, bail};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

use sdvpr_engine::skills::would_level_up;
use sdvpr_engine::{RandomizerSession, SavedData, SessionContext, SessionOptions, Template};

/// Salt mixing the session seed into the player's cancel decisions.
const PLAYER_RNG_SALT: u64 = 0x5D7F_A11E_D00D_2024;

/// Configuration for a simulated playthrough.
#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Chance of cancelling a rolled goal instead of finishing it.
    pub cancel_rate: f64,
    pub max_steps: usize,
}

impl SimulationConfig {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            seed,
            cancel_rate: 0.0,
            max_steps: 10_000,
        }
    }

    #[must_use]
    pub const fn with_cancel_rate(mut self, cancel_rate: f64) -> Self {
        self.cancel_rate = cancel_rate;
        self
    }

    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Outcome of one simulated playthrough.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaythroughSummary {
    pub template: String,
    pub seed: u64,
    pub steps: usize,
    pub finishes: usize,
    pub cancels: usize,
    pub completed: u64,
    pub total: u64,
    pub finished: bool,
    /// Rolled goals whose XP would have crossed a level threshold.
    pub level_guard_violations: Vec<String>,
}

/// Seeded player that rolls, then finishes or cancels each goal.
pub struct SimulationSession {
    session: RandomizerSession,
    player_rng: ChaCha20Rng,
    config: SimulationConfig,
    summary: PlaythroughSummary,
}

impl SimulationSession {
    pub fn new(template_name: &str, template: Rc<Template>, config: SimulationConfig) -> Self {
        let data = SavedData::fresh(template_name, &template);
        let session = RandomizerSession::new(
            SessionContext {
                profile_name: format!("sim-{template_name}-{}", config.seed),
                template,
            },
            data,
            SessionOptions::seeded(config.seed),
        );
        Self::resume(session, config)
    }

    /// Continue playing an already open session.
    pub fn resume(session: RandomizerSession, config: SimulationConfig) -> Self {
        let summary = PlaythroughSummary {
            template: session.data().template_name.clone(),
            seed: config.seed,
            completed: session.completed_count(),
            total: session.total_count(),
            ..PlaythroughSummary::default()
        };
        Self {
            session,
            player_rng: ChaCha20Rng::seed_from_u64(config.seed ^ PLAYER_RNG_SALT),
            config,
            summary,
        }
    }

    #[must_use]
    pub const fn session(&self) -> &RandomizerSession {
        &self.session
    }

    pub const fn session_mut(&mut self) -> &mut RandomizerSession {
        &mut self.session
    }

    /// Roll once and resolve the goal. Returns `false` once the run is over.
    ///
    /// # Errors
    ///
    /// Fails if the engine refuses to roll before every goal is complete.
    pub fn step(&mut self) -> Result<bool> {
        if self.session.state().is_finished() || self.summary.steps >= self.config.max_steps {
            return Ok(false);
        }

        let outcome = self
            .session
            .roll()
            .with_context(|| format!("roll failed after {} steps", self.summary.steps))?;
        let data = self.session.data();
        let goal = self
            .session
            .template()
            .goal(&outcome.goal_id)
            .with_context(|| format!("rolled unknown goal '{}'", outcome.goal_id))?;
        if goal.xp.iter().any(|(skill, implied)| {
            would_level_up(&data.predicted_skill_xp, &data.completion, skill, *implied)
        }) {
            self.summary
                .level_guard_violations
                .push(outcome.goal_id.clone());
        }

        if self.config.cancel_rate > 0.0 && self.player_rng.gen_bool(self.config.cancel_rate) {
            self.session.cancel();
            self.summary.cancels += 1;
        } else {
            self.session.finish();
            self.summary.finishes += 1;
        }
        self.summary.steps += 1;
        Ok(true)
    }

    /// Play until every goal is complete or the step cap is hit.
    ///
    /// `on_step` runs after each step and may abort the run.
    ///
    /// # Errors
    ///
    /// Propagates roll failures and errors from `on_step`.
    pub fn run_with(
        mut self,
        mut on_step: impl FnMut(&RandomizerSession) -> Result<()>,
    ) -> Result<(PlaythroughSummary, RandomizerSession)> {
        while self.step()? {
            on_step(&self.session)?;
        }
        self.summary.completed = self.session.completed_count();
        self.summary.finished = self.session.state().is_finished();
        Ok((self.summary, self.session))
    }

    /// # Errors
    ///
    /// Propagates roll failures.
    pub fn run(self) -> Result<(PlaythroughSummary, RandomizerSession)> {
        self.run_with(|_| Ok(()))
    }
}

/// Fail unless the playthrough completed every goal without breaking the XP guard.
///
/// # Errors
///
/// Returns a description of the first expectation that failed.
pub fn expect_completed(summary: &PlaythroughSummary) -> Result<()> {
    if !summary.level_guard_violations.is_empty() {
        bail!(
            "rolled goals that cross a level: {}",
            summary.level_guard_violations.join(", ")
        );
    }
    if !summary.finished {
        bail!(
            "stopped after {} steps with {}/{} completions",
            summary.steps,
            summary.completed,
            summary.total
        );
    }
    if summary.completed != summary.total {
        bail!(
            "completion count {} does not match total {}",
            summary.completed,
            summary.total
        );
    }
    Ok(())
}
