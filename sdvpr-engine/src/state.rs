//! Live randomizer state: a template plus the profile's saved progress.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::RandomizerError;
use crate::save::SavedData;
use crate::selection::{self, RollOutcome, SelectionRequest};
use crate::skills::{baseline_xp, xp_threshold};
use crate::template::{Goal, SkillXp, Template};

/// What a finish changed, enough to take it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishOutcome {
    pub goal_id: String,
    /// False when the goal was already at its multiplicity.
    pub incremented: bool,
    /// Predicted XP before the finish was applied.
    pub previous_skill_xp: SkillXp,
}

#[derive(Debug, Clone)]
pub struct RandomizerState {
    template: Rc<Template>,
    data: SavedData,
}

impl RandomizerState {
    #[must_use]
    pub const fn new(template: Rc<Template>, data: SavedData) -> Self {
        Self { template, data }
    }

    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    #[must_use]
    pub fn shared_template(&self) -> Rc<Template> {
        Rc::clone(&self.template)
    }

    #[must_use]
    pub const fn data(&self) -> &SavedData {
        &self.data
    }

    pub const fn data_mut(&mut self) -> &mut SavedData {
        &mut self.data
    }

    #[must_use]
    pub fn into_data(self) -> SavedData {
        self.data
    }

    #[must_use]
    pub fn current_goal_id(&self) -> Option<&str> {
        self.data.current_goal_id.as_deref()
    }

    #[must_use]
    pub fn current_goal(&self) -> Option<&Goal> {
        self.current_goal_id().and_then(|id| self.template.goal(id))
    }

    #[must_use]
    pub fn completion_of(&self, goal_id: &str) -> u32 {
        self.data.completion.get(goal_id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn selection_request(&self) -> SelectionRequest<'_> {
        SelectionRequest {
            template: &self.template,
            completion: &self.data.completion,
            predicted_skill_xp: &self.data.predicted_skill_xp,
            current_goal_id: self.current_goal_id(),
        }
    }

    #[must_use]
    pub fn eligible_goals(&self) -> Vec<&Goal> {
        selection::eligible_goals(&self.selection_request())
    }

    /// Sum of all completion counts.
    #[must_use]
    pub fn completed_count(&self) -> u64 {
        self.data.completion.values().map(|count| u64::from(*count)).sum()
    }

    /// Sum of all goal multiplicities.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.template.total_multiplicity()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.template
            .goals
            .iter()
            .all(|goal| self.completion_of(&goal.id) >= goal.multiplicity)
    }

    /// Roll a new current goal.
    ///
    /// The state is only touched once a goal has been drawn.
    ///
    /// # Errors
    ///
    /// Returns [`RandomizerError::NoEligibleGoals`] when nothing can be rolled.
    pub fn roll<R: Rng>(
        &mut self,
        recently_cancelled: &BTreeSet<String>,
        rng: &mut R,
    ) -> Result<RollOutcome, RandomizerError> {
        let outcome = selection::roll_goal(&self.selection_request(), recently_cancelled, rng)
            .ok_or_else(|| RandomizerError::NoEligibleGoals {
                template: self.data.template_name.clone(),
            })?;
        self.data.current_goal_id = Some(outcome.goal_id.clone());
        Ok(outcome)
    }

    /// Mark the current goal as done once.
    ///
    /// Returns `None` without a current goal.
    pub fn finish_goal(&mut self) -> Option<FinishOutcome> {
        let goal_id = self.data.current_goal_id.take()?;
        let previous_skill_xp = self.data.predicted_skill_xp.clone();
        let template = Rc::clone(&self.template);
        let Some(goal) = template.goal(&goal_id) else {
            log::warn!("current goal '{goal_id}' is not part of the template; clearing it");
            return Some(FinishOutcome {
                goal_id,
                incremented: false,
                previous_skill_xp,
            });
        };

        let count = self.data.completion.entry(goal_id.clone()).or_insert(0);
        let incremented = *count < goal.multiplicity;
        if incremented {
            *count += 1;
        }
        let new_count = *count;

        if let Some(skill) = goal.level_skill() {
            let floor = xp_threshold(new_count);
            let predicted = self
                .data
                .predicted_skill_xp
                .entry(skill.to_string())
                .or_insert(floor);
            *predicted = (*predicted).max(floor);
        }

        for (skill, implied) in &goal.xp {
            let base = baseline_xp(
                &self.data.predicted_skill_xp,
                &self.data.completion,
                skill,
            );
            self.data
                .predicted_skill_xp
                .insert(skill.clone(), base.saturating_add(*implied));
        }

        log::debug!("finished '{goal_id}' ({new_count}/{})", goal.multiplicity);
        Some(FinishOutcome {
            goal_id,
            incremented,
            previous_skill_xp,
        })
    }

    /// Drop the current goal without crediting it.
    pub fn cancel_goal(&mut self) -> Option<String> {
        let cancelled = self.data.current_goal_id.take();
        if let Some(goal_id) = &cancelled {
            log::debug!("cancelled '{goal_id}'");
        }
        cancelled
    }
}
