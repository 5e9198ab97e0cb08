//! Skill level ↔ XP model.
//!
//! The game never shows the exact XP total, so the engine keeps a predicted
//! total per skill and uses these thresholds to decide whether finishing a goal
//! would cross a level boundary.
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_SKILL_LEVEL, SKILL_XP_THRESHOLDS};
use crate::template::{Completion, SkillXp, level_goal_id};

/// Cumulative XP needed to reach `level`.
///
/// Levels above the maximum map to the unreachable sentinel.
#[must_use]
pub fn xp_threshold(level: u32) -> u32 {
    let idx = usize::try_from(level).unwrap_or(usize::MAX);
    SKILL_XP_THRESHOLDS
        .get(idx)
        .copied()
        .unwrap_or(SKILL_XP_THRESHOLDS[SKILL_XP_THRESHOLDS.len() - 1])
}

/// XP at which the level after `level` is reached, or `None` at max level.
#[must_use]
pub fn next_level_threshold(level: u32) -> Option<u32> {
    (level < MAX_SKILL_LEVEL).then(|| xp_threshold(level + 1))
}

/// Level reached by a given XP total plus the XP still missing for the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillLevel {
    pub level: u32,
    pub remaining: Option<u32>,
}

/// Inverse of [`xp_threshold`]: largest level whose threshold is `<= xp`.
#[must_use]
pub fn xp_to_level(xp: u32) -> SkillLevel {
    let level = (0..=MAX_SKILL_LEVEL)
        .rev()
        .find(|level| xp_threshold(*level) <= xp)
        .unwrap_or(0);
    let remaining = next_level_threshold(level).map(|next| next - xp);
    SkillLevel { level, remaining }
}

/// Current level of `skill` as recorded by its `level:<skill>` goal.
#[must_use]
pub fn skill_level(completion: &Completion, skill: &str) -> u32 {
    completion
        .get(&level_goal_id(skill))
        .copied()
        .unwrap_or(0)
}

/// Predicted XP for `skill`, falling back to the floor of its current level.
#[must_use]
pub fn baseline_xp(predicted: &SkillXp, completion: &Completion, skill: &str) -> u32 {
    predicted
        .get(skill)
        .copied()
        .unwrap_or_else(|| xp_threshold(skill_level(completion, skill)))
}

/// Whether adding `implied` XP to `skill` would reach the next level threshold.
#[must_use]
pub fn would_level_up(
    predicted: &SkillXp,
    completion: &Completion,
    skill: &str,
    implied: u32,
) -> bool {
    let level = skill_level(completion, skill);
    next_level_threshold(level).is_some_and(|next| {
        baseline_xp(predicted, completion, skill).saturating_add(implied) >= next
    })
}
