//! Goal eligibility and weighted random selection.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::prerequisites::is_satisfied;
use crate::skills::would_level_up;
use crate::template::{Completion, Goal, SkillXp, Template};

/// Borrowed view of everything eligibility depends on.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    pub template: &'a Template,
    pub completion: &'a Completion,
    pub predicted_skill_xp: &'a SkillXp,
    pub current_goal_id: Option<&'a str>,
}

/// Completions of `goal` still outstanding.
#[must_use]
pub fn remaining(goal: &Goal, completion: &Completion) -> u32 {
    let done = completion.get(&goal.id).copied().unwrap_or(0);
    goal.multiplicity.saturating_sub(done)
}

/// Whether `goal` may be rolled right now.
#[must_use]
pub fn is_eligible(goal: &Goal, request: &SelectionRequest<'_>) -> bool {
    if request.current_goal_id == Some(goal.id.as_str()) {
        return false;
    }
    if remaining(goal, request.completion) == 0 {
        return false;
    }
    if !is_satisfied(&goal.prerequisites, request.completion, &request.template.tags) {
        return false;
    }
    !goal.xp.iter().any(|(skill, implied)| {
        would_level_up(request.predicted_skill_xp, request.completion, skill, *implied)
    })
}

/// Every goal of the template that passes [`is_eligible`], in template order.
#[must_use]
pub fn eligible_goals<'a>(request: &SelectionRequest<'a>) -> Vec<&'a Goal> {
    request
        .template
        .goals
        .iter()
        .filter(|goal| {
            if !goal.prerequisites.is_well_formed() {
                log::warn!(
                    "goal '{}' has malformed prerequisites; treating them as met",
                    goal.id
                );
            }
            is_eligible(goal, request)
        })
        .collect()
}

/// One pool slot group: `weight` identical entries for `goal_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedGoal {
    pub goal_id: String,
    pub weight: u32,
}

/// Weighted pool over the eligible goals.
///
/// Each goal weighs as many entries as it has completions left.
#[must_use]
pub fn weighted_pool(request: &SelectionRequest<'_>) -> Vec<WeightedGoal> {
    eligible_goals(request)
        .into_iter()
        .map(|goal| WeightedGoal {
            goal_id: goal.id.clone(),
            weight: remaining(goal, request.completion),
        })
        .collect()
}

/// Result of a successful roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    pub goal_id: String,
    /// Total entries in the pool that was drawn from.
    pub pool_size: u32,
    /// Recently cancelled goals had to stay in the pool.
    pub kept_cancelled: bool,
}

/// Draw a goal from the weighted pool.
///
/// Recently cancelled goals are left out unless nothing else is eligible.
/// Returns `None` when no goal is eligible at all.
pub fn roll_goal<R: Rng>(
    request: &SelectionRequest<'_>,
    recently_cancelled: &BTreeSet<String>,
    rng: &mut R,
) -> Option<RollOutcome> {
    let pool = weighted_pool(request);
    if pool.is_empty() {
        return None;
    }

    let fresh: Vec<WeightedGoal> = pool
        .iter()
        .filter(|entry| !recently_cancelled.contains(&entry.goal_id))
        .cloned()
        .collect();
    let kept_cancelled = fresh.is_empty();
    let candidates = if kept_cancelled { pool } else { fresh };

    let pool_size: u32 = candidates.iter().map(|entry| entry.weight).sum();
    let goal_id = choose_weighted(&candidates, rng)?;
    log::debug!("rolled '{goal_id}' from a pool of {pool_size} entries");
    Some(RollOutcome {
        goal_id,
        pool_size,
        kept_cancelled,
    })
}

fn choose_weighted<R: Rng>(candidates: &[WeightedGoal], rng: &mut R) -> Option<String> {
    let total_weight: u32 = candidates.iter().map(|entry| entry.weight).sum();
    if total_weight == 0 {
        return None;
    }

    let roll = rng.gen_range(0..total_weight);
    let mut current = 0;
    for entry in candidates {
        current += entry.weight;
        if roll < current {
            return Some(entry.goal_id.clone());
        }
    }

    candidates.first().map(|entry| entry.goal_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::collections::BTreeMap;

    fn template() -> Template {
        Template::from_json(
            r#"{"ruleset":"hardcore","tags":{},"goals":[
                {"id":"a","name":"A","multiplicity":3},
                {"id":"b","name":"B","multiplicity":1},
                {"id":"c","name":"C","multiplicity":1,"prerequisites":{"goal":"b"}},
                {"id":"level:farming","name":"Farming","multiplicity":10},
                {"id":"big_farm","name":"Big Farm","multiplicity":1,"xp":{"farming":400}},
                {"id":"small_farm","name":"Small Farm","multiplicity":1,"xp":{"farming":5}}
            ]}"#,
        )
        .unwrap()
    }

    fn request<'a>(
        template: &'a Template,
        completion: &'a Completion,
        predicted: &'a SkillXp,
        current: Option<&'a str>,
    ) -> SelectionRequest<'a> {
        SelectionRequest {
            template,
            completion,
            predicted_skill_xp: predicted,
            current_goal_id: current,
        }
    }

    #[test]
    fn current_goal_is_never_eligible() {
        let template = template();
        let completion = template.fresh_completion();
        let predicted = SkillXp::new();
        let goal = template.goal("a").unwrap();
        assert!(is_eligible(goal, &request(&template, &completion, &predicted, None)));
        assert!(!is_eligible(
            goal,
            &request(&template, &completion, &predicted, Some("a"))
        ));
    }

    #[test]
    fn prerequisites_gate_eligibility() {
        let template = template();
        let mut completion = template.fresh_completion();
        let predicted = SkillXp::new();
        let goal = template.goal("c").unwrap();
        assert!(!is_eligible(goal, &request(&template, &completion, &predicted, None)));
        completion.insert("b".into(), 1);
        assert!(is_eligible(goal, &request(&template, &completion, &predicted, None)));
    }

    #[test]
    fn xp_guard_blocks_level_crossing_goals() {
        let template = template();
        let mut completion = template.fresh_completion();
        completion.insert("level:farming".into(), 2);
        let predicted = SkillXp::new();
        let req = request(&template, &completion, &predicted, None);
        assert!(!is_eligible(template.goal("big_farm").unwrap(), &req));
        assert!(is_eligible(template.goal("small_farm").unwrap(), &req));
    }

    #[test]
    fn pool_weights_by_remaining_completions() {
        let template = template();
        let mut completion = template.fresh_completion();
        completion.insert("a".into(), 1);
        completion.insert("b".into(), 1);
        let predicted = SkillXp::new();
        let pool = weighted_pool(&request(&template, &completion, &predicted, None));
        let weights: BTreeMap<_, _> = pool
            .iter()
            .map(|entry| (entry.goal_id.as_str(), entry.weight))
            .collect();
        assert_eq!(weights.get("a"), Some(&2));
        assert_eq!(weights.get("b"), None);
        assert_eq!(weights.get("c"), Some(&1));
    }

    #[test]
    fn completed_goal_is_never_rolled() {
        let template = template();
        let mut completion = template.fresh_completion();
        completion.insert("a".into(), 3);
        let predicted = SkillXp::new();
        let req = request(&template, &completion, &predicted, None);
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for _ in 0..200 {
            let outcome = roll_goal(&req, &BTreeSet::new(), &mut rng).unwrap();
            assert_ne!(outcome.goal_id, "a");
        }
    }

    #[test]
    fn recently_cancelled_goals_are_avoided_until_nothing_else_remains() {
        let template = Template::from_json(
            r#"{"tags":{},"goals":[
                {"id":"x","name":"X","multiplicity":1},
                {"id":"y","name":"Y","multiplicity":1}
            ]}"#,
        )
        .unwrap();
        let completion = template.fresh_completion();
        let predicted = SkillXp::new();
        let req = request(&template, &completion, &predicted, None);
        let mut rng = ChaCha20Rng::seed_from_u64(11);

        let cancelled = BTreeSet::from(["x".to_string()]);
        for _ in 0..50 {
            let outcome = roll_goal(&req, &cancelled, &mut rng).unwrap();
            assert_eq!(outcome.goal_id, "y");
            assert!(!outcome.kept_cancelled);
        }

        let both = BTreeSet::from(["x".to_string(), "y".to_string()]);
        let outcome = roll_goal(&req, &both, &mut rng).unwrap();
        assert!(outcome.kept_cancelled);
        assert_eq!(outcome.pool_size, 2);
    }

    #[test]
    fn empty_pool_yields_none() {
        let template = Template::from_json(
            r#"{"tags":{},"goals":[{"id":"x","name":"X","multiplicity":1}]}"#,
        )
        .unwrap();
        let mut completion = template.fresh_completion();
        completion.insert("x".into(), 1);
        let predicted = SkillXp::new();
        let req = request(&template, &completion, &predicted, None);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        assert!(roll_goal(&req, &BTreeSet::new(), &mut rng).is_none());
    }

    #[test]
    fn draws_follow_weights() {
        let template = Template::from_json(
            r#"{"tags":{},"goals":[
                {"id":"heavy","name":"Heavy","multiplicity":9},
                {"id":"light","name":"Light","multiplicity":1}
            ]}"#,
        )
        .unwrap();
        let completion = template.fresh_completion();
        let predicted = SkillXp::new();
        let req = request(&template, &completion, &predicted, None);
        let mut rng = ChaCha20Rng::seed_from_u64(2024);
        let heavy = (0..2_000)
            .filter(|_| roll_goal(&req, &BTreeSet::new(), &mut rng).unwrap().goal_id == "heavy")
            .count();
        assert!((1_600..=1_990).contains(&heavy), "heavy drawn {heavy} times");
    }
}
