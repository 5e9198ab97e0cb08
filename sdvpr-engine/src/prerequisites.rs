//! Recursive evaluation of prerequisite expressions against completion state.
use std::collections::BTreeMap;

use crate::template::{Completion, Prerequisite, Requirement};

/// Tag name → member goal IDs, as stored on a template.
pub type Tags = BTreeMap<String, Vec<String>>;

fn completed(completion: &Completion, goal_id: &str) -> u32 {
    completion.get(goal_id).copied().unwrap_or(0)
}

/// Whether a single goal or tag reference holds.
///
/// Tag references are satisfied when any member meets the count on its own,
/// regardless of the group the reference sits in. Unknown tags never hold.
#[must_use]
pub fn requirement_met(requirement: &Requirement, completion: &Completion, tags: &Tags) -> bool {
    let required = requirement.required_count();
    match requirement.tag_name() {
        Some(tag) => tags.get(tag).is_some_and(|members| {
            members
                .iter()
                .any(|member| completed(completion, member) >= required)
        }),
        None => completed(completion, &requirement.goal) >= required,
    }
}

/// Evaluate `expr` against the given completion counts.
///
/// Malformed nodes evaluate as satisfied; validation is where they get
/// rejected.
#[must_use]
pub fn is_satisfied(expr: &Prerequisite, completion: &Completion, tags: &Tags) -> bool {
    match expr {
        Prerequisite::Empty | Prerequisite::Malformed(_) => true,
        Prerequisite::Single(requirement) => requirement_met(requirement, completion, tags),
        Prerequisite::All(children) => children
            .iter()
            .all(|child| is_satisfied(child, completion, tags)),
        Prerequisite::Any(children) => children
            .iter()
            .any(|child| is_satisfied(child, completion, tags)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(entries: &[(&str, u32)]) -> Completion {
        entries
            .iter()
            .map(|(id, count)| ((*id).to_string(), *count))
            .collect()
    }

    fn tags() -> Tags {
        Tags::from([(
            "T".to_string(),
            vec!["a".to_string(), "b".to_string()],
        )])
    }

    #[test]
    fn empty_is_always_satisfied() {
        assert!(is_satisfied(&Prerequisite::Empty, &Completion::new(), &Tags::new()));
    }

    #[test]
    fn goal_reference_uses_multiplicity_and_missing_as_zero() {
        let done = completion(&[("x", 2)]);
        assert!(is_satisfied(&Prerequisite::goal("x"), &done, &Tags::new()));
        assert!(is_satisfied(&Prerequisite::goal_times("x", 2), &done, &Tags::new()));
        assert!(!is_satisfied(&Prerequisite::goal_times("x", 3), &done, &Tags::new()));
        assert!(!is_satisfied(&Prerequisite::goal("unknown"), &done, &Tags::new()));
    }

    #[test]
    fn tag_reference_is_any_member() {
        let expr = Prerequisite::goal_times("#T", 1);
        assert!(is_satisfied(&expr, &completion(&[("a", 0), ("b", 5)]), &tags()));
        assert!(!is_satisfied(&expr, &completion(&[("a", 0), ("b", 0)]), &tags()));
        assert!(!is_satisfied(&Prerequisite::goal("#missing"), &completion(&[]), &tags()));
    }

    #[test]
    fn tag_inside_all_group_still_needs_only_one_member() {
        let expr = Prerequisite::all(vec![Prerequisite::goal("#T"), Prerequisite::goal("c")]);
        let state = completion(&[("a", 1), ("b", 0), ("c", 1)]);
        assert!(is_satisfied(&expr, &state, &tags()));
    }

    #[test]
    fn all_group_with_zero_one_two_children() {
        let tags = Tags::new();
        let state = completion(&[("p1", 1), ("p2", 0)]);
        assert!(is_satisfied(&Prerequisite::all(vec![]), &state, &tags));
        assert!(is_satisfied(&Prerequisite::all(vec![Prerequisite::goal("p1")]), &state, &tags));
        assert!(!is_satisfied(&Prerequisite::all(vec![Prerequisite::goal("p2")]), &state, &tags));
        assert!(!is_satisfied(
            &Prerequisite::all(vec![Prerequisite::goal("p1"), Prerequisite::goal("p2")]),
            &state,
            &tags
        ));
        let both = completion(&[("p1", 1), ("p2", 1)]);
        assert!(is_satisfied(
            &Prerequisite::all(vec![Prerequisite::goal("p1"), Prerequisite::goal("p2")]),
            &both,
            &tags
        ));
    }

    #[test]
    fn any_group_with_zero_one_two_children() {
        let tags = Tags::new();
        let state = completion(&[("p1", 1), ("p2", 0)]);
        assert!(!is_satisfied(&Prerequisite::any(vec![]), &state, &tags));
        assert!(is_satisfied(&Prerequisite::any(vec![Prerequisite::goal("p1")]), &state, &tags));
        assert!(!is_satisfied(&Prerequisite::any(vec![Prerequisite::goal("p2")]), &state, &tags));
        assert!(is_satisfied(
            &Prerequisite::any(vec![Prerequisite::goal("p1"), Prerequisite::goal("p2")]),
            &state,
            &tags
        ));
        assert!(!is_satisfied(
            &Prerequisite::any(vec![Prerequisite::goal("p2"), Prerequisite::goal("p3")]),
            &state,
            &tags
        ));
    }

    #[test]
    fn nested_groups_recurse() {
        let expr = Prerequisite::all(vec![
            Prerequisite::goal("p1"),
            Prerequisite::any(vec![Prerequisite::goal("p2"), Prerequisite::goal_times("p3", 2)]),
        ]);
        let tags = Tags::new();
        assert!(!is_satisfied(&expr, &completion(&[("p1", 1), ("p3", 1)]), &tags));
        assert!(is_satisfied(&expr, &completion(&[("p1", 1), ("p3", 2)]), &tags));
    }

    #[test]
    fn malformed_is_permissive() {
        let raw: Prerequisite = serde_json::from_str(r#"{"all":[],"any":[]}"#).unwrap();
        assert!(is_satisfied(&raw, &Completion::new(), &Tags::new()));
    }
}
