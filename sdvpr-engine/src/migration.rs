//! Upgrades saves whose template was superseded by a newer revision.
//!
//! Each entry maps an old template name to its replacement plus a fixer that
//! reshapes completion for the new goal list. Migrations are looked up once per
//! load and never chained.
use crate::save::SavedData;
use crate::template::{Completion, Template};

/// Reshapes saved progress for the target template.
pub type Fixer = fn(&Template, &mut SavedData);

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub from: &'static str,
    pub to: &'static str,
    pub fixer: Fixer,
}

const MIGRATIONS: [Migration; 2] = [
    Migration {
        from: "standard",
        to: "standard_1_6",
        fixer: fix_1_6,
    },
    Migration {
        from: "hardcore",
        to: "hardcore_1_6",
        fixer: fix_1_6,
    },
];

#[must_use]
pub fn template_has_migrations(template_name: &str) -> bool {
    find_migration(template_name).is_some()
}

#[must_use]
pub fn find_migration(template_name: &str) -> Option<Migration> {
    MIGRATIONS
        .iter()
        .find(|migration| migration.from == template_name)
        .copied()
}

/// Rebuild completion so it has exactly the target template's goals.
///
/// Counts of goals that still exist carry over; new goals start at 0.
pub fn autofix(template: &Template, data: &mut SavedData) {
    let completion: Completion = template
        .goals
        .iter()
        .map(|goal| {
            let count = data.completion.get(&goal.id).copied().unwrap_or(0);
            (goal.id.clone(), count)
        })
        .collect();
    data.completion = completion;
}

/// Move the completion count of `old_id` to `new_id`.
///
/// An in-flight current goal follows the rename.
pub fn rename_goal(data: &mut SavedData, old_id: &str, new_id: &str) {
    let count = data.completion.remove(old_id).unwrap_or(0);
    data.completion.insert(new_id.to_string(), count);
    if data.current_goal_id.as_deref() == Some(old_id) {
        data.current_goal_id = Some(new_id.to_string());
    }
}

/// Fixer for the 1.6 template revision.
pub fn fix_1_6(template: &Template, data: &mut SavedData) {
    rename_goal(data, "slay_125_cave_insects", "slay_80_cave_insects");
    autofix(template, data);
}

/// Run `migration` against `data` and retarget it to the new template.
pub fn apply_migration(migration: &Migration, template: &Template, data: &mut SavedData) {
    log::warn!(
        "migrating save from template '{}' to '{}'",
        migration.from,
        migration.to
    );
    (migration.fixer)(template, data);
    data.template_name = migration.to.to_string();
    if let Some(current) = &data.current_goal_id
        && template.goal(current).is_none()
    {
        log::warn!("current goal '{current}' was removed by the migration; clearing it");
        data.current_goal_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TemplateProvider;
    use crate::provider::BuiltinTemplates;

    fn old_save() -> SavedData {
        SavedData {
            current_goal_id: Some("slay_125_cave_insects".into()),
            template_name: "standard".into(),
            predicted_skill_xp: Default::default(),
            completion: Completion::from([
                ("slay_125_cave_insects".into(), 1),
                ("catch_a_carp".into(), 1),
                ("ship_a_clam".into(), 1),
            ]),
        }
    }

    #[test]
    fn table_covers_pre_1_6_templates_only() {
        assert_eq!(find_migration("standard").map(|m| m.to), Some("standard_1_6"));
        assert_eq!(find_migration("hardcore").map(|m| m.to), Some("hardcore_1_6"));
        assert!(!template_has_migrations("standard_1_6"));
        assert!(!template_has_migrations("custom"));
    }

    #[test]
    fn rename_moves_count_and_current_goal() {
        let mut data = old_save();
        rename_goal(&mut data, "slay_125_cave_insects", "slay_80_cave_insects");
        assert_eq!(data.completion.get("slay_80_cave_insects"), Some(&1));
        assert!(!data.completion.contains_key("slay_125_cave_insects"));
        assert_eq!(data.completion.get("catch_a_carp"), Some(&1));
        assert_eq!(data.current_goal_id.as_deref(), Some("slay_80_cave_insects"));
    }

    #[test]
    fn migration_to_1_6_reshapes_completion() {
        let template = BuiltinTemplates.get_template("standard_1_6").unwrap();
        let mut data = old_save();
        let migration = find_migration(&data.template_name).unwrap();
        apply_migration(&migration, &template, &mut data);

        assert_eq!(data.template_name, "standard_1_6");
        assert_eq!(data.completion.len(), template.goals.len());
        assert_eq!(data.completion.get("slay_80_cave_insects"), Some(&1));
        assert_eq!(data.completion.get("catch_a_carp"), Some(&1));
        assert_eq!(data.completion.get("catch_a_goby"), Some(&0));
        assert!(!data.completion.contains_key("ship_a_clam"));
        assert_eq!(data.current_goal_id.as_deref(), Some("slay_80_cave_insects"));
    }

    #[test]
    fn migration_drops_current_goal_missing_from_target() {
        let template = BuiltinTemplates.get_template("standard_1_6").unwrap();
        let mut data = SavedData {
            current_goal_id: Some("ship_a_clam".into()),
            ..old_save()
        };
        let migration = find_migration(&data.template_name).unwrap();
        apply_migration(&migration, &template, &mut data);

        assert!(template.goal("ship_a_clam").is_none());
        assert_eq!(data.current_goal_id, None);
        assert_eq!(data.completion.get("slay_80_cave_insects"), Some(&1));
    }

    #[test]
    fn autofix_drops_unknown_and_fills_missing() {
        let template = Template::from_json(
            r#"{"tags":{},"goals":[
                {"id":"a","name":"A","multiplicity":2},
                {"id":"b","name":"B","multiplicity":1}
            ]}"#,
        )
        .unwrap();
        let mut data = SavedData {
            completion: Completion::from([("a".into(), 2), ("z".into(), 1)]),
            ..SavedData::default()
        };
        autofix(&template, &mut data);
        assert_eq!(
            data.completion,
            Completion::from([("a".into(), 2), ("b".into(), 0)])
        );
    }
}
