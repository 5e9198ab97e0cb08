//! Structural checks for templates and stored profiles.
//!
//! Both checks come in two flavors: a `*_report` function returning the first
//! problem found, and a boolean wrapper for callers that only need a yes/no.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::TemplateProvider;
use crate::constants::{CUSTOM_TEMPLATE_NAME, TAG_REFERENCE_PREFIX};
use crate::save::{SaveError, SavedData, deserialize_save_data};
use crate::template::{Template, level_goal_id};

static GOAL_ID_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9:_]+$").ok());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateIssue {
    #[error("invalid goal id '{0}'")]
    InvalidGoalId(String),
    #[error("goal '{goal}' has an invalid image URL '{url}'")]
    InvalidImageUrl { goal: String, url: String },
    #[error("goal '{0}' must have a positive multiplicity")]
    ZeroMultiplicity(String),
    #[error("goal '{goal}' grants no positive XP for '{skill}'")]
    NonPositiveXp { goal: String, skill: String },
    #[error("goal '{0}' has malformed prerequisites")]
    MalformedPrerequisites(String),
    #[error("id '{0}' is used more than once")]
    DuplicateId(String),
    #[error("goal '{goal}' grants '{skill}' XP but there is no level goal for it")]
    MissingLevelGoal { goal: String, skill: String },
    #[error("goal '{goal}' requires unknown '{reference}'")]
    DanglingReference { goal: String, reference: String },
    #[error("goal '{goal}' puts a multiplicity on tag '{tag}'")]
    TagMultiplicity { goal: String, tag: String },
    #[error("goal '{goal}' requires '{reference}' {required} times but it only has {available}")]
    ExcessiveMultiplicity {
        goal: String,
        reference: String,
        required: u32,
        available: u32,
    },
    #[error("tag '{tag}' lists unknown '{member}'")]
    DanglingTagMember { tag: String, member: String },
}

#[derive(Debug, Error)]
pub enum ProfileIssue {
    #[error(transparent)]
    Decode(#[from] SaveError),
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    #[error("custom profile has no template")]
    MissingCustomTemplate,
    #[error("current goal '{0}' is not in the template")]
    UnknownCurrentGoal(String),
    #[error("predicted XP for '{0}' has no level goal or is not positive")]
    InvalidSkillXp(String),
    #[error("completion has {found} entries, template has {expected} goals")]
    CompletionSize { expected: usize, found: usize },
    #[error("completion tracks unknown goal '{0}'")]
    UnknownCompletionGoal(String),
    #[error("completion of '{goal}' is {count}, above its multiplicity {multiplicity}")]
    CompletionOutOfRange {
        goal: String,
        count: u32,
        multiplicity: u32,
    },
}

#[must_use]
pub fn is_valid_goal_id(id: &str) -> bool {
    GOAL_ID_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(id))
}

fn check_goals(template: &Template) -> Result<(), TemplateIssue> {
    for goal in &template.goals {
        if !is_valid_goal_id(&goal.id) {
            return Err(TemplateIssue::InvalidGoalId(goal.id.clone()));
        }
        if let Some(url) = &goal.image_url
            && url::Url::parse(url).is_err()
        {
            return Err(TemplateIssue::InvalidImageUrl {
                goal: goal.id.clone(),
                url: url.clone(),
            });
        }
        if goal.multiplicity == 0 {
            return Err(TemplateIssue::ZeroMultiplicity(goal.id.clone()));
        }
        if let Some((skill, _)) = goal.xp.iter().find(|(_, xp)| **xp == 0) {
            return Err(TemplateIssue::NonPositiveXp {
                goal: goal.id.clone(),
                skill: skill.clone(),
            });
        }
        if !goal.prerequisites.is_well_formed() {
            return Err(TemplateIssue::MalformedPrerequisites(goal.id.clone()));
        }
    }
    Ok(())
}

fn known_ids(template: &Template) -> Result<HashSet<String>, TemplateIssue> {
    let mut ids = HashSet::new();
    let tag_refs = template
        .tags
        .keys()
        .map(|tag| format!("{TAG_REFERENCE_PREFIX}{tag}"));
    for id in template.goals.iter().map(|goal| goal.id.clone()).chain(tag_refs) {
        if ids.contains(&id) {
            return Err(TemplateIssue::DuplicateId(id));
        }
        ids.insert(id);
    }
    Ok(ids)
}

fn check_references(template: &Template, ids: &HashSet<String>) -> Result<(), TemplateIssue> {
    let multiplicities: HashMap<&str, u32> = template
        .goals
        .iter()
        .map(|goal| (goal.id.as_str(), goal.multiplicity))
        .collect();

    for goal in &template.goals {
        for skill in goal.xp.keys() {
            if !ids.contains(&level_goal_id(skill)) {
                return Err(TemplateIssue::MissingLevelGoal {
                    goal: goal.id.clone(),
                    skill: skill.clone(),
                });
            }
        }

        for requirement in goal.prerequisites.requirements() {
            if !ids.contains(&requirement.goal) {
                return Err(TemplateIssue::DanglingReference {
                    goal: goal.id.clone(),
                    reference: requirement.goal.clone(),
                });
            }
            let Some(required) = requirement.multiplicity else {
                continue;
            };
            if requirement.is_tag() {
                return Err(TemplateIssue::TagMultiplicity {
                    goal: goal.id.clone(),
                    tag: requirement.goal.clone(),
                });
            }
            let available = multiplicities
                .get(requirement.goal.as_str())
                .copied()
                .unwrap_or(0);
            if required > available {
                return Err(TemplateIssue::ExcessiveMultiplicity {
                    goal: goal.id.clone(),
                    reference: requirement.goal.clone(),
                    required,
                    available,
                });
            }
        }
    }

    for (tag, members) in &template.tags {
        if let Some(member) = members.iter().find(|member| !ids.contains(*member)) {
            return Err(TemplateIssue::DanglingTagMember {
                tag: tag.clone(),
                member: member.clone(),
            });
        }
    }
    Ok(())
}

/// Check a template, returning the first problem found.
///
/// Reachability of goals is deliberately not checked.
///
/// # Errors
///
/// Returns the first [`TemplateIssue`] encountered.
pub fn validate_template_report(template: &Template) -> Result<(), TemplateIssue> {
    check_goals(template)?;
    let ids = known_ids(template)?;
    check_references(template, &ids)
}

#[must_use]
pub fn validate_template(template: &Template) -> bool {
    match validate_template_report(template) {
        Ok(()) => true,
        Err(issue) => {
            log::warn!("template failed validation: {issue}");
            false
        }
    }
}

/// Check saved progress against the template it names.
///
/// # Errors
///
/// Returns the first [`ProfileIssue`] encountered.
pub fn validate_profile_report<P: TemplateProvider>(
    serialized: &str,
    custom_template: Option<&Template>,
    provider: &P,
) -> Result<SavedData, ProfileIssue> {
    let data = deserialize_save_data(serialized)?;
    let loaded;
    let template = if data.template_name == CUSTOM_TEMPLATE_NAME {
        custom_template.ok_or(ProfileIssue::MissingCustomTemplate)?
    } else {
        loaded = provider
            .get_template(&data.template_name)
            .map_err(|_| ProfileIssue::UnknownTemplate(data.template_name.clone()))?;
        &*loaded
    };
    check_profile(&data, template)?;
    Ok(data)
}

/// Check decoded progress against `template`.
///
/// # Errors
///
/// Returns the first [`ProfileIssue`] encountered.
pub fn check_profile(data: &SavedData, template: &Template) -> Result<(), ProfileIssue> {
    let goals = template.goals_by_id();

    if let Some(current) = &data.current_goal_id
        && !goals.contains_key(current.as_str())
    {
        return Err(ProfileIssue::UnknownCurrentGoal(current.clone()));
    }

    for (skill, xp) in &data.predicted_skill_xp {
        if *xp == 0 || !goals.contains_key(level_goal_id(skill).as_str()) {
            return Err(ProfileIssue::InvalidSkillXp(skill.clone()));
        }
    }

    if data.completion.len() != template.goals.len() {
        return Err(ProfileIssue::CompletionSize {
            expected: template.goals.len(),
            found: data.completion.len(),
        });
    }
    for (goal_id, count) in &data.completion {
        let goal = goals
            .get(goal_id.as_str())
            .ok_or_else(|| ProfileIssue::UnknownCompletionGoal(goal_id.clone()))?;
        if *count > goal.multiplicity {
            return Err(ProfileIssue::CompletionOutOfRange {
                goal: goal_id.clone(),
                count: *count,
                multiplicity: goal.multiplicity,
            });
        }
    }
    Ok(())
}

#[must_use]
pub fn validate_profile_data<P: TemplateProvider>(
    serialized: &str,
    custom_template: Option<&Template>,
    provider: &P,
) -> bool {
    match validate_profile_report(serialized, custom_template, provider) {
        Ok(_) => true,
        Err(issue) => {
            log::warn!("profile failed validation: {issue}");
            false
        }
    }
}
