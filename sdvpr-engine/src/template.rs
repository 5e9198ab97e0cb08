//! Static template model: goals, tags and prerequisite expressions.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::constants::{LEVEL_GOAL_PREFIX, TAG_REFERENCE_PREFIX};

/// Completion count per goal ID.
pub type Completion = BTreeMap<String, u32>;

/// Predicted total XP per skill name.
pub type SkillXp = BTreeMap<String, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Ruleset {
    #[default]
    Standard,
    Hardcore,
}

impl Ruleset {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Hardcore => "hardcore",
        }
    }
}

impl fmt::Display for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to a goal (`some_goal`) or a tag (`#some_tag`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub goal: String,
    pub multiplicity: Option<u32>,
}

impl Requirement {
    /// Minimum completion count the reference asks for.
    #[must_use]
    pub fn required_count(&self) -> u32 {
        self.multiplicity.unwrap_or(1)
    }

    /// Tag name without the `#` prefix, if this references a tag.
    #[must_use]
    pub fn tag_name(&self) -> Option<&str> {
        self.goal.strip_prefix(TAG_REFERENCE_PREFIX)
    }

    #[must_use]
    pub fn is_tag(&self) -> bool {
        self.tag_name().is_some()
    }
}

/// Loose on-disk shape of a prerequisite node.
///
/// Which field is present decides the node kind; see [`Prerequisite`] for the
/// typed view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawPrerequisite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplicity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<Vec<Prerequisite>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any: Option<Vec<Prerequisite>>,
}

/// Prerequisite expression tree attached to a goal.
///
/// `Malformed` keeps objects that mix fields (e.g. both `all` and `any`, or a
/// `goal` next to a group) so validation can reject them instead of the data
/// silently turning into something else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "RawPrerequisite", into = "RawPrerequisite")]
pub enum Prerequisite {
    #[default]
    Empty,
    Single(Requirement),
    All(Vec<Prerequisite>),
    Any(Vec<Prerequisite>),
    Malformed(Box<RawPrerequisite>),
}

impl From<RawPrerequisite> for Prerequisite {
    fn from(raw: RawPrerequisite) -> Self {
        match raw {
            RawPrerequisite {
                goal: Some(goal),
                multiplicity,
                all: None,
                any: None,
            } => Self::Single(Requirement { goal, multiplicity }),
            RawPrerequisite {
                goal: None,
                multiplicity: None,
                all: Some(children),
                any: None,
            } => Self::All(children),
            RawPrerequisite {
                goal: None,
                multiplicity: None,
                all: None,
                any: Some(children),
            } => Self::Any(children),
            RawPrerequisite {
                goal: None,
                multiplicity: None,
                all: None,
                any: None,
            } => Self::Empty,
            other => Self::Malformed(Box::new(other)),
        }
    }
}

impl From<Prerequisite> for RawPrerequisite {
    fn from(value: Prerequisite) -> Self {
        match value {
            Prerequisite::Empty => Self::default(),
            Prerequisite::Single(Requirement { goal, multiplicity }) => Self {
                goal: Some(goal),
                multiplicity,
                ..Self::default()
            },
            Prerequisite::All(children) => Self {
                all: Some(children),
                ..Self::default()
            },
            Prerequisite::Any(children) => Self {
                any: Some(children),
                ..Self::default()
            },
            Prerequisite::Malformed(raw) => *raw,
        }
    }
}

impl Prerequisite {
    /// Require `goal` (or `#tag`) to be completed at least once.
    #[must_use]
    pub fn goal(goal: impl Into<String>) -> Self {
        Self::Single(Requirement {
            goal: goal.into(),
            multiplicity: None,
        })
    }

    /// Require `goal` to be completed at least `times` times.
    #[must_use]
    pub fn goal_times(goal: impl Into<String>, times: u32) -> Self {
        Self::Single(Requirement {
            goal: goal.into(),
            multiplicity: Some(times),
        })
    }

    #[must_use]
    pub const fn all(children: Vec<Self>) -> Self {
        Self::All(children)
    }

    #[must_use]
    pub const fn any(children: Vec<Self>) -> Self {
        Self::Any(children)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Every single requirement in the tree, depth first.
    #[must_use]
    pub fn requirements(&self) -> Vec<&Requirement> {
        let mut found = Vec::new();
        self.collect_requirements(&mut found);
        found
    }

    fn collect_requirements<'a>(&'a self, found: &mut Vec<&'a Requirement>) {
        match self {
            Self::Single(requirement) => found.push(requirement),
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.collect_requirements(found);
                }
            }
            Self::Empty | Self::Malformed(_) => {}
        }
    }

    /// True when no node in the tree is `Malformed`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self {
            Self::Empty | Self::Single(_) => true,
            Self::All(children) | Self::Any(children) => children.iter().all(Self::is_well_formed),
            Self::Malformed(_) => false,
        }
    }
}

/// A single completable checklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub prerequisites: Prerequisite,
    #[serde(rename = "imageURL", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub multiplicity: u32,
    #[serde(default)]
    pub xp: SkillXp,
}

impl Goal {
    /// Skill this goal levels up, for `level:<skill>` goals.
    #[must_use]
    pub fn level_skill(&self) -> Option<&str> {
        skill_for_level_goal(&self.id)
    }
}

/// Goal ID of the level-up goal for `skill`.
#[must_use]
pub fn level_goal_id(skill: &str) -> String {
    format!("{LEVEL_GOAL_PREFIX}{skill}")
}

/// Skill name encoded in a `level:<skill>` goal ID.
#[must_use]
pub fn skill_for_level_goal(goal_id: &str) -> Option<&str> {
    goal_id
        .strip_prefix(LEVEL_GOAL_PREFIX)
        .filter(|skill| !skill.is_empty())
}

/// Complete ruleset definition: every goal and tag of one challenge variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Template {
    #[serde(default)]
    pub ruleset: Ruleset,
    pub tags: BTreeMap<String, Vec<String>>,
    pub goals: Vec<Goal>,
}

impl Template {
    /// Parse a template from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the template shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the template as single-line JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Find a goal by ID.
    #[must_use]
    pub fn goal(&self, goal_id: &str) -> Option<&Goal> {
        self.goals.iter().find(|goal| goal.id == goal_id)
    }

    /// All goals as a map keyed by ID.
    #[must_use]
    pub fn goals_by_id(&self) -> HashMap<&str, &Goal> {
        self.goals
            .iter()
            .map(|goal| (goal.id.as_str(), goal))
            .collect()
    }

    /// Members of tag `name` (without the `#` prefix).
    #[must_use]
    pub fn tag(&self, name: &str) -> Option<&[String]> {
        self.tags.get(name).map(Vec::as_slice)
    }

    /// Sum of every goal's multiplicity.
    #[must_use]
    pub fn total_multiplicity(&self) -> u64 {
        self.goals
            .iter()
            .map(|goal| u64::from(goal.multiplicity))
            .sum()
    }

    /// Completion map with every goal at zero.
    #[must_use]
    pub fn fresh_completion(&self) -> Completion {
        self.goals.iter().map(|goal| (goal.id.clone(), 0)).collect()
    }

    /// Skills that have a `level:<skill>` goal in this template.
    #[must_use]
    pub fn skills(&self) -> Vec<&str> {
        self.goals.iter().filter_map(Goal::level_skill).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_prerequisite_shape() {
        let empty: Prerequisite = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, Prerequisite::Empty);

        let single: Prerequisite =
            serde_json::from_str(r#"{"goal":"level:fishing","multiplicity":3}"#).unwrap();
        assert_eq!(single, Prerequisite::goal_times("level:fishing", 3));

        let nested: Prerequisite = serde_json::from_str(
            r##"{"all":[{"goal":"#ocean_fish"},{"any":[{"goal":"a"},{"goal":"b"}]}]}"##,
        )
        .unwrap();
        assert_eq!(
            nested,
            Prerequisite::all(vec![
                Prerequisite::goal("#ocean_fish"),
                Prerequisite::any(vec![Prerequisite::goal("a"), Prerequisite::goal("b")]),
            ])
        );
        assert_eq!(nested.requirements().len(), 3);
    }

    #[test]
    fn mixed_fields_become_malformed() {
        let both: Prerequisite =
            serde_json::from_str(r#"{"all":[],"any":[{"goal":"x"}]}"#).unwrap();
        assert!(matches!(both, Prerequisite::Malformed(_)));
        assert!(!both.is_well_formed());

        let goal_and_group: Prerequisite =
            serde_json::from_str(r#"{"goal":"x","all":[{"goal":"y"}]}"#).unwrap();
        assert!(matches!(goal_and_group, Prerequisite::Malformed(_)));

        let stray_multiplicity: Prerequisite =
            serde_json::from_str(r#"{"multiplicity":2}"#).unwrap();
        assert!(matches!(stray_multiplicity, Prerequisite::Malformed(_)));

        let nested = Prerequisite::any(vec![Prerequisite::goal("a"), both]);
        assert!(!nested.is_well_formed());
    }

    #[test]
    fn prerequisites_serialize_back_to_loose_shape() {
        let expr = Prerequisite::all(vec![Prerequisite::goal_times("x", 2)]);
        let json = serde_json::to_string(&expr).unwrap();
        assert_eq!(json, r#"{"all":[{"goal":"x","multiplicity":2}]}"#);
        assert_eq!(serde_json::to_string(&Prerequisite::Empty).unwrap(), "{}");
    }

    #[test]
    fn goal_json_uses_image_url_key() {
        let goal: Goal = serde_json::from_str(
            r#"{"id":"catch_a_carp","name":"Catch a Carp","prerequisites":{},
                "imageURL":"https://example.com/carp.png","multiplicity":1,"xp":{"fishing":10}}"#,
        )
        .unwrap();
        assert_eq!(goal.image_url.as_deref(), Some("https://example.com/carp.png"));
        assert_eq!(goal.xp.get("fishing"), Some(&10));
        assert!(goal.level_skill().is_none());
    }

    #[test]
    fn level_goal_helpers_agree() {
        assert_eq!(level_goal_id("mining"), "level:mining");
        assert_eq!(skill_for_level_goal("level:mining"), Some("mining"));
        assert_eq!(skill_for_level_goal("level:"), None);
        assert_eq!(skill_for_level_goal("mine_copper_ore"), None);
    }

    #[test]
    fn template_helpers_cover_lookup_and_totals() {
        let template = Template::from_json(
            r#"{"ruleset":"hardcore","tags":{"t":["a"]},"goals":[
                {"id":"a","name":"A","multiplicity":2},
                {"id":"level:combat","name":"Combat","multiplicity":10}
            ]}"#,
        )
        .unwrap();
        assert_eq!(template.ruleset, Ruleset::Hardcore);
        assert_eq!(template.total_multiplicity(), 12);
        assert_eq!(template.tag("t"), Some(&["a".to_string()][..]));
        assert_eq!(template.skills(), vec!["combat"]);
        assert_eq!(template.fresh_completion().get("a"), Some(&0));
        assert!(template.goal("missing").is_none());
        assert_eq!(template.goals_by_id().len(), 2);
    }
}
