//! Per-profile saved state and its delimited text encoding.
//!
//! A save is one line of five `;`-separated fields:
//!
//! ```text
//! sdvpr_v1;<template name>;<current goal or @@null>;<predicted XP JSON>;<completion JSON>
//! ```
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{NULL_GOAL_SENTINEL, SAVE_FIELD_COUNT, SAVE_FIELD_DELIMITER, SAVE_FORMAT_TAG};
use crate::template::{Completion, SkillXp, Template};

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("save has {found} fields, expected {expected}", expected = SAVE_FIELD_COUNT)]
    FieldCount { found: usize },
    #[error("unknown save format '{0}'")]
    UnknownFormat(String),
    #[error("save field '{field}' is not valid JSON: {source}")]
    Json {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("save field '{field}' contains the field delimiter")]
    Delimiter { field: &'static str },
    #[error("goal ID '{0}' collides with the no-goal marker")]
    ReservedGoalId(String),
}

/// Mutable progress of one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SavedData {
    #[serde(rename = "currentGoalID")]
    pub current_goal_id: Option<String>,
    pub template_name: String,
    #[serde(rename = "predictedSkillXP")]
    pub predicted_skill_xp: SkillXp,
    pub completion: Completion,
}

impl SavedData {
    /// Fresh progress for `template`: every goal at zero, no goal rolled.
    #[must_use]
    pub fn fresh(template_name: impl Into<String>, template: &Template) -> Self {
        Self {
            current_goal_id: None,
            template_name: template_name.into(),
            predicted_skill_xp: SkillXp::new(),
            completion: template.fresh_completion(),
        }
    }
}

/// Entry of the profile list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub template: String,
}

fn json_field<T: Serialize>(field: &'static str, value: &T) -> Result<String, SaveError> {
    serde_json::to_string(value).map_err(|source| SaveError::Json { field, source })
}

fn checked<'a>(field: &'static str, value: &'a str) -> Result<&'a str, SaveError> {
    if value.contains(SAVE_FIELD_DELIMITER) {
        return Err(SaveError::Delimiter { field });
    }
    Ok(value)
}

/// Encode `data` as a save string.
///
/// # Errors
///
/// Returns [`SaveError::Delimiter`] if any field would contain `;`, or
/// [`SaveError::ReservedGoalId`] if the current goal is named like the
/// no-goal marker.
pub fn serialize_save_data(data: &SavedData) -> Result<String, SaveError> {
    if let Some(goal_id) = data
        .current_goal_id
        .as_deref()
        .filter(|goal_id| *goal_id == NULL_GOAL_SENTINEL)
    {
        return Err(SaveError::ReservedGoalId(goal_id.to_string()));
    }
    let xp = json_field("predictedSkillXP", &data.predicted_skill_xp)?;
    let completion = json_field("completion", &data.completion)?;
    let fields = [
        SAVE_FORMAT_TAG,
        checked("templateName", &data.template_name)?,
        checked(
            "currentGoalID",
            data.current_goal_id.as_deref().unwrap_or(NULL_GOAL_SENTINEL),
        )?,
        checked("predictedSkillXP", &xp)?,
        checked("completion", &completion)?,
    ];
    Ok(fields.join(&SAVE_FIELD_DELIMITER.to_string()))
}

/// Decode a save string.
///
/// # Errors
///
/// Returns an error on a wrong field count, an unknown format tag, or
/// JSON fields that fail to parse.
pub fn deserialize_save_data(serialized: &str) -> Result<SavedData, SaveError> {
    let fields: Vec<&str> = serialized.split(SAVE_FIELD_DELIMITER).collect();
    let [tag, template_name, current, xp, completion] = fields.as_slice() else {
        return Err(SaveError::FieldCount {
            found: fields.len(),
        });
    };
    if *tag != SAVE_FORMAT_TAG {
        return Err(SaveError::UnknownFormat((*tag).to_string()));
    }

    let current_goal_id = (*current != NULL_GOAL_SENTINEL).then(|| (*current).to_string());
    let predicted_skill_xp = serde_json::from_str(xp).map_err(|source| SaveError::Json {
        field: "predictedSkillXP",
        source,
    })?;
    let completion = serde_json::from_str(completion).map_err(|source| SaveError::Json {
        field: "completion",
        source,
    })?;

    Ok(SavedData {
        current_goal_id,
        template_name: (*template_name).to_string(),
        predicted_skill_xp,
        completion,
    })
}
