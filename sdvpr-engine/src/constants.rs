//! Centralized format tags, storage keys and tuning constants for the randomizer.
//!
//! Anything that ends up on disk (save tags, storage key prefixes, the packed
//! header) lives here so a format change is a single reviewed edit.

// Save formats -------------------------------------------------------------
pub const SAVE_FORMAT_TAG: &str = "sdvpr_v1";
pub const PACKED_FORMAT_HEADER: &[u8] = b"sdvpr_v1_packed;";
pub const NULL_GOAL_SENTINEL: &str = "@@null";
pub const SAVE_FIELD_DELIMITER: char = ';';
pub const SAVE_FIELD_COUNT: usize = 5;
pub const EXPORT_FILE_EXTENSION: &str = "randomizer";

// Storage keys -------------------------------------------------------------
pub const PROFILE_KEY_PREFIX: &str = "profile:";
pub const PROFILE_TEMPLATE_KEY_PREFIX: &str = "profileTemplate:";
pub const ALL_PROFILES_KEY: &str = "allProfiles";
pub const CURRENT_PROFILE_KEY: &str = "currentProfile";

// Templates ----------------------------------------------------------------
pub const CUSTOM_TEMPLATE_NAME: &str = "custom";
pub const TAG_REFERENCE_PREFIX: char = '#';
pub const LEVEL_GOAL_PREFIX: &str = "level:";

// Skills -------------------------------------------------------------------
pub const MAX_SKILL_LEVEL: u32 = 10;
/// Cumulative XP required for each level; index 11 is an unreachable cap.
pub const SKILL_XP_THRESHOLDS: [u32; 12] = [
    0, 100, 380, 770, 1_300, 2_150, 3_300, 4_800, 6_900, 10_000, 15_000, 9_999_999,
];

// Session ------------------------------------------------------------------
pub const DEFAULT_HISTORY_LIMIT: usize = 30;

/// Storage key holding the serialized save of `profile`.
#[must_use]
pub fn profile_key(profile: &str) -> String {
    format!("{PROFILE_KEY_PREFIX}{profile}")
}

/// Storage key holding the inline custom template of `profile`.
#[must_use]
pub fn profile_template_key(profile: &str) -> String {
    format!("{PROFILE_TEMPLATE_KEY_PREFIX}{profile}")
}

/// Download filename for an exported profile.
#[must_use]
pub fn export_file_name(profile: &str) -> String {
    format!("{profile}.{EXPORT_FILE_EXTENSION}")
}
