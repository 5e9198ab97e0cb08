//! Bounded undo/redo over roll, finish and cancel actions.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use crate::constants::DEFAULT_HISTORY_LIMIT;
use crate::state::{FinishOutcome, RandomizerState};
use crate::template::SkillXp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Generated,
    Finished,
    Cancelled,
}

/// One undoable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Generate {
        previous_goal_id: Option<String>,
        goal_id: String,
    },
    Finish {
        goal_id: String,
        incremented: bool,
        previous_skill_xp: SkillXp,
        /// Cancelled goals the finish released from avoidance.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        released: BTreeSet<String>,
    },
    Cancel {
        goal_id: String,
    },
}

impl From<FinishOutcome> for HistoryEntry {
    fn from(outcome: FinishOutcome) -> Self {
        Self::finished(outcome, BTreeSet::new())
    }
}

impl HistoryEntry {
    /// A finish that cleared `released` from the avoid-set.
    #[must_use]
    pub fn finished(outcome: FinishOutcome, released: BTreeSet<String>) -> Self {
        Self::Finish {
            goal_id: outcome.goal_id,
            incremented: outcome.incremented,
            previous_skill_xp: outcome.previous_skill_xp,
            released,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Generate { .. } => ActionKind::Generated,
            Self::Finish { .. } => ActionKind::Finished,
            Self::Cancel { .. } => ActionKind::Cancelled,
        }
    }

    #[must_use]
    pub fn goal_id(&self) -> &str {
        match self {
            Self::Generate { goal_id, .. }
            | Self::Finish { goal_id, .. }
            | Self::Cancel { goal_id } => goal_id,
        }
    }

    fn undo(&self, state: &mut RandomizerState) {
        let data = state.data_mut();
        match self {
            Self::Generate {
                previous_goal_id, ..
            } => data.current_goal_id.clone_from(previous_goal_id),
            Self::Finish {
                goal_id,
                incremented,
                previous_skill_xp,
                ..
            } => {
                if *incremented && let Some(count) = data.completion.get_mut(goal_id) {
                    *count = count.saturating_sub(1);
                }
                data.current_goal_id = Some(goal_id.clone());
                data.predicted_skill_xp.clone_from(previous_skill_xp);
            }
            Self::Cancel { goal_id } => data.current_goal_id = Some(goal_id.clone()),
        }
    }

    /// Replay the action, returning the entry to push back on the undo stack.
    fn redo(self, state: &mut RandomizerState) -> Self {
        match self {
            Self::Generate { ref goal_id, .. } => {
                state.data_mut().current_goal_id = Some(goal_id.clone());
                self
            }
            Self::Finish {
                ref goal_id,
                ref released,
                ..
            } => {
                state.data_mut().current_goal_id = Some(goal_id.clone());
                let released = released.clone();
                state
                    .finish_goal()
                    .map_or(self, |outcome| Self::finished(outcome, released))
            }
            Self::Cancel { .. } => {
                state.cancel_goal();
                self
            }
        }
    }
}

/// Notification payload describing a redone action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedoEffect {
    pub kind: ActionKind,
    pub goal_id: String,
}

#[derive(Debug, Clone)]
pub struct History {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            limit,
        }
    }

    /// Record a freshly performed action; clears anything redoable.
    pub fn record(&mut self, entry: HistoryEntry) {
        if self.limit == 0 {
            return;
        }
        while self.undo_stack.len() >= self.limit {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(entry);
        self.redo_stack.clear();
    }

    /// Revert the most recent action. Returns what was undone.
    pub fn undo(&mut self, state: &mut RandomizerState) -> Option<ActionKind> {
        let entry = self.undo_stack.pop_back()?;
        entry.undo(state);
        let kind = entry.kind();
        self.redo_stack.push(entry);
        Some(kind)
    }

    /// The entry the next [`History::redo`] would replay.
    #[must_use]
    pub fn next_redo(&self) -> Option<&HistoryEntry> {
        self.redo_stack.last()
    }

    /// Replay the most recently undone action.
    pub fn redo(&mut self, state: &mut RandomizerState) -> Option<RedoEffect> {
        let entry = self.redo_stack.pop()?;
        let replayed = entry.redo(state);
        let effect = RedoEffect {
            kind: replayed.kind(),
            goal_id: replayed.goal_id().to_string(),
        };
        self.undo_stack.push_back(replayed);
        Some(effect)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::SavedData;
    use crate::template::Template;
    use std::rc::Rc;

    fn state() -> RandomizerState {
        let template = Rc::new(
            Template::from_json(
                r#"{"tags":{},"goals":[
                    {"id":"level:mining","name":"Mining","multiplicity":10},
                    {"id":"mine_copper_ore","name":"Copper","multiplicity":3,"xp":{"mining":20}}
                ]}"#,
            )
            .unwrap(),
        );
        let data = SavedData::fresh("custom", &template);
        RandomizerState::new(template, data)
    }

    fn finish(state: &mut RandomizerState, history: &mut History, goal: &str) {
        state.data_mut().current_goal_id = Some(goal.into());
        let outcome = state.finish_goal().unwrap();
        history.record(outcome.into());
    }

    #[test]
    fn undo_finish_restores_goal_completion_and_xp() {
        let mut state = state();
        let mut history = History::default();
        finish(&mut state, &mut history, "mine_copper_ore");
        assert_eq!(state.completion_of("mine_copper_ore"), 1);
        assert_eq!(state.data().predicted_skill_xp.get("mining"), Some(&20));

        assert_eq!(history.undo(&mut state), Some(ActionKind::Finished));
        assert_eq!(state.completion_of("mine_copper_ore"), 0);
        assert_eq!(state.current_goal_id(), Some("mine_copper_ore"));
        assert!(state.data().predicted_skill_xp.is_empty());

        let effect = history.redo(&mut state).unwrap();
        assert_eq!(
            effect,
            RedoEffect {
                kind: ActionKind::Finished,
                goal_id: "mine_copper_ore".into()
            }
        );
        assert_eq!(state.completion_of("mine_copper_ore"), 1);
        assert!(state.current_goal_id().is_none());
    }

    #[test]
    fn undo_generate_and_cancel() {
        let mut state = state();
        let mut history = History::default();
        state.data_mut().current_goal_id = Some("level:mining".into());
        history.record(HistoryEntry::Generate {
            previous_goal_id: None,
            goal_id: "level:mining".into(),
        });
        let cancelled = state.cancel_goal().unwrap();
        history.record(HistoryEntry::Cancel { goal_id: cancelled });

        assert_eq!(history.undo(&mut state), Some(ActionKind::Cancelled));
        assert_eq!(state.current_goal_id(), Some("level:mining"));
        assert_eq!(history.undo(&mut state), Some(ActionKind::Generated));
        assert!(state.current_goal_id().is_none());
        assert_eq!(history.undo(&mut state), None);

        assert_eq!(history.redo(&mut state).unwrap().kind, ActionKind::Generated);
        assert_eq!(history.redo(&mut state).unwrap().kind, ActionKind::Cancelled);
        assert!(state.current_goal_id().is_none());
        assert!(history.redo(&mut state).is_none());
    }

    #[test]
    fn new_action_clears_redo() {
        let mut state = state();
        let mut history = History::default();
        finish(&mut state, &mut history, "mine_copper_ore");
        history.undo(&mut state);
        assert!(history.can_redo());
        state.cancel_goal();
        history.record(HistoryEntry::Cancel {
            goal_id: "mine_copper_ore".into(),
        });
        assert!(!history.can_redo());
    }

    #[test]
    fn oldest_entries_fall_off() {
        let mut state = state();
        let mut history = History::with_limit(3);
        for _ in 0..5 {
            finish(&mut state, &mut history, "level:mining");
        }
        assert_eq!(history.len(), 3);
        assert_eq!(state.completion_of("level:mining"), 5);
        while history.undo(&mut state).is_some() {}
        assert_eq!(state.completion_of("level:mining"), 2);
    }

    #[test]
    fn default_limit_is_thirty() {
        let mut state = state();
        let mut history = History::default();
        for _ in 0..40 {
            state.data_mut().current_goal_id = Some("level:mining".into());
            state.cancel_goal();
            history.record(HistoryEntry::Cancel {
                goal_id: "level:mining".into(),
            });
        }
        assert_eq!(history.len(), 30);
    }
}
