//! An open profile: live state plus history, RNG and subscribers.
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::RandomizerError;
use crate::constants::DEFAULT_HISTORY_LIMIT;
use crate::events::{EventSink, RandomizerEvent};
use crate::history::{ActionKind, History, HistoryEntry, RedoEffect};
use crate::save::{SaveError, SavedData, serialize_save_data};
use crate::selection::RollOutcome;
use crate::state::{FinishOutcome, RandomizerState};
use crate::template::Template;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Fixed RNG seed; entropy when absent.
    pub seed: Option<u64>,
    pub history_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            seed: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn rng(&self) -> ChaCha20Rng {
        self.seed
            .map_or_else(ChaCha20Rng::from_entropy, ChaCha20Rng::seed_from_u64)
    }
}

/// Which profile is open and what template it plays.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub profile_name: String,
    pub template: Rc<Template>,
}

/// Callback receiving a snapshot after every mutation.
pub type SaveObserver = Box<dyn FnMut(&SavedData)>;

pub struct RandomizerSession {
    profile_name: String,
    state: RandomizerState,
    history: History,
    rng: ChaCha20Rng,
    recently_cancelled: BTreeSet<String>,
    observers: Vec<SaveObserver>,
    sinks: Vec<Rc<dyn EventSink>>,
}

impl std::fmt::Debug for RandomizerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomizerSession")
            .field("profile_name", &self.profile_name)
            .field("state", &self.state)
            .field("recently_cancelled", &self.recently_cancelled)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl RandomizerSession {
    #[must_use]
    pub fn new(context: SessionContext, data: SavedData, options: SessionOptions) -> Self {
        Self {
            profile_name: context.profile_name,
            state: RandomizerState::new(context.template, data),
            history: History::with_limit(options.history_limit),
            rng: options.rng(),
            recently_cancelled: BTreeSet::new(),
            observers: Vec::new(),
            sinks: Vec::new(),
        }
    }

    #[must_use]
    pub fn context(&self) -> SessionContext {
        SessionContext {
            profile_name: self.profile_name.clone(),
            template: self.state.shared_template(),
        }
    }

    #[must_use]
    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    #[must_use]
    pub const fn state(&self) -> &RandomizerState {
        &self.state
    }

    #[must_use]
    pub fn template(&self) -> &Template {
        self.state.template()
    }

    #[must_use]
    pub const fn data(&self) -> &SavedData {
        self.state.data()
    }

    #[must_use]
    pub fn snapshot(&self) -> SavedData {
        self.state.data().clone()
    }

    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub const fn recently_cancelled(&self) -> &BTreeSet<String> {
        &self.recently_cancelled
    }

    #[must_use]
    pub fn completed_count(&self) -> u64 {
        self.state.completed_count()
    }

    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.state.total_count()
    }

    /// # Errors
    ///
    /// Returns an error if the state cannot be encoded.
    pub fn serialize(&self) -> Result<String, SaveError> {
        serialize_save_data(self.state.data())
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&SavedData) + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn add_sink(&mut self, sink: Rc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    fn emit(&self, event: &RandomizerEvent) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }

    fn notify_observers(&mut self) {
        let snapshot = self.state.data();
        for observer in &mut self.observers {
            observer(snapshot);
        }
    }

    /// Roll a new current goal, avoiding recently cancelled ones.
    ///
    /// # Errors
    ///
    /// Returns [`RandomizerError::NoEligibleGoals`] and leaves the state as it
    /// was when nothing can be rolled.
    pub fn roll(&mut self) -> Result<RollOutcome, RandomizerError> {
        let previous_goal_id = self.state.current_goal_id().map(str::to_string);
        let outcome = match self.state.roll(&self.recently_cancelled, &mut self.rng) {
            Ok(outcome) => outcome,
            Err(err) => {
                if let RandomizerError::NoEligibleGoals { template } = &err {
                    self.emit(&RandomizerEvent::NoEligibleGoals {
                        template: template.clone(),
                    });
                }
                return Err(err);
            }
        };
        self.history.record(HistoryEntry::Generate {
            previous_goal_id,
            goal_id: outcome.goal_id.clone(),
        });
        self.emit(&RandomizerEvent::Rolled {
            goal_id: outcome.goal_id.clone(),
            pool_size: outcome.pool_size,
        });
        self.notify_observers();
        Ok(outcome)
    }

    /// Credit the current goal. A no-op without one.
    pub fn finish(&mut self) -> Option<FinishOutcome> {
        let outcome = self.state.finish_goal()?;
        let released = std::mem::take(&mut self.recently_cancelled);
        self.history
            .record(HistoryEntry::finished(outcome.clone(), released));
        let multiplicity = self
            .state
            .template()
            .goal(&outcome.goal_id)
            .map_or(0, |goal| goal.multiplicity);
        self.emit(&RandomizerEvent::Finished {
            goal_id: outcome.goal_id.clone(),
            completion: self.state.completion_of(&outcome.goal_id),
            multiplicity,
        });
        self.notify_observers();
        Some(outcome)
    }

    /// Drop the current goal and keep it out of the next rolls.
    pub fn cancel(&mut self) -> Option<String> {
        let goal_id = self.state.cancel_goal()?;
        self.recently_cancelled.insert(goal_id.clone());
        self.history.record(HistoryEntry::Cancel {
            goal_id: goal_id.clone(),
        });
        self.emit(&RandomizerEvent::Cancelled {
            goal_id: goal_id.clone(),
        });
        self.notify_observers();
        Some(goal_id)
    }

    /// Revert the last action, including its effect on the avoid-set.
    pub fn undo(&mut self) -> Option<ActionKind> {
        let kind = self.history.undo(&mut self.state)?;
        match self.history.next_redo() {
            Some(HistoryEntry::Cancel { goal_id }) => {
                self.recently_cancelled.remove(goal_id);
            }
            Some(HistoryEntry::Finish { released, .. }) => {
                self.recently_cancelled.clone_from(released);
            }
            Some(HistoryEntry::Generate { .. }) | None => {}
        }
        self.emit(&RandomizerEvent::Undone { kind });
        self.notify_observers();
        Some(kind)
    }

    pub fn redo(&mut self) -> Option<RedoEffect> {
        let effect = self.history.redo(&mut self.state)?;
        match effect.kind {
            ActionKind::Finished => self.recently_cancelled.clear(),
            ActionKind::Cancelled => {
                self.recently_cancelled.insert(effect.goal_id.clone());
            }
            ActionKind::Generated => {}
        }
        self.emit(&RandomizerEvent::Redone(effect.clone()));
        self.notify_observers();
        Some(effect)
    }

    #[must_use]
    pub fn into_data(self) -> SavedData {
        self.state.into_data()
    }
}
