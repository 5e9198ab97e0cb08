//! Notifications emitted by sessions and the engine facade.
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

use crate::history::{ActionKind, RedoEffect};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RandomizerEvent {
    Rolled {
        goal_id: String,
        pool_size: u32,
    },
    Finished {
        goal_id: String,
        completion: u32,
        multiplicity: u32,
    },
    Cancelled {
        goal_id: String,
    },
    Undone {
        kind: ActionKind,
    },
    Redone(RedoEffect),
    NoEligibleGoals {
        template: String,
    },
    Migrated {
        profile: String,
        from: String,
        to: String,
    },
    ValidationFailed {
        profile: String,
        reason: String,
    },
}

/// Receives every [`RandomizerEvent`]; implementations must not feed back
/// into the session.
pub trait EventSink {
    fn notify(&self, event: &RandomizerEvent);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn notify(&self, event: &RandomizerEvent) {
        match event {
            RandomizerEvent::Rolled { goal_id, pool_size } => {
                log::debug!("rolled goal '{goal_id}' (pool {pool_size})");
            }
            RandomizerEvent::Finished {
                goal_id,
                completion,
                multiplicity,
            } => log::debug!("finished goal '{goal_id}' ({completion}/{multiplicity})"),
            RandomizerEvent::Cancelled { goal_id } => log::debug!("cancelled goal '{goal_id}'"),
            RandomizerEvent::Undone { kind } => log::debug!("undid {kind:?}"),
            RandomizerEvent::Redone(effect) => {
                log::debug!("redid {:?} of '{}'", effect.kind, effect.goal_id);
            }
            RandomizerEvent::NoEligibleGoals { template } => {
                log::error!("no eligible goals left on template '{template}'");
            }
            RandomizerEvent::Migrated { profile, from, to } => {
                log::warn!("profile '{profile}' migrated from '{from}' to '{to}'");
            }
            RandomizerEvent::ValidationFailed { profile, reason } => {
                log::warn!("profile '{profile}' failed validation: {reason}");
            }
        }
    }
}

/// Keeps every event it receives; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Rc<RefCell<Vec<RandomizerEvent>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<RandomizerEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, event: &RandomizerEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_shares_buffer() {
        let sink = RecordingSink::new();
        let handle = sink.clone();
        sink.notify(&RandomizerEvent::Cancelled {
            goal_id: "a".into(),
        });
        LogSink.notify(&RandomizerEvent::NoEligibleGoals {
            template: "standard".into(),
        });
        assert_eq!(handle.events().len(), 1);
        handle.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_string(&RandomizerEvent::Rolled {
            goal_id: "a".into(),
            pool_size: 3,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"rolled","goal_id":"a","pool_size":3}"#);
    }
}
