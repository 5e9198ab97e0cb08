//! Stardew Perfection Randomizer engine
//!
//! Platform-agnostic goal eligibility, weighted selection and save handling
//! for a perfection-run checklist. Templates and storage are supplied by the
//! host through [`TemplateProvider`] and [`ProfileStorage`].

pub mod constants;
pub mod events;
pub mod history;
pub mod migration;
pub mod packed;
pub mod prerequisites;
pub mod profiles;
pub mod provider;
pub mod save;
pub mod selection;
pub mod session;
pub mod skills;
pub mod state;
pub mod storage;
pub mod template;
pub mod validate;

use std::rc::Rc;

// Re-export commonly used types
pub use events::{EventSink, LogSink, RandomizerEvent, RecordingSink};
pub use history::{ActionKind, History, HistoryEntry, RedoEffect};
pub use migration::{Migration, apply_migration, find_migration};
pub use packed::{PackedError, UnpackedProfile, pack_profile, unpack_profile};
pub use prerequisites::is_satisfied;
pub use profiles::ProfileRegistry;
pub use provider::{BuiltinTemplates, PREDEFINED_TEMPLATES, ProviderError, TemplateCache};
pub use save::{Profile, SaveError, SavedData, deserialize_save_data, serialize_save_data};
pub use selection::{RollOutcome, SelectionRequest, is_eligible, roll_goal};
pub use session::{RandomizerSession, SessionContext, SessionOptions};
pub use skills::{SkillLevel, xp_threshold, xp_to_level};
pub use state::{FinishOutcome, RandomizerState};
pub use storage::MemoryStorage;
pub use template::{Completion, Goal, Prerequisite, Requirement, Ruleset, SkillXp, Template};
pub use validate::{
    ProfileIssue, TemplateIssue, validate_profile_data, validate_template,
    validate_template_report,
};

use constants::{CUSTOM_TEMPLATE_NAME, export_file_name};

#[derive(Debug, thiserror::Error)]
pub enum RandomizerError {
    #[error("invalid save data: {0}")]
    InvalidSave(#[from] SaveError),
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    #[error("no eligible goals left on template '{template}'")]
    NoEligibleGoals { template: String },
    #[error("unknown profile '{0}'")]
    UnknownProfile(String),
    #[error("no profile is selected")]
    NoCurrentProfile,
    #[error("profile '{0}' already exists")]
    ProfileExists(String),
    #[error("custom profile is missing its template")]
    MissingCustomTemplate,
    #[error("profile data is invalid: {0}")]
    InvalidProfile(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("packed profile error: {0}")]
    Packed(#[from] PackedError),
}

/// Trait for abstracting template lookup
/// Platform-specific implementations should provide this
pub trait TemplateProvider {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the template registered under `name`
    ///
    /// # Errors
    ///
    /// Returns an error if the template is unknown or cannot be parsed.
    fn get_template(&self, name: &str) -> Result<Rc<Template>, Self::Error>;
}

/// Trait for abstracting the string key-value store profiles live in\
/// Platform-specific implementations should provide this
pub trait ProfileStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store `value` under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Delete `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be removed.
    fn remove_item(&self, key: &str) -> Result<(), Self::Error>;
}

/// A packed profile ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedProfile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Main engine tying templates, storage and sessions together
pub struct RandomizerEngine<P, S>
where
    P: TemplateProvider,
    S: ProfileStorage,
{
    templates: TemplateCache<P>,
    storage: S,
    options: SessionOptions,
    sinks: Vec<Rc<dyn EventSink>>,
}

impl<P, S> RandomizerEngine<P, S>
where
    P: TemplateProvider,
    S: ProfileStorage,
{
    /// Create a new engine with the provided template source and storage
    pub fn new(provider: P, storage: S) -> Self {
        Self {
            templates: TemplateCache::new(provider),
            storage,
            options: SessionOptions::default(),
            sinks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Subscribe `sink` to engine events and to every session opened later.
    pub fn add_sink(&mut self, sink: Rc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    #[must_use]
    pub const fn templates(&self) -> &TemplateCache<P> {
        &self.templates
    }

    #[must_use]
    pub const fn profiles(&self) -> ProfileRegistry<'_, S> {
        ProfileRegistry::new(&self.storage)
    }

    fn emit(&self, event: &RandomizerEvent) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }

    /// Resolve a predefined template by name.
    ///
    /// # Errors
    ///
    /// Returns [`RandomizerError::UnknownTemplate`] if the provider has no
    /// such template.
    pub fn template(&self, name: &str) -> Result<Rc<Template>, RandomizerError> {
        self.templates.get_template(name).map_err(|err| {
            log::warn!("template lookup for '{name}' failed: {err}");
            RandomizerError::UnknownTemplate(name.to_string())
        })
    }

    fn profile_template(
        &self,
        profile: &str,
        template_name: &str,
    ) -> Result<Rc<Template>, RandomizerError> {
        if template_name == CUSTOM_TEMPLATE_NAME {
            self.profiles()
                .load_custom_template(profile)?
                .map(Rc::new)
                .ok_or(RandomizerError::MissingCustomTemplate)
        } else {
            self.template(template_name)
        }
    }

    /// Create a profile with fresh progress and make it current.
    ///
    /// `custom` is required when `template_name` is `"custom"`.
    ///
    /// # Errors
    ///
    /// Returns an error for taken names, unknown templates or storage failures.
    pub fn create_profile(
        &self,
        name: &str,
        template_name: &str,
        custom: Option<&Template>,
    ) -> Result<SavedData, RandomizerError> {
        let template = if template_name == CUSTOM_TEMPLATE_NAME {
            let custom = custom.ok_or(RandomizerError::MissingCustomTemplate)?;
            validate_template_report(custom)
                .map_err(|issue| RandomizerError::InvalidProfile(issue.to_string()))?;
            Rc::new(custom.clone())
        } else {
            self.template(template_name)?
        };
        self.profiles().create_profile(
            Profile {
                name: name.to_string(),
                template: template_name.to_string(),
            },
            &template,
        )
    }

    /// Load, migrate and open a profile.
    ///
    /// Migrated saves are written back even if they then fail validation; a
    /// validation failure is reported through the event sinks only.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile or its template cannot be loaded.
    pub fn open_session(&self, name: &str) -> Result<RandomizerSession, RandomizerError> {
        let registry = self.profiles();
        if !registry.profile_exists(name)? {
            return Err(RandomizerError::UnknownProfile(name.to_string()));
        }
        let raw = registry
            .load_save(name)?
            .ok_or_else(|| RandomizerError::UnknownProfile(name.to_string()))?;
        let mut data = deserialize_save_data(&raw)?;

        let template = if let Some(migration) = find_migration(&data.template_name) {
            let template = self.template(migration.to)?;
            apply_migration(&migration, &template, &mut data);
            self.check_loaded(name, &data, &template);
            registry.retarget_profile(name, &data, migration.to)?;
            self.emit(&RandomizerEvent::Migrated {
                profile: name.to_string(),
                from: migration.from.to_string(),
                to: migration.to.to_string(),
            });
            template
        } else {
            let template = self.profile_template(name, &data.template_name)?;
            self.check_loaded(name, &data, &template);
            template
        };

        registry.select_profile(name)?;
        let mut session = RandomizerSession::new(
            SessionContext {
                profile_name: name.to_string(),
                template,
            },
            data,
            self.options,
        );
        for sink in &self.sinks {
            session.add_sink(Rc::clone(sink));
        }
        Ok(session)
    }

    /// Open whichever profile is marked current.
    ///
    /// # Errors
    ///
    /// Returns [`RandomizerError::NoCurrentProfile`] if none is selected.
    pub fn open_current_session(&self) -> Result<RandomizerSession, RandomizerError> {
        let name = self
            .profiles()
            .current()?
            .ok_or(RandomizerError::NoCurrentProfile)?;
        self.open_session(&name)
    }

    fn check_loaded(&self, name: &str, data: &SavedData, template: &Template) {
        if let Err(issue) = validate::check_profile(data, template) {
            self.emit(&RandomizerEvent::ValidationFailed {
                profile: name.to_string(),
                reason: issue.to_string(),
            });
        }
    }

    /// Persist the session's current progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be encoded or stored.
    pub fn save_session(&self, session: &RandomizerSession) -> Result<(), RandomizerError> {
        self.profiles().store_save(session.profile_name(), session.data())
    }

    /// Write every future mutation of `session` straight to storage.
    pub fn attach_autosave(&self, session: &mut RandomizerSession)
    where
        S: Clone + 'static,
    {
        let storage = self.storage.clone();
        let name = session.profile_name().to_string();
        session.subscribe(move |data| {
            if let Err(err) = ProfileRegistry::new(&storage).store_save(&name, data) {
                log::error!("autosave of profile '{name}' failed: {err}");
            }
        });
    }

    /// Pack a stored profile into the `.randomizer` export format.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile is missing or cannot be packed.
    pub fn export_profile(&self, name: &str) -> Result<ExportedProfile, RandomizerError> {
        let registry = self.profiles();
        let raw = registry
            .load_save(name)?
            .ok_or_else(|| RandomizerError::UnknownProfile(name.to_string()))?;
        let custom = registry.load_custom_template(name)?;
        let bytes = pack_profile(&raw, custom.as_ref())?;
        Ok(ExportedProfile {
            file_name: export_file_name(name),
            bytes,
        })
    }

    /// Register a packed profile under `name` and make it current.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode, the data does not match
    /// its template, or the name is taken.
    pub fn import_profile(&self, name: &str, bytes: &[u8]) -> Result<SavedData, RandomizerError> {
        let UnpackedProfile { template, save } = unpack_profile(bytes)?;
        let resolved = if save.template_name == CUSTOM_TEMPLATE_NAME {
            let template = template.ok_or(RandomizerError::MissingCustomTemplate)?;
            validate_template_report(&template)
                .map_err(|issue| RandomizerError::InvalidProfile(issue.to_string()))?;
            Rc::new(template)
        } else {
            self.template(&save.template_name)?
        };
        validate::check_profile(&save, &resolved)
            .map_err(|issue| RandomizerError::InvalidProfile(issue.to_string()))?;

        self.profiles().insert_profile(
            Profile {
                name: name.to_string(),
                template: save.template_name.clone(),
            },
            &save,
            &resolved,
        )?;
        Ok(save)
    }

    /// # Errors
    ///
    /// Returns [`RandomizerError::UnknownProfile`] if no such profile exists.
    pub fn delete_profile(&self, name: &str) -> Result<(), RandomizerError> {
        self.profiles().delete_profile(name)
    }
}
