//! Profile list, current-profile pointer and per-profile storage slots.
use crate::constants::{
    ALL_PROFILES_KEY, CURRENT_PROFILE_KEY, CUSTOM_TEMPLATE_NAME, profile_key, profile_template_key,
};
use crate::save::{Profile, SavedData, serialize_save_data};
use crate::template::Template;
use crate::{ProfileStorage, RandomizerError};

fn storage_error<E: std::fmt::Display>(err: E) -> RandomizerError {
    RandomizerError::Storage(err.to_string())
}

/// View over the profile keys of a [`ProfileStorage`].
pub struct ProfileRegistry<'a, S> {
    storage: &'a S,
}

/// Storage writes that remember each key's prior value.
struct WriteJournal<'a, S> {
    storage: &'a S,
    touched: Vec<(String, Option<String>)>,
}

impl<S: ProfileStorage> WriteJournal<'_, S> {
    fn set(&mut self, key: &str, value: &str) -> Result<(), RandomizerError> {
        let previous = self.storage.get_item(key).map_err(storage_error)?;
        self.storage.set_item(key, value).map_err(storage_error)?;
        self.touched.push((key.to_string(), previous));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), RandomizerError> {
        let previous = self.storage.get_item(key).map_err(storage_error)?;
        if previous.is_none() {
            return Ok(());
        }
        self.storage.remove_item(key).map_err(storage_error)?;
        self.touched.push((key.to_string(), previous));
        Ok(())
    }

    fn rollback(self) {
        for (key, previous) in self.touched.into_iter().rev() {
            let restored = match &previous {
                Some(value) => self.storage.set_item(&key, value),
                None => self.storage.remove_item(&key),
            };
            if let Err(err) = restored {
                log::error!("could not restore '{key}' after a failed write: {err}");
            }
        }
    }
}

impl<'a, S: ProfileStorage> ProfileRegistry<'a, S> {
    pub const fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    /// Every known profile, in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or the list is not valid JSON.
    pub fn all_profiles(&self) -> Result<Vec<Profile>, RandomizerError> {
        match self.storage.get_item(ALL_PROFILES_KEY).map_err(storage_error)? {
            Some(json) => serde_json::from_str(&json).map_err(storage_error),
            None => Ok(Vec::new()),
        }
    }

    /// Run `apply` against a write journal, restoring every key it touched
    /// when it fails.
    fn transaction<T>(
        &self,
        apply: impl FnOnce(&mut WriteJournal<'a, S>) -> Result<T, RandomizerError>,
    ) -> Result<T, RandomizerError> {
        let mut journal = WriteJournal {
            storage: self.storage,
            touched: Vec::new(),
        };
        match apply(&mut journal) {
            Ok(value) => Ok(value),
            Err(err) => {
                journal.rollback();
                Err(err)
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn current(&self) -> Result<Option<String>, RandomizerError> {
        self.storage
            .get_item(CURRENT_PROFILE_KEY)
            .map_err(storage_error)
    }

    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn profile_exists(&self, name: &str) -> Result<bool, RandomizerError> {
        Ok(self.find(name)?.is_some())
    }

    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn find(&self, name: &str) -> Result<Option<Profile>, RandomizerError> {
        Ok(self
            .all_profiles()?
            .into_iter()
            .find(|profile| profile.name == name))
    }

    /// Register `profile` with fresh progress on `template` and make it current.
    ///
    /// Custom templates are stored alongside the save.
    ///
    /// # Errors
    ///
    /// Returns [`RandomizerError::ProfileExists`] for a taken name, or a
    /// storage error.
    pub fn create_profile(
        &self,
        profile: Profile,
        template: &Template,
    ) -> Result<SavedData, RandomizerError> {
        let data = SavedData::fresh(profile.template.clone(), template);
        self.insert_profile(profile, &data, template)?;
        Ok(data)
    }

    /// Register `profile` with existing progress and make it current.
    ///
    /// # Errors
    ///
    /// Returns [`RandomizerError::ProfileExists`] for a taken name, or a
    /// storage error.
    pub fn insert_profile(
        &self,
        profile: Profile,
        data: &SavedData,
        template: &Template,
    ) -> Result<(), RandomizerError> {
        let mut profiles = self.all_profiles()?;
        if profiles.iter().any(|existing| existing.name == profile.name) {
            return Err(RandomizerError::ProfileExists(profile.name));
        }

        let serialized = serialize_save_data(data)?;
        let custom_json = if profile.template == CUSTOM_TEMPLATE_NAME {
            Some(template.to_json().map_err(storage_error)?)
        } else {
            None
        };
        let name = profile.name.clone();
        let template_name = profile.template.clone();
        profiles.push(profile);
        let profiles_json = serde_json::to_string(&profiles).map_err(storage_error)?;

        self.transaction(|writes| {
            writes.set(ALL_PROFILES_KEY, &profiles_json)?;
            if let Some(json) = &custom_json {
                writes.set(&profile_template_key(&name), json)?;
            }
            writes.set(&profile_key(&name), &serialized)?;
            writes.set(CURRENT_PROFILE_KEY, &name)
        })?;
        log::info!("registered profile '{name}' on template '{template_name}'");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RandomizerError::UnknownProfile`] if no such profile exists.
    pub fn select_profile(&self, name: &str) -> Result<(), RandomizerError> {
        if !self.profile_exists(name)? {
            return Err(RandomizerError::UnknownProfile(name.to_string()));
        }
        self.storage
            .set_item(CURRENT_PROFILE_KEY, name)
            .map_err(storage_error)
    }

    /// Remove a profile with its save and custom template.
    ///
    /// # Errors
    ///
    /// Returns [`RandomizerError::UnknownProfile`] if no such profile exists.
    pub fn delete_profile(&self, name: &str) -> Result<(), RandomizerError> {
        let mut profiles = self.all_profiles()?;
        let before = profiles.len();
        profiles.retain(|profile| profile.name != name);
        if profiles.len() == before {
            return Err(RandomizerError::UnknownProfile(name.to_string()));
        }
        let profiles_json = serde_json::to_string(&profiles).map_err(storage_error)?;
        let was_current = self.current()?.as_deref() == Some(name);
        self.transaction(|writes| {
            writes.set(ALL_PROFILES_KEY, &profiles_json)?;
            writes.remove(&profile_key(name))?;
            writes.remove(&profile_template_key(name))?;
            if was_current {
                writes.remove(CURRENT_PROFILE_KEY)?;
            }
            Ok(())
        })
    }

    /// Store migrated progress of `name` and point its list entry at
    /// `template_name`. Either both writes land or neither does.
    ///
    /// # Errors
    ///
    /// Returns [`RandomizerError::UnknownProfile`] if no such profile exists,
    /// or the first encoding or storage error.
    pub fn retarget_profile(
        &self,
        name: &str,
        data: &SavedData,
        template_name: &str,
    ) -> Result<(), RandomizerError> {
        let mut profiles = self.all_profiles()?;
        let profile = profiles
            .iter_mut()
            .find(|profile| profile.name == name)
            .ok_or_else(|| RandomizerError::UnknownProfile(name.to_string()))?;
        profile.template = template_name.to_string();
        let profiles_json = serde_json::to_string(&profiles).map_err(storage_error)?;
        let serialized = serialize_save_data(data)?;

        self.transaction(|writes| {
            writes.set(&profile_key(name), &serialized)?;
            writes.set(ALL_PROFILES_KEY, &profiles_json)
        })
    }

    /// Raw serialized save of `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn load_save(&self, name: &str) -> Result<Option<String>, RandomizerError> {
        self.storage
            .get_item(&profile_key(name))
            .map_err(storage_error)
    }

    /// # Errors
    ///
    /// Returns an error if the data cannot be serialized or stored.
    pub fn store_save(&self, name: &str, data: &SavedData) -> Result<(), RandomizerError> {
        let serialized = serialize_save_data(data)?;
        self.store_raw_save(name, &serialized)
    }

    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn store_raw_save(&self, name: &str, serialized: &str) -> Result<(), RandomizerError> {
        self.storage
            .set_item(&profile_key(name), serialized)
            .map_err(storage_error)
    }

    /// Inline template of a custom profile, if one is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or the JSON does not parse.
    pub fn load_custom_template(&self, name: &str) -> Result<Option<Template>, RandomizerError> {
        self.storage
            .get_item(&profile_template_key(name))
            .map_err(storage_error)?
            .map(|json| Template::from_json(&json).map_err(storage_error))
            .transpose()
    }

    /// # Errors
    ///
    /// Returns an error if the template cannot be serialized or stored.
    pub fn store_custom_template(
        &self,
        name: &str,
        template: &Template,
    ) -> Result<(), RandomizerError> {
        let json = template.to_json().map_err(storage_error)?;
        self.storage
            .set_item(&profile_template_key(name), &json)
            .map_err(storage_error)
    }
}
