//! Bundled templates and a name-keyed cache over any provider.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::TemplateProvider;
use crate::template::Template;

/// Names of the templates shipped with the engine.
pub const PREDEFINED_TEMPLATES: [&str; 4] = ["standard", "hardcore", "standard_1_6", "hardcore_1_6"];

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Unknown template: {0}")]
    Unknown(String),
    #[error("Template '{name}' failed to parse: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Provider backed by the JSON templates compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTemplates;

impl BuiltinTemplates {
    fn raw(name: &str) -> Option<&'static str> {
        let json = match name {
            "standard" => include_str!("../data/templates/standard.json"),
            "hardcore" => include_str!("../data/templates/hardcore.json"),
            "standard_1_6" => include_str!("../data/templates/standard_1_6.json"),
            "hardcore_1_6" => include_str!("../data/templates/hardcore_1_6.json"),
            _ => return None,
        };
        Some(json)
    }

    #[must_use]
    pub fn is_predefined(name: &str) -> bool {
        PREDEFINED_TEMPLATES.contains(&name)
    }
}

impl TemplateProvider for BuiltinTemplates {
    type Error = ProviderError;

    fn get_template(&self, name: &str) -> Result<Rc<Template>, Self::Error> {
        let json = Self::raw(name).ok_or_else(|| ProviderError::Unknown(name.to_string()))?;
        Template::from_json(json)
            .map(Rc::new)
            .map_err(|source| ProviderError::Json {
                name: name.to_string(),
                source,
            })
    }
}

/// Parses each template at most once and hands out shared references.
#[derive(Debug, Default)]
pub struct TemplateCache<P> {
    inner: P,
    loaded: RefCell<HashMap<String, Rc<Template>>>,
}

impl<P: TemplateProvider> TemplateCache<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            loaded: RefCell::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.loaded.borrow().len()
    }

    pub fn clear(&self) {
        self.loaded.borrow_mut().clear();
    }
}

impl<P: TemplateProvider> TemplateProvider for TemplateCache<P> {
    type Error = P::Error;

    fn get_template(&self, name: &str) -> Result<Rc<Template>, Self::Error> {
        if let Some(template) = self.loaded.borrow().get(name) {
            return Ok(Rc::clone(template));
        }
        let template = self.inner.get_template(name)?;
        self.loaded
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&template));
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_predefined_template_loads() {
        for name in PREDEFINED_TEMPLATES {
            let template = BuiltinTemplates.get_template(name).unwrap();
            assert!(!template.goals.is_empty(), "{name} has no goals");
            assert!(BuiltinTemplates::is_predefined(name));
        }
        assert!(!BuiltinTemplates::is_predefined("custom"));
    }

    #[test]
    fn unknown_name_is_an_error() {
        assert!(matches!(
            BuiltinTemplates.get_template("expert"),
            Err(ProviderError::Unknown(name)) if name == "expert"
        ));
    }

    #[test]
    fn cache_shares_parsed_templates() {
        let cache = TemplateCache::new(BuiltinTemplates);
        let first = cache.get_template("standard").unwrap();
        let second = cache.get_template("standard").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.cached_len(), 1);
        assert!(cache.get_template("nope").is_err());
        assert_eq!(cache.cached_len(), 1);
        cache.clear();
        assert_eq!(cache.cached_len(), 0);
    }
}
