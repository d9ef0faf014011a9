//! Persisted user settings and saved-prompt management.
//!
//! Settings are stored as three independent groups so that saving one form
//! never clobbers another:
//!
//! | Key | Contents |
//! |-----|----------|
//! | `settings.provider` | active provider, API keys, models |
//! | `settings.prompts` | saved prompts, default prompt id, legacy custom prompts |
//! | `settings.ui` | theme, floating-ball toggle (stored, never interpreted) |
//!
//! A missing group loads as its default.

use crate::cache::SummaryCache;
use crate::error::{CoreError, SettingsError, StoreError};
use crate::prompt::SUMMARY_TEMPLATE;
use crate::store::{KeyValueStore, KeyValueStoreExt};
use crate::{DEFAULT_PROMPT_ID, generate_id};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const PROVIDER_KEY: &str = "settings.provider";
pub const PROMPTS_KEY: &str = "settings.prompts";
pub const UI_KEY: &str = "settings.ui";

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

/// Placeholder every saved prompt must contain.
pub const CONTENT_PLACEHOLDER: &str = "{content}";

// ── Types ──────────────────────────────────────────────────────────

/// Which LLM vendor handles requests.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    #[default]
    OpenAi,
    Anthropic,
}

impl ApiProvider {
    /// Human-readable vendor name, used in error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "OpenAI",
            ApiProvider::Anthropic => "Anthropic",
        }
    }
}

impl std::fmt::Display for ApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiProvider::OpenAi => write!(f, "openai"),
            ApiProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl std::str::FromStr for ApiProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ApiProvider::OpenAi),
            "anthropic" => Ok(ApiProvider::Anthropic),
            other => Err(format!("unknown provider '{other}' (expected openai or anthropic)")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderSettings {
    pub api_provider: ApiProvider,
    pub openai_api_key: String,
    pub openai_model: String,
    pub anthropic_api_key: String,
    pub anthropic_model: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_provider: ApiProvider::default(),
            openai_api_key: String::new(),
            openai_model: DEFAULT_OPENAI_MODEL.into(),
            anthropic_api_key: String::new(),
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.into(),
        }
    }
}

impl ProviderSettings {
    /// API key for `provider` (may be empty).
    pub fn api_key(&self, provider: ApiProvider) -> &str {
        match provider {
            ApiProvider::OpenAi => &self.openai_api_key,
            ApiProvider::Anthropic => &self.anthropic_api_key,
        }
    }

    /// Model for `provider` (may be empty).
    pub fn model(&self, provider: ApiProvider) -> &str {
        match provider {
            ApiProvider::OpenAi => &self.openai_model,
            ApiProvider::Anthropic => &self.anthropic_model,
        }
    }
}

/// A named, user-managed summary template.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CustomPrompt {
    pub id: String,
    pub name: String,
    pub content: String,
}

impl CustomPrompt {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Legacy single-template fields. `question` still drives question answering.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CustomPrompts {
    pub summarize: String,
    pub question: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct PromptSettings {
    pub saved_prompts: Vec<CustomPrompt>,
    pub default_prompt_id: String,
    pub custom_prompts: CustomPrompts,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            saved_prompts: vec![CustomPrompt::new(
                DEFAULT_PROMPT_ID,
                "Default summary",
                SUMMARY_TEMPLATE,
            )],
            default_prompt_id: DEFAULT_PROMPT_ID.into(),
            custom_prompts: CustomPrompts::default(),
        }
    }
}

impl PromptSettings {
    /// No saved prompts and no default.
    pub fn empty() -> Self {
        Self {
            saved_prompts: Vec::new(),
            default_prompt_id: String::new(),
            custom_prompts: CustomPrompts::default(),
        }
    }

    pub fn find(&self, id: &str) -> Option<&CustomPrompt> {
        self.saved_prompts.iter().find(|p| p.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut CustomPrompt> {
        self.saved_prompts.iter_mut().find(|p| p.id == id)
    }

    /// The custom question template, if one is set.
    pub fn question_template(&self) -> Option<&str> {
        Some(self.custom_prompts.question.as_str()).filter(|q| !q.trim().is_empty())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct UiSettings {
    pub theme: String,
    pub show_floating_ball: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            theme: "system".into(),
            show_floating_ball: true,
        }
    }
}

/// All settings groups.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub prompts: PromptSettings,
    pub ui: UiSettings,
}

// ── SettingsStore ──────────────────────────────────────────────────

/// Loads and saves settings groups and edits saved prompts.
///
/// Prompt edits invalidate the cached summaries produced under the edited
/// prompt's id.
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    cache: Arc<SummaryCache>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>, cache: Arc<SummaryCache>) -> Self {
        Self { store, cache }
    }

    pub fn load(&self) -> Result<Settings, StoreError> {
        Ok(Settings {
            provider: self.store.get_json(PROVIDER_KEY)?.unwrap_or_default(),
            prompts: self.store.get_json(PROMPTS_KEY)?.unwrap_or_default(),
            ui: self.store.get_json(UI_KEY)?.unwrap_or_default(),
        })
    }

    pub fn save_provider(&self, provider: &ProviderSettings) -> Result<(), StoreError> {
        self.store.set_json(PROVIDER_KEY, provider)
    }

    pub fn save_prompts(&self, prompts: &PromptSettings) -> Result<(), StoreError> {
        self.store.set_json(PROMPTS_KEY, prompts)
    }

    pub fn save_ui(&self, ui: &UiSettings) -> Result<(), StoreError> {
        self.store.set_json(UI_KEY, ui)
    }

    fn load_prompts(&self) -> Result<PromptSettings, StoreError> {
        Ok(self.store.get_json(PROMPTS_KEY)?.unwrap_or_default())
    }

    /// Save a new prompt under a freshly generated id.
    pub fn add_prompt(&self, name: &str, content: &str) -> Result<CustomPrompt, CoreError> {
        validate(name, content)?;
        let mut prompts = self.load_prompts()?;
        let mut id = generate_id("prompt");
        while prompts.find(&id).is_some() {
            id = generate_id("prompt");
        }
        let prompt = CustomPrompt::new(id, name.trim(), content);
        prompts.saved_prompts.push(prompt.clone());
        self.save_prompts(&prompts)?;
        info!("Added prompt '{}' ({})", prompt.name, prompt.id);
        Ok(prompt)
    }

    /// Replace a prompt's name and content and drop its cached summaries.
    pub fn update_prompt(&self, id: &str, name: &str, content: &str) -> Result<(), CoreError> {
        validate(name, content)?;
        let mut prompts = self.load_prompts()?;
        let prompt = prompts
            .find_mut(id)
            .ok_or_else(|| SettingsError::PromptNotFound(id.to_string()))?;
        prompt.name = name.trim().to_string();
        prompt.content = content.to_string();
        self.save_prompts(&prompts)?;
        let cleared = self.cache.clear_for_prompt(id)?;
        info!("Updated prompt {id}; invalidated {cleared} cached summaries");
        Ok(())
    }

    /// Delete a prompt. The current default cannot be deleted.
    pub fn delete_prompt(&self, id: &str) -> Result<(), CoreError> {
        let mut prompts = self.load_prompts()?;
        if prompts.default_prompt_id == id {
            return Err(SettingsError::DeleteDefault(id.to_string()).into());
        }
        let before = prompts.saved_prompts.len();
        prompts.saved_prompts.retain(|p| p.id != id);
        if prompts.saved_prompts.len() == before {
            return Err(SettingsError::PromptNotFound(id.to_string()).into());
        }
        self.save_prompts(&prompts)?;
        self.cache.clear_for_prompt(id)?;
        info!("Deleted prompt {id}");
        Ok(())
    }

    pub fn set_default_prompt(&self, id: &str) -> Result<(), CoreError> {
        let mut prompts = self.load_prompts()?;
        if prompts.find(id).is_none() {
            return Err(SettingsError::PromptNotFound(id.to_string()).into());
        }
        prompts.default_prompt_id = id.to_string();
        self.save_prompts(&prompts)?;
        Ok(())
    }
}

fn validate(name: &str, content: &str) -> Result<(), SettingsError> {
    if name.trim().is_empty() {
        return Err(SettingsError::EmptyName);
    }
    if !content.contains(CONTENT_PLACEHOLDER) {
        return Err(SettingsError::MissingPlaceholder);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn fixture() -> (SettingsStore, Arc<SummaryCache>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(SummaryCache::new(store.clone(), Arc::new(ManualClock::new(0))));
        (SettingsStore::new(store.clone(), cache.clone()), cache, store)
    }

    #[test]
    fn fresh_store_loads_defaults() {
        let (settings, _, _) = fixture();
        let s = settings.load().unwrap();
        assert_eq!(s.provider.api_provider, ApiProvider::OpenAi);
        assert_eq!(s.provider.openai_model, DEFAULT_OPENAI_MODEL);
        assert_eq!(s.prompts.default_prompt_id, "default");
        assert_eq!(s.prompts.find("default").unwrap().content, SUMMARY_TEMPLATE);
        assert!(s.ui.show_floating_ball);
        assert_eq!(s.ui.theme, "system");
    }

    #[test]
    fn groups_use_camel_case_and_partial_fields() {
        let (settings, _, store) = fixture();
        store
            .set(PROVIDER_KEY, json!({"apiProvider": "anthropic", "anthropicApiKey": "k"}))
            .unwrap();
        let s = settings.load().unwrap();
        assert_eq!(s.provider.api_provider, ApiProvider::Anthropic);
        assert_eq!(s.provider.api_key(ApiProvider::Anthropic), "k");
        assert_eq!(s.provider.model(ApiProvider::Anthropic), DEFAULT_ANTHROPIC_MODEL);

        settings.save_ui(&UiSettings {
            theme: "dark".into(),
            show_floating_ball: false,
        }).unwrap();
        assert_eq!(
            store.get(UI_KEY).unwrap(),
            Some(json!({"theme": "dark", "showFloatingBall": false}))
        );
    }

    #[test]
    fn add_prompt_requires_placeholder_and_name() {
        let (settings, _, _) = fixture();
        let err = settings.add_prompt("Short", "Be brief").unwrap_err();
        assert!(matches!(err, CoreError::Settings(SettingsError::MissingPlaceholder)));
        let err = settings.add_prompt("  ", "{content}").unwrap_err();
        assert!(matches!(err, CoreError::Settings(SettingsError::EmptyName)));

        let a = settings.add_prompt("Short", "Be brief: {content}").unwrap();
        let b = settings.add_prompt("Short", "Be brief: {content}").unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(settings.load().unwrap().prompts.saved_prompts.len(), 3);
    }

    #[test]
    fn update_prompt_invalidates_its_cache_entries() {
        let (settings, cache, _) = fixture();
        let p = settings.add_prompt("Bullets", "Bullets: {content}").unwrap();
        cache.set("https://a.test", "old", Some(&p.id)).unwrap();
        cache.set("https://a.test", "other", Some("default")).unwrap();

        settings.update_prompt(&p.id, "Bullets", "Three bullets: {content}").unwrap();

        assert_eq!(cache.get("https://a.test", Some(&p.id)).unwrap(), None);
        assert!(cache.get("https://a.test", Some("default")).unwrap().is_some());
        let loaded = settings.load().unwrap();
        assert_eq!(loaded.prompts.find(&p.id).unwrap().content, "Three bullets: {content}");
    }

    #[test]
    fn default_prompt_cannot_be_deleted() {
        let (settings, _, _) = fixture();
        let err = settings.delete_prompt("default").unwrap_err();
        assert!(matches!(err, CoreError::Settings(SettingsError::DeleteDefault(_))));

        let p = settings.add_prompt("Alt", "{content}").unwrap();
        settings.set_default_prompt(&p.id).unwrap();
        settings.delete_prompt("default").unwrap();
        assert!(settings.delete_prompt(&p.id).is_err());
        assert!(matches!(
            settings.delete_prompt("nope").unwrap_err(),
            CoreError::Settings(SettingsError::PromptNotFound(_))
        ));
    }

    #[test]
    fn set_default_requires_existing_prompt() {
        let (settings, _, _) = fixture();
        assert!(settings.set_default_prompt("ghost").is_err());
        assert_eq!(settings.load().unwrap().prompts.default_prompt_id, "default");
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<ApiProvider>().unwrap(), ApiProvider::OpenAi);
        assert_eq!("anthropic".parse::<ApiProvider>().unwrap(), ApiProvider::Anthropic);
        assert!("gemini".parse::<ApiProvider>().is_err());
        assert_eq!(serde_json::to_value(ApiProvider::OpenAi).unwrap(), json!("openai"));
    }
}
