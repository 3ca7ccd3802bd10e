//! The settings store: persistence for global and per-widget-feature user
//! preferences.

use async_trait::async_trait;

use crate::error::AceError;
use crate::preference::{GlobalPreference, UserPreference};

/// Identifies a single widget/feature pairing a preference applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreferenceKey {
    pub subject: String,
    pub resource: String,
}

impl PreferenceKey {
    #[must_use]
    pub fn new(subject: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
        }
    }
}

/// Persists and retrieves user preferences.
///
/// Implementations are an external collaborator (a settings database, a
/// platform preference service); this crate ships only an in-memory
/// reference implementation for tests and the `ace-cli` fixtures.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn global_preference(&self) -> Result<GlobalPreference, AceError>;

    async fn preference(&self, key: &PreferenceKey) -> Result<UserPreference, AceError>;

    async fn set_preference(
        &self,
        key: PreferenceKey,
        preference: UserPreference,
    ) -> Result<(), AceError>;

    async fn set_global_preference(
        &self,
        preference: GlobalPreference,
    ) -> Result<(), AceError>;
}

/// An in-memory [`SettingsStore`], defaulting every unset preference to
/// [`UserPreference::Default`]/[`GlobalPreference::Default`].
#[derive(Debug)]
pub struct InMemorySettingsStore {
    global: tokio::sync::RwLock<GlobalPreference>,
    per_feature: tokio::sync::RwLock<std::collections::HashMap<PreferenceKey, UserPreference>>,
}

impl Default for InMemorySettingsStore {
    fn default() -> Self {
        Self {
            global: tokio::sync::RwLock::new(GlobalPreference::Default),
            per_feature: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl InMemorySettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn global_preference(&self) -> Result<GlobalPreference, AceError> {
        Ok(*self.global.read().await)
    }

    async fn preference(&self, key: &PreferenceKey) -> Result<UserPreference, AceError> {
        Ok(self
            .per_feature
            .read()
            .await
            .get(key)
            .copied()
            .unwrap_or(UserPreference::Default))
    }

    async fn set_preference(
        &self,
        key: PreferenceKey,
        preference: UserPreference,
    ) -> Result<(), AceError> {
        self.per_feature.write().await.insert(key, preference);
        Ok(())
    }

    async fn set_global_preference(&self, preference: GlobalPreference) -> Result<(), AceError> {
        *self.global.write().await = preference;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unset_preference_defaults_to_default() {
        let store = InMemorySettingsStore::new();
        let key = PreferenceKey::new("widget://w1", "device-cap://camera");
        assert_eq!(store.preference(&key).await.unwrap(), UserPreference::Default);
    }

    #[tokio::test]
    async fn set_preference_round_trips() {
        let store = InMemorySettingsStore::new();
        let key = PreferenceKey::new("widget://w1", "device-cap://camera");
        store
            .set_preference(key.clone(), UserPreference::BlanketPrompt)
            .await
            .unwrap();
        assert_eq!(
            store.preference(&key).await.unwrap(),
            UserPreference::BlanketPrompt
        );
    }

    #[tokio::test]
    async fn global_preference_round_trips() {
        let store = InMemorySettingsStore::new();
        store
            .set_global_preference(GlobalPreference::AlwaysDeny)
            .await
            .unwrap();
        assert_eq!(
            store.global_preference().await.unwrap(),
            GlobalPreference::AlwaysDeny
        );
    }
}
