// SPDX-License-Identifier: AGPL-3.0
// Off Fire Core - User preferences
//
// Small flags kept in the key-value store under fixed keys.

use crate::kv::KeyValueStore;
use crate::types::AppResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const LANGUAGE_KEY: &str = "language";
pub const ONBOARDING_KEY: &str = "hasSeenOnboarding";
pub const NOTIFICATIONS_ENABLED_KEY: &str = "@notifications_enabled";
pub const PUSH_TOKEN_KEY: &str = "@notification_token";
pub const REMINDERS_SCHEDULED_KEY: &str = "@notifications_scheduled";

/// UI language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ar,
    En,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ar => "ar",
            Self::En => "en",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "ar" => Some(Self::Ar),
            "en" => Some(Self::En),
            _ => None,
        }
    }

    pub fn is_rtl(&self) -> bool {
        matches!(self, Self::Ar)
    }
}

pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn flag(&self, key: &str) -> AppResult<bool> {
        Ok(self.store.get(key).await?.as_deref() == Some("true"))
    }

    async fn set_flag(&self, key: &str, value: bool) -> AppResult<()> {
        self.store.set(key, value.to_string()).await
    }

    /// Saved language, Arabic when unset or unrecognized
    pub async fn language(&self) -> AppResult<Language> {
        Ok(self
            .store
            .get(LANGUAGE_KEY)
            .await?
            .and_then(|code| Language::from_code(&code))
            .unwrap_or_default())
    }

    pub async fn set_language(&self, language: Language) -> AppResult<()> {
        self.store
            .set(LANGUAGE_KEY, language.code().to_string())
            .await
    }

    pub async fn has_seen_onboarding(&self) -> AppResult<bool> {
        self.flag(ONBOARDING_KEY).await
    }

    pub async fn mark_onboarding_seen(&self) -> AppResult<()> {
        self.set_flag(ONBOARDING_KEY, true).await
    }

    pub async fn notifications_enabled(&self) -> AppResult<bool> {
        self.flag(NOTIFICATIONS_ENABLED_KEY).await
    }

    pub async fn set_notifications_enabled(&self, enabled: bool) -> AppResult<()> {
        self.set_flag(NOTIFICATIONS_ENABLED_KEY, enabled).await
    }

    /// Push token of this device, if one was registered
    pub async fn push_token(&self) -> AppResult<Option<String>> {
        Ok(self
            .store
            .get(PUSH_TOKEN_KEY)
            .await?
            .filter(|t| !t.trim().is_empty()))
    }

    pub async fn set_push_token(&self, token: &str) -> AppResult<()> {
        self.store.set(PUSH_TOKEN_KEY, token.to_string()).await
    }

    pub async fn reminders_scheduled(&self) -> AppResult<bool> {
        self.flag(REMINDERS_SCHEDULED_KEY).await
    }

    pub async fn set_reminders_scheduled(&self, scheduled: bool) -> AppResult<()> {
        self.set_flag(REMINDERS_SCHEDULED_KEY, scheduled).await
    }
}
