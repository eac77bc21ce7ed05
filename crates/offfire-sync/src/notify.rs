// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - Notification dispatch
//
// Turns domain events into notifications. Local notifications go to this
// device; a new order is also pushed to the admin device, whose token lives
// in the backend's shared settings record. Dispatch never fails the caller:
// every channel's result is returned in a DispatchReport.

use crate::backend::Backend;
use async_trait::async_trait;
use chrono::Utc;
use offfire_core::{AppError, AppResult, ErrorLog, Language, Preferences};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Default,
    AdminAlerts,
}

impl Channel {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AdminAlerts => "admin_alerts",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub data: Value,
    pub channel: Channel,
}

impl Notification {
    fn new(title: String, body: String, data: Value, channel: Channel) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            body,
            data,
            channel,
        }
    }
}

/// Domain events that produce notifications
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    NewOrder {
        order_id: i64,
        client_name: String,
        service_name: Option<String>,
    },
    Offer {
        title: String,
        description: Option<String>,
        code: Option<String>,
    },
    ServiceReminder {
        service_name: Option<String>,
        message: Option<String>,
    },
    DailyTip,
    MaintenanceReminder {
        service_name: String,
    },
}

/// Shows a notification on this device
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    async fn show(&self, notification: &Notification) -> AppResult<()>;
}

/// Delivers a notification to another device by push token
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn push(&self, token: &str, notification: &Notification) -> AppResult<()>;
}

/// Local notifier for hosts without a notification center
pub struct LoggingNotifier;

#[async_trait]
impl LocalNotifier for LoggingNotifier {
    async fn show(&self, notification: &Notification) -> AppResult<()> {
        tracing::info!(
            channel = notification.channel.id(),
            "Notification: {} | {}",
            notification.title,
            notification.body.replace('\n', " / ")
        );
        Ok(())
    }
}

/// Push sender for the Expo push service
pub struct ExpoPushClient {
    http_client: Client,
    endpoint: String,
}

impl ExpoPushClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl PushSender for ExpoPushClient {
    async fn push(&self, token: &str, notification: &Notification) -> AppResult<()> {
        let message = json!({
            "to": token,
            "sound": "default",
            "title": notification.title,
            "body": notification.body,
            "data": notification.data,
            "channelId": notification.channel.id(),
            "priority": "high",
        });

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&message)
            .send()
            .await
            .map_err(|e| AppError::Push(format!("Failed to reach push service: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Push(format!(
                "Push service returned status {}",
                response.status()
            )));
        }

        // Per-message failures come back with a 200 and a ticket status
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if body["data"]["status"] == "error" {
            let message = body["data"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(AppError::Push(message));
        }

        Ok(())
    }
}

/// Result of one dispatch, per channel. `None` means not attempted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispatchReport {
    pub local: Option<Result<(), AppError>>,
    pub remote: Option<Result<(), AppError>>,
}

impl DispatchReport {
    pub fn is_ok(&self) -> bool {
        !matches!(self.local, Some(Err(_))) && !matches!(self.remote, Some(Err(_)))
    }
}

fn pick(language: Language, ar: &str, en: &str) -> String {
    match language {
        Language::Ar => ar.to_string(),
        Language::En => en.to_string(),
    }
}

pub struct NotificationDispatcher {
    local: Arc<dyn LocalNotifier>,
    push: Arc<dyn PushSender>,
    backend: Arc<dyn Backend>,
    preferences: Option<Arc<Preferences>>,
    error_log: Option<Arc<ErrorLog>>,
}

impl NotificationDispatcher {
    pub fn new(
        local: Arc<dyn LocalNotifier>,
        push: Arc<dyn PushSender>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            local,
            push,
            backend,
            preferences: None,
            error_log: None,
        }
    }

    /// Read the display language from preferences on every dispatch
    pub fn with_preferences(mut self, preferences: Arc<Preferences>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_error_log(mut self, error_log: Arc<ErrorLog>) -> Self {
        self.error_log = Some(error_log);
        self
    }

    async fn current_language(&self) -> Language {
        let Some(preferences) = &self.preferences else {
            return Language::default();
        };

        preferences.language().await.unwrap_or_else(|e| {
            tracing::warn!("Could not read language, using default: {}", e);
            Language::default()
        })
    }

    /// Notification shown on this device for `event`
    pub fn compose_local(&self, event: &NotificationEvent, lang: Language) -> Notification {
        let timestamp = Utc::now().to_rfc3339();

        match event {
            NotificationEvent::NewOrder { order_id, .. } => Notification::new(
                pick(lang, "✅ تم استلام طلبك", "✅ Your request was received"),
                match lang {
                    Language::Ar => format!(
                        "تم تسجيل طلبك رقم #{} بنجاح، سيتم مراجعته والتواصل معك قريباً.",
                        order_id
                    ),
                    Language::En => format!(
                        "Your request #{} was registered. We will review it and contact you soon.",
                        order_id
                    ),
                },
                json!({ "type": "order_success", "orderId": order_id, "timestamp": timestamp }),
                Channel::Default,
            ),
            NotificationEvent::Offer {
                title,
                description,
                code,
            } => {
                let code_text = code.as_ref().map(|c| match lang {
                    Language::Ar => format!("الكود: {}", c),
                    Language::En => format!("Code: {}", c),
                });
                let body = [description.clone(), code_text]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");

                Notification::new(
                    format!("🎁 {}", title),
                    body.trim().to_string(),
                    json!({ "type": "offer", "code": code, "screen": "offers", "timestamp": timestamp }),
                    Channel::Default,
                )
            }
            NotificationEvent::ServiceReminder {
                service_name,
                message,
            } => {
                let message = message.clone().unwrap_or_else(|| {
                    pick(lang, "اطلب عرض سعر مجاني الآن", "Request a free quote now")
                });
                let body = format!("{} {}", service_name.as_deref().unwrap_or_default(), message);

                Notification::new(
                    pick(lang, "🔔 تذكير", "🔔 Reminder"),
                    body.trim().to_string(),
                    json!({ "type": "reminder", "screen": "services", "timestamp": timestamp }),
                    Channel::Default,
                )
            }
            NotificationEvent::DailyTip => Notification::new(
                pick(lang, "💡 دليلك الرقمي الذكي", "💡 Your smart safety guide"),
                pick(
                    lang,
                    "وفّر عناء البحث واحصل على عروض أسعار",
                    "Skip the search and get price quotes",
                ),
                json!({ "type": "tip", "screen": "home", "timestamp": timestamp }),
                Channel::Default,
            ),
            NotificationEvent::MaintenanceReminder { service_name } => Notification::new(
                pick(lang, "⏰ صيانة دورية", "⏰ Periodic maintenance"),
                match lang {
                    Language::Ar => format!("هل حان وقت صيانة {}؟", service_name),
                    Language::En => format!("Is it time to service your {}?", service_name),
                },
                json!({ "type": "maintenance", "screen": "services", "timestamp": timestamp }),
                Channel::Default,
            ),
        }
    }

    /// Notification pushed to the admin device, only for new orders
    pub fn compose_admin(&self, event: &NotificationEvent, lang: Language) -> Option<Notification> {
        let NotificationEvent::NewOrder {
            order_id,
            client_name,
            service_name,
        } = event
        else {
            return None;
        };

        let body = match lang {
            Language::Ar => format!(
                "العميل: {}\nالخدمة: {}\nرقم الطلب: #{}",
                client_name,
                service_name.as_deref().unwrap_or("عام"),
                order_id
            ),
            Language::En => format!(
                "Client: {}\nService: {}\nOrder: #{}",
                client_name,
                service_name.as_deref().unwrap_or("General"),
                order_id
            ),
        };

        Some(Notification::new(
            pick(lang, "🚨 طلب جديد وصل!", "🚨 New order received!"),
            body,
            json!({ "type": "new_order", "orderId": order_id, "screen": "admin_orders" }),
            Channel::AdminAlerts,
        ))
    }

    /// Fire every notification `event` calls for
    pub async fn dispatch(&self, event: NotificationEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        let language = self.current_language().await;

        if let Some(notification) = self.compose_admin(&event, language) {
            report.remote = self.push_to_admin(&notification).await;
        }

        let notification = self.compose_local(&event, language);
        let local = self.local.show(&notification).await;
        if let Err(e) = &local {
            tracing::warn!("Local notification failed: {}", e);
            self.log_error("notify.local", e).await;
        }
        report.local = Some(local);

        report
    }

    /// Push to the admin device. None when no admin token is registered.
    async fn push_to_admin(&self, notification: &Notification) -> Option<Result<(), AppError>> {
        let token = match self.backend.admin_push_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("No admin push token registered, skipping remote push");
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to read admin push token: {}", e);
                self.log_error("notify.admin_token", &e).await;
                return Some(Err(e));
            }
        };

        let result = self.push.push(&token, notification).await;
        if let Err(e) = &result {
            tracing::warn!("Remote push to admin failed: {}", e);
            self.log_error("notify.push", e).await;
        }
        Some(result)
    }

    async fn log_error(&self, context: &str, error: &AppError) {
        if let Some(log) = &self.error_log {
            log.record_quietly(context, error).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, RecordingNotifier};

    fn new_order() -> NotificationEvent {
        NotificationEvent::NewOrder {
            order_id: 17,
            client_name: "Ali".to_string(),
            service_name: None,
        }
    }

    #[tokio::test]
    async fn test_new_order_pushes_to_admin_and_confirms_locally() {
        let backend = Arc::new(FakeBackend::new());
        *backend.admin_token.lock().unwrap() = Some("ExponentPushToken[admin]".to_string());
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(notifier.clone(), notifier.clone(), backend);

        let report = dispatcher.dispatch(new_order()).await;
        assert!(report.is_ok());
        assert_eq!(report.remote, Some(Ok(())));

        let pushed = notifier.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].0, "ExponentPushToken[admin]");
        assert_eq!(pushed[0].1.channel, Channel::AdminAlerts);
        assert!(pushed[0].1.body.contains("#17"));
        assert!(pushed[0].1.body.contains("عام"));

        let shown = notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].data["type"], "order_success");
    }

    #[tokio::test]
    async fn test_no_admin_token_skips_remote() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(
            notifier.clone(),
            notifier.clone(),
            Arc::new(FakeBackend::new()),
        );

        let report = dispatcher.dispatch(new_order()).await;
        assert_eq!(report.remote, None);
        assert_eq!(report.local, Some(Ok(())));
        assert!(notifier.pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_failure_is_reported_not_raised() {
        let backend = Arc::new(FakeBackend::new());
        *backend.admin_token.lock().unwrap() = Some("ExponentPushToken[admin]".to_string());
        let notifier = Arc::new(RecordingNotifier {
            fail_push: true,
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(notifier.clone(), notifier.clone(), backend);

        let report = dispatcher.dispatch(new_order()).await;
        assert!(!report.is_ok());
        assert!(matches!(report.remote, Some(Err(AppError::Push(_)))));
        // The customer still gets the confirmation
        assert_eq!(notifier.shown.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_language_follows_preferences() {
        let preferences = Arc::new(Preferences::new(Arc::new(
            offfire_core::MemoryKeyValueStore::new(),
        )));
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(
            notifier.clone(),
            notifier.clone(),
            Arc::new(FakeBackend::new()),
        )
        .with_preferences(preferences.clone());

        dispatcher.dispatch(NotificationEvent::DailyTip).await;
        preferences.set_language(Language::En).await.unwrap();
        dispatcher.dispatch(NotificationEvent::DailyTip).await;

        let shown = notifier.shown.lock().unwrap();
        assert_eq!(shown[0].title, "💡 دليلك الرقمي الذكي");
        assert_eq!(shown[1].title, "💡 Your smart safety guide");
    }

    #[test]
    fn test_offer_and_reminder_are_local_only() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(
            notifier.clone(),
            notifier,
            Arc::new(FakeBackend::new()),
        );

        let offer = NotificationEvent::Offer {
            title: "20% off".to_string(),
            description: Some("Extinguisher refill".to_string()),
            code: Some("FIRE20".to_string()),
        };
        assert!(dispatcher.compose_admin(&offer, Language::En).is_none());

        let local = dispatcher.compose_local(&offer, Language::En);
        assert_eq!(local.title, "🎁 20% off");
        assert_eq!(local.body, "Extinguisher refill Code: FIRE20");
        assert_eq!(local.data["screen"], "offers");

        let reminder = dispatcher.compose_local(
            &NotificationEvent::ServiceReminder {
                service_name: None,
                message: None,
            },
            Language::En,
        );
        assert_eq!(reminder.body, "Request a free quote now");
    }
}
