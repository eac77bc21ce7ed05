// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - Everything that talks to the network
//
// - ConnectivityMonitor and the HTTP probe feeding it
// - Backend trait and the REST implementation
// - SyncEngine draining the offline queue
// - NotificationDispatcher and the reminder scheduler
// - QuoteSubmitter and AuthService built on top of them

pub mod auth;
pub mod backend;
pub mod connectivity;
pub mod notify;
pub mod probe;
pub mod reminders;
pub mod rest;
pub mod submit;
pub mod sync;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthService, SignInOutcome, TokenSync, PASSWORD_RESET_REDIRECT};
pub use backend::{Backend, Role, Session, SessionSlot, SignUpProfile};
pub use connectivity::{ConnectionType, ConnectivityMonitor, ConnectivityWatcher, NetworkState};
pub use notify::{
    Channel, DispatchReport, ExpoPushClient, LocalNotifier, LoggingNotifier, Notification,
    NotificationDispatcher, NotificationEvent, PushSender,
};
pub use probe::ConnectivityProbe;
pub use reminders::{default_reminders, Reminder, ReminderSchedule, ReminderScheduler};
pub use rest::RestBackend;
pub use submit::{QuoteSubmitter, SubmitOutcome};
pub use sync::{SkipReason, SyncEngine, SyncEvent, SyncHandle, SyncOutcome, SyncTrigger};
pub use task::BackgroundTask;
