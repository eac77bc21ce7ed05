// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - Recurring local reminders
//
// Daily and weekly reminders evaluated against local wall-clock time.
// The scheduler sleeps until the next due reminder, dispatches it, and
// recomputes. Missed occurrences (host asleep) are not replayed.

use crate::notify::{NotificationDispatcher, NotificationEvent};
use crate::task::BackgroundTask;
use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Weekday};
use offfire_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderSchedule {
    Daily { at: NaiveTime },
    Weekly { weekday: Weekday, at: NaiveTime },
}

fn time_of_day(hour: u32, minute: u32) -> AppResult<NaiveTime> {
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
        AppError::Validation(format!("Invalid reminder time {:02}:{:02}", hour, minute))
    })
}

impl ReminderSchedule {
    pub fn daily(hour: u32, minute: u32) -> AppResult<Self> {
        Ok(Self::Daily {
            at: time_of_day(hour, minute)?,
        })
    }

    pub fn weekly(weekday: Weekday, hour: u32, minute: u32) -> AppResult<Self> {
        Ok(Self::Weekly {
            weekday,
            at: time_of_day(hour, minute)?,
        })
    }

    /// First occurrence strictly after `now`
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        match *self {
            Self::Daily { at } => {
                let today = now.date().and_time(at);
                if today > now {
                    today
                } else {
                    today + ChronoDuration::days(1)
                }
            }
            Self::Weekly { weekday, at } => {
                let days_ahead = (7 + weekday.num_days_from_monday()
                    - now.weekday().num_days_from_monday())
                    % 7;
                let candidate =
                    now.date().and_time(at) + ChronoDuration::days(i64::from(days_ahead));
                if candidate > now {
                    candidate
                } else {
                    candidate + ChronoDuration::days(7)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub schedule: ReminderSchedule,
    pub event: NotificationEvent,
}

/// Daily tip at 10:00 and a Monday 14:00 maintenance reminder
pub fn default_reminders(service_name: &str) -> AppResult<Vec<Reminder>> {
    Ok(vec![
        Reminder {
            schedule: ReminderSchedule::daily(10, 0)?,
            event: NotificationEvent::DailyTip,
        },
        Reminder {
            schedule: ReminderSchedule::weekly(Weekday::Mon, 14, 0)?,
            event: NotificationEvent::MaintenanceReminder {
                service_name: service_name.to_string(),
            },
        },
    ])
}

pub struct ReminderScheduler {
    dispatcher: Arc<NotificationDispatcher>,
    reminders: Vec<Reminder>,
}

impl ReminderScheduler {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, reminders: Vec<Reminder>) -> Self {
        Self {
            dispatcher,
            reminders,
        }
    }

    /// Earliest due time after `now` and the reminders due at that time
    pub fn next_due(&self, now: NaiveDateTime) -> Option<(NaiveDateTime, Vec<&Reminder>)> {
        let next = self
            .reminders
            .iter()
            .map(|r| r.schedule.next_after(now))
            .min()?;

        let due = self
            .reminders
            .iter()
            .filter(|r| r.schedule.next_after(now) == next)
            .collect();

        Some((next, due))
    }

    /// Run until stopped, dispatching each reminder when it comes due
    pub fn start(self) -> BackgroundTask {
        BackgroundTask::spawn("reminders", move |mut shutdown| async move {
            loop {
                let now = Local::now().naive_local();
                let Some((next, _)) = self.next_due(now) else {
                    tracing::debug!("No reminders scheduled");
                    let _ = shutdown.await;
                    return;
                };

                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tracing::debug!("Next reminder at {} (in {:?})", next, wait);

                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(wait) => {
                        // Evaluate relative to just before the target so the
                        // due set matches what was scheduled
                        let events: Vec<NotificationEvent> = self
                            .next_due(next - ChronoDuration::seconds(1))
                            .map(|(_, due)| due.into_iter().map(|r| r.event.clone()).collect())
                            .unwrap_or_default();

                        for event in events {
                            let report = self.dispatcher.dispatch(event).await;
                            if !report.is_ok() {
                                tracing::warn!("Reminder dispatch reported failures: {:?}", report);
                            }
                        }
                    }
                }
            }
        })
    }
}
