// SPDX-License-Identifier: AGPL-3.0
// Off Fire Sync - Background task handle
//
// Owned handle for a spawned loop. Dropping the handle drops the shutdown
// sender, which also ends the loop.

use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct BackgroundTask {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn `body` with a receiver that resolves when the task should stop
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(body(shutdown_rx));
        tracing::debug!("Started background task {}", name);

        Self {
            name,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop and wait for it. Work already in progress completes first.
    pub async fn stop(self) {
        let Self {
            name,
            shutdown,
            task,
        } = self;

        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }

        if let Err(e) = task.await {
            tracing::error!("Background task {} ended abnormally: {}", name, e);
        } else {
            tracing::debug!("Stopped background task {}", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_waits_for_loop() {
        let task = BackgroundTask::spawn("ticker", |shutdown| async move {
            let _ = shutdown.await;
        });
        assert_eq!(task.name(), "ticker");
        assert!(!task.is_finished());
        task.stop().await;
    }

    #[tokio::test]
    async fn test_finished_task_is_reported() {
        let task = BackgroundTask::spawn("once", |_shutdown| async {});
        tokio::time::timeout(Duration::from_secs(1), async {
            while !task.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // Stopping an exited task is harmless
        task.stop().await;
    }
}
