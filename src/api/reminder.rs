//! Deadline reminder worker and delivery abstractions.
//!
//! Tasks carry an optional `deadline` and a `reminded_at` marker. A background
//! task periodically polls for overdue, incomplete, unreminded tasks whose
//! owner has a reminder subscription, locks a batch via `FOR UPDATE SKIP
//! LOCKED`, and hands each row to a `ReminderSender`. On successful delivery
//! the task is stamped with `reminded_at` inside the same transaction, so a
//! task is reminded at most once even with multiple workers running.
//!
//! The default sender for local dev is `LogReminderSender`, which logs and
//! returns `Ok(())`. `TelegramSender` delivers through the Telegram Bot API.
//! Poll interval and batch size are configurable via `ReminderWorkerConfig`.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::APP_USER_AGENT;

#[derive(Clone, Debug)]
pub struct Reminder {
    pub task_id: Uuid,
    pub chat_id: i64,
    pub title: String,
    pub deadline: DateTime<Utc>,
}

type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Reminder delivery abstraction used by the worker.
/// Implementations return an error to leave the task unreminded for retry on
/// the next poll.
pub trait ReminderSender: Send + Sync {
    fn send<'a>(&'a self, reminder: &'a Reminder) -> SendFuture<'a>;
}

/// Local dev sender that logs the reminder instead of calling Telegram.
#[derive(Clone, Debug)]
pub struct LogReminderSender;

impl ReminderSender for LogReminderSender {
    fn send<'a>(&'a self, reminder: &'a Reminder) -> SendFuture<'a> {
        Box::pin(async move {
            info!(
                task_id = %reminder.task_id,
                chat_id = reminder.chat_id,
                title = %reminder.title,
                deadline = %reminder.deadline,
                "reminder send stub"
            );
            Ok(())
        })
    }
}

/// Delivers reminders through the Telegram Bot API `sendMessage` method.
pub struct TelegramSender {
    client: reqwest::Client,
    token: SecretString,
}

impl TelegramSender {
    /// Build a sender with a shared HTTP client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(token: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build Telegram HTTP client")?;
        Ok(Self { client, token })
    }

    fn message_text(reminder: &Reminder) -> String {
        format!(
            "Task \"{}\" was due {}",
            reminder.title,
            reminder.deadline.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

impl ReminderSender for TelegramSender {
    fn send<'a>(&'a self, reminder: &'a Reminder) -> SendFuture<'a> {
        Box::pin(async move {
            let url = format!(
                "https://api.telegram.org/bot{}/sendMessage",
                self.token.expose_secret()
            );
            let body = serde_json::json!({
                "chat_id": reminder.chat_id,
                "text": Self::message_text(reminder),
            });
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .context("failed to reach Telegram")?;
            match response.status() {
                StatusCode::OK => Ok(()),
                status => Err(anyhow!("Telegram sendMessage returned {status}")),
            }
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ReminderWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
}

impl ReminderWorkerConfig {
    /// Default worker config: 60s poll interval, 25 tasks per batch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 25,
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.poll_interval
        };
        let batch_size = if self.batch_size == 0 {
            1
        } else {
            self.batch_size
        };
        Self {
            poll_interval,
            batch_size,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Default for ReminderWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that polls for due tasks and sends reminders.
pub fn spawn_reminder_worker(
    pool: PgPool,
    sender: Arc<dyn ReminderSender>,
    config: ReminderWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        let poll_interval = config.poll_interval();

        loop {
            let batch_result = process_due_batch(&pool, sender.as_ref(), &config).await;
            if let Err(err) = batch_result {
                error!("reminder batch failed: {err}");
            }

            sleep(poll_interval).await;
        }
    })
}

async fn process_due_batch(
    pool: &PgPool,
    sender: &dyn ReminderSender,
    config: &ReminderWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start reminder transaction")?;

    // Lock a batch so multiple workers can run without double-sending. Tasks
    // whose owner has no subscription are left alone and picked up once a
    // subscription exists.
    let query = r"
        SELECT t.id, t.title, t.deadline, s.chat_id
        FROM tasks t
        JOIN reminder_subscribers s ON s.user_id = t.user_id
        WHERE t.deadline IS NOT NULL
          AND t.deadline <= NOW()
          AND t.completed = FALSE
          AND t.reminded_at IS NULL
        ORDER BY t.deadline ASC
        LIMIT $1
        FOR UPDATE OF t SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(0))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load due task batch")?;

    if rows.is_empty() {
        tx.commit()
            .await
            .context("failed to commit empty reminder batch")?;
        return Ok(0);
    }

    let mut sent = 0;
    for row in rows {
        let reminder = Reminder {
            task_id: row.get("id"),
            chat_id: row.get("chat_id"),
            title: row.get("title"),
            deadline: row.get("deadline"),
        };

        // A failed send leaves reminded_at NULL; the next poll retries it.
        match sender.send(&reminder).await {
            Ok(()) => {
                mark_reminded(&mut tx, reminder.task_id).await?;
                sent += 1;
            }
            Err(err) => {
                error!(task_id = %reminder.task_id, "failed to send reminder: {err}");
            }
        }
    }

    tx.commit()
        .await
        .context("failed to commit reminder batch")?;

    Ok(sent)
}

async fn mark_reminded(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    task_id: Uuid,
) -> Result<()> {
    let query = "UPDATE tasks SET reminded_at = NOW() WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(task_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to mark task as reminded")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_zero_values() {
        let config = ReminderWorkerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .normalize();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch_size(), 1);
    }

    #[test]
    fn normalize_keeps_configured_values() {
        let config = ReminderWorkerConfig::new()
            .with_poll_interval_seconds(30)
            .with_batch_size(50)
            .normalize();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.batch_size(), 50);
    }

    #[test]
    fn default_config_matches_new() {
        let config = ReminderWorkerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.batch_size(), 25);
    }

    #[test]
    fn message_text_includes_title_and_deadline() {
        let deadline = DateTime::parse_from_rfc3339("2024-05-01T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let reminder = Reminder {
            task_id: Uuid::nil(),
            chat_id: 42,
            title: "file taxes".to_string(),
            deadline,
        };
        let text = TelegramSender::message_text(&reminder);
        assert!(text.contains("file taxes"));
        assert!(text.contains("2024-05-01 09:30 UTC"));
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let sender = LogReminderSender;
        let reminder = Reminder {
            task_id: Uuid::nil(),
            chat_id: 1,
            title: "ping".to_string(),
            deadline: Utc::now(),
        };
        assert!(sender.send(&reminder).await.is_ok());
    }
}
