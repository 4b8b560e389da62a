use crate::api::{
    self,
    handlers::auth::AuthConfig,
    reminder::{LogReminderSender, ReminderSender, ReminderWorkerConfig, TelegramSender},
};
use crate::cli::actions::Action;
use anyhow::Result;
use std::sync::Arc;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            base_url,
            telegram_token,
            reminder_poll_seconds,
        } => {
            let auth_config = AuthConfig::new(base_url);

            let sender: Arc<dyn ReminderSender> = match telegram_token {
                Some(token) => Arc::new(TelegramSender::new(token)?),
                None => Arc::new(LogReminderSender),
            };

            let reminder_config =
                ReminderWorkerConfig::new().with_poll_interval_seconds(reminder_poll_seconds);

            api::new(port, dsn, auth_config, sender, reminder_config).await?;
        }
    }

    Ok(())
}
