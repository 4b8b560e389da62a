pub mod server;

use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        base_url: String,
        telegram_token: Option<SecretString>,
        reminder_poll_seconds: u64,
    },
}
