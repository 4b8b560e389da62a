pub mod auth;
pub mod health;
pub mod reminders;
pub mod tasks;
pub mod users;
