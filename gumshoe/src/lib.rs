//! gumshoe: daily new-episode email notifications.
//!
//! Subscribers follow TV shows by catalog id. Once a day the
//! [`notification::NotificationPipeline`] checks which followed shows air an
//! episode today and mails each subscriber the list, with signed magic links
//! for managing subscriptions or opting out.

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod notification;
pub mod scheduler;
pub mod subscriptions;
pub mod utils;

pub use error::{Error, Result};
