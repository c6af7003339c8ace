pub mod client;
pub mod messages;
pub mod poller;
pub mod types;

pub use client::{TelegramClient, TelegramError};
pub use poller::{dispatch, run_polling};
pub use types::{Command, Intent, Message, Update, VideoAttachment};
