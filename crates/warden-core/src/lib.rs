pub mod access_consts;
pub mod classify;
pub mod config;
pub mod error;
pub mod reminder;
pub mod types;

pub use config::WardenConfig;
pub use error::{Result, WardenError};
pub use types::{AccessLevel, AgentId, ChannelOutbound, ConnId, JobId, RunId, SessionKey, UserId};
