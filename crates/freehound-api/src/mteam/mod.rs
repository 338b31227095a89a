pub mod client;
pub mod error;
pub mod types;

pub use client::MTeamClient;
pub use error::MTeamError;
pub use types::{DiscountKind, SearchMode, UserTorrentKind};
