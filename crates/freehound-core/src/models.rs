use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub use freehound_api::mteam::types::{CategoryRecord, DiscountKind, SearchMode};
use freehound_api::mteam::types::{ProfileCounters, TorrentRecord, UserTorrentRecord};

use crate::remaining::{self, Remaining};

/// Share ratio reported when the user has uploaded but never downloaded.
pub const INFINITE_RATIO: f64 = 99_999.99;

/// The operator's relationship to a torrent in the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    None,
    Seeding,
    Leeching,
}

/// One promotional listing. Rebuilt from scratch every refresh cycle and
/// never mutated afterwards; only the id persists across cycles (for alert
/// history correlation).
#[derive(Debug, Clone, Serialize)]
pub struct TorrentItem {
    pub id: String,
    pub name: String,
    pub small_descr: String,
    pub size: u64,
    pub size_display: String,
    pub seeders: u64,
    pub leechers: u64,
    pub discount: DiscountKind,
    pub discount_label_zh: &'static str,
    pub discount_label_en: &'static str,
    pub discount_end_time: Option<String>,
    pub remaining: Remaining,
    pub category: String,
    pub category_name: String,
    pub created_date: String,
    pub detail_url: String,
    pub user_status: UserStatus,
    /// Download completion percent when `user_status` is `Leeching`.
    pub user_progress: f64,
    pub is_collected: bool,
    pub mode: SearchMode,
}

impl TorrentItem {
    /// Build one listing from a raw search record.
    ///
    /// `fallback` is the discount kind the search was issued for, used when
    /// the record itself carries none.
    pub fn from_record(
        record: &TorrentRecord,
        fallback: DiscountKind,
        mode: SearchMode,
        site_url: &str,
        state: &UserTorrentState,
        collected: &HashSet<String>,
        now: NaiveDateTime,
    ) -> Self {
        let status = record.status.clone().unwrap_or_default();
        let discount = status
            .discount
            .as_deref()
            .map(DiscountKind::from_api_str)
            .unwrap_or(fallback);
        let end = status
            .discount_end_time
            .as_deref()
            .and_then(remaining::parse_datetime);
        let remaining = remaining::classify_at(end, now);

        let (user_status, user_progress) = if state.seeding.contains(&record.id) {
            (UserStatus::Seeding, 0.0)
        } else if let Some(progress) = state.leeching.get(&record.id) {
            (UserStatus::Leeching, progress.completion())
        } else {
            (UserStatus::None, 0.0)
        };

        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            small_descr: record.small_descr.clone(),
            size: record.size,
            size_display: format_size(record.size),
            seeders: status.seeders,
            leechers: status.leechers,
            discount,
            discount_label_zh: discount.label_zh(),
            discount_label_en: discount.label_en(),
            discount_end_time: status.discount_end_time.clone(),
            remaining,
            category: record.category.clone(),
            category_name: record.category_name.clone(),
            created_date: record.created_date.clone(),
            detail_url: format!("{site_url}/detail/{}", record.id),
            user_status,
            user_progress,
            is_collected: collected.contains(&record.id),
            mode,
        }
    }
}

/// Per-torrent progress for an in-flight download.
#[derive(Debug, Clone)]
pub struct LeechProgress {
    pub name: String,
    pub downloaded: u64,
    pub size: u64,
    pub discount: DiscountKind,
    pub discount_end_time: Option<String>,
}

impl LeechProgress {
    /// Completion percent in [0, 100]; 0 when the total size is unknown.
    pub fn completion(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        ((self.downloaded as f64 / self.size as f64) * 100.0).min(100.0)
    }
}

/// Seeding/leeching correlation maps for one cycle.
///
/// Invariant: an id appears in at most one of the two maps. Seeding wins
/// when the raw lists overlap, because it is applied first.
#[derive(Debug, Clone, Default)]
pub struct UserTorrentState {
    pub seeding: HashSet<String>,
    pub leeching: HashMap<String, LeechProgress>,
}

impl UserTorrentState {
    /// Replace the seeding set from a fresh list fetch.
    pub fn set_seeding(&mut self, records: &[UserTorrentRecord]) {
        self.seeding = records
            .iter()
            .map(|r| r.torrent_id().to_string())
            .filter(|id| !id.is_empty())
            .collect();
    }

    /// Replace the leeching map from a fresh list fetch, skipping ids
    /// already claimed by the seeding set.
    pub fn set_leeching(&mut self, records: &[UserTorrentRecord]) {
        let mut leeching = HashMap::new();
        for record in records {
            let id = record.torrent_id().to_string();
            if id.is_empty() || self.seeding.contains(&id) {
                continue;
            }
            let torrent = record.torrent.clone().unwrap_or_default();
            let status = torrent.status.unwrap_or_default();
            leeching.entry(id).or_insert(LeechProgress {
                name: if torrent.name.is_empty() {
                    "未知种子".to_string()
                } else {
                    torrent.name
                },
                downloaded: record.peer.as_ref().map(|p| p.downloaded).unwrap_or(0),
                size: torrent.size,
                discount: status
                    .discount
                    .as_deref()
                    .map(DiscountKind::from_api_str)
                    .unwrap_or(DiscountKind::Unknown),
                discount_end_time: status.discount_end_time,
            });
        }
        self.leeching = leeching;
    }
}

/// Uploaded/downloaded totals with a derived share ratio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub uploaded: u64,
    pub downloaded: u64,
    pub share_ratio: f64,
    pub uploaded_display: String,
    pub downloaded_display: String,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self::from_counters(&ProfileCounters::default())
    }
}

impl UserProfile {
    pub fn from_counters(counters: &ProfileCounters) -> Self {
        let share_ratio = match counters.share_rate {
            Some(rate) => rate,
            None if counters.downloaded > 0 => {
                counters.uploaded as f64 / counters.downloaded as f64
            }
            None if counters.uploaded > 0 => INFINITE_RATIO,
            None => 0.0,
        };

        Self {
            uploaded: counters.uploaded,
            downloaded: counters.downloaded,
            share_ratio,
            uploaded_display: format_size(counters.uploaded),
            downloaded_display: format_size(counters.downloaded),
        }
    }
}

/// The published result of one refresh cycle. Immutable once published;
/// replaced wholesale via an `Arc` swap so readers never see a torn one.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub torrents: Vec<TorrentItem>,
    pub categories: Vec<CategoryRecord>,
    pub last_update: Option<String>,
    pub error: Option<String>,
    pub total: usize,
    pub free_count: usize,
    pub free_2x_count: usize,
}

impl Snapshot {
    /// The error-marked empty snapshot published when the credential is
    /// missing: the facade can always render something.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Bytes to a human-readable "x.xx UNIT" string.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}
