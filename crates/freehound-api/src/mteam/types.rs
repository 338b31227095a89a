use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Response envelope ────────────────────────────────────────────

/// Standard `{code, message, data}` response envelope. Success is
/// `code == "0"`; anything else is an API-level failure.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_ok(&self) -> bool {
        self.code == "0"
    }
}

/// Paged payload: the record list lives one level down at `data.data`.
#[derive(Debug, Deserialize)]
pub struct PagedData<T> {
    #[serde(default)]
    pub data: Vec<T>,
}

impl<T> Default for PagedData<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

// ── Domain enums shared with the core crate ──────────────────────

/// Promotional pricing category the tracker assigns to a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscountKind {
    Free,
    DoubleFree,
    HalfPrice,
    DoubleHalfPrice,
    DoubleUp,
    Percent30,
    Percent70,
    Normal,
    Unknown,
}

impl DiscountKind {
    pub fn from_api_str(raw: &str) -> Self {
        match raw {
            "FREE" => Self::Free,
            "_2X_FREE" => Self::DoubleFree,
            "PERCENT_50" => Self::HalfPrice,
            "_2X_PERCENT_50" => Self::DoubleHalfPrice,
            "_2X" => Self::DoubleUp,
            "PERCENT_30" => Self::Percent30,
            "PERCENT_70" => Self::Percent70,
            "NORMAL" => Self::Normal,
            // The tracker grows new free variants over time; anything
            // carrying "FREE" must keep charging-free semantics.
            other if other.contains("FREE") => Self::Free,
            _ => Self::Unknown,
        }
    }

    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::DoubleFree => "_2X_FREE",
            Self::HalfPrice => "PERCENT_50",
            Self::DoubleHalfPrice => "_2X_PERCENT_50",
            Self::DoubleUp => "_2X",
            Self::Percent30 => "PERCENT_30",
            Self::Percent70 => "PERCENT_70",
            Self::Normal => "NORMAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Free-class discounts do not charge download traffic.
    pub fn is_free_class(self) -> bool {
        matches!(self, Self::Free | Self::DoubleFree)
    }

    pub fn label_zh(self) -> &'static str {
        match self {
            Self::Free => "免费",
            Self::DoubleFree => "2x免费",
            Self::HalfPrice => "50%",
            Self::DoubleHalfPrice => "2x50%",
            Self::DoubleUp => "2x上传",
            Self::Percent30 => "30%",
            Self::Percent70 => "70%",
            Self::Normal => "无优惠",
            Self::Unknown => "未知",
        }
    }

    pub fn label_en(self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::DoubleFree => "2x Free",
            Self::HalfPrice => "50%",
            Self::DoubleHalfPrice => "2x50%",
            Self::DoubleUp => "2x UP",
            Self::Percent30 => "30%",
            Self::Percent70 => "70%",
            Self::Normal => "None",
            Self::Unknown => "Unknown",
        }
    }
}

/// Content-category search partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Normal,
    Adult,
}

impl SearchMode {
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Adult => "adult",
        }
    }
}

/// Which of the user's torrent lists to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTorrentKind {
    Seeding,
    Leeching,
}

impl UserTorrentKind {
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::Seeding => "SEEDING",
            Self::Leeching => "LEECHING",
        }
    }
}

// ── Record types ─────────────────────────────────────────────────

/// One torrent record from search or a nested `torrent` object.
///
/// The remote is loose with types (ids and sizes arrive as either string or
/// number, fields go missing); everything degrades to zero/empty instead of
/// failing the batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TorrentRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    pub small_descr: String,
    #[serde(deserialize_with = "de_u64")]
    pub size: u64,
    #[serde(deserialize_with = "de_id")]
    pub category: String,
    pub category_name: String,
    pub created_date: String,
    pub status: Option<TorrentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TorrentStatus {
    #[serde(deserialize_with = "de_u64")]
    pub seeders: u64,
    #[serde(deserialize_with = "de_u64")]
    pub leechers: u64,
    pub discount: Option<String>,
    pub discount_end_time: Option<String>,
}

/// One entry from the user-torrent or collection lists: a nested torrent
/// reference plus (for leeching) peer progress counters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserTorrentRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub torrent: Option<TorrentRecord>,
    pub peer: Option<PeerRecord>,
}

impl UserTorrentRecord {
    /// The torrent identity: nested `torrent.id` when present, else the
    /// record's own `id`.
    pub fn torrent_id(&self) -> &str {
        match &self.torrent {
            Some(t) if !t.id.is_empty() => &t.id,
            _ => &self.id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerRecord {
    #[serde(deserialize_with = "de_u64")]
    pub downloaded: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name_chs: String,
    pub name_eng: String,
}

// ── Profile counters ─────────────────────────────────────────────

/// Transfer counters extracted from the profile payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileCounters {
    pub uploaded: u64,
    pub downloaded: u64,
    /// Share ratio as reported by the remote, when it reports one.
    pub share_rate: Option<f64>,
}

/// Extract transfer counters from a profile payload.
///
/// The remote has shipped the counters in at least three places:
/// `data.memberCount`, directly on `data`, and under `data.member`. The
/// candidates are tried in that order; the first with any non-zero counter
/// wins. A `shareRate` seen on an earlier candidate is kept.
pub fn extract_profile_counters(data: &Value) -> ProfileCounters {
    let candidates = [data.get("memberCount"), Some(data), data.get("member")];

    let mut share_rate = None;
    for node in candidates.into_iter().flatten() {
        if share_rate.is_none() {
            share_rate = value_f64(node.get("shareRate"));
        }
        let uploaded = value_u64(node.get("uploaded"));
        let downloaded = value_u64(node.get("downloaded"));
        if uploaded > 0 || downloaded > 0 {
            return ProfileCounters {
                uploaded,
                downloaded,
                share_rate,
            };
        }
    }

    ProfileCounters {
        uploaded: 0,
        downloaded: 0,
        share_rate,
    }
}

fn value_u64(v: Option<&Value>) -> u64 {
    match v {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn value_f64(v: Option<&Value>) -> Option<f64> {
    match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

// ── Lenient field deserializers ──────────────────────────────────

fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn de_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(value_u64(Some(&Value::deserialize(d)?)))
}
