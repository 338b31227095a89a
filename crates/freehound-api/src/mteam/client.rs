use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::error::MTeamError;
use super::types::{
    extract_profile_counters, ApiEnvelope, CategoryRecord, DiscountKind, PagedData,
    ProfileCounters, SearchMode, TorrentRecord, UserTorrentKind, UserTorrentRecord,
};
use crate::pacer::CallPacer;

const TIMEOUT: Duration = Duration::from_secs(30);

/// The tracker rejects requests without a browser User-Agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/120.0.0.0 Safari/537.36";

/// M-Team API client.
///
/// All operations are read-only except [`toggle_collection`]. Every call is
/// paced through a single-slot [`CallPacer`] to respect the remote's
/// per-credential rate limits.
///
/// [`toggle_collection`]: MTeamClient::toggle_collection
pub struct MTeamClient {
    base_url: String,
    api_key: String,
    http: Client,
    pacer: CallPacer,
}

impl MTeamClient {
    pub fn new(base_url: String, api_key: String, delay: Duration) -> Self {
        Self {
            base_url,
            api_key,
            http: Client::new(),
            pacer: CallPacer::new(delay),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{path}", self.base_url))
            .timeout(TIMEOUT)
            .header("User-Agent", USER_AGENT)
            .header("x-api-key", self.api_key.trim())
            .header("Accept", "application/json")
    }

    /// Parse the `{code, message, data}` envelope; a missing `data` on a
    /// successful response degrades to the payload's default.
    async fn parse_envelope<T: DeserializeOwned + Default>(
        resp: reqwest::Response,
    ) -> Result<T, MTeamError> {
        let envelope: ApiEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| MTeamError::Parse(e.to_string()))?;

        if envelope.is_ok() {
            Ok(envelope.data.unwrap_or_default())
        } else {
            let code = envelope.code;
            let message = envelope.message.unwrap_or_default();
            tracing::warn!(code = %code, message = %message, "M-Team API error");
            Err(MTeamError::Api { code, message })
        }
    }

    /// Search one page of one (discount, partition) combination.
    pub async fn search_torrents(
        &self,
        discount: DiscountKind,
        mode: SearchMode,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<TorrentRecord>, MTeamError> {
        self.pacer.acquire().await;
        let payload = json!({
            "mode": mode.as_api_str(),
            "discount": discount.as_api_str(),
            "pageNumber": page,
            "pageSize": page_size,
        });

        let resp = self
            .request("/torrent/search")
            .json(&payload)
            .send()
            .await?;
        let data: PagedData<TorrentRecord> = Self::parse_envelope(resp).await?;
        Ok(data.data)
    }

    pub async fn category_list(&self) -> Result<Vec<CategoryRecord>, MTeamError> {
        self.pacer.acquire().await;
        let resp = self.request("/torrent/categoryList").send().await?;
        Self::parse_envelope(resp).await
    }

    /// Fetch one page of the user's seeding or leeching list.
    pub async fn user_torrent_list(
        &self,
        uid: u64,
        kind: UserTorrentKind,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<UserTorrentRecord>, MTeamError> {
        self.pacer.acquire().await;
        let payload = json!({
            "userid": uid,
            "type": kind.as_api_str(),
            "pageNumber": page,
            "pageSize": page_size,
        });

        let resp = self
            .request("/member/getUserTorrentList")
            .json(&payload)
            .send()
            .await?;
        let data: PagedData<UserTorrentRecord> = Self::parse_envelope(resp).await?;
        Ok(data.data)
    }

    pub async fn collection_list(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<UserTorrentRecord>, MTeamError> {
        self.pacer.acquire().await;
        let payload = json!({ "pageNumber": page, "pageSize": page_size });

        let resp = self
            .request("/member/collection")
            .json(&payload)
            .send()
            .await?;
        let data: PagedData<UserTorrentRecord> = Self::parse_envelope(resp).await?;
        Ok(data.data)
    }

    /// Fetch transfer counters for a user. Unlike the JSON endpoints this
    /// one takes a form-encoded body with no JSON Content-Type.
    pub async fn member_profile(&self, uid: u64) -> Result<ProfileCounters, MTeamError> {
        self.pacer.acquire().await;
        let resp = self
            .request("/member/profile")
            .form(&[("uid", uid.to_string())])
            .send()
            .await?;
        let data: serde_json::Value = Self::parse_envelope(resp).await?;
        Ok(extract_profile_counters(&data))
    }

    /// Collect or uncollect a torrent. Form-encoded, like `member_profile`.
    pub async fn toggle_collection(&self, torrent_id: &str, make: bool) -> Result<(), MTeamError> {
        self.pacer.acquire().await;
        let resp = self
            .request("/torrent/collection")
            .form(&[
                ("id", torrent_id),
                ("make", if make { "true" } else { "false" }),
            ])
            .send()
            .await?;
        let _: serde_json::Value = Self::parse_envelope(resp).await?;
        tracing::info!(id = %torrent_id, make, "collection toggled");
        Ok(())
    }
}
