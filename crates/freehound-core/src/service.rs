//! The service facade: owns all process-wide state and runs the
//! refresh-aggregate-alert cycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use freehound_api::mteam::types::TorrentRecord;
use freehound_api::mteam::{MTeamClient, MTeamError, UserTorrentKind};
use freehound_api::pushplus::PushPlusClient;

use crate::alerts::AlertEngine;
use crate::config::AppConfig;
use crate::error::FreehoundError;
use crate::models::{
    DiscountKind, SearchMode, Snapshot, TorrentItem, UserProfile, UserTorrentState,
};
use crate::remaining;

/// The four (discount, partition) combinations fetched each cycle, in
/// order. A partition search may return overlapping promo kinds, hence the
/// de-duplication in [`merge_search_pages`].
pub const SEARCH_TASKS: [(DiscountKind, SearchMode); 4] = [
    (DiscountKind::Free, SearchMode::Normal),
    (DiscountKind::DoubleFree, SearchMode::Normal),
    (DiscountKind::Free, SearchMode::Adult),
    (DiscountKind::DoubleFree, SearchMode::Adult),
];

const SEARCH_PAGE_SIZE: u32 = 100;
const USER_PAGE_SIZE: u32 = 200;
/// Spacing between consecutive push sends, to avoid bursting the transport.
const PUSH_PACING: Duration = Duration::from_secs(1);

const MISSING_TOKEN: &str = "MT_TOKEN 未配置";

/// Owns the tracker client, the optional push transport, and all
/// process-wide state: the published snapshot, the user-correlation maps,
/// both profiles, and the alert engine.
///
/// Exactly one refresh cycle runs at a time; `cycle_guard` serializes the
/// interval loop and on-demand triggers.
pub struct HunterService {
    config: AppConfig,
    client: MTeamClient,
    push: Option<PushPlusClient>,
    snapshot: RwLock<Arc<Snapshot>>,
    user_state: RwLock<UserTorrentState>,
    collection_ids: RwLock<HashSet<String>>,
    profile: RwLock<UserProfile>,
    rival_profile: RwLock<UserProfile>,
    alerts: Mutex<AlertEngine>,
    cycle_guard: Mutex<()>,
}

impl HunterService {
    pub fn new(config: AppConfig) -> Self {
        let client = MTeamClient::new(
            config.tracker.api_base.clone(),
            config.tracker.api_key.clone(),
            config.api_delay(),
        );
        let push = if config.alerts.pushplus_token.trim().is_empty() {
            None
        } else {
            Some(PushPlusClient::new(config.alerts.pushplus_token.clone()))
        };
        let alerts = AlertEngine::new(
            config.alerts.threshold_minutes,
            config.alerts.cooldown_secs,
        );

        Self {
            config,
            client,
            push,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            user_state: RwLock::new(UserTorrentState::default()),
            collection_ids: RwLock::new(HashSet::new()),
            profile: RwLock::new(UserProfile::default()),
            rival_profile: RwLock::new(UserProfile::default()),
            alerts: Mutex::new(alerts),
            cycle_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn refresh_interval(&self) -> Duration {
        self.config.refresh_interval()
    }

    /// The latest fully published snapshot.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn profile(&self) -> UserProfile {
        self.profile.read().await.clone()
    }

    pub async fn rival_profile(&self) -> UserProfile {
        self.rival_profile.read().await.clone()
    }

    /// On-demand refresh for the facade; waits behind any in-flight cycle.
    pub async fn trigger_refresh(&self) {
        self.refresh().await;
    }

    /// One full refresh-aggregate-alert cycle.
    ///
    /// Individual remote failures degrade that portion of the output; only
    /// a missing credential short-circuits the whole cycle, with an
    /// explicit error snapshot.
    pub async fn refresh(&self) {
        let _cycle = self.cycle_guard.lock().await;

        if !self.config.has_credential() {
            warn!("tracker credential not configured; publishing error snapshot");
            self.publish(Arc::new(Snapshot::config_error(MISSING_TOKEN)))
                .await;
            return;
        }

        info!("refresh cycle started");
        self.refresh_user_state().await;
        self.refresh_collection().await;
        self.refresh_profiles().await;

        let now = remaining::reference_now();
        let state = self.user_state.read().await.clone();
        let collected = self.collection_ids.read().await.clone();

        let mut pages = Vec::with_capacity(SEARCH_TASKS.len());
        for (discount, mode) in SEARCH_TASKS {
            let records = match self
                .client
                .search_torrents(discount, mode, 1, SEARCH_PAGE_SIZE)
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    error!(
                        discount = discount.as_api_str(),
                        mode = mode.as_api_str(),
                        error = %e,
                        "search failed"
                    );
                    Vec::new()
                }
            };
            pages.push((discount, mode, records));
        }

        let mut torrents = merge_search_pages(
            &pages,
            &self.config.tracker.site_url,
            &state,
            &collected,
            now,
        );
        sort_by_remaining(&mut torrents);

        let categories = match self.client.category_list().await {
            Ok(categories) => categories,
            Err(e) => {
                error!(error = %e, "category list failed");
                Vec::new()
            }
        };

        let free_count = torrents
            .iter()
            .filter(|t| t.discount == DiscountKind::Free)
            .count();
        let free_2x_count = torrents
            .iter()
            .filter(|t| t.discount == DiscountKind::DoubleFree)
            .count();
        info!(
            total = torrents.len(),
            free = free_count,
            free_2x = free_2x_count,
            "refresh cycle complete"
        );

        let snapshot = Arc::new(Snapshot {
            total: torrents.len(),
            free_count,
            free_2x_count,
            torrents,
            categories,
            last_update: Some(now.format("%Y-%m-%d %H:%M:%S").to_string()),
            error: None,
        });
        self.publish(snapshot.clone()).await;

        self.run_alerts(&snapshot.torrents, &state, now).await;
    }

    /// Swap the published snapshot wholesale; readers holding the previous
    /// `Arc` keep a consistent view.
    async fn publish(&self, snapshot: Arc<Snapshot>) {
        *self.snapshot.write().await = snapshot;
    }

    async fn refresh_user_state(&self) {
        let uid = match self.config.tracker.user_id.trim().parse::<u64>() {
            Ok(uid) => uid,
            Err(_) => {
                warn!("user id not configured; skipping user torrent state");
                return;
            }
        };

        match self
            .client
            .user_torrent_list(uid, UserTorrentKind::Seeding, 1, USER_PAGE_SIZE)
            .await
        {
            Ok(records) => {
                let mut state = self.user_state.write().await;
                state.set_seeding(&records);
                info!(count = state.seeding.len(), "seeding list updated");
            }
            // Keep the previous seeding set on failure.
            Err(e) => warn!(error = %e, "failed to fetch seeding list"),
        }

        match self
            .client
            .user_torrent_list(uid, UserTorrentKind::Leeching, 1, USER_PAGE_SIZE)
            .await
        {
            Ok(records) => {
                let mut state = self.user_state.write().await;
                state.set_leeching(&records);
                info!(count = state.leeching.len(), "leeching list updated");
            }
            Err(e) => warn!(error = %e, "failed to fetch leeching list"),
        }
    }

    async fn refresh_collection(&self) {
        match self.client.collection_list(1, USER_PAGE_SIZE).await {
            Ok(records) => {
                let ids: HashSet<String> = records
                    .iter()
                    .map(|r| r.torrent_id().to_string())
                    .filter(|id| !id.is_empty())
                    .collect();
                info!(count = ids.len(), "collection list updated");
                *self.collection_ids.write().await = ids;
            }
            Err(e) => warn!(error = %e, "failed to fetch collection list"),
        }
    }

    async fn refresh_profiles(&self) {
        if let Ok(uid) = self.config.tracker.user_id.trim().parse::<u64>() {
            match self.client.member_profile(uid).await {
                Ok(counters) => {
                    *self.profile.write().await = UserProfile::from_counters(&counters);
                }
                Err(e) => warn!(error = %e, "failed to fetch profile"),
            }
        }

        match self.config.tracker.rival_user_id.trim().parse::<u64>() {
            Ok(uid) => match self.client.member_profile(uid).await {
                Ok(counters) => {
                    *self.rival_profile.write().await = UserProfile::from_counters(&counters);
                }
                Err(e) => warn!(error = %e, "failed to fetch rival profile"),
            },
            Err(_) => {
                tracing::debug!("rival user id not configured; skipping rival profile");
            }
        }
    }

    async fn run_alerts(&self, items: &[TorrentItem], state: &UserTorrentState, now: NaiveDateTime) {
        // Transport structurally disabled: no engine state may advance.
        let Some(push) = &self.push else {
            return;
        };

        let alerts = {
            let mut engine = self.alerts.lock().await;
            engine.evaluate(items, &state.leeching, now)
        };

        for alert in alerts {
            match push.send(&alert.title, &alert.body).await {
                Ok(()) => info!(id = %alert.torrent_id, kind = ?alert.kind, "alert delivered"),
                Err(e) => {
                    // Undelivered, but the cooldown slot is already spent.
                    error!(id = %alert.torrent_id, kind = ?alert.kind, error = %e, "alert delivery failed");
                }
            }
            tokio::time::sleep(PUSH_PACING).await;
        }
    }

    /// Collection toggle passthrough for the facade. Keeps the local
    /// collected-id set in sync on success.
    pub async fn toggle_collection(&self, id: &str, make: bool) -> Result<(), FreehoundError> {
        if id.is_empty() || id.len() > 20 || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FreehoundError::InvalidInput(format!(
                "invalid torrent id: {id:?}"
            )));
        }
        if !self.config.has_credential() {
            return Err(FreehoundError::Config(MISSING_TOKEN.to_string()));
        }

        self.client
            .toggle_collection(id, make)
            .await
            .map_err(|e: MTeamError| FreehoundError::Api(e.to_string()))?;

        let mut ids = self.collection_ids.write().await;
        if make {
            ids.insert(id.to_string());
        } else {
            ids.remove(id);
        }
        Ok(())
    }
}

/// Merge the per-(discount, partition) search pages into one item list.
///
/// De-duplicates by identity: the first occurrence wins, so an item present
/// in several pages keeps its first-seen classification.
pub fn merge_search_pages(
    pages: &[(DiscountKind, SearchMode, Vec<TorrentRecord>)],
    site_url: &str,
    state: &UserTorrentState,
    collected: &HashSet<String>,
    now: NaiveDateTime,
) -> Vec<TorrentItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for (discount, mode, records) in pages {
        for record in records {
            if record.id.is_empty() || !seen.insert(record.id.clone()) {
                continue;
            }
            items.push(TorrentItem::from_record(
                record, *discount, *mode, site_url, state, collected, now,
            ));
        }
    }
    items
}

/// Ascending by remaining hours: expired (0) first, permanent (+∞) last.
pub fn sort_by_remaining(items: &mut [TorrentItem]) {
    items.sort_by(|a, b| a.remaining.hours.total_cmp(&b.remaining.hours));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remaining::WindowStatus;

    fn record(id: &str, end_time: Option<&str>) -> TorrentRecord {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("torrent-{id}"),
            "size": 1000,
            "status": {
                "discount": "FREE",
                "discountEndTime": end_time,
            }
        }))
        .unwrap()
    }

    fn now() -> NaiveDateTime {
        remaining::parse_datetime("2024-06-15 12:00:00").unwrap()
    }

    fn build(pages: &[(DiscountKind, SearchMode, Vec<TorrentRecord>)]) -> Vec<TorrentItem> {
        merge_search_pages(
            pages,
            "https://example.org",
            &UserTorrentState::default(),
            &HashSet::new(),
            now(),
        )
    }

    #[test]
    fn test_merge_deduplicates_first_wins() {
        let pages = vec![
            (
                DiscountKind::Free,
                SearchMode::Normal,
                vec![record("123", None), record("200", None)],
            ),
            (
                DiscountKind::DoubleFree,
                SearchMode::Adult,
                vec![record("123", None), record("300", None)],
            ),
        ];

        let items = build(&pages);
        assert_eq!(items.len(), 3);

        let dup = items.iter().find(|i| i.id == "123").unwrap();
        // First-seen partition's classification is retained.
        assert_eq!(dup.mode, SearchMode::Normal);
    }

    #[test]
    fn test_sort_expired_first_permanent_last() {
        let pages = vec![(
            DiscountKind::Free,
            SearchMode::Normal,
            vec![
                record("permanent", None),
                record("soon", Some("2024-06-15 14:00:00")),
                record("expired", Some("2024-06-15 11:00:00")),
                record("later", Some("2024-06-16 12:00:00")),
            ],
        )];

        let mut items = build(&pages);
        sort_by_remaining(&mut items);

        let order: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(order, ["expired", "soon", "later", "permanent"]);
        assert_eq!(items[0].remaining.status, WindowStatus::Expired);
        assert_eq!(items[3].remaining.status, WindowStatus::Permanent);
    }

    #[tokio::test]
    async fn test_missing_credential_publishes_error_snapshot() {
        let service = HunterService::new(AppConfig::default());

        // Initial snapshot is empty and unmarked.
        assert!(service.snapshot().await.error.is_none());

        service.refresh().await;

        let snapshot = service.snapshot().await;
        assert!(snapshot.error.is_some());
        assert!(snapshot.torrents.is_empty());
        assert_eq!(snapshot.total, 0);
    }

    #[tokio::test]
    async fn test_toggle_collection_validates_input() {
        let service = HunterService::new(AppConfig::default());

        for bad in ["", "abc", "12x", "1; DROP TABLE", "123456789012345678901"] {
            let err = service.toggle_collection(bad, true).await.unwrap_err();
            assert!(matches!(err, FreehoundError::InvalidInput(_)), "{bad:?}");
        }

        // Valid id but no credential configured.
        let err = service.toggle_collection("12345", true).await.unwrap_err();
        assert!(matches!(err, FreehoundError::Config(_)));
    }

    #[tokio::test]
    async fn test_no_push_token_leaves_alert_engine_untouched() {
        // Empty pushplus token: the transport is structurally disabled.
        let service = HunterService::new(AppConfig::default());
        assert!(service.push.is_none());

        // An item set and leeching map that would otherwise raise an
        // expiring alert (free, 5 minutes left, 20% downloaded).
        let items = build(&[(
            DiscountKind::Free,
            SearchMode::Normal,
            vec![record("999", Some("2024-06-15 12:05:00"))],
        )]);
        let leech: freehound_api::mteam::types::UserTorrentRecord =
            serde_json::from_value(serde_json::json!({
                "id": "999",
                "torrent": {
                    "id": "999",
                    "name": "x",
                    "size": 100,
                    "status": {
                        "discount": "FREE",
                        "discountEndTime": "2024-06-15 12:05:00"
                    }
                },
                "peer": { "downloaded": 20 }
            }))
            .unwrap();
        let mut state = UserTorrentState::default();
        state.set_leeching(&[leech]);

        service.run_alerts(&items, &state, now()).await;

        // Bypassed before any state mutation: the known-free set did not
        // grow and no cooldown was reserved.
        let engine = service.alerts.lock().await;
        assert_eq!(engine.tracked_free_count(), 0);
        assert_eq!(engine.pending_cooldowns(), 0);
    }

    #[tokio::test]
    async fn test_profiles_default_until_fetched() {
        let service = HunterService::new(AppConfig::default());
        let profile = service.profile().await;
        assert_eq!(profile.share_ratio, 0.0);
        assert_eq!(profile.uploaded, 0);
    }
}
