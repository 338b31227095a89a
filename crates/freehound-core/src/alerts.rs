//! Alert engine: detects expiring and reneged promotions over the
//! operator's incomplete downloads, with per-(torrent, condition) cooldown
//! deduplication.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::models::{LeechProgress, TorrentItem};
use crate::remaining::{self, Remaining};

const ALERT_TITLE: &str = "Mteam 做种预警";

/// The two alert conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    /// Free window closing with the download incomplete.
    Expiring,
    /// Previously-free torrent reverted to paid with the download
    /// incomplete.
    Changed,
}

/// One notification request produced by the engine.
#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: AlertKind,
    pub torrent_id: String,
    pub title: String,
    pub body: String,
}

/// Cooldown-deduplicated alert detection.
///
/// `known_free` records every id ever observed with a free-class discount.
/// It is append-only across cycles — ids are kept even after expiry so a
/// later reversion to paid is still detected. Unbounded over very long
/// uptimes; eviction would change reneged-promotion behavior, so none is
/// done.
pub struct AlertEngine {
    threshold_minutes: f64,
    cooldown_secs: i64,
    known_free: HashSet<String>,
    sent: HashMap<(String, AlertKind), i64>,
}

impl AlertEngine {
    pub fn new(threshold_minutes: u64, cooldown_secs: u64) -> Self {
        Self {
            threshold_minutes: threshold_minutes as f64,
            cooldown_secs: cooldown_secs as i64,
            known_free: HashSet::new(),
            sent: HashMap::new(),
        }
    }

    /// Evaluate one cycle's merged items and leeching map at `now`
    /// (reference-zone wall clock).
    ///
    /// Mutates the known-free set and the cooldown map; the caller delivers
    /// the returned alerts. Must not be called when the notification
    /// transport is unconfigured — state must not advance in that case.
    pub fn evaluate(
        &mut self,
        items: &[TorrentItem],
        leeching: &HashMap<String, LeechProgress>,
        now: NaiveDateTime,
    ) -> Vec<Alert> {
        for item in items {
            if item.discount.is_free_class() {
                self.known_free.insert(item.id.clone());
            }
        }
        debug!(tracked = self.known_free.len(), "known-free set updated");

        let ts = now.and_utc().timestamp();
        let mut alerts = Vec::new();

        for (id, progress) in leeching {
            let completion = progress.completion();
            // Finished downloads are exempt from both conditions.
            if completion >= 100.0 {
                continue;
            }

            if progress.discount.is_free_class() {
                let end = progress
                    .discount_end_time
                    .as_deref()
                    .and_then(remaining::parse_datetime);
                if let Some(end) = end {
                    let remaining = remaining::classify_at(Some(end), now);
                    let minutes = remaining.minutes();
                    if minutes > 0.0
                        && minutes < self.threshold_minutes
                        && self.try_reserve(id, AlertKind::Expiring, ts)
                    {
                        alerts.push(Alert {
                            kind: AlertKind::Expiring,
                            torrent_id: id.clone(),
                            title: ALERT_TITLE.to_string(),
                            body: expiring_body(progress, &remaining, completion),
                        });
                    }
                }
            } else if self.known_free.contains(id) && self.try_reserve(id, AlertKind::Changed, ts) {
                alerts.push(Alert {
                    kind: AlertKind::Changed,
                    torrent_id: id.clone(),
                    title: ALERT_TITLE.to_string(),
                    body: changed_body(progress, completion),
                });
            }
        }

        alerts
    }

    /// Number of ids ever observed with a free-class discount.
    pub fn tracked_free_count(&self) -> usize {
        self.known_free.len()
    }

    /// Number of recorded cooldown reservations (live or prunable).
    pub fn pending_cooldowns(&self) -> usize {
        self.sent.len()
    }

    /// Prune stale cooldown entries, then reserve the slot for this
    /// (id, kind) pair. Reserving happens before the send is attempted, so
    /// a failed send still consumes the cooldown.
    fn try_reserve(&mut self, id: &str, kind: AlertKind, now: i64) -> bool {
        let cooldown = self.cooldown_secs;
        self.sent.retain(|_, sent_at| now - *sent_at <= cooldown);

        let key = (id.to_string(), kind);
        if self.sent.contains_key(&key) {
            return false;
        }
        self.sent.insert(key, now);
        true
    }
}

fn expiring_body(progress: &LeechProgress, remaining: &Remaining, completion: f64) -> String {
    format!(
        "<h3>⚠️ 免费即将到期警告</h3>\
         <p><strong>种子名称:</strong> {}</p>\
         <p><strong>剩余免费时间:</strong> <span style=\"color:red;\">{}</span></p>\
         <p><strong>当前下载进度:</strong> <span style=\"color:orange;\">{:.1}%</span></p>\
         <p><strong>当前优惠:</strong> {}</p>\
         <hr>\
         <p style=\"color:red;\"><strong>请注意！</strong>该种子即将结束免费，但你只下载了 {:.1}%！</p>",
        progress.name,
        remaining.display,
        completion,
        progress.discount.as_api_str(),
        completion,
    )
}

fn changed_body(progress: &LeechProgress, completion: f64) -> String {
    format!(
        "<h3>🚨 种子免费状态变更警告</h3>\
         <p><strong>种子名称:</strong> {}</p>\
         <p><strong>当前状态:</strong> <span style=\"color:red;\">非免费 ({})</span></p>\
         <p><strong>当前下载进度:</strong> <span style=\"color:orange;\">{:.1}%</span></p>\
         <hr>\
         <p style=\"color:red;\"><strong>警告！</strong>该种子已从免费变为非免费状态，且当前未完成下载，正在消耗流量！</p>",
        progress.name,
        progress.discount.as_api_str(),
        completion,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscountKind;
    use chrono::Duration;

    fn now() -> NaiveDateTime {
        remaining::parse_datetime("2024-06-15 12:00:00").unwrap()
    }

    fn engine() -> AlertEngine {
        AlertEngine::new(10, 1800)
    }

    fn free_item(id: &str) -> TorrentItem {
        let raw: freehound_api::mteam::types::TorrentRecord =
            serde_json::from_value(serde_json::json!({
                "id": id,
                "name": format!("torrent-{id}"),
                "size": 1000,
                "status": { "discount": "FREE" }
            }))
            .unwrap();
        TorrentItem::from_record(
            &raw,
            DiscountKind::Free,
            crate::models::SearchMode::Normal,
            "https://example.org",
            &Default::default(),
            &Default::default(),
            now(),
        )
    }

    fn leeching(
        id: &str,
        discount: DiscountKind,
        end_in: Option<chrono::Duration>,
        completion: f64,
    ) -> HashMap<String, LeechProgress> {
        let mut map = HashMap::new();
        map.insert(
            id.to_string(),
            LeechProgress {
                name: format!("torrent-{id}"),
                downloaded: completion as u64,
                size: 100,
                discount,
                discount_end_time: end_in
                    .map(|d| (now() + d).format("%Y-%m-%d %H:%M:%S").to_string()),
            },
        );
        map
    }

    #[test]
    fn test_expiring_alert_fires_once_within_cooldown() {
        let mut engine = engine();
        let map = leeching("999", DiscountKind::Free, Some(Duration::minutes(5)), 20.0);

        let first = engine.evaluate(&[], &map, now());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, AlertKind::Expiring);
        assert_eq!(first[0].torrent_id, "999");

        // Second trigger inside the cooldown window: suppressed.
        let second = engine.evaluate(&[], &map, now() + Duration::minutes(2));
        assert!(second.is_empty());

        // Third trigger after the cooldown elapses: fires again. The end
        // time moves with it so the condition itself still holds.
        let later = leeching(
            "999",
            DiscountKind::Free,
            Some(Duration::seconds(1801) + Duration::minutes(5)),
            20.0,
        );
        let third = engine.evaluate(&[], &later, now() + Duration::seconds(1801));
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn test_expiring_requires_window_inside_threshold() {
        let mut engine = engine();

        // 30 minutes left: outside the 10-minute threshold.
        let far = leeching("1", DiscountKind::Free, Some(Duration::minutes(30)), 20.0);
        assert!(engine.evaluate(&[], &far, now()).is_empty());

        // Already expired: remaining is 0, not strictly positive.
        let expired = leeching("2", DiscountKind::Free, Some(Duration::minutes(-5)), 20.0);
        assert!(engine.evaluate(&[], &expired, now()).is_empty());

        // No end time at all: permanent free, nothing to expire.
        let permanent = leeching("3", DiscountKind::Free, None, 20.0);
        assert!(engine.evaluate(&[], &permanent, now()).is_empty());
    }

    #[test]
    fn test_reneged_promotion_detection() {
        let mut engine = engine();

        // Cycle N: the torrent is observed free.
        let items = vec![free_item("777")];
        let no_leech = HashMap::new();
        assert!(engine.evaluate(&items, &no_leech, now()).is_empty());

        // Cycle N+1: same id now Normal while leeching at 40%.
        let map = leeching("777", DiscountKind::Normal, None, 40.0);
        let alerts = engine.evaluate(&[], &map, now() + Duration::minutes(10));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Changed);

        // Fired again immediately: cooldown suppresses.
        let repeat = engine.evaluate(&[], &map, now() + Duration::minutes(11));
        assert!(repeat.is_empty());
    }

    #[test]
    fn test_unmapped_free_variant_is_not_a_reversion() {
        let mut engine = engine();
        let items = vec![free_item("777")];
        engine.evaluate(&items, &HashMap::new(), now());

        // Cycle N+1 reports a free variant the mapping has never seen.
        // Still free-class, so no reversion alert.
        let map = leeching(
            "777",
            DiscountKind::from_api_str("_3X_FREE"),
            None,
            40.0,
        );
        assert!(engine
            .evaluate(&[], &map, now() + Duration::minutes(10))
            .is_empty());
    }

    #[test]
    fn test_completed_downloads_are_exempt() {
        let mut engine = engine();
        let items = vec![free_item("777")];
        engine.evaluate(&items, &HashMap::new(), now());

        // Reverted to Normal but at 100%: no alert.
        let done = leeching("777", DiscountKind::Normal, None, 100.0);
        assert!(engine.evaluate(&[], &done, now()).is_empty());

        // Expiring at 100%: no alert either.
        let done_free = leeching("888", DiscountKind::Free, Some(Duration::minutes(5)), 100.0);
        assert!(engine.evaluate(&[], &done_free, now()).is_empty());
    }

    #[test]
    fn test_never_free_torrent_does_not_alert_on_normal() {
        let mut engine = engine();
        // Id was never observed free, so a Normal discount is just normal.
        let map = leeching("42", DiscountKind::Normal, None, 40.0);
        assert!(engine.evaluate(&[], &map, now()).is_empty());
    }

    #[test]
    fn test_five_minute_scenario_emits_exactly_one_expiring() {
        let mut engine = engine();
        let items = vec![free_item("999")];
        let map = leeching("999", DiscountKind::Free, Some(Duration::minutes(5)), 20.0);

        let alerts = engine.evaluate(&items, &map, now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Expiring);
        assert!(alerts[0].body.contains("20.0%"));
    }
}
