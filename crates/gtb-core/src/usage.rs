//! Durable daily API-call counter.
//!
//! The counter lives under the `"usage"` key of a JSON document it shares
//! with the personality table. It never assumes exclusive ownership of the
//! document: every persist re-reads the file and overwrites only the usage
//! fields, so external edits to sibling keys survive.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// On-disk shape of the `"usage"` key. Both fields default so a partially
/// written record still parses and triggers a reset instead of a crash.
#[derive(Debug, Default, Serialize, Deserialize)]
struct UsageRecord {
    #[serde(default)]
    date: String,
    #[serde(default)]
    count: u64,
}

#[derive(Clone, Copy, Debug)]
struct UsageState {
    date: NaiveDate,
    count: u64,
}

/// Concurrency-safe daily usage counter persisted to disk.
///
/// One mutex guards the whole read-check-rollover-mutate-persist sequence;
/// persistence failures are logged and swallowed so the in-memory count
/// stays authoritative for the process lifetime.
pub struct UsageTracker {
    path: PathBuf,
    /// Personality table snapshot from startup, used to seed the
    /// `system_prompts` key when writing a fresh or corrupt file.
    initial_prompts: Value,
    state: Mutex<UsageState>,
}

impl UsageTracker {
    pub fn new(path: impl Into<PathBuf>, initial_prompts: Value) -> Self {
        Self {
            path: path.into(),
            initial_prompts,
            state: Mutex::new(UsageState {
                date: today(),
                count: 0,
            }),
        }
    }

    /// Load the persisted record, resetting if the calendar date advanced.
    ///
    /// Absent or unparsable data synthesizes `{today, 0}` and persists it.
    pub async fn load(&self) {
        let mut st = self.state.lock().await;
        let today = today();

        match read_usage_record(&self.path).await {
            Some((date, count)) if date == today => {
                st.date = today;
                st.count = count;
                tracing::info!(count, date = %today.format(DATE_FORMAT), "loaded usage data");
            }
            Some((date, _)) => {
                tracing::info!(
                    old = %date.format(DATE_FORMAT),
                    new = %today.format(DATE_FORMAT),
                    "detected new day, usage counter reset"
                );
                st.date = today;
                st.count = 0;
                self.persist_under_lock(&st).await;
            }
            None => {
                tracing::warn!(path = %self.path.display(), "no usable usage data, starting at 0");
                st.date = today;
                st.count = 0;
                self.persist_under_lock(&st).await;
            }
        }
    }

    /// Logical count for today. Read-only: a stale in-memory date reads as 0
    /// without mutating state, so display never races with increment.
    pub async fn get_count(&self) -> u64 {
        let st = self.state.lock().await;
        if st.date < today() {
            return 0;
        }
        st.count
    }

    /// Atomically bump today's count and persist; returns the new count.
    ///
    /// The date rollover check happens here too, so a process that ran past
    /// midnight resets on its next write regardless of `load()`.
    pub async fn increment(&self) -> u64 {
        let mut st = self.state.lock().await;
        let today = today();

        if st.date < today {
            tracing::info!(date = %today.format(DATE_FORMAT), "new day during increment, counter reset");
            st.date = today;
            st.count = 0;
        }

        st.count += 1;
        self.persist_under_lock(&st).await;
        st.count
    }

    /// Read-merge-write: only the `"usage"` key is ours to overwrite. Runs
    /// with the state lock held, which is what serializes writers.
    async fn persist_under_lock(&self, st: &UsageState) {
        let mut doc = read_document(&self.path).await;

        let record = UsageRecord {
            date: st.date.format(DATE_FORMAT).to_string(),
            count: st.count,
        };
        match serde_json::to_value(&record) {
            Ok(v) => {
                doc.insert("usage".to_string(), v);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize usage record");
                return;
            }
        }

        if !doc.contains_key("system_prompts") {
            doc.insert("system_prompts".to_string(), self.initial_prompts.clone());
        }

        let rendered = match serde_json::to_string_pretty(&Value::Object(doc)) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize usage document");
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&self.path, rendered).await {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to persist usage data, keeping in-memory count"
            );
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Best-effort read of the whole shared document; empty object on any failure.
async fn read_document(path: &Path) -> Map<String, Value> {
    let Ok(raw) = tokio::fs::read_to_string(path).await else {
        return Map::new();
    };
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

async fn read_usage_record(path: &Path) -> Option<(NaiveDate, u64)> {
    let doc = read_document(path).await;
    let record: UsageRecord = serde_json::from_value(doc.get("usage")?.clone()).unwrap_or_default();

    let date = NaiveDate::parse_from_str(&record.date, DATE_FORMAT)
        // Malformed date reads as the distant past, which forces a reset.
        .unwrap_or(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default());

    Some((date, record.count))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.json"))
    }

    fn write_usage_file(path: &Path, date: NaiveDate, count: u64, extra: Option<(&str, Value)>) {
        let mut doc = Map::new();
        doc.insert(
            "usage".to_string(),
            json!({"date": date.format(DATE_FORMAT).to_string(), "count": count}),
        );
        if let Some((k, v)) = extra {
            doc.insert(k.to_string(), v);
        }
        std::fs::write(path, serde_json::to_string_pretty(&Value::Object(doc)).unwrap()).unwrap();
    }

    fn read_doc(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn loads_todays_count() {
        let path = tmp_file("gtb-usage-today");
        write_usage_file(&path, today(), 5, None);

        let tracker = UsageTracker::new(&path, json!({}));
        tracker.load().await;
        assert_eq!(tracker.get_count().await, 5);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn resets_yesterdays_count_and_persists() {
        let path = tmp_file("gtb-usage-rollover");
        let yesterday = today().pred_opt().unwrap();
        write_usage_file(&path, yesterday, 5, None);

        let tracker = UsageTracker::new(&path, json!({}));
        tracker.load().await;
        assert_eq!(tracker.get_count().await, 0);

        let doc = read_doc(&path);
        assert_eq!(doc["usage"]["count"], 0);
        assert_eq!(
            doc["usage"]["date"],
            today().format(DATE_FORMAT).to_string()
        );

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_synthesizes_zero() {
        let path = tmp_file("gtb-usage-missing");
        let tracker = UsageTracker::new(&path, json!({"Greeter": "Say hi."}));
        tracker.load().await;
        assert_eq!(tracker.get_count().await, 0);

        // A fresh file was written, seeded with the personality snapshot.
        let doc = read_doc(&path);
        assert_eq!(doc["usage"]["count"], 0);
        assert_eq!(doc["system_prompts"]["Greeter"], "Say hi.");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn corrupt_file_does_not_crash() {
        let path = tmp_file("gtb-usage-corrupt");
        std::fs::write(&path, "{not json at all").unwrap();

        let tracker = UsageTracker::new(&path, json!({}));
        tracker.load().await;
        assert_eq!(tracker.get_count().await, 0);
        assert_eq!(tracker.increment().await, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn increment_preserves_sibling_keys() {
        let path = tmp_file("gtb-usage-siblings");
        write_usage_file(
            &path,
            today(),
            2,
            Some(("system_prompts", json!({"Pirate": "Arr."}))),
        );

        let tracker = UsageTracker::new(&path, json!({}));
        tracker.load().await;

        // Simulate an external edit between load and increment.
        write_usage_file(
            &path,
            today(),
            2,
            Some(("system_prompts", json!({"Pirate": "Arr, matey."}))),
        );

        assert_eq!(tracker.increment().await, 3);

        let doc = read_doc(&path);
        assert_eq!(doc["usage"]["count"], 3);
        assert_eq!(doc["system_prompts"]["Pirate"], "Arr, matey.");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_lose_nothing() {
        let path = tmp_file("gtb-usage-concurrent");
        let tracker = Arc::new(UsageTracker::new(&path, json!({})));
        tracker.load().await;

        let mut handles = Vec::new();
        for _ in 0..25 {
            let t = tracker.clone();
            handles.push(tokio::spawn(async move { t.increment().await }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(tracker.get_count().await, 25);
        let doc = read_doc(&path);
        assert_eq!(doc["usage"]["count"], 25);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn persist_failure_keeps_in_memory_count() {
        // Unwritable path: the directory does not exist.
        let path = PathBuf::from("/tmp/gtb-no-such-dir/usage.json");
        let tracker = UsageTracker::new(&path, json!({}));

        assert_eq!(tracker.increment().await, 1);
        assert_eq!(tracker.increment().await, 2);
        assert_eq!(tracker.get_count().await, 2);
    }
}
