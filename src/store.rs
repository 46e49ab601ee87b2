//! SQLite-backed state: runtime configuration (with a short-TTL read
//! cache), user rows, relayed-message records, and per-admin input state.
//!
//! All durable state lives here. The cache and the lock map are soft
//! process state and losing them never affects correctness.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task;

pub const CONFIG_CACHE_TTL_SECS: i64 = 60;
const ADMIN_STATE_PREFIX: &str = "admin_state:";

/// Built-in last-resort defaults, consulted after the table and the
/// environment.
const DEFAULTS: &[(&str, &str)] = &[
    ("welcome_msg", "👋 欢迎！完成验证后即可留言，消息会转达给管理员。"),
    ("verify_q", "1 + 1 = ?"),
    ("verify_a", "2"),
    ("enable_verify", "true"),
    ("enable_qa_verify", "false"),
    ("captcha_mode", "turnstile"),
    ("block_threshold", "3"),
    ("block_keywords", "[]"),
    ("keyword_responses", "[]"),
    ("authorized_admins", "[]"),
    ("enable_text_forwarding", "true"),
    ("enable_media_forwarding", "true"),
    ("enable_audio_forwarding", "true"),
    ("enable_sticker_forwarding", "true"),
    ("enable_forward_forwarding", "true"),
    ("enable_channel_forwarding", "true"),
    ("enable_link_forwarding", "true"),
    ("busy_mode", "false"),
    ("busy_msg", "🌙 管理员暂时不在线，消息已收到，会尽快回复。"),
    ("enable_backup", "false"),
    ("enable_admin_receipt", "true"),
];

pub fn now_ts() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

// Run sqlite work off the async executor (rusqlite is not Send/Sync)
async fn db_call<T, F>(db_path: String, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(Connection) -> Result<T> + Send + 'static,
{
    task::spawn_blocking(move || {
        let conn = Connection::open(db_path)?;
        f(conn)
    })
    .await
    .context("sqlite task join failed")?
}

fn init_db(db_path: &str) -> Result<()> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS config (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
  user_id INTEGER PRIMARY KEY,
  user_state TEXT NOT NULL DEFAULT 'new',
  is_blocked INTEGER NOT NULL DEFAULT 0,
  block_count INTEGER NOT NULL DEFAULT 0,
  topic_id INTEGER,
  user_info_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS messages (
  user_id INTEGER NOT NULL,
  message_id INTEGER NOT NULL,
  text TEXT,
  date INTEGER NOT NULL,
  PRIMARY KEY (user_id, message_id)
);
"#,
    )?;
    Ok(())
}

/// Admission phase. `blocked` is an orthogonal overlay, not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    New,
    PendingTurnstile,
    PendingVerification,
    Verified,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::New => "new",
            UserState::PendingTurnstile => "pending_turnstile",
            UserState::PendingVerification => "pending_verification",
            UserState::Verified => "verified",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending_turnstile" => UserState::PendingTurnstile,
            "pending_verification" => UserState::PendingVerification,
            "verified" => UserState::Verified,
            _ => UserState::New,
        }
    }
}

/// Typed user metadata blob. Partial updates merge at the field level;
/// a write never drops an unrelated field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub note: Option<String>,
    pub card_msg_id: Option<i64>,
    pub inbox_msg_id: Option<i64>,
    pub blacklist_msg_id: Option<i64>,
    pub last_busy_reply: Option<i64>,
    pub last_notify: Option<i64>,
    pub join_date: Option<i64>,
}

/// Record-of-optionals patch: `Some` overwrites, `None` keeps.
#[derive(Debug, Clone, Default)]
pub struct UserInfoPatch {
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub note: Option<String>,
    pub card_msg_id: Option<i64>,
    pub inbox_msg_id: Option<i64>,
    pub blacklist_msg_id: Option<i64>,
    pub last_busy_reply: Option<i64>,
    pub last_notify: Option<i64>,
    pub join_date: Option<i64>,
}

impl UserInfo {
    pub fn apply(&mut self, patch: UserInfoPatch) {
        if let Some(v) = patch.display_name {
            self.display_name = Some(v);
        }
        if let Some(v) = patch.username {
            self.username = Some(v);
        }
        if let Some(v) = patch.note {
            self.note = Some(v);
        }
        if let Some(v) = patch.card_msg_id {
            self.card_msg_id = Some(v);
        }
        if let Some(v) = patch.inbox_msg_id {
            self.inbox_msg_id = Some(v);
        }
        if let Some(v) = patch.blacklist_msg_id {
            self.blacklist_msg_id = Some(v);
        }
        if let Some(v) = patch.last_busy_reply {
            self.last_busy_reply = Some(v);
        }
        if let Some(v) = patch.last_notify {
            self.last_notify = Some(v);
        }
        if let Some(v) = patch.join_date {
            self.join_date = Some(v);
        }
    }

    fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: i64,
    pub state: UserState,
    pub is_blocked: bool,
    pub block_count: i64,
    pub topic_id: Option<i64>,
    pub info: UserInfo,
}

/// Multi-step admin input, persisted under `admin_state:<adminId>` so that
/// concurrent admins never trample each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminInputState {
    pub action: AdminInputAction,
    pub key: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdminInputAction {
    Input,
    InputNote,
}

struct ConfigCache {
    values: HashMap<String, String>,
    loaded_at: i64,
}

#[derive(Clone)]
pub struct Store {
    db_path: String,
    cache: Arc<Mutex<ConfigCache>>,
}

enum CacheLookup {
    Hit(String),
    FreshMiss,
    Stale,
}

impl Store {
    pub fn open(db_path: &str) -> Result<Self> {
        init_db(db_path)?;
        Ok(Self {
            db_path: db_path.to_string(),
            cache: Arc::new(Mutex::new(ConfigCache {
                values: HashMap::new(),
                loaded_at: 0,
            })),
        })
    }

    // --- configuration ---

    /// Resolution order: fresh cache → full reload → environment variable
    /// (rewritten key) → built-in default → empty string.
    pub async fn get(&self, key: &str) -> String {
        match self.lookup(key) {
            CacheLookup::Hit(v) => return v,
            CacheLookup::FreshMiss => {}
            CacheLookup::Stale => {
                self.reload().await;
                if let CacheLookup::Hit(v) = self.lookup(key) {
                    return v;
                }
            }
        }
        if let Ok(v) = std::env::var(env_key(key)) {
            return v;
        }
        default_for(key).unwrap_or_default().to_string()
    }

    /// Table-only read: no environment or default fallback.
    pub async fn get_opt(&self, key: &str) -> Option<String> {
        match self.lookup(key) {
            CacheLookup::Hit(v) => Some(v),
            CacheLookup::FreshMiss => None,
            CacheLookup::Stale => {
                self.reload().await;
                match self.lookup(key) {
                    CacheLookup::Hit(v) => Some(v),
                    _ => None,
                }
            }
        }
    }

    pub async fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key).await.trim(), "true" | "1" | "on" | "yes")
    }

    pub async fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).await.trim().parse::<i64>().ok()
    }

    /// Fails closed: invalid JSON reads as `Null`.
    pub async fn get_json(&self, key: &str) -> serde_json::Value {
        serde_json::from_str(&self.get(key).await).unwrap_or(serde_json::Value::Null)
    }

    /// Fails closed: anything that is not a JSON array reads as empty.
    pub async fn get_json_list(&self, key: &str) -> Vec<serde_json::Value> {
        match self.get_json(key).await {
            serde_json::Value::Array(items) => items,
            _ => Vec::new(),
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        db_call(self.db_path.clone(), move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO config(key, value) VALUES(?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        })
        .await?;
        self.invalidate_cache();
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        db_call(self.db_path.clone(), move |conn| {
            conn.execute("DELETE FROM config WHERE key=?1", params![key])?;
            Ok(())
        })
        .await?;
        self.invalidate_cache();
        Ok(())
    }

    fn lookup(&self, key: &str) -> CacheLookup {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if cache.loaded_at == 0 || now_ts() - cache.loaded_at > CONFIG_CACHE_TTL_SECS {
            return CacheLookup::Stale;
        }
        match cache.values.get(key) {
            Some(v) => CacheLookup::Hit(v.clone()),
            None => CacheLookup::FreshMiss,
        }
    }

    async fn reload(&self) {
        let loaded = db_call(self.db_path.clone(), |conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM config")?;
            let mut rows = stmt.query([])?;
            let mut map = HashMap::new();
            while let Some(r) = rows.next()? {
                map.insert(r.get::<_, String>(0)?, r.get::<_, String>(1)?);
            }
            Ok(map)
        })
        .await;

        match loaded {
            Ok(map) => {
                let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                cache.values = map;
                cache.loaded_at = now_ts();
            }
            Err(e) => log::warn!("config reload failed: {e:?}"),
        }
    }

    fn invalidate_cache(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.loaded_at = 0;
    }

    // --- users ---

    pub async fn ensure_user(&self, user_id: i64) -> Result<UserRow> {
        db_call(self.db_path.clone(), move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users(user_id) VALUES(?1)",
                params![user_id],
            )?;
            select_user(&conn, user_id)?.context("user row missing after insert")
        })
        .await
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserRow>> {
        db_call(self.db_path.clone(), move |conn| select_user(&conn, user_id)).await
    }

    pub async fn find_user_by_topic(&self, topic_id: i64) -> Result<Option<UserRow>> {
        db_call(self.db_path.clone(), move |conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, user_state, is_blocked, block_count, topic_id, user_info_json
                     FROM users WHERE topic_id=?1",
                    params![topic_id],
                    map_user_row,
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    pub async fn set_state(&self, user_id: i64, state: UserState) -> Result<()> {
        db_call(self.db_path.clone(), move |conn| {
            conn.execute(
                "UPDATE users SET user_state=?2 WHERE user_id=?1",
                params![user_id, state.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_topic(&self, user_id: i64, topic_id: Option<i64>) -> Result<()> {
        db_call(self.db_path.clone(), move |conn| {
            conn.execute(
                "UPDATE users SET topic_id=?2 WHERE user_id=?1",
                params![user_id, topic_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_blocked(&self, user_id: i64, blocked: bool) -> Result<()> {
        db_call(self.db_path.clone(), move |conn| {
            conn.execute(
                "UPDATE users SET is_blocked=?2 WHERE user_id=?1",
                params![user_id, blocked as i64],
            )?;
            Ok(())
        })
        .await
    }

    /// Self-unblock: clears the overlay and the accrued count together.
    pub async fn clear_block(&self, user_id: i64) -> Result<()> {
        db_call(self.db_path.clone(), move |conn| {
            conn.execute(
                "UPDATE users SET is_blocked=0, block_count=0 WHERE user_id=?1",
                params![user_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Accrue one violation; crossing `threshold` flips `is_blocked` in the
    /// same statement. Returns `(count, blocked, newly_blocked)`.
    pub async fn record_violation(
        &self,
        user_id: i64,
        threshold: i64,
    ) -> Result<(i64, bool, bool)> {
        db_call(self.db_path.clone(), move |conn| {
            let was_blocked: bool = conn
                .query_row(
                    "SELECT is_blocked FROM users WHERE user_id=?1",
                    params![user_id],
                    |r| r.get::<_, i64>(0),
                )
                .optional()?
                .map(|v| v != 0)
                .unwrap_or(false);
            conn.execute(
                "UPDATE users SET block_count = block_count + 1,
                        is_blocked = CASE WHEN block_count + 1 >= ?2 THEN 1 ELSE is_blocked END
                 WHERE user_id=?1",
                params![user_id, threshold],
            )?;
            let (count, blocked): (i64, i64) = conn.query_row(
                "SELECT block_count, is_blocked FROM users WHERE user_id=?1",
                params![user_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            Ok((count, blocked != 0, blocked != 0 && !was_blocked))
        })
        .await
    }

    /// Atomic field-level merge of the info blob. The closure sees the
    /// current value inside an immediate transaction.
    pub async fn update_info<F>(&self, user_id: i64, f: F) -> Result<UserInfo>
    where
        F: FnOnce(&mut UserInfo) + Send + 'static,
    {
        db_call(self.db_path.clone(), move |conn| {
            let mut conn = conn;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let raw: String = tx
                .query_row(
                    "SELECT user_info_json FROM users WHERE user_id=?1",
                    params![user_id],
                    |r| r.get(0),
                )
                .optional()?
                .unwrap_or_else(|| "{}".to_string());
            let mut info = UserInfo::parse(&raw);
            f(&mut info);
            tx.execute(
                "UPDATE users SET user_info_json=?2 WHERE user_id=?1",
                params![user_id, serde_json::to_string(&info)?],
            )?;
            tx.commit()?;
            Ok(info)
        })
        .await
    }

    pub async fn merge_info(&self, user_id: i64, patch: UserInfoPatch) -> Result<UserInfo> {
        self.update_info(user_id, move |info| info.apply(patch)).await
    }

    // --- message records (edit-diff lookup) ---

    pub async fn record_message(
        &self,
        user_id: i64,
        message_id: i64,
        text: &str,
        date: i64,
    ) -> Result<()> {
        let text = text.to_string();
        db_call(self.db_path.clone(), move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO messages(user_id, message_id, text, date)
                 VALUES(?1, ?2, ?3, ?4)",
                params![user_id, message_id, text, date],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn message_text(&self, user_id: i64, message_id: i64) -> Result<Option<String>> {
        db_call(self.db_path.clone(), move |conn| {
            let text: Option<Option<String>> = conn
                .query_row(
                    "SELECT text FROM messages WHERE user_id=?1 AND message_id=?2",
                    params![user_id, message_id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(text.flatten())
        })
        .await
    }

    // --- admin input state ---

    pub async fn set_admin_state(&self, admin_id: i64, state: &AdminInputState) -> Result<()> {
        let raw = serde_json::to_string(state)?;
        self.set(&format!("{ADMIN_STATE_PREFIX}{admin_id}"), &raw).await
    }

    pub async fn admin_state(&self, admin_id: i64) -> Option<AdminInputState> {
        let raw = self.get_opt(&format!("{ADMIN_STATE_PREFIX}{admin_id}")).await?;
        serde_json::from_str(&raw).ok()
    }

    pub async fn clear_admin_state(&self, admin_id: i64) -> Result<()> {
        self.delete(&format!("{ADMIN_STATE_PREFIX}{admin_id}")).await
    }
}

fn select_user(conn: &Connection, user_id: i64) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT user_id, user_state, is_blocked, block_count, topic_id, user_info_json
             FROM users WHERE user_id=?1",
            params![user_id],
            map_user_row,
        )
        .optional()?;
    Ok(row)
}

fn map_user_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    let state: String = r.get(1)?;
    let raw_info: String = r.get(5)?;
    Ok(UserRow {
        user_id: r.get(0)?,
        state: UserState::from_str(&state),
        is_blocked: r.get::<_, i64>(2)? != 0,
        block_count: r.get(3)?,
        topic_id: r.get(4)?,
        info: UserInfo::parse(&raw_info),
    })
}

/// Environment fallback key: `_msg → _MESSAGE`, `_q → _QUESTION`,
/// `_a → _ANSWER`, otherwise the key uppercased.
fn env_key(key: &str) -> String {
    if let Some(stem) = key.strip_suffix("_msg") {
        return format!("{}_MESSAGE", stem.to_uppercase());
    }
    if let Some(stem) = key.strip_suffix("_q") {
        return format!("{}_QUESTION", stem.to_uppercase());
    }
    if let Some(stem) = key.strip_suffix("_a") {
        return format!("{}_ANSWER", stem.to_uppercase());
    }
    key.to_uppercase()
}

fn default_for(key: &str) -> Option<&'static str> {
    DEFAULTS.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store(dir: &TempDir) -> Store {
        let path = dir.path().join("test.sqlite");
        Store::open(path.to_str().unwrap()).expect("open store")
    }

    #[test]
    fn env_key_rewrites_suffixes() {
        assert_eq!(env_key("welcome_msg"), "WELCOME_MESSAGE");
        assert_eq!(env_key("verify_q"), "VERIFY_QUESTION");
        assert_eq!(env_key("verify_a"), "VERIFY_ANSWER");
        assert_eq!(env_key("enable_verify"), "ENABLE_VERIFY");
    }

    #[tokio::test]
    async fn write_then_read_sees_new_value_despite_cache() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        store.set("enable_text_forwarding", "true").await.unwrap();
        assert!(store.get_bool("enable_text_forwarding").await);

        // Cache is warm now; a write must still be visible immediately.
        store.set("enable_text_forwarding", "false").await.unwrap();
        assert!(!store.get_bool("enable_text_forwarding").await);
    }

    #[tokio::test]
    async fn get_falls_back_to_default_when_unset() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        assert_eq!(store.get("block_threshold").await, "3");
        assert_eq!(store.get("nonexistent_key_xyz").await, "");
        assert_eq!(store.get_opt("block_threshold").await, None);
    }

    #[tokio::test]
    async fn get_json_list_fails_closed() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        store.set("block_keywords", "not json at all").await.unwrap();
        assert!(store.get_json_list("block_keywords").await.is_empty());
        store.set("block_keywords", r#"["spam","scam"]"#).await.unwrap();
        assert_eq!(store.get_json_list("block_keywords").await.len(), 2);
    }

    #[tokio::test]
    async fn user_lifecycle_and_topic_lookup() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let row = store.ensure_user(42).await.unwrap();
        assert_eq!(row.state, UserState::New);
        assert!(!row.is_blocked);
        assert_eq!(row.topic_id, None);

        store.set_state(42, UserState::Verified).await.unwrap();
        store.set_topic(42, Some(900)).await.unwrap();

        let row = store.get_user(42).await.unwrap().unwrap();
        assert_eq!(row.state, UserState::Verified);
        assert_eq!(row.topic_id, Some(900));

        let by_topic = store.find_user_by_topic(900).await.unwrap().unwrap();
        assert_eq!(by_topic.user_id, 42);
        assert!(store.find_user_by_topic(901).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn info_merge_keeps_unrelated_fields() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        store.ensure_user(7).await.unwrap();

        store
            .merge_info(
                7,
                UserInfoPatch {
                    display_name: Some("Alice".into()),
                    note: Some("vip".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let info = store
            .merge_info(
                7,
                UserInfoPatch {
                    inbox_msg_id: Some(123),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(info.display_name.as_deref(), Some("Alice"));
        assert_eq!(info.note.as_deref(), Some("vip"));
        assert_eq!(info.inbox_msg_id, Some(123));

        // Closure-style update can clear a single field without touching others.
        let info = store
            .update_info(7, |i| i.inbox_msg_id = None)
            .await
            .unwrap();
        assert_eq!(info.inbox_msg_id, None);
        assert_eq!(info.display_name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn violation_accrual_blocks_exactly_at_threshold() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        store.ensure_user(5).await.unwrap();

        let (c, blocked, newly) = store.record_violation(5, 3).await.unwrap();
        assert_eq!((c, blocked, newly), (1, false, false));
        let (c, blocked, newly) = store.record_violation(5, 3).await.unwrap();
        assert_eq!((c, blocked, newly), (2, false, false));
        let (c, blocked, newly) = store.record_violation(5, 3).await.unwrap();
        assert_eq!((c, blocked, newly), (3, true, true));
        // Already blocked: never reported as newly blocked again.
        let (_, blocked, newly) = store.record_violation(5, 3).await.unwrap();
        assert!(blocked);
        assert!(!newly);

        store.clear_block(5).await.unwrap();
        let row = store.get_user(5).await.unwrap().unwrap();
        assert!(!row.is_blocked);
        assert_eq!(row.block_count, 0);
    }

    #[tokio::test]
    async fn message_records_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        store.record_message(1, 100, "hello", 1_700_000_000).await.unwrap();
        assert_eq!(store.message_text(1, 100).await.unwrap().as_deref(), Some("hello"));
        assert_eq!(store.message_text(1, 101).await.unwrap(), None);

        store.record_message(1, 100, "edited", 1_700_000_100).await.unwrap();
        assert_eq!(store.message_text(1, 100).await.unwrap().as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn admin_states_are_per_admin() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let a = AdminInputState {
            action: AdminInputAction::Input,
            key: "welcome_msg".into(),
        };
        let b = AdminInputState {
            action: AdminInputAction::InputNote,
            key: "42".into(),
        };
        store.set_admin_state(1, &a).await.unwrap();
        store.set_admin_state(2, &b).await.unwrap();

        assert_eq!(store.admin_state(1).await, Some(a));
        assert_eq!(store.admin_state(2).await, Some(b));

        store.clear_admin_state(1).await.unwrap();
        assert_eq!(store.admin_state(1).await, None);
        assert!(store.admin_state(2).await.is_some());
    }
}
