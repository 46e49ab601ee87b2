use std::sync::Arc;

use anyhow::Result;

use crate::client::TgClient;
use crate::env::Env;
use crate::locks::Locks;
use crate::store::Store;

/// Shared handles for every handler. Cheap to clone; the store and lock map
/// are the only pieces of cross-request state.
#[derive(Clone)]
pub struct App {
    pub env: Arc<Env>,
    pub store: Store,
    pub tg: TgClient,
    pub http: reqwest::Client,
    pub locks: Locks,
}

impl App {
    pub fn new(env: Env) -> Result<Self> {
        let store = Store::open(&env.db_path)?;
        let http = reqwest::Client::new();
        let tg = TgClient::new(http.clone(), &env.bot_token);
        Ok(Self {
            env: Arc::new(env),
            store,
            tg,
            http,
            locks: Locks::new(),
        })
    }

    /// Primary admins plus the config-managed `authorized_admins` list.
    pub async fn is_authorized_admin(&self, user_id: i64) -> bool {
        if self.env.is_primary_admin(user_id) {
            return true;
        }
        self.store
            .get_json_list("authorized_admins")
            .await
            .iter()
            .any(|v| match v {
                serde_json::Value::Number(n) => n.as_i64() == Some(user_id),
                serde_json::Value::String(s) => s.parse::<i64>().ok() == Some(user_id),
                _ => false,
            })
    }
}
