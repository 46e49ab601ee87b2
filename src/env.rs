use std::env;

use anyhow::{Context, Result};

/// Deployment configuration, read once at startup. Runtime-tunable settings
/// live in the `config` table instead (see `store`).
#[derive(Debug, Clone)]
pub struct Env {
    pub bot_token: String,
    pub admin_group_id: i64,
    /// Primary admins from `ADMIN_IDS`. Only these may use the admin console.
    pub admin_ids: Vec<i64>,
    /// Base URL the verification page is served under.
    pub worker_url: String,
    pub turnstile_site_key: Option<String>,
    pub turnstile_secret_key: Option<String>,
    pub recaptcha_site_key: Option<String>,
    pub recaptcha_secret_key: Option<String>,
    pub db_path: String,
    pub bind_addr: String,
}

impl Env {
    pub fn load() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").context("Missing BOT_TOKEN")?;
        let admin_group_id = env::var("ADMIN_GROUP_ID")
            .context("Missing ADMIN_GROUP_ID")?
            .trim()
            .parse::<i64>()
            .context("ADMIN_GROUP_ID is not a number")?;

        let admin_ids = parse_id_list(&env::var("ADMIN_IDS").unwrap_or_default());
        if admin_ids.is_empty() {
            log::warn!("ADMIN_IDS is empty; the admin console will be unreachable");
        }

        Ok(Self {
            bot_token,
            admin_group_id,
            admin_ids,
            worker_url: env::var("WORKER_URL")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            turnstile_site_key: env::var("TURNSTILE_SITE_KEY").ok().filter(|s| !s.is_empty()),
            turnstile_secret_key: env::var("TURNSTILE_SECRET_KEY").ok().filter(|s| !s.is_empty()),
            recaptcha_site_key: env::var("RECAPTCHA_SITE_KEY").ok().filter(|s| !s.is_empty()),
            recaptcha_secret_key: env::var("RECAPTCHA_SECRET_KEY").ok().filter(|s| !s.is_empty()),
            db_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "relay.sqlite".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }

    /// Primary admins only: the env-var list, never the config list.
    pub fn is_primary_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_list_tolerates_spaces_and_junk() {
        assert_eq!(parse_id_list("1, 22 ,333"), vec![1, 22, 333]);
        assert_eq!(parse_id_list(""), Vec::<i64>::new());
        assert_eq!(parse_id_list("a,5,,7x,9"), vec![5, 9]);
    }
}
