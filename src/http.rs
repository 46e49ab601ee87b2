//! HTTP dispatcher. Exactly three externally meaningful routes: the
//! verification page, the attested token submission, and the platform's
//! webhook push. `GET /` is a plaintext liveness probe.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::admission;
use crate::app::App;
use crate::captcha::{self, CaptchaMode};
use crate::initdata;
use crate::store::{now_ts, UserInfoPatch};
use crate::tg::Update;
use crate::update;

pub fn router(app: App) -> Router {
    Router::new()
        .route("/", get(health).post(webhook))
        .route("/verify", get(verify_page))
        .route("/submit_token", post(submit_token))
        .with_state(app)
}

async fn health() -> &'static str {
    "relaybot is running"
}

/// The platform redelivers on non-200, so once the envelope parses the
/// answer is always 200; processing continues in a detached task.
async fn webhook(State(app): State<App>, body: Bytes) -> impl IntoResponse {
    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            log::warn!("invalid update payload: {e}");
            return (StatusCode::BAD_REQUEST, "invalid update");
        }
    };
    tokio::spawn(update::handle_update(app, update));
    (StatusCode::OK, "OK")
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    user_id: Option<String>,
}

async fn verify_page(
    State(app): State<App>,
    Query(params): Query<VerifyParams>,
) -> Result<Html<String>, (StatusCode, String)> {
    if !app.store.get_bool("enable_verify").await {
        return Err((StatusCode::BAD_REQUEST, "verification is disabled".into()));
    }
    let mode = CaptchaMode::from_str(&app.store.get("captcha_mode").await);

    let site_key = match mode {
        CaptchaMode::Turnstile => app.env.turnstile_site_key.clone(),
        CaptchaMode::Recaptcha => app.env.recaptcha_site_key.clone(),
        CaptchaMode::Off => None,
    };
    let Some(site_key) = site_key else {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("no site key configured for captcha mode {}", mode.as_str()),
        ));
    };

    // Display-only; the authoritative id comes from the attested initData.
    let user_id: String = params
        .user_id
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    Ok(Html(render_page(mode, &site_key, &user_id)))
}

#[derive(Debug, Deserialize)]
struct SubmitTokenBody {
    token: String,
    #[serde(rename = "userId", default)]
    #[allow(dead_code)]
    user_id: String,
    #[serde(rename = "initData", default)]
    init_data: String,
}

type SubmitResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

fn reject(reason: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": reason.into() })),
    )
}

async fn submit_token(State(app): State<App>, Json(body): Json<SubmitTokenBody>) -> SubmitResult {
    if !app.store.get_bool("enable_verify").await {
        return Err(reject("verification is disabled"));
    }
    let mode = CaptchaMode::from_str(&app.store.get("captcha_mode").await);
    let secret = match mode {
        CaptchaMode::Turnstile => app.env.turnstile_secret_key.clone(),
        CaptchaMode::Recaptcha => app.env.recaptcha_secret_key.clone(),
        CaptchaMode::Off => None,
    };
    let Some(secret) = secret else {
        return Err(reject(format!(
            "no secret configured for captcha mode {}",
            mode.as_str()
        )));
    };

    match captcha::siteverify(&app.http, mode, &secret, &body.token).await {
        Ok(true) => {}
        Ok(false) => return Err(reject("captcha verification failed")),
        Err(e) => {
            log::warn!("siteverify unavailable: {e:?}");
            return Err(reject("captcha verification unavailable"));
        }
    }

    // The session attestation is the only trusted source of the user id.
    let attested =
        initdata::verify_init_data(&body.init_data, &app.env.bot_token, now_ts())
            .map_err(|e| reject(e.to_string()))?;

    let user_id = attested.id;
    app.store.ensure_user(user_id).await.map_err(|e| {
        log::error!("store failure during verification of {user_id}: {e:?}");
        reject("internal store error")
    })?;

    let display_name = match (&attested.first_name, &attested.last_name) {
        (Some(f), Some(l)) if !l.is_empty() => Some(format!("{f} {l}")),
        (Some(f), _) => Some(f.clone()),
        _ => None,
    };
    let _ = app
        .store
        .merge_info(
            user_id,
            UserInfoPatch {
                display_name,
                username: attested.username.clone(),
                ..Default::default()
            },
        )
        .await;

    admission::complete_captcha(&app, user_id).await.map_err(|e| {
        log::error!("admission step failed for {user_id}: {e:?}");
        reject("verification state update failed")
    })?;

    log::info!("captcha verification completed for user {user_id}");
    Ok(Json(json!({ "success": true })))
}

const PAGE_TEMPLATE: &str = r#"<!doctype html>
<html lang="zh-CN">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>人机验证</title>
<script src="https://telegram.org/js/telegram-web-app.js"></script>
__WIDGET_SCRIPT__
<style>
  body { font-family: -apple-system, "Segoe UI", sans-serif; display: flex;
         justify-content: center; align-items: center; min-height: 100vh;
         margin: 0; background: #f5f6f8; }
  .card { background: #fff; border-radius: 12px; padding: 32px 24px;
          box-shadow: 0 2px 12px rgba(0,0,0,.08); text-align: center; }
  #status { min-height: 1.2em; color: #555; }
</style>
</head>
<body>
<div class="card">
  <h2>人机验证</h2>
  <p>请完成下方验证，然后返回对话。</p>
  __WIDGET_DIV__
  <p id="status"></p>
</div>
<script>
  var userId = "__USER_ID__";
  function submitToken(token) {
    var initData = (window.Telegram && window.Telegram.WebApp)
      ? window.Telegram.WebApp.initData : "";
    document.getElementById("status").textContent = "验证中…";
    fetch("/submit_token", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify({ token: token, userId: userId, initData: initData })
    }).then(function (r) { return r.json(); }).then(function (d) {
      if (d.success) {
        document.getElementById("status").textContent = "✅ 验证通过，可以关闭本页。";
        if (window.Telegram && window.Telegram.WebApp) { window.Telegram.WebApp.close(); }
      } else {
        document.getElementById("status").textContent = "❌ " + (d.error || "验证失败");
      }
    }).catch(function () {
      document.getElementById("status").textContent = "❌ 网络错误，请重试。";
    });
  }
</script>
</body>
</html>
"#;

fn render_page(mode: CaptchaMode, site_key: &str, user_id: &str) -> String {
    let (script, widget) = match mode {
        CaptchaMode::Recaptcha => (
            r#"<script src="https://www.google.com/recaptcha/api.js" async defer></script>"#
                .to_string(),
            format!(
                r#"<div class="g-recaptcha" data-sitekey="{site_key}" data-callback="submitToken"></div>"#
            ),
        ),
        _ => (
            r#"<script src="https://challenges.cloudflare.com/turnstile/v0/api.js" async defer></script>"#
                .to_string(),
            format!(
                r#"<div class="cf-turnstile" data-sitekey="{site_key}" data-callback="submitToken"></div>"#
            ),
        ),
    };
    PAGE_TEMPLATE
        .replace("__WIDGET_SCRIPT__", &script)
        .replace("__WIDGET_DIV__", &widget)
        .replace("__USER_ID__", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_embeds_the_right_widget() {
        let page = render_page(CaptchaMode::Turnstile, "site-abc", "42");
        assert!(page.contains("cf-turnstile"));
        assert!(page.contains("site-abc"));
        assert!(page.contains(r#"var userId = "42";"#));

        let page = render_page(CaptchaMode::Recaptcha, "site-xyz", "7");
        assert!(page.contains("g-recaptcha"));
        assert!(!page.contains("cf-turnstile"));
    }
}
