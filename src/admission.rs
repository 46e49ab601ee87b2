//! Per-user admission state machine.
//!
//! ```text
//! new ── /start ────────────► pending_turnstile ── captcha ok & qa on ──► pending_verification
//!                          └─ captcha off & qa on ─► pending_verification
//!                          └─ captcha off & qa off ► verified
//! pending_verification ── correct answer ──► verified
//! ```
//!
//! `blocked` is an overlay: a blocked user's `/start` clears it and re-runs
//! the admission from `new`.

use anyhow::Result;

use crate::app::App;
use crate::boards;
use crate::captcha::CaptchaMode;
use crate::client::{inline_keyboard, web_app_button, OutMessage, WelcomeMedia};
use crate::relay;
use crate::store::{now_ts, UserInfoPatch, UserRow, UserState};
use crate::tg::TgUser;

pub async fn handle_start(app: &App, user: &TgUser) -> Result<()> {
    let row = app.store.ensure_user(user.id).await?;

    if row.is_blocked {
        // Deliberate self-unblock affordance.
        app.store.clear_block(user.id).await?;
        boards::remove_blacklist_card(app, user.id).await;
        log::info!("user {} self-unblocked via /start", user.id);
    }

    app.store
        .merge_info(
            user.id,
            UserInfoPatch {
                display_name: Some(user.display_name()),
                username: user.username.clone(),
                join_date: Some(row.info.join_date.unwrap_or_else(now_ts)),
                ..Default::default()
            },
        )
        .await?;

    if app.is_authorized_admin(user.id).await {
        app.store.set_state(user.id, UserState::Verified).await?;
        send_welcome(app, user.id, None).await?;
        return Ok(());
    }

    // A second /start while a verification is already pending must not
    // produce a second prompt pair.
    if !row.is_blocked
        && matches!(
            row.state,
            UserState::PendingTurnstile | UserState::PendingVerification
        )
    {
        return Ok(());
    }

    if row.state == UserState::Verified && !row.is_blocked {
        send_welcome(app, user.id, None).await?;
        return Ok(());
    }

    begin_admission(app, user.id).await
}

/// Entry transition from `new`: pick the first enabled gate and prompt for it.
pub async fn begin_admission(app: &App, user_id: i64) -> Result<()> {
    let captcha_on = app.store.get_bool("enable_verify").await
        && CaptchaMode::from_str(&app.store.get("captcha_mode").await) != CaptchaMode::Off;
    let qa_on = app.store.get_bool("enable_qa_verify").await;

    if captcha_on {
        app.store.set_state(user_id, UserState::PendingTurnstile).await?;
        send_welcome(app, user_id, Some(verify_keyboard(app, user_id))).await?;
    } else if qa_on {
        app.store.set_state(user_id, UserState::PendingVerification).await?;
        send_welcome(app, user_id, None).await?;
        send_question(app, user_id).await?;
    } else {
        app.store.set_state(user_id, UserState::Verified).await?;
        send_welcome(app, user_id, None).await?;
    }
    Ok(())
}

/// A message from a user who has not finished admission yet.
pub async fn handle_unverified_message(app: &App, row: &UserRow, text: Option<&str>) -> Result<()> {
    match row.state {
        UserState::New => begin_admission(app, row.user_id).await,
        UserState::PendingTurnstile => {
            let msg = OutMessage::new(row.user_id, "⚠️ 请先点击按钮完成人机验证。")
                .markup(verify_keyboard(app, row.user_id));
            app.tg.send_message(msg).await?;
            Ok(())
        }
        UserState::PendingVerification => {
            let expected = app.store.get("verify_a").await;
            match text {
                Some(answer) if answer.trim() == expected.trim() && !expected.trim().is_empty() => {
                    app.store.set_state(row.user_id, UserState::Verified).await?;
                    app.tg
                        .send_message(OutMessage::new(row.user_id, "✅ 验证通过，现在可以发送消息了。"))
                        .await?;
                    Ok(())
                }
                _ => {
                    app.tg
                        .send_message(OutMessage::new(row.user_id, "❌ 回答错误，请重新回答。"))
                        .await?;
                    Ok(())
                }
            }
        }
        UserState::Verified => Ok(()),
    }
}

/// Called once the captcha solve has been validated server-side.
pub async fn complete_captcha(app: &App, user_id: i64) -> Result<()> {
    app.store.ensure_user(user_id).await?;

    if app.store.get_bool("enable_qa_verify").await {
        app.store
            .set_state(user_id, UserState::PendingVerification)
            .await?;
        send_question(app, user_id).await?;
        return Ok(());
    }

    app.store.set_state(user_id, UserState::Verified).await?;

    // Provision the topic and info card before the first relayed message.
    let row = app.store.get_user(user_id).await?;
    if let Some(row) = row {
        if row.topic_id.is_none() {
            if let Some(topic_id) = relay::bind_topic(app, &row).await? {
                relay::ensure_info_card(app, user_id, topic_id).await;
            }
        }
    }

    app.tg
        .send_message(OutMessage::new(user_id, "✅ 验证通过，现在可以发送消息了。"))
        .await?;
    Ok(())
}

async fn send_question(app: &App, user_id: i64) -> Result<()> {
    let question = app.store.get("verify_q").await;
    app.tg
        .send_message(OutMessage::new(user_id, format!("❓ {question}")))
        .await?;
    Ok(())
}

fn verify_keyboard(app: &App, user_id: i64) -> serde_json::Value {
    let url = format!("{}/verify?user_id={}", app.env.worker_url, user_id);
    inline_keyboard(vec![vec![web_app_button("🔐 点击完成验证", &url)]])
}

/// The stored welcome is either plain text or a `{type, file_id, caption}`
/// media blob captured from the console.
async fn send_welcome(app: &App, user_id: i64, markup: Option<serde_json::Value>) -> Result<()> {
    let blob = app.store.get_json("welcome_msg").await;
    let media = blob["type"].as_str().and_then(WelcomeMedia::from_type_str);
    if let (Some(media), Some(file_id)) = (media, blob["file_id"].as_str()) {
        app.tg
            .send_media(user_id, media, file_id, blob["caption"].as_str(), markup)
            .await?;
        return Ok(());
    }

    let mut msg = OutMessage::new(user_id, app.store.get("welcome_msg").await);
    if let Some(m) = markup {
        msg = msg.markup(m);
    }
    app.tg.send_message(msg).await?;
    Ok(())
}
