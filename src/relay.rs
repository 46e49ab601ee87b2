//! The relay engine: binds each verified user to exactly one forum topic in
//! the operator group and carries the user's messages into it.

use anyhow::Result;
use serde_json::Value;

use crate::app::App;
use crate::boards;
use crate::client::{callback_button, inline_keyboard, url_button, OutMessage};
use crate::locks::{self, TOPIC_CREATE_TTL};
use crate::store::{now_ts, UserInfoPatch, UserRow};
use crate::tg::Message;

const TOPIC_NAME_MAX_CHARS: usize = 128;
const SESSION_EXPIRED_TEXT: &str = "⚠️ 会话已失效，请重新发送一次消息。";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    Dropped,
}

/// Relay one inbound private message into the user's bound topic.
pub async fn relay(app: &App, row: &UserRow, msg: &Message) -> Result<RelayOutcome> {
    let row = refresh_identity(app, row, msg).await?;

    let Some(topic_id) = bind_topic(app, &row).await? else {
        // A concurrent invocation holds the creation lock.
        return Ok(RelayOutcome::Dropped);
    };

    // Delivery: prefer forward, fall back to copy.
    let forwarded = app
        .tg
        .forward_message(app.env.admin_group_id, Some(topic_id), row.user_id, msg.message_id)
        .await;
    let delivered = match forwarded {
        Ok(_) => Ok(()),
        Err(first) => {
            let copied = app
                .tg
                .copy_message(app.env.admin_group_id, Some(topic_id), row.user_id, msg.message_id)
                .await;
            match copied {
                Ok(_) => Ok(()),
                Err(second) => Err((first, second)),
            }
        }
    };

    if let Err((first, second)) = delivered {
        if first.is_topic_lost() || second.is_topic_lost() {
            log::warn!(
                "topic {} lost for user {}: {} / {}",
                topic_id,
                row.user_id,
                first,
                second
            );
            app.store.set_topic(row.user_id, None).await?;
            let _ = app
                .tg
                .send_message(OutMessage::new(row.user_id, SESSION_EXPIRED_TEXT))
                .await;
        } else {
            log::error!("relay delivery failed for user {}: {} / {}", row.user_id, first, second);
        }
        return Ok(RelayOutcome::Dropped);
    }

    if let Some(text) = msg.text.as_deref() {
        app.store
            .record_message(row.user_id, msg.message_id, text, msg.date)
            .await?;
    }

    if row.info.card_msg_id.is_none() {
        ensure_info_card(app, row.user_id, topic_id).await;
    }

    app.store
        .merge_info(
            row.user_id,
            UserInfoPatch {
                last_notify: Some(now_ts()),
                ..Default::default()
            },
        )
        .await?;

    acknowledge(app, row.user_id, msg.message_id).await;

    // Fan-out: neither board nor backup may block the relay result.
    let preview = msg.text_or_caption().unwrap_or("[媒体消息]").to_string();
    let fan_app = app.clone();
    let user_id = row.user_id;
    tokio::spawn(async move {
        boards::update_inbox_card(&fan_app, user_id, &preview).await;
    });

    if app.store.get_bool("enable_backup").await {
        if let Some(backup_id) = app.store.get_i64("backup_group_id").await {
            let mirror_app = app.clone();
            let message_id = msg.message_id;
            tokio::spawn(async move {
                if let Err(e) = mirror_app
                    .tg
                    .copy_message(backup_id, None, user_id, message_id)
                    .await
                {
                    log::warn!("backup mirror failed for user {user_id}: {e}");
                }
            });
        }
    }

    Ok(RelayOutcome::Delivered)
}

/// An edited private message: show the previous wording next to the new one.
pub async fn relay_edit(app: &App, row: &UserRow, msg: &Message) -> Result<()> {
    let Some(topic_id) = row.topic_id else {
        return Ok(());
    };
    let Some(new_text) = msg.text.as_deref() else {
        return Ok(());
    };

    let old_text = app
        .store
        .message_text(row.user_id, msg.message_id)
        .await?
        .unwrap_or_else(|| "（无记录）".to_string());

    let notice = format!(
        "✏️ <b>用户编辑了消息</b>\n原文：{}\n现文：{}",
        escape_html(&old_text),
        escape_html(new_text)
    );
    let send = OutMessage::new(app.env.admin_group_id, notice)
        .thread(topic_id)
        .html()
        .silent();
    if let Err(e) = app.tg.send_message(send).await {
        log::warn!("edit notice failed for user {}: {}", row.user_id, e);
        return Ok(());
    }

    app.store
        .record_message(row.user_id, msg.message_id, new_text, msg.date)
        .await?;
    Ok(())
}

/// Ensure the user is bound to a topic, creating one on demand. Returns
/// `None` when the message should be dropped because another task holds the
/// creation lock.
pub async fn bind_topic(app: &App, row: &UserRow) -> Result<Option<i64>> {
    if let Some(topic_id) = row.topic_id {
        return Ok(Some(topic_id));
    }

    let key = locks::topic_create_key(row.user_id);
    if !app.locks.try_acquire(&key, TOPIC_CREATE_TTL) {
        log::debug!("topic creation already in flight for user {}", row.user_id);
        return Ok(None);
    }

    // Another process-step may have bound a topic while we waited.
    let fresh = app.store.get_user(row.user_id).await?;
    if let Some(topic_id) = fresh.as_ref().and_then(|r| r.topic_id) {
        app.locks.release(&key);
        return Ok(Some(topic_id));
    }

    let name = topic_name(
        row.info.display_name.as_deref().unwrap_or("user"),
        row.user_id,
    );
    let created = app.tg.create_forum_topic(app.env.admin_group_id, &name).await;
    let topic_id = match created {
        Ok(id) => id,
        Err(e) => {
            app.locks.release(&key);
            return Err(e.into());
        }
    };
    app.store.set_topic(row.user_id, Some(topic_id)).await?;
    app.locks.release(&key);
    log::info!("created topic {} for user {}", topic_id, row.user_id);
    Ok(Some(topic_id))
}

/// Post (and best-effort pin) the identity card if none is recorded yet.
pub async fn ensure_info_card(app: &App, user_id: i64, topic_id: i64) {
    let row = match app.store.get_user(user_id).await {
        Ok(Some(row)) => row,
        _ => return,
    };
    if row.info.card_msg_id.is_some() {
        return;
    }

    let send = OutMessage::new(app.env.admin_group_id, card_text(&row))
        .thread(topic_id)
        .html()
        .markup(card_keyboard(user_id, row.is_blocked));
    let card_id = match app.tg.send_message(send).await {
        Ok(id) => id,
        Err(e) => {
            log::warn!("info card send failed for user {user_id}: {e}");
            return;
        }
    };

    if let Err(e) = app
        .store
        .merge_info(
            user_id,
            UserInfoPatch {
                card_msg_id: Some(card_id),
                ..Default::default()
            },
        )
        .await
    {
        log::warn!("info card id persist failed for user {user_id}: {e:?}");
    }

    // Pin failure must not fail the relay.
    if let Err(e) = app.tg.pin_chat_message(app.env.admin_group_id, card_id).await {
        log::debug!("info card pin failed for user {user_id}: {e}");
    }
}

/// Re-render the card in place after a note edit or block flip.
pub async fn refresh_info_card(app: &App, user_id: i64) {
    let row = match app.store.get_user(user_id).await {
        Ok(Some(row)) => row,
        _ => return,
    };
    let Some(card_id) = row.info.card_msg_id else {
        return;
    };
    if let Err(e) = app
        .tg
        .edit_message_text(
            app.env.admin_group_id,
            card_id,
            &card_text(&row),
            true,
            Some(card_keyboard(user_id, row.is_blocked)),
        )
        .await
    {
        log::debug!("info card refresh failed for user {user_id}: {e}");
    }
}

async fn refresh_identity(app: &App, row: &UserRow, msg: &Message) -> Result<UserRow> {
    let Some(from) = &msg.from else {
        return Ok(row.clone());
    };
    let name = from.display_name();
    let changed = row.info.display_name.as_deref() != Some(name.as_str())
        || row.info.username != from.username;
    if !changed {
        return Ok(row.clone());
    }

    let info = app
        .store
        .merge_info(
            row.user_id,
            UserInfoPatch {
                display_name: Some(name.clone()),
                username: from.username.clone(),
                ..Default::default()
            },
        )
        .await?;

    if let Some(topic_id) = row.topic_id {
        let new_name = topic_name(&name, row.user_id);
        if let Err(e) = app
            .tg
            .edit_forum_topic(app.env.admin_group_id, topic_id, &new_name)
            .await
        {
            log::debug!("topic rename failed for user {}: {}", row.user_id, e);
        }
    }

    Ok(UserRow {
        info,
        ..row.clone()
    })
}

async fn acknowledge(app: &App, user_id: i64, message_id: i64) {
    if app
        .tg
        .set_message_reaction(user_id, message_id, "👍")
        .await
        .is_ok()
    {
        return;
    }
    let fallback = OutMessage::new(user_id, "✅ 已送达")
        .reply_to(message_id)
        .silent();
    if let Err(e) = app.tg.send_message(fallback).await {
        log::debug!("delivery ack failed for user {user_id}: {e}");
    }
}

fn topic_name(display_name: &str, user_id: i64) -> String {
    let full = format!("{display_name} | {user_id}");
    full.chars().take(TOPIC_NAME_MAX_CHARS).collect()
}

fn card_text(row: &UserRow) -> String {
    let info = &row.info;
    let name = info.display_name.as_deref().unwrap_or("未知");
    let username = info
        .username
        .as_deref()
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| "无".to_string());
    let note = match info.note.as_deref() {
        Some(n) if !n.is_empty() => n,
        _ => "无",
    };
    let joined = info
        .join_date
        .map(format_date)
        .unwrap_or_else(|| "未知".to_string());
    let status = if row.is_blocked { "🚫 已封禁" } else { "✅ 正常" };

    format!(
        "📇 <b>{}</b>\n🆔 <code>{}</code>\n👤 {}\n📝 备注：{}\n📅 首次联系：{}\n状态:{}",
        escape_html(name),
        row.user_id,
        escape_html(&username),
        escape_html(note),
        joined,
        status
    )
}

fn card_keyboard(user_id: i64, is_blocked: bool) -> Value {
    let block_button = if is_blocked {
        callback_button("✅ 解除封禁", &format!("unblock:{user_id}"))
    } else {
        callback_button("🚫 封禁", &format!("block:{user_id}"))
    };
    inline_keyboard(vec![
        vec![
            url_button("👤 打开资料", &format!("tg://user?id={user_id}")),
            block_button,
        ],
        vec![
            callback_button("📝 编辑备注", &format!("note:{user_id}")),
            callback_button("📌 置顶卡片", &format!("pin_card:{user_id}")),
        ],
    ])
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn format_date(ts: i64) -> String {
    match time::OffsetDateTime::from_unix_timestamp(ts) {
        Ok(dt) => {
            let fmt = time::macros::format_description!("[year]-[month]-[day]");
            dt.format(&fmt).unwrap_or_else(|_| ts.to_string())
        }
        Err(_) => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_name_truncates_to_128_chars() {
        let long = "统".repeat(200);
        let name = topic_name(&long, 42);
        assert_eq!(name.chars().count(), TOPIC_NAME_MAX_CHARS);

        let short = topic_name("Alice", 12345);
        assert_eq!(short, "Alice | 12345");
    }

    #[test]
    fn card_keyboard_flips_block_button() {
        let kb = card_keyboard(9, false);
        assert_eq!(kb["inline_keyboard"][0][1]["callback_data"], "block:9");
        let kb = card_keyboard(9, true);
        assert_eq!(kb["inline_keyboard"][0][1]["callback_data"], "unblock:9");
    }

    #[test]
    fn html_escaping_covers_angle_brackets() {
        assert_eq!(escape_html("<b>&x</b>"), "&lt;b&gt;&amp;x&lt;/b&gt;");
    }
}
