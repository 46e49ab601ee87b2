//! Inbox and blacklist notification boards: two auto-provisioned singleton
//! topics in the operator group that aggregate one card per user.

use anyhow::Result;

use crate::app::App;
use crate::client::{callback_button, inline_keyboard, url_button, OutMessage};
use crate::locks::{self, INBOX_TTL};
use crate::relay::escape_html;
use crate::store::UserInfoPatch;

const UNREAD_TOPIC_KEY: &str = "unread_topic_id";
const BLOCKED_TOPIC_KEY: &str = "blocked_topic_id";
const UNREAD_TOPIC_TITLE: &str = "📬 未读消息";
const BLOCKED_TOPIC_TITLE: &str = "🚫 黑名单";
const PREVIEW_MAX_CHARS: usize = 20;

/// Post or refresh the user's inbox card after a successful relay.
/// Failures only log; the relay has already succeeded.
pub async fn update_inbox_card(app: &App, user_id: i64, latest_text: &str) {
    let key = locks::inbox_key(user_id);
    if !app.locks.try_acquire(&key, INBOX_TTL) {
        // A very recent update is already in flight; let it win.
        return;
    }
    let result = update_inbox_card_inner(app, user_id, latest_text).await;
    app.locks.release(&key);
    if let Err(e) = result {
        log::warn!("inbox card update failed for user {user_id}: {e:?}");
    }
}

async fn update_inbox_card_inner(app: &App, user_id: i64, latest_text: &str) -> Result<()> {
    let Some(row) = app.store.get_user(user_id).await? else {
        return Ok(());
    };
    let Some(topic_id) = row.topic_id else {
        return Ok(());
    };

    let board = board_topic(app, UNREAD_TOPIC_KEY, UNREAD_TOPIC_TITLE).await?;

    let name = row.info.display_name.as_deref().unwrap_or("未知");
    let preview: String = latest_text.chars().take(PREVIEW_MAX_CHARS).collect();
    let text = format!(
        "📨 <b>{}</b> <code>{}</code>\n💬 {}",
        escape_html(name),
        user_id,
        escape_html(&preview)
    );
    let markup = inline_keyboard(vec![vec![
        url_button("➡️ 进入会话", &jump_url(app.env.admin_group_id, topic_id)),
        callback_button("✅ 已读", &format!("inbox:{user_id}")),
    ]]);

    if let Some(card_id) = row.info.inbox_msg_id {
        match app
            .tg
            .edit_message_text(app.env.admin_group_id, card_id, &text, true, Some(markup.clone()))
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) => log::debug!("inbox card edit failed for user {user_id}, reposting: {e}"),
        }
    }

    let send = OutMessage::new(app.env.admin_group_id, text.clone())
        .thread(board)
        .html()
        .markup(markup.clone());
    let card_id = match app.tg.send_message(send).await {
        Ok(id) => id,
        Err(e) if e.is_topic_lost() => {
            // Board topic was deleted by an operator: provision a new one once.
            log::info!("unread board topic lost ({e}), rebuilding");
            app.store.delete(UNREAD_TOPIC_KEY).await?;
            let board = board_topic(app, UNREAD_TOPIC_KEY, UNREAD_TOPIC_TITLE).await?;
            let retry = OutMessage::new(app.env.admin_group_id, text)
                .thread(board)
                .html()
                .markup(markup);
            app.tg.send_message(retry).await?
        }
        Err(e) => return Err(e.into()),
    };

    app.store
        .merge_info(
            user_id,
            UserInfoPatch {
                inbox_msg_id: Some(card_id),
                ..Default::default()
            },
        )
        .await?;
    Ok(())
}

/// The "acknowledge" callback: drop the card entirely.
pub async fn ack_inbox_card(app: &App, user_id: i64) {
    let row = match app.store.get_user(user_id).await {
        Ok(Some(row)) => row,
        _ => return,
    };
    if let Some(card_id) = row.info.inbox_msg_id {
        if let Err(e) = app.tg.delete_message(app.env.admin_group_id, card_id).await {
            log::debug!("inbox card delete failed for user {user_id}: {e}");
        }
    }
    if let Err(e) = app
        .store
        .update_info(user_id, |info| info.inbox_msg_id = None)
        .await
    {
        log::warn!("inbox ack persist failed for user {user_id}: {e:?}");
    }
}

/// One card per blocked user, posted whenever a user becomes blocked.
pub async fn post_blacklist_card(app: &App, user_id: i64, reason: &str) {
    if let Err(e) = post_blacklist_card_inner(app, user_id, reason).await {
        log::warn!("blacklist card post failed for user {user_id}: {e:?}");
    }
}

async fn post_blacklist_card_inner(app: &App, user_id: i64, reason: &str) -> Result<()> {
    let Some(row) = app.store.get_user(user_id).await? else {
        return Ok(());
    };
    if let Some(old) = row.info.blacklist_msg_id {
        // Replace a stale card rather than stacking a second one.
        let _ = app.tg.delete_message(app.env.admin_group_id, old).await;
    }

    let board = board_topic(app, BLOCKED_TOPIC_KEY, BLOCKED_TOPIC_TITLE).await?;
    let name = row.info.display_name.as_deref().unwrap_or("未知");
    let text = format!(
        "🚫 <b>{}</b> <code>{}</code>\n原因：{}\n累计违规：{}",
        escape_html(name),
        user_id,
        escape_html(reason),
        row.block_count
    );
    let markup = inline_keyboard(vec![vec![callback_button(
        "✅ 解除封禁",
        &format!("unblock:{user_id}"),
    )]]);

    let send = OutMessage::new(app.env.admin_group_id, text)
        .thread(board)
        .html()
        .markup(markup);
    let card_id = app.tg.send_message(send).await?;

    app.store
        .merge_info(
            user_id,
            UserInfoPatch {
                blacklist_msg_id: Some(card_id),
                ..Default::default()
            },
        )
        .await?;
    Ok(())
}

/// Deleted when the user is unblocked, by whatever path.
pub async fn remove_blacklist_card(app: &App, user_id: i64) {
    let row = match app.store.get_user(user_id).await {
        Ok(Some(row)) => row,
        _ => return,
    };
    if let Some(card_id) = row.info.blacklist_msg_id {
        if let Err(e) = app.tg.delete_message(app.env.admin_group_id, card_id).await {
            log::debug!("blacklist card delete failed for user {user_id}: {e}");
        }
    }
    if let Err(e) = app
        .store
        .update_info(user_id, |info| info.blacklist_msg_id = None)
        .await
    {
        log::warn!("blacklist card clear failed for user {user_id}: {e:?}");
    }
}

/// Resolve a board topic id, creating the topic on first use.
async fn board_topic(app: &App, key: &str, title: &str) -> Result<i64> {
    if let Some(raw) = app.store.get_opt(key).await {
        if let Ok(id) = raw.trim().parse::<i64>() {
            return Ok(id);
        }
    }
    let id = app
        .tg
        .create_forum_topic(app.env.admin_group_id, title)
        .await?;
    app.store.set(key, &id.to_string()).await?;
    log::info!("provisioned board topic {title} as {id}");
    Ok(id)
}

/// Deep link into the operator group's thread: the internal id is the group
/// id with its `-100` prefix removed.
fn jump_url(admin_group_id: i64, topic_id: i64) -> String {
    let raw = admin_group_id.to_string();
    let internal = raw
        .strip_prefix("-100")
        .map(str::to_string)
        .unwrap_or_else(|| admin_group_id.unsigned_abs().to_string());
    format!("https://t.me/c/{internal}/{topic_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jump_url_strips_internal_prefix() {
        assert_eq!(jump_url(-1001234567890, 77), "https://t.me/c/1234567890/77");
        assert_eq!(jump_url(-456, 3), "https://t.me/c/456/3");
    }

    #[test]
    fn preview_truncates_at_twenty_chars() {
        let text = "一二三四五六七八九十一二三四五六七八九十超出";
        let preview: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
        assert_eq!(preview.chars().count(), 20);
        assert!(!preview.contains("超出"));
    }
}
