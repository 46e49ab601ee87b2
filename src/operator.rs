//! Operator-group handling: a message inside a bound topic from an
//! authorized admin is copied back to the originating user.

use anyhow::Result;

use crate::app::App;
use crate::client::OutMessage;
use crate::console;
use crate::store::AdminInputAction;
use crate::tg::Message;

pub async fn handle_group_message(app: &App, msg: &Message) -> Result<()> {
    if msg.chat.id != app.env.admin_group_id {
        return Ok(());
    }
    let Some(from) = &msg.from else {
        return Ok(());
    };
    if from.is_bot {
        return Ok(());
    }
    if !app.is_authorized_admin(from.id).await {
        return Ok(());
    }

    // An armed note-input consumes this message instead of relaying it.
    if let Some(state) = app.store.admin_state(from.id).await {
        if state.action == AdminInputAction::InputNote {
            console::consume_admin_input(app, from.id, msg).await?;
            return Ok(());
        }
    }

    let Some(topic_id) = msg.message_thread_id else {
        return Ok(());
    };

    // Board topics carry cards, not conversations.
    for board_key in ["unread_topic_id", "blocked_topic_id"] {
        if let Some(raw) = app.store.get_opt(board_key).await {
            if raw.trim().parse::<i64>().ok() == Some(topic_id) {
                return Ok(());
            }
        }
    }

    let Some(user) = app.store.find_user_by_topic(topic_id).await? else {
        return Ok(());
    };

    match app
        .tg
        .copy_message(user.user_id, None, app.env.admin_group_id, msg.message_id)
        .await
    {
        Ok(_) => {
            if app.store.get_bool("enable_admin_receipt").await {
                let receipt = OutMessage::new(app.env.admin_group_id, "✅")
                    .thread(topic_id)
                    .reply_to(msg.message_id)
                    .silent();
                if let Err(e) = app.tg.send_message(receipt).await {
                    log::debug!("admin receipt failed in topic {topic_id}: {e}");
                }
            }
        }
        Err(e) => {
            log::warn!("operator reply to user {} failed: {}", user.user_id, e);
            let notice = OutMessage::new(
                app.env.admin_group_id,
                format!("❌ 发送失败：{e}"),
            )
            .thread(topic_id)
            .reply_to(msg.message_id)
            .silent();
            let _ = app.tg.send_message(notice).await;
        }
    }

    Ok(())
}
