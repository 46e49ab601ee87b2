//! Routes one parsed platform update to the right subsystem. Each update is
//! handled inside its own detached task; everything here catches at the
//! boundary and logs rather than escalating.

use anyhow::Result;

use crate::admission;
use crate::app::App;
use crate::boards;
use crate::console;
use crate::operator;
use crate::policy;
use crate::relay;
use crate::store::{AdminInputAction, AdminInputState, UserState};
use crate::tg::{CallbackQuery, Message, Update};

pub async fn handle_update(app: App, update: Update) {
    let result = dispatch(&app, update).await;
    if let Err(e) = result {
        log::error!("update handler error: {e:?}");
    }
}

async fn dispatch(app: &App, update: Update) -> Result<()> {
    if let Some(q) = update.callback_query {
        return handle_callback(app, q).await;
    }
    if let Some(msg) = update.message {
        if msg.is_private() {
            return handle_private_message(app, &msg).await;
        }
        return operator::handle_group_message(app, &msg).await;
    }
    if let Some(msg) = update.edited_message {
        if msg.is_private() {
            return handle_private_edit(app, &msg).await;
        }
    }
    Ok(())
}

async fn handle_private_message(app: &App, msg: &Message) -> Result<()> {
    let Some(from) = &msg.from else {
        return Ok(());
    };
    if from.is_bot {
        return Ok(());
    }

    let row = app.store.ensure_user(from.id).await?;
    let is_primary = app.env.is_primary_admin(from.id);
    let is_admin = app.is_authorized_admin(from.id).await;

    // Armed input state eats the next message, console or note alike.
    if is_admin && console::consume_admin_input(app, from.id, msg).await? {
        return Ok(());
    }

    if is_primary && msg.is_command("/admin") {
        return console::open_root_panel(app, from.id).await;
    }

    if msg.is_command("/start") {
        return admission::handle_start(app, from).await;
    }

    // Blocked users are silent except for /start, handled above.
    if row.is_blocked {
        log::debug!("dropping message from blocked user {}", from.id);
        return Ok(());
    }

    // Operators bypass verification entirely.
    let row = if is_admin && row.state != UserState::Verified {
        app.store.set_state(from.id, UserState::Verified).await?;
        app.store
            .get_user(from.id)
            .await?
            .unwrap_or(row)
    } else {
        row
    };

    match row.state {
        UserState::Verified => policy::handle_verified_message(app, &row, msg).await,
        _ => admission::handle_unverified_message(app, &row, msg.text.as_deref()).await,
    }
}

async fn handle_private_edit(app: &App, msg: &Message) -> Result<()> {
    let Some(from) = &msg.from else {
        return Ok(());
    };
    let Some(row) = app.store.get_user(from.id).await? else {
        return Ok(());
    };
    if row.state != UserState::Verified || row.is_blocked {
        return Ok(());
    }
    relay::relay_edit(app, &row, msg).await
}

async fn handle_callback(app: &App, q: CallbackQuery) -> Result<()> {
    let data = q.data.clone().unwrap_or_default();
    let mut parts = data.splitn(2, ':');
    let namespace = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("");

    // Stop the client-side spinner whatever happens next.
    if let Err(e) = app.tg.answer_callback_query(&q.id, None).await {
        log::debug!("answer_callback_query failed: {e}");
    }

    match namespace {
        "config" => {
            if !app.env.is_primary_admin(q.from.id) {
                return Ok(());
            }
            console::handle_callback(app, &q).await
        }
        "inbox" => {
            if !app.is_authorized_admin(q.from.id).await {
                return Ok(());
            }
            if let Ok(user_id) = arg.parse::<i64>() {
                boards::ack_inbox_card(app, user_id).await;
            }
            Ok(())
        }
        "note" => {
            if !app.is_authorized_admin(q.from.id).await {
                return Ok(());
            }
            if arg.parse::<i64>().is_ok() {
                let state = AdminInputState {
                    action: AdminInputAction::InputNote,
                    key: arg.to_string(),
                };
                app.store.set_admin_state(q.from.id, &state).await?;
                let _ = app
                    .tg
                    .answer_callback_query(&q.id, Some("请发送备注内容，/clear 清空"))
                    .await;
            }
            Ok(())
        }
        "block" => {
            if !app.is_authorized_admin(q.from.id).await {
                return Ok(());
            }
            if let Ok(user_id) = arg.parse::<i64>() {
                app.store.set_blocked(user_id, true).await?;
                boards::post_blacklist_card(app, user_id, "管理员手动封禁").await;
                relay::refresh_info_card(app, user_id).await;
            }
            Ok(())
        }
        "unblock" => {
            if !app.is_authorized_admin(q.from.id).await {
                return Ok(());
            }
            if let Ok(user_id) = arg.parse::<i64>() {
                app.store.clear_block(user_id).await?;
                boards::remove_blacklist_card(app, user_id).await;
                relay::refresh_info_card(app, user_id).await;
            }
            Ok(())
        }
        "pin_card" => {
            if !app.is_authorized_admin(q.from.id).await {
                return Ok(());
            }
            if let Ok(user_id) = arg.parse::<i64>() {
                if let Ok(Some(row)) = app.store.get_user(user_id).await {
                    if let Some(card_id) = row.info.card_msg_id {
                        if let Err(e) =
                            app.tg.pin_chat_message(app.env.admin_group_id, card_id).await
                        {
                            log::debug!("card pin failed for user {user_id}: {e}");
                        }
                    }
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
