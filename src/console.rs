//! Admin console: a hierarchical menu rendered through message edits, plus
//! the two-step input workflow for values that need free-form text.
//!
//! Callback data is namespaced `config:<verb>:<key>[:<value>]`. Verbs:
//! `menu`, `toggle`, `edit`, `add`, `del`, `cl`, `rotate_mode`.

use anyhow::Result;
use serde_json::Value;

use crate::app::App;
use crate::captcha::CaptchaMode;
use crate::client::{callback_button, inline_keyboard, OutMessage};
use crate::relay;
use crate::store::{AdminInputAction, AdminInputState, UserInfoPatch};
use crate::tg::{CallbackQuery, Message};

const LIST_KEYS: &[&str] = &["keyword_responses", "block_keywords", "authorized_admins"];
const BOARD_KEYS: &[&str] = &["unread_topic_id", "blocked_topic_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Panel {
    Root,
    Base,
    AutoReply,
    Keywords,
    Filters,
    Admins,
    Backup,
    Quiet,
}

impl Panel {
    fn from_key(key: &str) -> Panel {
        match key {
            "base" => Panel::Base,
            "autoreply" => Panel::AutoReply,
            "keywords" => Panel::Keywords,
            "filters" => Panel::Filters,
            "admins" => Panel::Admins,
            "backup" => Panel::Backup,
            "quiet" => Panel::Quiet,
            _ => Panel::Root,
        }
    }

    fn key(&self) -> &'static str {
        match self {
            Panel::Root => "root",
            Panel::Base => "base",
            Panel::AutoReply => "autoreply",
            Panel::Keywords => "keywords",
            Panel::Filters => "filters",
            Panel::Admins => "admins",
            Panel::Backup => "backup",
            Panel::Quiet => "quiet",
        }
    }
}

/// Which panel re-renders after a mutation of `key`.
fn panel_for_key(key: &str) -> Panel {
    match key {
        "enable_qa_verify" | "welcome_msg" | "verify_q" | "verify_a" => Panel::Base,
        "keyword_responses" => Panel::AutoReply,
        "block_keywords" | "block_threshold" => Panel::Keywords,
        "authorized_admins" => Panel::Admins,
        "busy_mode" | "busy_msg" => Panel::Quiet,
        k if k.starts_with("enable_") && k.ends_with("_forwarding") => Panel::Filters,
        _ => Panel::Backup,
    }
}

/// Entry point for `config:` callbacks. The caller has already checked the
/// sender is a primary admin.
pub async fn handle_callback(app: &App, q: &CallbackQuery) -> Result<()> {
    let data = q.data.as_deref().unwrap_or("");
    let mut parts = data.splitn(4, ':');
    let _ns = parts.next();
    let verb = parts.next().unwrap_or("");
    let key = parts.next().unwrap_or("");
    let value = parts.next().unwrap_or("");

    match verb {
        "menu" => show_panel(app, q, Panel::from_key(key)).await,
        "toggle" => {
            let current = app.store.get_bool(key).await;
            app.store.set(key, if current { "false" } else { "true" }).await?;
            show_panel(app, q, panel_for_key(key)).await
        }
        "edit" | "add" => {
            let state = AdminInputState {
                action: AdminInputAction::Input,
                key: key.to_string(),
            };
            app.store.set_admin_state(q.from.id, &state).await?;
            app.tg
                .send_message(OutMessage::new(q.from.id, input_prompt(key)))
                .await?;
            Ok(())
        }
        "del" => {
            if let Ok(idx) = value.parse::<usize>() {
                let mut items = app.store.get_json_list(key).await;
                if idx < items.len() {
                    items.remove(idx);
                    app.store
                        .set(key, &serde_json::to_string(&items)?)
                        .await?;
                }
            }
            show_panel(app, q, panel_for_key(key)).await
        }
        "cl" => {
            if BOARD_KEYS.contains(&key) {
                app.store.delete(key).await?;
            } else {
                app.store.set(key, "[]").await?;
            }
            show_panel(app, q, panel_for_key(key)).await
        }
        "rotate_mode" => {
            rotate_captcha_mode(app).await?;
            show_panel(app, q, Panel::Base).await
        }
        _ => Ok(()),
    }
}

/// `/admin` in the primary admin's private chat.
pub async fn open_root_panel(app: &App, admin_id: i64) -> Result<()> {
    let (text, keyboard) = render(app, Panel::Root).await;
    app.tg
        .send_message(OutMessage::new(admin_id, text).html().markup(keyboard))
        .await?;
    Ok(())
}

/// Consume the admin's next private (or topic) message when an input state
/// is armed. Returns true when the message was consumed.
pub async fn consume_admin_input(app: &App, admin_id: i64, msg: &Message) -> Result<bool> {
    let Some(state) = app.store.admin_state(admin_id).await else {
        return Ok(false);
    };

    if msg.is_command("/cancel") {
        app.store.clear_admin_state(admin_id).await?;
        app.tg
            .send_message(OutMessage::new(msg.chat.id, "已取消。"))
            .await?;
        return Ok(true);
    }

    match state.action {
        AdminInputAction::Input => consume_config_input(app, admin_id, &state.key, msg).await,
        AdminInputAction::InputNote => consume_note_input(app, admin_id, &state.key, msg).await,
    }
}

async fn consume_config_input(
    app: &App,
    admin_id: i64,
    key: &str,
    msg: &Message,
) -> Result<bool> {
    // Media welcome: a photo/video/animation sent in lieu of text.
    if key == "welcome_msg" {
        if let Some(blob) = welcome_media_blob(msg) {
            app.store.set(key, &blob.to_string()).await?;
            app.store.clear_admin_state(admin_id).await?;
            app.tg
                .send_message(OutMessage::new(msg.chat.id, "✅ 欢迎语已更新（媒体）。"))
                .await?;
            return Ok(true);
        }
    }

    let Some(text) = msg.text_or_caption().map(str::trim).filter(|t| !t.is_empty()) else {
        app.tg
            .send_message(OutMessage::new(msg.chat.id, "请发送文本内容，或 /cancel 取消。"))
            .await?;
        return Ok(true);
    };

    if let Some(problem) = validate_input(key, text) {
        // Structurally invalid input is reported now; the state stays armed.
        app.tg
            .send_message(OutMessage::new(msg.chat.id, problem))
            .await?;
        return Ok(true);
    }

    if LIST_KEYS.contains(&key) {
        let mut items = app.store.get_json_list(key).await;
        items.push(Value::String(text.to_string()));
        app.store.set(key, &serde_json::to_string(&items)?).await?;
    } else {
        app.store.set(key, text).await?;
    }

    app.store.clear_admin_state(admin_id).await?;
    app.tg
        .send_message(OutMessage::new(msg.chat.id, "✅ 已更新。"))
        .await?;
    Ok(true)
}

async fn consume_note_input(app: &App, admin_id: i64, key: &str, msg: &Message) -> Result<bool> {
    let Ok(user_id) = key.parse::<i64>() else {
        app.store.clear_admin_state(admin_id).await?;
        return Ok(false);
    };

    let text = msg.text_or_caption().unwrap_or("").trim();
    let note = if text == "/clear" || text == "清除" {
        String::new()
    } else {
        text.to_string()
    };

    app.store
        .merge_info(
            user_id,
            UserInfoPatch {
                note: Some(note),
                ..Default::default()
            },
        )
        .await?;
    app.store.clear_admin_state(admin_id).await?;

    app.tg
        .send_message(
            OutMessage::new(msg.chat.id, "✅ 备注已更新。")
                .reply_to(msg.message_id)
                .silent(),
        )
        .await?;
    relay::refresh_info_card(app, user_id).await;
    Ok(true)
}

/// on+turnstile → on+recaptcha → off (mode unchanged) → on+turnstile
async fn rotate_captcha_mode(app: &App) -> Result<()> {
    let enabled = app.store.get_bool("enable_verify").await;
    let mode = CaptchaMode::from_str(&app.store.get("captcha_mode").await);

    match (enabled, mode) {
        (true, CaptchaMode::Turnstile) => {
            app.store.set("captcha_mode", "recaptcha").await?;
        }
        (true, CaptchaMode::Recaptcha) => {
            app.store.set("enable_verify", "false").await?;
        }
        _ => {
            app.store.set("enable_verify", "true").await?;
            app.store.set("captcha_mode", "turnstile").await?;
        }
    }
    Ok(())
}

async fn show_panel(app: &App, q: &CallbackQuery, panel: Panel) -> Result<()> {
    let (text, keyboard) = render(app, panel).await;
    match &q.message {
        Some(msg) => {
            app.tg
                .edit_message_text(msg.chat.id, msg.message_id, &text, true, Some(keyboard))
                .await?;
        }
        None => {
            app.tg
                .send_message(OutMessage::new(q.from.id, text).html().markup(keyboard))
                .await?;
        }
    }
    Ok(())
}

async fn render(app: &App, panel: Panel) -> (String, Value) {
    match panel {
        Panel::Root => render_root(),
        Panel::Base => render_base(app).await,
        Panel::AutoReply => render_list(app, Panel::AutoReply).await,
        Panel::Keywords => render_list(app, Panel::Keywords).await,
        Panel::Filters => render_filters(app).await,
        Panel::Admins => render_list(app, Panel::Admins).await,
        Panel::Backup => render_backup(app).await,
        Panel::Quiet => render_quiet(app).await,
    }
}

fn back_row() -> Vec<Value> {
    vec![callback_button("⬅️ 返回", "config:menu:root")]
}

fn render_root() -> (String, Value) {
    let keyboard = inline_keyboard(vec![
        vec![
            callback_button("⚙️ 基础设置", "config:menu:base"),
            callback_button("💬 自动回复", "config:menu:autoreply"),
        ],
        vec![
            callback_button("🚫 违禁词", "config:menu:keywords"),
            callback_button("📂 消息类型", "config:menu:filters"),
        ],
        vec![
            callback_button("👥 协作管理员", "config:menu:admins"),
            callback_button("🗂 备份与面板", "config:menu:backup"),
        ],
        vec![callback_button("🌙 勿扰模式", "config:menu:quiet")],
    ]);
    ("🛠 <b>管理面板</b>\n选择要调整的配置。".to_string(), keyboard)
}

async fn render_base(app: &App) -> (String, Value) {
    let enabled = app.store.get_bool("enable_verify").await;
    let mode = CaptchaMode::from_str(&app.store.get("captcha_mode").await);
    let qa = app.store.get_bool("enable_qa_verify").await;
    let question = app.store.get("verify_q").await;

    let captcha_label = if enabled {
        format!("人机验证：{}", mode.as_str())
    } else {
        "人机验证：off".to_string()
    };

    let text = format!(
        "⚙️ <b>基础设置</b>\n问答验证：{}\n当前问题:{}",
        if qa { "开" } else { "关" },
        relay::escape_html(&question)
    );
    let keyboard = inline_keyboard(vec![
        vec![callback_button("✏️ 欢迎语", "config:edit:welcome_msg")],
        vec![
            callback_button("✏️ 验证问题", "config:edit:verify_q"),
            callback_button("✏️ 验证答案", "config:edit:verify_a"),
        ],
        vec![callback_button(&format!("🔁 {captcha_label}"), "config:rotate_mode")],
        vec![callback_button(
            if qa { "❓ 问答验证：开" } else { "❓ 问答验证：关" },
            "config:toggle:enable_qa_verify",
        )],
        back_row(),
    ]);
    (text, keyboard)
}

async fn render_list(app: &App, panel: Panel) -> (String, Value) {
    let (title, key, add_label) = match panel {
        Panel::AutoReply => ("💬 <b>自动回复</b>", "keyword_responses", "➕ 添加规则"),
        Panel::Keywords => ("🚫 <b>违禁词</b>", "block_keywords", "➕ 添加违禁词"),
        _ => ("👥 <b>协作管理员</b>", "authorized_admins", "➕ 添加管理员"),
    };

    let items = app.store.get_json_list(key).await;
    let mut text = format!("{title}\n");
    if items.is_empty() {
        text.push_str("（暂无条目）");
    }
    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let shown = item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string());
        text.push_str(&format!("{}. {}\n", idx + 1, relay::escape_html(&shown)));
        rows.push(vec![callback_button(
            &format!("🗑 删除 {}", idx + 1),
            &format!("config:del:{key}:{idx}"),
        )]);
    }

    rows.push(vec![
        callback_button(add_label, &format!("config:add:{key}")),
        callback_button("🧹 清空", &format!("config:cl:{key}")),
    ]);
    if panel == Panel::Keywords {
        let threshold = app.store.get("block_threshold").await;
        rows.push(vec![callback_button(
            &format!("🎚 封禁阈值：{threshold}"),
            "config:edit:block_threshold",
        )]);
    }
    rows.push(back_row());
    (text, inline_keyboard(rows))
}

async fn render_filters(app: &App) -> (String, Value) {
    let switches: &[(&str, &str)] = &[
        ("文字", "enable_text_forwarding"),
        ("图片/视频/文件", "enable_media_forwarding"),
        ("语音/音频", "enable_audio_forwarding"),
        ("贴纸/动图", "enable_sticker_forwarding"),
        ("转发消息", "enable_forward_forwarding"),
        ("频道转发", "enable_channel_forwarding"),
        ("链接", "enable_link_forwarding"),
    ];

    let mut rows = Vec::new();
    for (label, key) in switches {
        let on = app.store.get_bool(key).await;
        rows.push(vec![callback_button(
            &format!("{} {label}", if on { "✅" } else { "⛔" }),
            &format!("config:toggle:{key}"),
        )]);
    }
    rows.push(back_row());
    (
        "📂 <b>消息类型</b>\n点击切换是否接收对应类型。".to_string(),
        inline_keyboard(rows),
    )
}

async fn render_backup(app: &App) -> (String, Value) {
    let backup_on = app.store.get_bool("enable_backup").await;
    let backup_group = app.store.get("backup_group_id").await;
    let receipt_on = app.store.get_bool("enable_admin_receipt").await;

    let text = format!(
        "🗂 <b>备份与面板</b>\n备份群：{}",
        if backup_group.is_empty() { "未设置" } else { &backup_group }
    );
    let keyboard = inline_keyboard(vec![
        vec![callback_button(
            if backup_on { "📦 备份：开" } else { "📦 备份：关" },
            "config:toggle:enable_backup",
        )],
        vec![callback_button("✏️ 备份群 ID", "config:edit:backup_group_id")],
        vec![callback_button(
            if receipt_on { "🧾 管理回执：开" } else { "🧾 管理回执：关" },
            "config:toggle:enable_admin_receipt",
        )],
        vec![
            callback_button("♻️ 重建未读面板", "config:cl:unread_topic_id"),
            callback_button("♻️ 重建黑名单面板", "config:cl:blocked_topic_id"),
        ],
        back_row(),
    ]);
    (text, keyboard)
}

async fn render_quiet(app: &App) -> (String, Value) {
    let busy = app.store.get_bool("busy_mode").await;
    let busy_msg = app.store.get("busy_msg").await;
    let text = format!(
        "🌙 <b>勿扰模式</b>\n当前回复：{}",
        relay::escape_html(&busy_msg)
    );
    let keyboard = inline_keyboard(vec![
        vec![callback_button(
            if busy { "🌙 勿扰：开" } else { "🌙 勿扰：关" },
            "config:toggle:busy_mode",
        )],
        vec![callback_button("✏️ 勿扰回复", "config:edit:busy_msg")],
        back_row(),
    ]);
    (text, keyboard)
}

fn input_prompt(key: &str) -> &'static str {
    match key {
        "welcome_msg" => "请发送新的欢迎语（可直接发送图片/视频/动图）。/cancel 取消",
        "verify_q" => "请发送新的验证问题。/cancel 取消",
        "verify_a" => "请发送新的验证答案。/cancel 取消",
        "block_threshold" => "请发送新的封禁阈值（正整数）。/cancel 取消",
        "busy_msg" => "请发送新的勿扰回复。/cancel 取消",
        "backup_group_id" => "请发送备份群的数字 ID。/cancel 取消",
        "keyword_responses" => "请发送规则，格式：匹配模式===回复内容。/cancel 取消",
        "block_keywords" => "请发送违禁词（支持正则，不超过 256 字符）。/cancel 取消",
        "authorized_admins" => "请发送管理员的数字 ID。/cancel 取消",
        _ => "请发送新的值。/cancel 取消",
    }
}

/// Structural validation at input time. Returns a user-facing problem
/// description, or None when acceptable.
fn validate_input(key: &str, text: &str) -> Option<String> {
    match key {
        "keyword_responses" => {
            if !text.contains("===") {
                return Some("格式错误：需要 匹配模式===回复内容。".to_string());
            }
            let (pattern, _) = text.split_once("===").unwrap();
            if regex::Regex::new(pattern).is_err() {
                return Some("匹配模式不是合法的正则表达式。".to_string());
            }
            None
        }
        "block_keywords" => {
            if text.chars().count() > 256 {
                return Some("违禁词过长（上限 256 字符）。".to_string());
            }
            if regex::Regex::new(text).is_err() {
                return Some("不是合法的正则表达式。".to_string());
            }
            None
        }
        "authorized_admins" | "backup_group_id" => {
            if text.parse::<i64>().is_err() {
                return Some("需要一个数字 ID。".to_string());
            }
            None
        }
        "block_threshold" => match text.parse::<i64>() {
            Ok(n) if n > 0 => None,
            _ => Some("阈值需要是正整数。".to_string()),
        },
        _ => None,
    }
}

/// Encode an admin-sent media message as the stored welcome blob.
fn welcome_media_blob(msg: &Message) -> Option<Value> {
    let caption = msg.caption.clone().unwrap_or_default();
    if let Some(photos) = &msg.photo {
        // Platform lists sizes ascending; the last is the largest.
        let file_id = photos.last()?.file_id.clone();
        return Some(serde_json::json!({ "type": "photo", "file_id": file_id, "caption": caption }));
    }
    if let Some(video) = &msg.video {
        return Some(
            serde_json::json!({ "type": "video", "file_id": video.file_id, "caption": caption }),
        );
    }
    if let Some(animation) = &msg.animation {
        return Some(
            serde_json::json!({ "type": "animation", "file_id": animation.file_id, "caption": caption }),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_keys_round_trip() {
        for panel in [
            Panel::Root,
            Panel::Base,
            Panel::AutoReply,
            Panel::Keywords,
            Panel::Filters,
            Panel::Admins,
            Panel::Backup,
            Panel::Quiet,
        ] {
            assert_eq!(Panel::from_key(panel.key()), panel);
        }
        assert_eq!(Panel::from_key("bogus"), Panel::Root);
    }

    #[test]
    fn keys_map_to_their_panels() {
        assert_eq!(panel_for_key("enable_text_forwarding"), Panel::Filters);
        assert_eq!(panel_for_key("enable_qa_verify"), Panel::Base);
        assert_eq!(panel_for_key("block_keywords"), Panel::Keywords);
        assert_eq!(panel_for_key("busy_mode"), Panel::Quiet);
        assert_eq!(panel_for_key("unread_topic_id"), Panel::Backup);
    }

    #[test]
    fn input_validation_flags_structural_problems() {
        assert!(validate_input("keyword_responses", "no delimiter").is_some());
        assert!(validate_input("keyword_responses", "hi===hello").is_none());
        assert!(validate_input("keyword_responses", "[===x").is_some());
        assert!(validate_input("block_keywords", "[").is_some());
        assert!(validate_input("block_keywords", "spam|scam").is_none());
        assert!(validate_input("authorized_admins", "abc").is_some());
        assert!(validate_input("authorized_admins", "12345").is_none());
        assert!(validate_input("block_threshold", "0").is_some());
        assert!(validate_input("block_threshold", "3").is_none());
    }

    #[test]
    fn welcome_media_blob_prefers_largest_photo() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "message_id": 1,
            "chat": {"id": 1, "type": "private"},
            "date": 0,
            "caption": "hi",
            "photo": [{"file_id": "small"}, {"file_id": "large"}]
        }))
        .unwrap();
        let blob = welcome_media_blob(&msg).unwrap();
        assert_eq!(blob["type"], "photo");
        assert_eq!(blob["file_id"], "large");
        assert_eq!(blob["caption"], "hi");
    }
}
