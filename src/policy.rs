//! Content-policy pipeline for verified, unblocked users. Fixed evaluation
//! order; the first hit short-circuits, except the quiet-hours notice which
//! never blocks relaying.

use anyhow::Result;
use regex::RegexBuilder;

use crate::app::App;
use crate::boards;
use crate::client::OutMessage;
use crate::relay;
use crate::store::{now_ts, UserInfoPatch, UserRow};
use crate::tg::{classify, ContentKind, Message};

const SCAN_MAX_CHARS: usize = 2000;
const PATTERN_MAX_CHARS: usize = 256;
const BUSY_REPLY_INTERVAL_SECS: i64 = 300;
const DEFAULT_BLOCK_THRESHOLD: i64 = 3;

pub async fn handle_verified_message(app: &App, row: &UserRow, msg: &Message) -> Result<()> {
    let text = msg.text_or_caption().unwrap_or("");
    let scan: String = text.chars().take(SCAN_MAX_CHARS).collect();

    // 1. Block keywords: accrue a violation, auto-block at the threshold.
    if let Some(pattern) = first_keyword_hit(&app.store.get_json_list("block_keywords").await, &scan)
    {
        let threshold = app
            .store
            .get_i64("block_threshold")
            .await
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_BLOCK_THRESHOLD);
        let (count, _blocked, newly_blocked) =
            app.store.record_violation(row.user_id, threshold).await?;
        log::info!(
            "user {} hit block keyword {:?} ({count}/{threshold})",
            row.user_id,
            pattern
        );

        if newly_blocked {
            boards::post_blacklist_card(app, row.user_id, "触发违禁词自动封禁").await;
            relay::refresh_info_card(app, row.user_id).await;
            app.tg
                .send_message(OutMessage::new(row.user_id, "🚫 多次触发违禁词，已被自动封禁。"))
                .await?;
        } else {
            app.tg
                .send_message(OutMessage::new(
                    row.user_id,
                    format!("⚠️ 消息包含违禁词，未转发（{count}/{threshold}）。"),
                ))
                .await?;
        }
        return Ok(());
    }

    // 2. Typed-content switches. Authorized admins bypass the type filters.
    if !app.is_authorized_admin(row.user_id).await {
        let kind = classify(msg);
        if let Some(reason) = type_rejection(app, kind).await {
            app.tg
                .send_message(OutMessage::new(row.user_id, reason))
                .await?;
            return Ok(());
        }
    }

    // 3. Auto-reply: first matching rule answers instead of relaying.
    if let Some(response) =
        first_auto_reply(&app.store.get_json_list("keyword_responses").await, &scan)
    {
        app.tg.send_message(OutMessage::new(row.user_id, response)).await?;
        return Ok(());
    }

    // 4. Quiet hours: damped notice, relaying continues.
    if app.store.get_bool("busy_mode").await {
        let last = row.info.last_busy_reply.unwrap_or(0);
        let now = now_ts();
        if now - last > BUSY_REPLY_INTERVAL_SECS {
            let busy = app.store.get("busy_msg").await;
            if let Err(e) = app.tg.send_message(OutMessage::new(row.user_id, busy)).await {
                log::debug!("busy notice failed for user {}: {}", row.user_id, e);
            }
            app.store
                .merge_info(
                    row.user_id,
                    UserInfoPatch {
                        last_busy_reply: Some(now),
                        ..Default::default()
                    },
                )
                .await?;
        }
    }

    // 5. Relay.
    relay::relay(app, row, msg).await?;
    Ok(())
}

async fn type_rejection(app: &App, kind: ContentKind) -> Option<String> {
    if !app.store.get_bool(kind.switch_key()).await {
        return Some(rejection_text(kind));
    }
    if let ContentKind::Forward { from_channel: true } = kind {
        if !app.store.get_bool("enable_channel_forwarding").await {
            return Some("⚠️ 当前不接收频道转发的消息。".to_string());
        }
    }
    None
}

fn rejection_text(kind: ContentKind) -> String {
    let what = match kind {
        ContentKind::Forward { .. } => "转发消息",
        ContentKind::Audio => "语音/音频",
        ContentKind::Sticker => "贴纸/动图",
        ContentKind::Media => "图片/视频/文件",
        ContentKind::Link => "包含链接的消息",
        ContentKind::Text => "文字消息",
    };
    format!("⚠️ 当前不接收{what}，请谅解。")
}

/// First block keyword matching `text`. Empty, oversized, or invalid
/// patterns are ignored without raising.
fn first_keyword_hit(patterns: &[serde_json::Value], text: &str) -> Option<String> {
    for value in patterns {
        let Some(pattern) = value.as_str() else { continue };
        if matches_tolerant(pattern, text) {
            return Some(pattern.to_string());
        }
    }
    None
}

/// Auto-reply rules are stored as `pattern===response` strings.
fn first_auto_reply(rules: &[serde_json::Value], text: &str) -> Option<String> {
    for value in rules {
        let Some(raw) = value.as_str() else { continue };
        let Some((pattern, response)) = raw.split_once("===") else {
            continue;
        };
        if matches_tolerant(pattern, text) {
            return Some(response.to_string());
        }
    }
    None
}

/// Compile lazily per evaluation; any failure is a mismatch.
fn matches_tolerant(pattern: &str, text: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() || pattern.chars().count() > PATTERN_MAX_CHARS {
        return false;
    }
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let patterns = vec![json!("spam")];
        assert_eq!(first_keyword_hit(&patterns, "this is SPAM"), Some("spam".into()));
        assert_eq!(first_keyword_hit(&patterns, "clean"), None);
    }

    #[test]
    fn invalid_and_oversized_patterns_never_raise() {
        let patterns = vec![
            json!("["),                    // invalid regex
            json!(""),                     // empty
            json!("x".repeat(300)),        // over the length cap
            json!(42),                     // not a string
            json!("valid"),
        ];
        assert_eq!(first_keyword_hit(&patterns, "a valid message"), Some("valid".into()));
        assert_eq!(first_keyword_hit(&patterns[..4].to_vec(), "anything"), None);
    }

    #[test]
    fn auto_reply_uses_first_match_and_skips_malformed() {
        let rules = vec![
            json!("no delimiter here"),
            json!("hi|hello===你好！"),
            json!("hello===second"),
        ];
        assert_eq!(first_auto_reply(&rules, "hello there"), Some("你好！".into()));
        assert_eq!(first_auto_reply(&rules, "bye"), None);
    }

    #[test]
    fn rejection_text_names_the_kind() {
        assert!(rejection_text(ContentKind::Audio).contains("语音"));
        assert!(rejection_text(ContentKind::Link).contains("链接"));
    }
}
