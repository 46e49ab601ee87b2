//! Server-side captcha verification against the provider's siteverify
//! endpoint. Boolean outcome; transport failures surface as errors so the
//! caller can distinguish "failed" from "unreachable".

use anyhow::{Context, Result};
use serde::Deserialize;

const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";
const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaMode {
    Off,
    Turnstile,
    Recaptcha,
}

impl CaptchaMode {
    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            "recaptcha" => CaptchaMode::Recaptcha,
            "off" => CaptchaMode::Off,
            _ => CaptchaMode::Turnstile,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptchaMode::Off => "off",
            CaptchaMode::Turnstile => "turnstile",
            CaptchaMode::Recaptcha => "recaptcha",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
}

/// Turnstile expects a JSON body, reCAPTCHA a form-encoded one.
pub async fn siteverify(
    http: &reqwest::Client,
    mode: CaptchaMode,
    secret: &str,
    token: &str,
) -> Result<bool> {
    let resp = match mode {
        CaptchaMode::Turnstile => http
            .post(TURNSTILE_VERIFY_URL)
            .json(&serde_json::json!({ "secret": secret, "response": token }))
            .send()
            .await
            .context("turnstile siteverify request failed")?,
        CaptchaMode::Recaptcha => http
            .post(RECAPTCHA_VERIFY_URL)
            .form(&[("secret", secret), ("response", token)])
            .send()
            .await
            .context("recaptcha siteverify request failed")?,
        CaptchaMode::Off => return Ok(true),
    };

    let body: SiteverifyResponse = resp.json().await.context("siteverify response parse failed")?;
    Ok(body.success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing_defaults_to_turnstile() {
        assert_eq!(CaptchaMode::from_str("turnstile"), CaptchaMode::Turnstile);
        assert_eq!(CaptchaMode::from_str("recaptcha"), CaptchaMode::Recaptcha);
        assert_eq!(CaptchaMode::from_str("off"), CaptchaMode::Off);
        assert_eq!(CaptchaMode::from_str("whatever"), CaptchaMode::Turnstile);
    }
}
