// File: grabbot-core/src/platforms/binance/client.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use grabbot_common::models::{ClaimConfig, ClaimOutcome, Code};
use grabbot_common::traits::RedemptionApi;
use crate::http::{DefaultHttpClient, HttpClient, HttpReply};
use crate::Error;

/// Upstream error codes.
pub const CODE_TOO_MANY_REQUESTS: &str = "403067";
pub const CODE_ALREADY_CLAIMED: &str = "403802";
pub const CODES_INVALID: [&str; 2] = ["403803", "PAY4001COM000"];
pub const CODE_SESSION_EXPIRED: &str = "100002001";

static WAIT_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2})").unwrap_or_else(|_| Regex::new("$^").unwrap())
});

/// JSON shape of the grab endpoint's reply. Every field is optional;
/// `code` arrives as a string or a number depending on the error.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GrabResponse {
    success: Option<bool>,
    code: Option<Value>,
    message: Option<String>,
    data: Option<Value>,
}

/// Submits crypto-box codes to the Binance Pay grab endpoint.
pub struct BinancePayClient {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    headers: BTreeMap<String, String>,
}

impl BinancePayClient {
    pub fn new(http: Arc<dyn HttpClient>, endpoint: &str, headers: BTreeMap<String, String>) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            headers,
        }
    }

    /// Builds the reqwest-backed client with the configured timeout.
    pub fn from_config(cfg: &ClaimConfig) -> Result<Self, Error> {
        let http = DefaultHttpClient::new(Duration::from_secs(cfg.request_timeout_secs))?;
        Ok(Self::new(Arc::new(http), &cfg.endpoint, cfg.headers.clone()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// The fixed request body for one grab attempt.
pub fn grab_payload(code: &Code) -> Value {
    json!({
        "channel": "DEFAULT",
        "grabCode": code.as_str(),
        "scene": Value::Null,
    })
}

#[async_trait]
impl RedemptionApi for BinancePayClient {
    async fn claim(&self, code: &Code) -> ClaimOutcome {
        let payload = grab_payload(code);
        debug!("POST {} grabCode={}", self.endpoint, code);
        match self.http.post_json(&self.endpoint, &self.headers, &payload).await {
            Ok(reply) => {
                let outcome = classify(&reply);
                log_outcome(code, &outcome);
                outcome
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("Network problem while claiming {}: {}", code, e);
                } else {
                    error!("Request for {} failed before a reply: {}", code, e);
                }
                ClaimOutcome::TransientNetworkError
            }
        }
    }
}

/// Maps a raw reply onto an outcome. Checks run in a fixed priority order;
/// the first that matches wins.
pub fn classify(reply: &HttpReply) -> ClaimOutcome {
    if !reply.is_success() {
        return ClaimOutcome::ApiError {
            code: format!("http_{}", reply.status),
            message: truncate(&reply.body, 200),
        };
    }

    let value: Value = match serde_json::from_str(&reply.body) {
        Ok(v) => v,
        Err(_) => return ClaimOutcome::MalformedResponse,
    };
    if !value.is_object() {
        return ClaimOutcome::MalformedResponse;
    }
    let resp: GrabResponse = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(_) => return ClaimOutcome::MalformedResponse,
    };

    let data = resp.data.as_ref().and_then(Value::as_object);

    if resp.success == Some(true) {
        let field = |name: &str, fallback: &str| {
            data.and_then(|d| d.get(name))
                .and_then(value_to_string)
                .unwrap_or_else(|| fallback.to_string())
        };
        return ClaimOutcome::Claimed {
            amount: field("grabAmountStr", "0"),
            currency: field("currency", "N/A"),
        };
    }

    if data.is_some_and(|d| d.contains_key("validateId")) {
        return ClaimOutcome::CaptchaRequired;
    }

    let code = resp.code.as_ref().and_then(value_to_string).unwrap_or_default();
    let message = resp.message.unwrap_or_default();

    match code.as_str() {
        CODE_TOO_MANY_REQUESTS => ClaimOutcome::RateLimited {
            wait_hint: wait_hint(&message),
        },
        CODE_ALREADY_CLAIMED => ClaimOutcome::AlreadyProcessed,
        c if CODES_INVALID.contains(&c) => ClaimOutcome::AlreadyProcessed,
        CODE_SESSION_EXPIRED => ClaimOutcome::SessionExpired,
        "" => ClaimOutcome::ApiError {
            code: "unknown".to_string(),
            message,
        },
        _ => ClaimOutcome::ApiError { code, message },
    }
}

/// `"... try again after 01:30"` => `Some("01:30")`
pub fn wait_hint(message: &str) -> Option<String> {
    WAIT_HINT
        .captures(message)
        .map(|caps| format!("{:0>2}:{}", &caps[1], &caps[2]))
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn log_outcome(code: &Code, outcome: &ClaimOutcome) {
    match outcome {
        ClaimOutcome::Claimed { amount, currency } => {
            info!("Claimed {} => {} {}", code, amount, currency)
        }
        ClaimOutcome::AlreadyProcessed => info!("{} was already claimed or is not valid", code),
        ClaimOutcome::CaptchaRequired => error!("Captcha required while claiming {}", code),
        ClaimOutcome::RateLimited { wait_hint: Some(h) } => {
            warn!("Too many requests; endpoint asks to wait {}", h)
        }
        ClaimOutcome::RateLimited { wait_hint: None } => warn!("Too many requests"),
        ClaimOutcome::SessionExpired => error!("Session expired; log in again and refresh headers"),
        ClaimOutcome::ApiError { code: c, message } => {
            error!("Endpoint error for {}: {} (code {})", code, message, c)
        }
        ClaimOutcome::MalformedResponse => error!("Reply for {} was not valid JSON", code),
        ClaimOutcome::TransientNetworkError => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn ok(body: &str) -> HttpReply {
        HttpReply { status: 200, body: body.to_string() }
    }

    #[test]
    fn non_2xx_is_api_error_with_status() {
        let out = classify(&HttpReply { status: 502, body: "{\"success\":true}".into() });
        assert!(matches!(out, ClaimOutcome::ApiError { ref code, .. } if code == "http_502"));
    }

    #[test]
    fn non_json_is_malformed() {
        assert_eq!(classify(&ok("<html>busy</html>")), ClaimOutcome::MalformedResponse);
        assert_eq!(classify(&ok("[1,2,3]")), ClaimOutcome::MalformedResponse);
        assert_eq!(classify(&ok("")), ClaimOutcome::MalformedResponse);
    }

    #[test]
    fn success_reads_amount_and_currency() {
        let out = classify(&ok(
            r#"{"success":true,"code":"000000","data":{"grabAmountStr":"5.00","currency":"USDT"}}"#,
        ));
        assert_eq!(
            out,
            ClaimOutcome::Claimed { amount: "5.00".into(), currency: "USDT".into() }
        );
    }

    #[test]
    fn success_without_data_uses_defaults() {
        let out = classify(&ok(r#"{"success":true,"data":null}"#));
        assert_eq!(out, ClaimOutcome::Claimed { amount: "0".into(), currency: "N/A".into() });
    }

    #[test]
    fn validate_id_means_captcha_even_with_error_code() {
        let out = classify(&ok(
            r#"{"success":false,"code":"403067","data":{"validateId":"abc"}}"#,
        ));
        assert_eq!(out, ClaimOutcome::CaptchaRequired);
    }

    #[test]
    fn too_many_requests_extracts_wait_hint() {
        let out = classify(&ok(
            r#"{"success":false,"code":"403067","message":"Too many attempts, retry after 1:30"}"#,
        ));
        assert_eq!(out, ClaimOutcome::RateLimited { wait_hint: Some("01:30".into()) });

        let out = classify(&ok(r#"{"success":false,"code":"403067","message":"slow down"}"#));
        assert_eq!(out, ClaimOutcome::RateLimited { wait_hint: None });
    }

    #[test]
    fn already_claimed_and_invalid_are_processed() {
        for c in ["403802", "403803", "PAY4001COM000"] {
            let body = format!(r#"{{"success":false,"code":"{c}","message":"x"}}"#);
            assert_eq!(classify(&ok(&body)), ClaimOutcome::AlreadyProcessed, "code {c}");
        }
    }

    #[test]
    fn session_expired_accepts_numeric_code() {
        let out = classify(&ok(r#"{"success":false,"code":100002001,"message":"please log in"}"#));
        assert_eq!(out, ClaimOutcome::SessionExpired);
    }

    #[test]
    fn unknown_codes_fall_through() {
        let out = classify(&ok(r#"{"success":false,"code":"999","message":"odd"}"#));
        assert_eq!(out, ClaimOutcome::ApiError { code: "999".into(), message: "odd".into() });

        let out = classify(&ok(r#"{"success":false}"#));
        assert_eq!(out, ClaimOutcome::ApiError { code: "unknown".into(), message: String::new() });
    }

    /// Records what it was asked to send and replies with a fixed result.
    struct CannedHttp {
        reply: Mutex<Option<Result<HttpReply, Error>>>,
        seen: Mutex<Vec<(String, BTreeMap<String, String>, Value)>>,
    }

    #[async_trait]
    impl HttpClient for CannedHttp {
        async fn post_json(
            &self,
            url: &str,
            headers: &BTreeMap<String, String>,
            body: &Value,
        ) -> Result<HttpReply, Error> {
            self.seen.lock().push((url.to_string(), headers.clone(), body.clone()));
            self.reply.lock().take().unwrap_or_else(|| Err(Error::Platform("no reply".into())))
        }
    }

    #[tokio::test]
    async fn claim_sends_fixed_payload_and_headers() {
        let http = Arc::new(CannedHttp {
            reply: Mutex::new(Some(Ok(ok(r#"{"success":false,"code":"403802"}"#)))),
            seen: Mutex::new(Vec::new()),
        });
        let mut headers = BTreeMap::new();
        headers.insert("csrftoken".to_string(), "t0k".to_string());
        let client = BinancePayClient::new(http.clone(), "https://example.test/grab", headers);

        let out = client.claim(&Code::parse("AB3D9F8K").unwrap()).await;
        assert_eq!(out, ClaimOutcome::AlreadyProcessed);

        let seen = http.seen.lock();
        assert_eq!(seen.len(), 1);
        let (url, headers, body) = &seen[0];
        assert_eq!(url, "https://example.test/grab");
        assert_eq!(headers.get("csrftoken").map(String::as_str), Some("t0k"));
        assert_eq!(body, &json!({"channel": "DEFAULT", "grabCode": "AB3D9F8K", "scene": null}));
    }

    #[tokio::test]
    async fn transport_failure_is_transient() {
        let http = Arc::new(CannedHttp {
            reply: Mutex::new(Some(Err(Error::Platform("connection refused".into())))),
            seen: Mutex::new(Vec::new()),
        });
        let client = BinancePayClient::new(http, "https://example.test/grab", BTreeMap::new());
        let out = client.claim(&Code::parse("AB3D9F8K").unwrap()).await;
        assert_eq!(out, ClaimOutcome::TransientNetworkError);
    }
}
