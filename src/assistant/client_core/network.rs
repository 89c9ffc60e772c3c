use anyhow::{Context, Result};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, info};

use super::AssistantsClient;
use crate::assistant::{ApiErrorKind, ApiStatusError, classify_error};

fn headers(client: &AssistantsClient) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("openai-beta", HeaderValue::from_static("assistants=v2"));
    headers.insert(
        AUTHORIZATION,
        format!("Bearer {}", client.api_key)
            .parse()
            .context("api key is not a valid header value")?,
    );
    Ok(headers)
}

/// Outcome of one HTTP exchange, keeping the `Retry-After` hint around.
struct Attempt<T> {
    result: Result<T>,
    retry_after: Option<u64>,
}

async fn exchange<T: DeserializeOwned>(
    client: &AssistantsClient,
    method: Method,
    url: &str,
    body: Option<&serde_json::Value>,
) -> Attempt<T> {
    let headers = match headers(client) {
        Ok(h) => h,
        Err(e) => {
            return Attempt {
                result: Err(e),
                retry_after: None,
            };
        }
    };

    let mut req = client.inner.request(method.clone(), url).headers(headers);
    if let Some(body) = body {
        req = req.json(body);
    }

    let resp = match req.send().await {
        Ok(resp) => resp,
        Err(e) => {
            error!(%method, url, err=%e, "assistants api send error");
            return Attempt {
                result: Err(anyhow::Error::new(e).context("send request")),
                retry_after: None,
            };
        }
    };

    let status = resp.status();
    if !status.is_success() {
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let text = resp.text().await.unwrap_or_default();
        error!(%method, url, status=%status.as_u16(), body=%text, "assistants api non-success status");
        return Attempt {
            result: Err(ApiStatusError { status, body: text }.into()),
            retry_after,
        };
    }

    let text = match resp.text().await {
        Ok(text) => text,
        Err(e) => {
            return Attempt {
                result: Err(anyhow::Error::new(e).context("read response body")),
                retry_after: None,
            };
        }
    };
    debug!(%method, url, response_body=%text, "assistants api response");

    Attempt {
        result: serde_json::from_str(&text)
            .map_err(|e| anyhow::Error::new(e).context("parse response body")),
        retry_after: None,
    }
}

/// Single-shot request for calls that change remote state.
pub(super) async fn send_once<T: DeserializeOwned>(
    client: &AssistantsClient,
    method: Method,
    url: &str,
    body: Option<serde_json::Value>,
) -> Result<T> {
    exchange(client, method, url, body.as_ref()).await.result
}

/// GET with retries on rate limits, server errors and flaky transport.
pub(super) async fn get_with_retry<T: DeserializeOwned>(
    client: &AssistantsClient,
    url: &str,
) -> Result<T> {
    let max_attempts = client.http_cfg.max_retries.saturating_add(1);
    let mut attempt = 1usize;
    loop {
        let Attempt {
            result,
            retry_after,
        } = exchange(client, Method::GET, url, None).await;
        let err = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let kind = classify_error(None, &err);
        if !should_retry(&kind) || attempt >= max_attempts {
            return Err(err);
        }
        let wait = backoff_delay(client, attempt, retry_after);
        info!(attempt, kind=?kind, wait_ms=%wait.as_millis(), url, "retrying assistants api read");
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

pub(crate) fn should_retry(kind: &ApiErrorKind) -> bool {
    matches!(
        kind,
        ApiErrorKind::RateLimited
            | ApiErrorKind::Server
            | ApiErrorKind::Network
            | ApiErrorKind::Timeout
    )
}

pub(crate) fn backoff_delay(
    client: &AssistantsClient,
    attempt: usize,
    retry_after_secs: Option<u64>,
) -> Duration {
    let cap = Duration::from_millis(client.http_cfg.max_retry_wait_ms);
    if client.http_cfg.respect_retry_after
        && let Some(secs) = retry_after_secs
    {
        return Duration::from_secs(secs).min(cap);
    }
    let base = client.http_cfg.retry_base_ms;
    let shift = attempt.saturating_sub(1).min(16) as u32;
    let exp = base.saturating_mul(1u64 << shift);
    let jitter = client.http_cfg.retry_jitter_ms;
    let rnd = if jitter == 0 {
        0
    } else {
        fastrand::u64(0..=jitter)
    };
    Duration::from_millis(exp.saturating_add(rnd)).min(cap)
}
