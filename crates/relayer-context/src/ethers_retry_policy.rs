// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use ethers::providers::{JsonRpcError, ProviderError, RetryPolicy};

/// Implements [RetryPolicy] that will retry requests that errored with
/// status code 429 i.e. TOO_MANY_REQUESTS
///
/// Infura often fails with a `"header not found"` rpc error which is apparently linked to load
/// balancing, which are retried as well.
#[derive(Debug)]
pub struct BridgeHttpRetryPolicy {
    err_regex: regex::Regex,
}

impl BridgeHttpRetryPolicy {
    pub fn new() -> Self {
        Self {
            err_regex: regex::Regex::new(
                r"(?mixU)\b(?:rate|limit|429|Too \s Many \s Requests)\b",
            )
            .expect("Valid Regex"),
        }
    }

    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }
}

impl Default for BridgeHttpRetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

fn should_retry_json_rpc_error(err: &JsonRpcError) -> bool {
    let JsonRpcError { code, message, .. } = err;
    // alchemy
    if *code == 429 {
        return true;
    }
    // infura `exceeded project rate limit`
    if *code == -32005 {
        return true;
    }
    if *code == -32016 && message.contains("rate limit") {
        return true;
    }
    matches!(
        message.as_str(),
        "header not found"
            | "daily request count exceeded, request rate limited"
    )
}

/// Some providers answer with an invalid JSON-RPC envelope, or with plain
/// text, when they rate limit.
fn should_retry_serde_error(
    err: &serde_json::Error,
    err_regex: &regex::Regex,
) -> bool {
    #[derive(serde::Deserialize)]
    struct Resp {
        error: JsonRpcError,
    }

    if let Ok(resp) = serde_json::from_str::<Resp>(&err.to_string()) {
        return should_retry_json_rpc_error(&resp.error);
    }

    let err_text = err.to_string().to_lowercase();
    let should_retry = err_regex.is_match(&err_text)
        || err_text == "expected value at line 1 column 1";

    tracing::event!(
        target: bridge_relayer_utils::probe::TARGET,
        tracing::Level::DEBUG,
        kind = %bridge_relayer_utils::probe::Kind::Retry,
        should_retry,
        error = %err_text,
    );
    should_retry
}

impl RetryPolicy<ProviderError> for BridgeHttpRetryPolicy {
    fn should_retry(&self, error: &ProviderError) -> bool {
        tracing::trace!("should_retry: {:?}", error);
        match error {
            ProviderError::HTTPError(err) => {
                err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS)
            }
            ProviderError::JsonRpcClientError(err) => {
                if let Some(e) = err.as_error_response() {
                    return should_retry_json_rpc_error(e);
                }
                if let Some(e) = err.as_serde_error() {
                    return should_retry_serde_error(e, &self.err_regex);
                }
                false
            }
            ProviderError::SerdeJson(err) => {
                should_retry_serde_error(err, &self.err_regex)
            }
            _ => false,
        }
    }

    fn backoff_hint(&self, error: &ProviderError) -> Option<Duration> {
        const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

        let ProviderError::JsonRpcClientError(err) = error else {
            return Some(DEFAULT_BACKOFF);
        };
        let backoff_seconds = err
            .as_error_response()
            .and_then(|e| e.data.as_ref())
            .and_then(|data| data.get("rate"))
            .and_then(|rate| rate.get("backoff_seconds"));
        // infura sends the requested backoff when the daily limit is hit.
        match backoff_seconds {
            Some(s) if s.as_u64().is_some() => {
                s.as_u64().map(Duration::from_secs)
            }
            Some(s) if s.as_f64().is_some() => {
                s.as_f64().map(|s| Duration::from_secs(s as u64 + 1))
            }
            _ => Some(DEFAULT_BACKOFF),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_error(code: i64, message: &str) -> JsonRpcError {
        JsonRpcError {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    #[test]
    fn retries_rate_limits_and_flaky_headers() {
        assert!(should_retry_json_rpc_error(&rpc_error(429, "slow down")));
        assert!(should_retry_json_rpc_error(&rpc_error(-32005, "limit")));
        assert!(should_retry_json_rpc_error(&rpc_error(-32000, "header not found")));
        assert!(!should_retry_json_rpc_error(&rpc_error(-32000, "execution reverted")));
        assert!(should_retry_json_rpc_error(&rpc_error(-32016, "rate limit exceeded")));
        assert!(!should_retry_json_rpc_error(&rpc_error(-32016, "forbidden")));
    }

    #[test]
    fn plain_text_rate_limit_bodies_are_retried() {
        let policy = BridgeHttpRetryPolicy::new();
        let err = serde_json::from_str::<serde_json::Value>("Too Many Requests")
            .unwrap_err();
        // the parser error itself does not carry the body.
        assert!(!policy.err_regex.is_match(&err.to_string().to_lowercase()));
        assert!(policy.err_regex.is_match("error: rate limited"));
        assert!(!policy.should_retry(&ProviderError::UnsupportedRPC));
    }

    #[test]
    fn default_backoff_hint() {
        let policy = BridgeHttpRetryPolicy::new();
        assert_eq!(
            policy.backoff_hint(&ProviderError::UnsupportedRPC),
            Some(Duration::from_secs(5))
        );
    }
}
