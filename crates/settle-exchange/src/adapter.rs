//! 프로토콜 어댑터.
//!
//! 서명기 + 요청 한도 관리자 + 에러 디코더를 조합해 거래소 REST 호출을
//! 수행합니다. 거래소별 차이는 조합하는 구성 요소에만 있고 호출 흐름은
//! 모든 커넥터가 공유합니다.
//!
//! ```text
//! call() ─> RateLimiter::acquire ─> sign_request ─> execute ─> ErrorDecoder
//! ```

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ExchangeError, ExchangeResult};
use crate::rate_limit::{QuotaTable, RateLimiter};
use crate::signer::{SignContext, Signer};

/// 공개 클라이언트의 요청 한도 키.
pub const PUBLIC_CREDENTIAL_KEY: &str = "public";

/// 요청 파라미터.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// 쿼리 파라미터 추가 (입력 순서 유지).
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// 값이 있을 때만 쿼리 파라미터 추가.
    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    /// JSON 본문 설정.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// 인코딩된 쿼리 문자열.
    pub fn encoded_query(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn body_string(&self) -> ExchangeResult<Option<String>> {
        self.body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(ExchangeError::from)
    }
}

/// 서명이 끝난 요청.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: Method,
    /// 요청 한도와 로그에 쓰는 엔드포인트 경로
    pub endpoint: String,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

/// 거래소 에러 응답 디코더.
pub trait ErrorDecoder: Send + Sync {
    /// 응답이 에러를 나타내면 정규화된 에러를 반환합니다.
    ///
    /// HTTP 200이지만 본문에 에러 코드가 있는 응답도 여기서 처리합니다.
    fn decode(&self, status: StatusCode, body: &str) -> Option<ExchangeError>;
}

/// 어댑터 연결 설정.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl AdapterConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// 거래소 하나에 대한 프로토콜 어댑터.
pub struct ProtocolAdapter {
    slug: String,
    http: Client,
    base_url: String,
    signer: Option<Arc<dyn Signer>>,
    limiter: Arc<RateLimiter>,
    quotas: QuotaTable,
    decoder: Arc<dyn ErrorDecoder>,
    credential_key: String,
    cancel: CancellationToken,
}

impl ProtocolAdapter {
    /// 자격증명 없는 어댑터 생성.
    pub fn new(
        slug: impl Into<String>,
        config: AdapterConfig,
        quotas: QuotaTable,
        decoder: Arc<dyn ErrorDecoder>,
    ) -> ExchangeResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::Network(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            slug: slug.into(),
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            signer: None,
            limiter: Arc::new(RateLimiter::new()),
            quotas,
            decoder,
            credential_key: PUBLIC_CREDENTIAL_KEY.to_string(),
            cancel: CancellationToken::new(),
        })
    }

    /// 서명기 설정. `credential_key`는 요청 한도 버킷 키로 쓰는 연결 해시입니다.
    pub fn with_signer(
        mut self,
        signer: Arc<dyn Signer>,
        credential_key: impl Into<String>,
    ) -> Self {
        self.signer = Some(signer);
        self.credential_key = credential_key.into();
        self
    }

    /// 같은 거래소의 다른 어댑터와 요청 한도 버킷을 공유합니다.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// 요청 한도 대기를 중단시킬 취소 토큰 설정.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn is_authenticated(&self) -> bool {
        self.signer.is_some()
    }

    fn timestamp_ms() -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }

    /// 요청 서명.
    pub fn sign_request(
        &self,
        method: Method,
        path: &str,
        params: &RequestParams,
        requires_auth: bool,
    ) -> ExchangeResult<SignedRequest> {
        let body = params.body_string()?;
        let query = params.encoded_query();

        let (query, headers) = if requires_auth {
            let signer = self.signer.as_ref().ok_or_else(|| {
                ExchangeError::InvalidCredentials(format!(
                    "{}: 공개 클라이언트로 인증 요청 불가 ({})",
                    self.slug, path
                ))
            })?;
            let signed = signer.sign(&SignContext {
                method: &method,
                path,
                query: &query,
                body: body.as_deref().unwrap_or_default(),
                timestamp_ms: Self::timestamp_ms(),
            })?;
            (signed.query, signed.headers)
        } else {
            (query, Vec::new())
        };

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        Ok(SignedRequest {
            method,
            endpoint: path.to_string(),
            url,
            headers,
            body,
        })
    }

    /// 서명된 요청 실행 및 응답 디코딩.
    pub async fn execute<T: DeserializeOwned>(&self, request: SignedRequest) -> ExchangeResult<T> {
        debug!(exchange = %self.slug, method = %request.method, endpoint = %request.endpoint, "요청");

        let mut builder = self.http.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(exchange = %self.slug, endpoint = %request.endpoint, "거래소 요청 한도 초과");
            return Err(ExchangeError::RateLimited(request.endpoint));
        }

        if let Some(err) = self.decoder.decode(status, &body) {
            debug!(exchange = %self.slug, endpoint = %request.endpoint, error = %err, "거래소 에러 응답");
            return Err(err);
        }

        if !status.is_success() {
            return Err(ExchangeError::Exchange {
                code: status.as_u16().to_string(),
                message: truncate(&body, 200),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!(
                exchange = %self.slug,
                endpoint = %request.endpoint,
                body = %truncate(&body, 200),
                "응답 파싱 실패: {}",
                e
            );
            ExchangeError::Parse(format!("{}: {}", request.endpoint, e))
        })
    }

    /// 요청 한도 대기 → 서명 → 실행.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: RequestParams,
        requires_auth: bool,
    ) -> ExchangeResult<T> {
        let quota = self.quotas.quota_for(path);
        let key = if requires_auth {
            self.credential_key.as_str()
        } else {
            PUBLIC_CREDENTIAL_KEY
        };
        self.limiter.acquire(path, key, quota, &self.cancel).await?;

        let request = self.sign_request(method, path, &params, requires_auth)?;
        self.execute(request).await
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::Quota;
    use crate::signer::QueryHmacSigner;
    use settle_core::Credential;

    struct CodeDecoder;

    impl ErrorDecoder for CodeDecoder {
        fn decode(&self, _status: StatusCode, body: &str) -> Option<ExchangeError> {
            let value: Value = serde_json::from_str(body).ok()?;
            let code = value.get("code")?.as_i64()?;
            let message = value.get("msg").and_then(Value::as_str).unwrap_or_default();
            (code != 0).then(|| ExchangeError::Exchange {
                code: code.to_string(),
                message: message.to_string(),
            })
        }
    }

    fn adapter(base_url: &str) -> ProtocolAdapter {
        ProtocolAdapter::new(
            "test",
            AdapterConfig::new(base_url),
            QuotaTable::new(Quota::per_second(100)),
            Arc::new(CodeDecoder),
        )
        .unwrap()
    }

    #[test]
    fn test_public_request_is_unsigned() {
        let adapter = adapter("https://api.example.com/");
        let params = RequestParams::new().query("symbol", "BTCUSDT").query("note", "a b");
        let request = adapter
            .sign_request(Method::GET, "/ticker", &params, false)
            .unwrap();

        assert_eq!(request.url, "https://api.example.com/ticker?symbol=BTCUSDT&note=a%20b");
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_auth_request_requires_signer() {
        let adapter = adapter("https://api.example.com");
        let result = adapter.sign_request(Method::GET, "/account", &RequestParams::new(), true);
        assert!(matches!(result, Err(ExchangeError::InvalidCredentials(_))));

        let signed = adapter
            .with_signer(Arc::new(QueryHmacSigner::new(Credential::new("k", "s"), 5000)), "hash")
            .sign_request(Method::GET, "/account", &RequestParams::new(), true)
            .unwrap();
        assert!(signed.url.contains("signature="));
        assert_eq!(signed.headers.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_maps_429_and_body_codes() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("GET", "/limited")
            .with_status(429)
            .create_async()
            .await;
        let coded = server
            .mock("GET", "/coded")
            .with_status(200)
            .with_body(r#"{"code":10003,"msg":"bad key"}"#)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body(r#"{"code":0,"value":7}"#)
            .create_async()
            .await;

        let adapter = adapter(&server.url());

        let err = adapter
            .call::<Value>(Method::GET, "/limited", RequestParams::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::RateLimited(_)));

        let err = adapter
            .call::<Value>(Method::GET, "/coded", RequestParams::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Exchange { ref code, .. } if code == "10003"));

        let value: Value = adapter
            .call(Method::GET, "/ok", RequestParams::new(), false)
            .await
            .unwrap();
        assert_eq!(value["value"], 7);

        limited.assert_async().await;
        coded.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancelled_adapter_refuses_calls() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let adapter = adapter("http://127.0.0.1:1").with_cancel(cancel);
        let err = adapter
            .call::<Value>(Method::GET, "/x", RequestParams::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Cancelled));
        assert!(err.is_retryable());
    }
}
