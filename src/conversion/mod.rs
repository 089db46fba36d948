//! Currency Conversion
//!
//! Talks to a remote rate service that converts the amount itself. The
//! response is `{ "rates": { "<CODE>": <converted total> } }`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ConversionSettings;
use crate::error::ConversionError;

/// Three-letter uppercase currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    /// Currency usually meant by a price symbol
    pub fn from_symbol(symbol: char) -> Option<Self> {
        let code = match symbol {
            '$' => "USD",
            '€' => "EUR",
            '£' => "GBP",
            '¥' => "JPY",
            '₱' => "PHP",
            _ => return None,
        };
        code.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII uppercase letters are ever stored
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bytes = upper.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(format!("invalid currency code: {s:?}"));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed amount to convert
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    /// Plain decimal string, e.g. "12.50"
    pub amount: String,
    pub from: CurrencyCode,
    pub to: CurrencyCode,
}

/// Converted amount ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub currency: CurrencyCode,
    pub value: f64,
    /// Value rounded to two decimals
    pub display_amount: String,
}

impl ConversionResult {
    pub fn new(currency: CurrencyCode, value: f64) -> Self {
        Self {
            currency,
            value,
            display_amount: format!("{value:.2}"),
        }
    }
}

impl fmt::Display for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, self.display_amount)
    }
}

/// How a conversion call ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Converted(ConversionResult),
    /// Cancelled before the response arrived; not an error
    Cancelled,
}

/// Remote rate lookup
#[async_trait]
pub trait RateService: Send + Sync {
    /// Send one request and return the decoded JSON body
    async fn fetch(&self, request: &ConversionRequest) -> Result<Value, ConversionError>;
}

/// Rate service over HTTP
pub struct HttpRateService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConversionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConversionError::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn from_settings(settings: &ConversionSettings) -> Result<Self, ConversionError> {
        Self::new(
            &settings.base_url,
            Duration::from_secs(settings.timeout_secs),
        )
    }
}

#[async_trait]
impl RateService for HttpRateService {
    async fn fetch(&self, request: &ConversionRequest) -> Result<Value, ConversionError> {
        debug!(
            "GET {} amount={} from={} to={}",
            self.base_url, request.amount, request.from, request.to
        );

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("amount", request.amount.as_str()),
                ("from", request.from.as_str()),
                ("to", request.to.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ConversionError::network(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConversionError::network(format!(
                "rate service returned {status}"
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                ConversionError::malformed(format!("response is not JSON: {e}"))
            } else {
                ConversionError::network(format!("failed to read response: {e}"))
            }
        })
    }
}

/// Issues conversion requests and interprets the response
#[derive(Clone)]
pub struct ConversionGateway {
    service: Arc<dyn RateService>,
}

impl ConversionGateway {
    pub fn new(service: Arc<dyn RateService>) -> Self {
        Self { service }
    }

    /// Convert `request`, resolving as [`ConversionOutcome::Cancelled`] if
    /// `cancel` fires before the response arrives
    pub async fn convert(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome, ConversionError> {
        if cancel.is_cancelled() {
            return Ok(ConversionOutcome::Cancelled);
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Conversion {} -> {} cancelled", request.from, request.to);
                return Ok(ConversionOutcome::Cancelled);
            }
            body = self.service.fetch(request) => body?,
        };

        let value = converted_value(&body, request.to)?;
        let result = ConversionResult::new(request.to, value);
        info!(
            "Converted {} {} -> {}",
            request.amount, request.from, result
        );
        Ok(ConversionOutcome::Converted(result))
    }
}

/// Pull the converted total for `to` out of a rate response
fn converted_value(body: &Value, to: CurrencyCode) -> Result<f64, ConversionError> {
    let rates = body
        .get("rates")
        .and_then(Value::as_object)
        .ok_or_else(|| ConversionError::malformed("response has no rates object"))?;

    let rate = rates
        .get(to.as_str())
        .ok_or_else(|| ConversionError::not_found(format!("no rate for {to}")))?;

    rate.as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConversionError::malformed(format!("rate for {to} is not a number")))
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory rate service for tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FakeRates {
        pub body: parking_lot::Mutex<Result<Value, ConversionError>>,
        pub delay: parking_lot::Mutex<Duration>,
        pub calls: AtomicUsize,
        pub last: parking_lot::Mutex<Option<ConversionRequest>>,
    }

    impl FakeRates {
        pub fn new(body: Result<Value, ConversionError>) -> Arc<Self> {
            Arc::new(Self {
                body: parking_lot::Mutex::new(body),
                delay: parking_lot::Mutex::new(Duration::ZERO),
                calls: AtomicUsize::new(0),
                last: parking_lot::Mutex::new(None),
            })
        }

        pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
            *self.delay.lock() = delay;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateService for FakeRates {
        async fn fetch(&self, request: &ConversionRequest) -> Result<Value, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some(request.clone());
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.body.lock().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeRates;
    use super::*;
    use crate::error::ConversionFailure;
    use mockito::Matcher;
    use serde_json::json;

    fn code(s: &str) -> CurrencyCode {
        s.parse().unwrap()
    }

    fn request() -> ConversionRequest {
        ConversionRequest {
            amount: "12.50".to_string(),
            from: code("USD"),
            to: code("EUR"),
        }
    }

    #[test]
    fn test_currency_code_parse() {
        assert_eq!(code("eur").as_str(), "EUR");
        assert!("EU".parse::<CurrencyCode>().is_err());
        assert!("EU1".parse::<CurrencyCode>().is_err());
        assert!("EURO".parse::<CurrencyCode>().is_err());
        assert_eq!(CurrencyCode::from_symbol('₱'), Some(code("PHP")));
        assert_eq!(CurrencyCode::from_symbol('#'), None);
    }

    #[test]
    fn test_currency_code_serde() {
        let json = serde_json::to_string(&code("GBP")).unwrap();
        assert_eq!(json, "\"GBP\"");
        let parsed: CurrencyCode = serde_json::from_str("\"jpy\"").unwrap();
        assert_eq!(parsed, code("JPY"));
        assert!(serde_json::from_str::<CurrencyCode>("\"nope\"").is_err());
    }

    #[test]
    fn test_result_display() {
        let r = ConversionResult::new(code("EUR"), 11.4789);
        assert_eq!(r.display_amount, "11.48");
        assert_eq!(r.to_string(), "EUR 11.48");
    }

    #[test]
    fn test_converted_value_errors() {
        let eur = code("EUR");
        assert_eq!(converted_value(&json!({"rates": {"EUR": 11.48}}), eur), Ok(11.48));

        let err = converted_value(&json!({"rates": {"GBP": 9.0}}), eur).unwrap_err();
        assert_eq!(err.reason, ConversionFailure::NotFound);

        let err = converted_value(&json!({"message": "bad"}), eur).unwrap_err();
        assert_eq!(err.reason, ConversionFailure::MalformedResponse);

        let err = converted_value(&json!({"rates": {"EUR": "11.48"}}), eur).unwrap_err();
        assert_eq!(err.reason, ConversionFailure::MalformedResponse);
    }

    #[tokio::test]
    async fn test_gateway_converts() {
        let fake = FakeRates::new(Ok(json!({"amount": 12.5, "rates": {"EUR": 11.48}})));
        let gateway = ConversionGateway::new(fake.clone());

        let outcome = gateway
            .convert(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ConversionOutcome::Converted(ConversionResult::new(code("EUR"), 11.48))
        );
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_gateway_cancel_is_not_error() {
        let fake = FakeRates::new(Ok(json!({"rates": {"EUR": 11.48}})))
            .with_delay(Duration::from_secs(5));
        let gateway = ConversionGateway::new(fake);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = gateway.convert(&request(), &cancel).await.unwrap();
        assert_eq!(outcome, ConversionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_gateway_precancelled_sends_nothing() {
        let fake = FakeRates::new(Ok(json!({"rates": {"EUR": 1.0}})));
        let gateway = ConversionGateway::new(fake.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = gateway.convert(&request(), &cancel).await.unwrap();
        assert_eq!(outcome, ConversionOutcome::Cancelled);
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_http_service_query_and_parse() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/latest")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("amount".into(), "12.50".into()),
                Matcher::UrlEncoded("from".into(), "USD".into()),
                Matcher::UrlEncoded("to".into(), "EUR".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"amount":12.5,"base":"USD","rates":{"EUR":11.48}}"#)
            .create_async()
            .await;

        let service =
            HttpRateService::new(&format!("{}/latest", server.url()), Duration::from_secs(5))
                .unwrap();
        let gateway = ConversionGateway::new(Arc::new(service));

        let outcome = gateway
            .convert(&request(), &CancellationToken::new())
            .await
            .unwrap();

        match outcome {
            ConversionOutcome::Converted(r) => assert_eq!(r.to_string(), "EUR 11.48"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_service_missing_currency() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/latest")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"rates":{}}"#)
            .create_async()
            .await;

        let service =
            HttpRateService::new(&format!("{}/latest", server.url()), Duration::from_secs(5))
                .unwrap();
        let err = ConversionGateway::new(Arc::new(service))
            .convert(&request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.reason, ConversionFailure::NotFound);
    }

    #[tokio::test]
    async fn test_http_service_bad_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _bad = server
            .mock("GET", "/error")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        let _html = server
            .mock("GET", "/html")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let service =
            HttpRateService::new(&format!("{}/error", server.url()), Duration::from_secs(5))
                .unwrap();
        let err = service.fetch(&request()).await.unwrap_err();
        assert_eq!(err.reason, ConversionFailure::Network);

        let service =
            HttpRateService::new(&format!("{}/html", server.url()), Duration::from_secs(5))
                .unwrap();
        let err = service.fetch(&request()).await.unwrap_err();
        assert_eq!(err.reason, ConversionFailure::MalformedResponse);
    }

    #[tokio::test]
    async fn test_http_service_unreachable() {
        let service =
            HttpRateService::new("http://127.0.0.1:1/latest", Duration::from_secs(2)).unwrap();
        let err = service.fetch(&request()).await.unwrap_err();
        assert_eq!(err.reason, ConversionFailure::Network);
    }
}
