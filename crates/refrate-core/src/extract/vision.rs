use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::http_client::{execute_with_retry, HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::table::ParsedTable;
use crate::{ColumnSchema, CurrencyCode, IngestError, RateRow, RateValue};

const INSTRUCTIONS: &str = "You read scanned bank forex rate sheets. Answer with one JSON object: \
{\"is_rate_table\": bool, \"headers\": [string], \"date_text\": string, \"time_text\": string, \
\"rows\": [{\"currency_code\": string, \"rates\": [number]}]}. \
is_rate_table is true only when the page holds the per-currency reference rate table. \
headers lists the rate column names left to right, excluding the currency column. \
date_text and time_text copy the printed publication date and time verbatim. \
Each row gives the 3-letter currency code and its rates in header order.";

/// Vision endpoint settings. The key is never logged.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub dpi: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://api.openai.com/v1/chat/completions"),
            model: String::from("gpt-4o"),
            api_key: String::new(),
            timeout_ms: 60_000,
            dpi: super::raster::DEFAULT_DPI,
        }
    }
}

impl std::fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("dpi", &self.dpi)
            .finish()
    }
}

/// A rate as read from an image: the model may answer with numbers or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VisionRate {
    Number(f64),
    Text(String),
}

impl VisionRate {
    fn to_rate(&self) -> Option<RateValue> {
        match self {
            Self::Number(value) => RateValue::from_f64(*value).ok(),
            Self::Text(text) => RateValue::parse(text).ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionRow {
    pub currency_code: String,
    #[serde(default)]
    pub rates: Vec<VisionRate>,
}

/// Structured guess for one page image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionRead {
    pub is_rate_table: bool,
    pub headers: Vec<String>,
    pub date_text: Option<String>,
    pub time_text: Option<String>,
    pub rows: Vec<VisionRow>,
}

impl VisionRead {
    /// Rows whose code and rate count fit the read's own headers. A currency
    /// listed twice keeps its last row.
    pub fn table(&self) -> Result<ParsedTable, IngestError> {
        let schema = ColumnSchema::new(&self.headers).map_err(|_| {
            IngestError::NoRatesFound(String::from("vision read confirmed a table without headers"))
        })?;
        let mut table = ParsedTable {
            schema,
            rows: Vec::new(),
        };
        for row in &self.rows {
            let Ok(currency) = CurrencyCode::parse(&row.currency_code) else {
                debug!(code = %row.currency_code, "skipping vision row with invalid code");
                continue;
            };
            let rates: Option<Vec<RateValue>> = row.rates.iter().map(VisionRate::to_rate).collect();
            match rates {
                Some(rates) if table.schema.check_arity(rates.len()).is_ok() => {
                    table.push(RateRow { currency, rates });
                }
                _ => debug!(code = %row.currency_code, "skipping vision row with bad rates"),
            }
        }
        if table.rows.is_empty() {
            return Err(IngestError::NoRatesFound(format!(
                "vision read confirmed a table with columns {:?} but no row fits",
                table.schema.columns()
            )));
        }
        Ok(table)
    }
}

pub type VisionFuture<'a> = Pin<Box<dyn Future<Output = Result<VisionRead, IngestError>> + Send + 'a>>;

/// Image-to-structure collaborator.
pub trait VisionReader: Send + Sync {
    /// Reads one page image; `mime_type` is `image/png` or `image/jpeg`.
    fn read_page<'a>(&'a self, image: &'a [u8], mime_type: &'a str) -> VisionFuture<'a>;
}

/// Reads page images through an OpenAI-compatible chat completions endpoint.
pub struct OpenAiVisionReader {
    client: Arc<dyn HttpClient>,
    config: VisionConfig,
    retry: RetryConfig,
}

impl OpenAiVisionReader {
    pub fn new(client: Arc<dyn HttpClient>, config: VisionConfig) -> Self {
        Self {
            client,
            config,
            retry: RetryConfig::exponential(2),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn request(&self, image: &[u8], mime_type: &str) -> Result<HttpRequest, IngestError> {
        let image_url = format!("data:{mime_type};base64,{}", STANDARD.encode(image));
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": INSTRUCTIONS },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": "Read this page." },
                        { "type": "image_url", "image_url": { "url": image_url, "detail": "high" } }
                    ]
                }
            ]
        });
        let body = serde_json::to_string(&body)
            .map_err(|e| IngestError::ExtractionFailed(format!("failed to encode vision request: {e}")))?;

        Ok(HttpRequest::post(&self.config.endpoint)
            .with_bearer(&self.config.api_key)
            .with_header("content-type", "application/json")
            .with_timeout_ms(self.config.timeout_ms)
            .with_body(body))
    }

    async fn read(&self, image: &[u8], mime_type: &str) -> Result<VisionRead, IngestError> {
        let request = self.request(image, mime_type)?;
        let response = execute_with_retry(self.client.as_ref(), &request, &self.retry)
            .await
            .map_err(|e| IngestError::ExtractionFailed(format!("vision request failed: {e}")))?;
        if !response.is_success() {
            warn!(status = response.status, "vision endpoint rejected request");
            return Err(IngestError::ExtractionFailed(format!(
                "vision endpoint returned HTTP {}",
                response.status
            )));
        }
        parse_completion(&response.body)
    }
}

impl VisionReader for OpenAiVisionReader {
    fn read_page<'a>(&'a self, image: &'a [u8], mime_type: &'a str) -> VisionFuture<'a> {
        Box::pin(self.read(image, mime_type))
    }
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Extracts the JSON answer from a chat completion body.
fn parse_completion(body: &[u8]) -> Result<VisionRead, IngestError> {
    let completion: Completion = serde_json::from_slice(body)
        .map_err(|e| IngestError::ExtractionFailed(format!("unexpected vision response: {e}")))?;
    let content = completion
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .ok_or_else(|| IngestError::ExtractionFailed(String::from("vision response has no content")))?;
    let answer = strip_code_fence(&content);
    serde_json::from_str(answer)
        .map_err(|e| IngestError::ExtractionFailed(format!("vision answer is not the expected JSON: {e}")))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|inner| inner.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::http_client::{HttpFuture, HttpResponse};

    struct Recording {
        reply: HttpResponse,
        seen: Mutex<Option<HttpRequest>>,
    }

    impl HttpClient for Recording {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            *self.seen.lock().expect("lock") = Some(request);
            let reply = self.reply.clone();
            Box::pin(async move { Ok(reply) })
        }
    }

    fn completion(answer: &str) -> HttpResponse {
        let body = json!({ "choices": [{ "message": { "content": answer } }] });
        HttpResponse::ok(serde_json::to_vec(&body).expect("encode"))
    }

    #[tokio::test]
    async fn posts_base64_png_and_parses_answer() {
        let client = Arc::new(Recording {
            reply: completion(
                r#"{"is_rate_table": true, "headers": ["TT BUY", "TT SELL"],
                    "date_text": "05-01-2024", "time_text": "10:30 AM",
                    "rows": [{"currency_code": "USD", "rates": [83.5, "84.40"]}]}"#,
            ),
            seen: Mutex::new(None),
        });
        let reader = OpenAiVisionReader::new(
            client.clone(),
            VisionConfig {
                api_key: String::from("sk-test"),
                ..VisionConfig::default()
            },
        );

        let read = reader.read_page(b"\x89PNG", "image/png").await.expect("read");
        assert!(read.is_rate_table);
        let table = read.table().expect("table");
        assert_eq!(
            table.rows[0].rates.iter().map(RateValue::as_str).collect::<Vec<_>>(),
            ["83.50", "84.40"]
        );

        let request = client.seen.lock().expect("lock").clone().expect("request");
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer sk-test")
        );
        let body = request.body.expect("body");
        assert!(body.contains("data:image/png;base64,iVBORw=="));
    }

    #[test]
    fn fenced_answers_are_accepted() {
        let body = serde_json::to_vec(&json!({
            "choices": [{ "message": { "content": "```json\n{\"is_rate_table\": false}\n```" } }]
        }))
        .expect("encode");
        let read = parse_completion(&body).expect("parse");
        assert!(!read.is_rate_table);
        assert!(read.rows.is_empty());
    }

    #[test]
    fn rows_must_fit_the_headers() {
        let read = VisionRead {
            is_rate_table: true,
            headers: vec![String::from("TT BUY"), String::from("TT SELL")],
            rows: vec![
                VisionRow {
                    currency_code: String::from("usd"),
                    rates: vec![VisionRate::Number(83.5)],
                },
                VisionRow {
                    currency_code: String::from("EUR"),
                    rates: vec![VisionRate::Number(89.1), VisionRate::Number(90.2)],
                },
            ],
            ..VisionRead::default()
        };

        let table = read.table().expect("one row fits");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].currency.as_str(), "EUR");
    }

    #[test]
    fn debug_output_hides_the_key() {
        let config = VisionConfig {
            api_key: String::from("sk-secret"),
            ..VisionConfig::default()
        };
        assert!(!format!("{config:?}").contains("sk-secret"));
    }
}
