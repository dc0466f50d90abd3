//! OpenAI client: chat completions, vision extraction and image generation.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use validator::Validate;

use super::{breaker_config, http_client, provider_error, transport_error};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::AppConfig;
use crate::errors::ServiceError;

const PROVIDER: &str = "OpenAI";
const IMAGE_MODEL: &str = "dall-e-3";
const ALLOWED_MIME_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/gif",
    "application/pdf",
];

const INVOICE_PROMPT: &str = r#"You extract data from supplier invoices.
Return STRICT JSON with this shape:
{
  "supplier_name": "string",
  "invoice_number": "string",
  "invoice_date": "YYYY-MM-DD or null",
  "total_amount": number,
  "total_tax": number,
  "total_transport": number,
  "vendor": {"name": "string", "ein": "string|null", "address": "string|null",
             "website": "string|null", "email": "string|null", "phone": "string|null",
             "fax": "string|null", "poc_name": "string|null"},
  "items": [{"product_name": "string", "vendor_code": "string|null", "upc": "string|null",
             "quantity": number, "unit_cost": number, "line_total": number,
             "expiry_date": "YYYY-MM-DD or null"}]
}"#;

const Z_REPORT_PROMPT: &str = r#"You parse point-of-sale Z-reports (end of day summaries).
Return STRICT JSON: {"items": [{"code": "string|null", "name": "string", "quantity": number, "price": number}]}
where price is the unit price. Include every sold line item."#;

/// Base64 document sent to the vision endpoints
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ImageUpload {
    #[validate(length(min = 1, message = "image_base64 is required"))]
    pub image_base64: String,
    #[validate(length(min = 1, message = "mime_type is required"))]
    pub mime_type: String,
}

impl ImageUpload {
    /// Checks the payload and returns it as a `data:` URL
    pub fn to_data_url(&self) -> Result<String, ServiceError> {
        let mime = self.mime_type.trim().to_ascii_lowercase();
        if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(ServiceError::ValidationError(format!(
                "Unsupported file type '{}'",
                self.mime_type
            )));
        }

        // Accept payloads that already carry a data URL prefix
        let payload = match self.image_base64.split_once(";base64,") {
            Some((_, rest)) => rest,
            None => self.image_base64.as_str(),
        }
        .trim();

        STANDARD
            .decode(payload)
            .map_err(|_| ServiceError::ValidationError("image_base64 is not valid base64".into()))?;

        Ok(format!("data:{};base64,{}", mime, payload))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct ParsedVendor {
    pub name: Option<String>,
    pub ein: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub poc_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct ParsedInvoiceItem {
    pub product_name: String,
    pub vendor_code: Option<String>,
    pub upc: Option<String>,
    #[serde(deserialize_with = "lenient_i32")]
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub line_total: Decimal,
    pub expiry_date: Option<String>,
    /// Store product this line most likely refers to
    pub matched_product_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct ParsedInvoice {
    pub supplier_name: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub total_amount: Decimal,
    pub total_tax: Decimal,
    pub total_transport: Decimal,
    pub vendor: ParsedVendor,
    pub items: Vec<ParsedInvoiceItem>,
}

/// One sold line read off a Z-report
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(default)]
pub struct ZReportItem {
    pub code: Option<String>,
    pub name: String,
    #[serde(deserialize_with = "lenient_i32")]
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ZReportEnvelope {
    items: Vec<ZReportItem>,
}

/// Model output sometimes carries counts as `2.0` or `"2"`
fn lenient_i32<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        Value::Null => Some(0),
        _ => None,
    };
    parsed
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| serde::de::Error::custom(format!("expected a quantity, got {}", value)))
}

/// Reads structured data out of scanned documents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn read_invoice(&self, upload: &ImageUpload) -> Result<ParsedInvoice, ServiceError>;
    async fn read_z_report(&self, upload: &ImageUpload) -> Result<Vec<ZReportItem>, ServiceError>;
}

pub struct AiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    breaker: CircuitBreaker,
}

impl AiClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::with_settings(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.openai_model.clone(),
            Duration::from_secs(config.integration_timeout_secs),
            breaker_config(config),
        )
    }

    pub fn with_settings(
        base_url: String,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            breaker: CircuitBreaker::new("openai", breaker),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, ServiceError> {
        self.api_key.as_deref().ok_or_else(|| {
            ServiceError::BadRequest(
                "AI features are not configured. Set openai_api_key to enable them".into(),
            )
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ServiceError> {
        let key = self.api_key()?.to_string();
        let url = format!("{}{}", self.base_url, path);

        self.breaker
            .call(|| async move {
                let response = self
                    .http
                    .post(&url)
                    .bearer_auth(&key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| transport_error(PROVIDER, e))?;

                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(provider_error(PROVIDER, status, &text));
                }
                response.json::<Value>().await.map_err(|e| {
                    ServiceError::ExternalServiceError(format!("invalid OpenAI response: {}", e))
                })
            })
            .await
    }

    /// Runs a chat completion and returns the first message's text
    async fn chat(&self, messages: Value, json_mode: bool) -> Result<String, ServiceError> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.2,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self.post("/chat/completions", body).await?;
        response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::ExternalServiceError("OpenAI returned no content".into()))
    }

    async fn vision_json<T>(&self, prompt: &str, upload: &ImageUpload) -> Result<T, ServiceError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let data_url = upload.to_data_url()?;
        let messages = json!([
            {"role": "system", "content": prompt},
            {"role": "user", "content": [
                {"type": "text", "text": "Extract the data from this document."},
                {"type": "image_url", "image_url": {"url": data_url}}
            ]}
        ]);
        let content = self.chat(messages, true).await?;
        debug!(bytes = content.len(), "vision response received");
        serde_json::from_str(strip_code_fence(&content)).map_err(|e| {
            ServiceError::ExternalServiceError(format!("could not read model output: {}", e))
        })
    }

    #[instrument(skip(self))]
    pub async fn generate_product_description(
        &self,
        name: &str,
        category: Option<&str>,
    ) -> Result<String, ServiceError> {
        let category = category.unwrap_or("general merchandise");
        let messages = json!([
            {"role": "system", "content": "You are a helpful assistant for a retail store."},
            {"role": "user", "content": format!(
                "Write a compelling and SEO-friendly product description for \"{}\" in the \"{}\" category. Keep it under 100 words.",
                name, category
            )}
        ]);
        let text = self.chat(messages, false).await?;
        Ok(text.trim().to_string())
    }

    #[instrument(skip(self))]
    pub async fn generate_product_image(&self, prompt: &str) -> Result<String, ServiceError> {
        let body = json!({
            "model": IMAGE_MODEL,
            "prompt": format!(
                "Professional product photography of {}. Clean white background, high resolution, marketing quality.",
                prompt
            ),
            "n": 1,
            "size": "1024x1024",
        });
        let response = self.post("/images/generations", body).await?;
        response["data"][0]["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::ExternalServiceError("OpenAI returned no image".into()))
    }
}

#[async_trait]
impl DocumentReader for AiClient {
    #[instrument(skip(self, upload), fields(mime = %upload.mime_type))]
    async fn read_invoice(&self, upload: &ImageUpload) -> Result<ParsedInvoice, ServiceError> {
        self.vision_json(INVOICE_PROMPT, upload).await
    }

    #[instrument(skip(self, upload), fields(mime = %upload.mime_type))]
    async fn read_z_report(&self, upload: &ImageUpload) -> Result<Vec<ZReportItem>, ServiceError> {
        let envelope: ZReportEnvelope = self.vision_json(Z_REPORT_PROMPT, upload).await?;
        Ok(envelope.items)
    }
}

/// Models occasionally wrap JSON in a markdown fence despite json mode
static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());

fn strip_code_fence(content: &str) -> &str {
    CODE_FENCE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| content.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, key: Option<&str>) -> AiClient {
        AiClient::with_settings(
            server.uri(),
            key.map(str::to_string),
            "gpt-4o-mini".into(),
            Duration::from_secs(5),
            CircuitBreakerConfig::default(),
        )
        .unwrap()
    }

    fn upload() -> ImageUpload {
        ImageUpload {
            image_base64: STANDARD.encode(b"fake-png-bytes"),
            mime_type: "image/png".into(),
        }
    }

    fn chat_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[test]
    fn uploads_are_checked_before_sending() {
        let bad_type = ImageUpload {
            image_base64: STANDARD.encode(b"x"),
            mime_type: "text/html".into(),
        };
        assert_matches!(bad_type.to_data_url(), Err(ServiceError::ValidationError(_)));

        let bad_payload = ImageUpload {
            image_base64: "!!not base64!!".into(),
            mime_type: "image/png".into(),
        };
        assert_matches!(bad_payload.to_data_url(), Err(ServiceError::ValidationError(_)));

        let prefixed = ImageUpload {
            image_base64: format!("data:image/png;base64,{}", STANDARD.encode(b"x")),
            mime_type: "image/png".into(),
        };
        assert!(prefixed.to_data_url().unwrap().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn quantities_accept_floats_and_strings() {
        let item: ZReportItem =
            serde_json::from_str(r#"{"name":"Milk","quantity":"3","price":1.5}"#).unwrap();
        assert_eq!(item.quantity, 3);
        let item: ZReportItem =
            serde_json::from_str(r#"{"name":"Milk","quantity":2.0,"price":"1.50"}"#).unwrap();
        assert_eq!(item.quantity, 2);
        assert_eq!(item.price, dec!(1.50));
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(
            strip_code_fence("Here you go:\n```\n{\"a\":1}\n```\nAnything else?"),
            "{\"a\":1}"
        );
    }

    #[tokio::test]
    async fn missing_key_is_a_bad_request() {
        let server = MockServer::start().await;
        let ai = client(&server, None);
        assert!(!ai.is_enabled());
        assert_matches!(
            ai.generate_product_description("Tea", None).await,
            Err(ServiceError::BadRequest(_))
        );
        assert_matches!(ai.read_invoice(&upload()).await, Err(ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn provider_rate_limit_and_auth_errors_pass_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let ai = client(&server, Some("sk-test"));
        assert_matches!(
            ai.read_z_report(&upload()).await,
            Err(ServiceError::RateLimitExceeded)
        );
        assert_matches!(
            ai.read_z_report(&upload()).await,
            Err(ServiceError::Unauthorized(_))
        );
    }

    #[tokio::test]
    async fn invoice_json_is_parsed() {
        let server = MockServer::start().await;
        let content = json!({
            "supplier_name": "Acme Foods",
            "invoice_number": "INV-42",
            "invoice_date": "2024-05-01",
            "total_amount": 120.5,
            "vendor": {"name": "Acme Foods", "email": "sales@acme.test"},
            "items": [{"product_name": "Rice 5kg", "quantity": 10, "unit_cost": 0, "line_total": 100}]
        })
        .to_string();
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(chat_reply(&content))
            .expect(1)
            .mount(&server)
            .await;

        let parsed = client(&server, Some("sk-test"))
            .read_invoice(&upload())
            .await
            .unwrap();
        assert_eq!(parsed.invoice_number.as_deref(), Some("INV-42"));
        assert_eq!(parsed.vendor.email.as_deref(), Some("sales@acme.test"));
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].line_total, dec!(100));
        assert_eq!(parsed.total_tax, Decimal::ZERO);
    }

    #[tokio::test]
    async fn image_generation_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"url": "https://img.test/1.png"}]})),
            )
            .mount(&server)
            .await;

        let url = client(&server, Some("sk-test"))
            .generate_product_image("green tea")
            .await
            .unwrap();
        assert_eq!(url, "https://img.test/1.png");
    }
}
