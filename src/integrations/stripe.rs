use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{breaker_config, http_client, provider_error, transport_error};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::AppConfig;
use crate::errors::ServiceError;

const PROVIDER: &str = "Stripe";

/// Subset of the Stripe PaymentIntent object the storefront needs
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

/// Stripe REST client. Secret keys are per store and passed on each call.
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl StripeClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::with_settings(
            config.stripe_api_base_url.clone(),
            Duration::from_secs(config.integration_timeout_secs),
            breaker_config(config),
        )
    }

    pub fn with_settings(
        base_url: String,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            breaker: CircuitBreaker::new("stripe", breaker),
        })
    }

    /// Creates a PaymentIntent for `amount` in the currency's minor unit
    #[instrument(skip(self, secret_key, metadata))]
    pub async fn create_payment_intent(
        &self,
        secret_key: &str,
        amount: i64,
        currency: &str,
        metadata: &[(&str, String)],
    ) -> Result<PaymentIntent, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::ValidationError(
                "Payment amount must be greater than zero".into(),
            ));
        }

        let mut params: Vec<(String, String)> = vec![
            ("amount".into(), amount.to_string()),
            ("currency".into(), currency.to_ascii_lowercase()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
        ];
        for (key, value) in metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
        }

        let url = format!("{}/payment_intents", self.base_url);
        let intent = self
            .breaker
            .call(|| async {
                let response = self
                    .http
                    .post(&url)
                    .basic_auth(secret_key, Some(""))
                    .form(&params)
                    .send()
                    .await
                    .map_err(|e| transport_error(PROVIDER, e))?;

                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(provider_error(PROVIDER, status, &text));
                }
                response.json::<PaymentIntent>().await.map_err(|e| {
                    ServiceError::ExternalServiceError(format!("invalid Stripe response: {}", e))
                })
            })
            .await?;

        info!(payment_intent = %intent.id, amount, "payment intent created");
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StripeClient {
        StripeClient::with_settings(
            server.uri(),
            Duration::from_secs(5),
            CircuitBreakerConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn creates_form_encoded_payment_intent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .and(header_exists("authorization"))
            .and(body_string_contains("amount=2599"))
            .and(body_string_contains("currency=usd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_123",
                "client_secret": "pi_123_secret",
                "amount": 2599,
                "currency": "usd",
                "status": "requires_payment_method"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let intent = client(&server)
            .create_payment_intent("sk_test", 2599, "USD", &[("order_id", "o-1".into())])
            .await
            .unwrap();
        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.client_secret.as_deref(), Some("pi_123_secret"));
    }

    #[tokio::test]
    async fn provider_errors_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert_matches!(
            client(&server)
                .create_payment_intent("sk_bad", 100, "usd", &[])
                .await,
            Err(ServiceError::Unauthorized(_))
        );
    }

    #[tokio::test]
    async fn zero_amount_is_rejected_locally() {
        let server = MockServer::start().await;
        assert_matches!(
            client(&server).create_payment_intent("sk", 0, "usd", &[]).await,
            Err(ServiceError::ValidationError(_))
        );
    }
}
