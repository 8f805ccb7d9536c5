//! Stripe-compatible checkout client.

use super::{
    CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, RawSession, SessionDetails,
    CURRENCY,
};
use crate::domain::SessionId;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, Method};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Payment gateway backed by the Checkout Sessions REST API.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct CreatedSession {
    id: String,
    url: Option<String>,
}

impl StripeGateway {
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<serde_json::Value, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.secret_key);
            if let Some(form) = form {
                request = request.form(form);
            }
            let response = request.send().await.map_err(|e| {
                backoff::Error::transient(GatewayError::NetworkError(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(GatewayError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(GatewayError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if status == 404 {
                return Err(backoff::Error::permanent(GatewayError::NotFound(
                    path.to_string(),
                )));
            }
            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Client error".to_string());
                return Err(backoff::Error::permanent(GatewayError::HttpError {
                    status: status.as_u16(),
                    message,
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(GatewayError::ParseError(e.to_string())))
        })
        .await
    }
}

/// Flatten a checkout request into the gateway's bracketed form encoding.
pub(crate) fn checkout_form(request: &CheckoutRequest) -> Result<Vec<(String, String)>, GatewayError> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        let unit_amount = item.unit_amount.to_minor_units().ok_or_else(|| {
            GatewayError::InvalidRequest(format!("amount out of range: {}", item.unit_amount))
        })?;
        let prefix = format!("line_items[{}]", i);
        form.push((
            format!("{}[price_data][currency]", prefix),
            CURRENCY.to_string(),
        ));
        form.push((
            format!("{}[price_data][product_data][name]", prefix),
            item.name.clone(),
        ));
        if !item.description.is_empty() {
            form.push((
                format!("{}[price_data][product_data][description]", prefix),
                item.description.clone(),
            ));
        }
        form.push((
            format!("{}[price_data][unit_amount]", prefix),
            unit_amount.to_string(),
        ));
        form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
    }

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
    }

    Ok(form)
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn open_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let total = request
            .total()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        debug!(
            "Opening checkout: items={}, total={}",
            request.line_items.len(),
            total
        );
        let form = checkout_form(&request)?;
        let response = self
            .send(Method::POST, "/v1/checkout/sessions", Some(&form))
            .await?;

        let created: CreatedSession = serde_json::from_value(response)
            .map_err(|e| GatewayError::ParseError(e.to_string()))?;
        let url = created
            .url
            .ok_or_else(|| GatewayError::ParseError("Missing session url".to_string()))?;

        Ok(CheckoutSession {
            session_id: SessionId::new(created.id),
            url,
        })
    }

    async fn retrieve_session(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionDetails, GatewayError> {
        debug!("Retrieving checkout session {}", session_id);
        let path = format!("/v1/checkout/sessions/{}", session_id);
        let response = self.send(Method::GET, &path, None).await?;

        let raw: RawSession = serde_json::from_value(response)
            .map_err(|e| GatewayError::ParseError(e.to_string()))?;
        Ok(raw.into())
    }
}
