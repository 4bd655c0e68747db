//! Receipt OCR over HTTP.
//!
//! The OCR service takes a multipart upload (`image` field) on
//! `/api/ocr/receipt` and answers `{"items": [{"name": .., "price": ..}]}`
//! with prices in major units, either as numbers or strings.

use std::time::Duration;

use async_trait::async_trait;
use engine::{
    Money,
    gateways::{GatewayError, ReceiptScanner, ScannedItem},
};
use reqwest::multipart;
use serde::Deserialize;

const RECEIPT_PATH: &str = "/api/ocr/receipt";
const TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    items: Vec<OcrItem>,
}

#[derive(Debug, Deserialize)]
struct OcrItem {
    name: String,
    price: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct HttpReceiptScanner {
    client: reqwest::Client,
    url: String,
}

impl HttpReceiptScanner {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .build()
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}{RECEIPT_PATH}", base_url.trim_end_matches('/')),
        })
    }
}

/// Converts a major-unit price to minor units. Unparseable prices, or prices
/// with more than two decimals, yield `None`.
fn price_minor(price: &serde_json::Value) -> Option<i64> {
    let text = match price {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().trim_start_matches('$').to_string(),
        _ => return None,
    };
    text.parse::<Money>().ok().map(Money::cents)
}

#[async_trait]
impl ReceiptScanner for HttpReceiptScanner {
    async fn extract_items(&self, image: &[u8]) -> Result<Vec<ScannedItem>, GatewayError> {
        let part = multipart::Part::bytes(image.to_vec()).file_name("receipt.jpg");
        let form = multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?
            .error_for_status()
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        let body: OcrResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;

        let items = body
            .items
            .into_iter()
            .filter_map(|item| {
                let price_minor = price_minor(&item.price)?;
                Some(ScannedItem {
                    name: item.name,
                    price_minor,
                })
            })
            .collect::<Vec<_>>();
        tracing::debug!(items = items.len(), "receipt scanned");
        Ok(items)
    }
}
