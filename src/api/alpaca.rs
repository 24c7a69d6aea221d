use super::Broker;
use crate::config::Credentials;
use crate::error::TraderError;
use crate::models::{BrokerPosition, OrderAck, OrderSide, PositionSide};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Alpaca Trading API v2
// Docs: https://docs.alpaca.markets/reference
const KEY_ID_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_KEY_HEADER: &str = "APCA-API-SECRET-KEY";

/// Client for the Alpaca brokerage account (paper or live)
///
/// Order endpoints are never retried: a timed-out submission may still have
/// reached the exchange.
#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct PositionRaw {
    symbol: String,
    qty: String,
    side: String,
}

#[derive(Debug, Deserialize)]
struct OrderRaw {
    id: String,
    #[serde(default)]
    client_order_id: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    symbol: &'a str,
    qty: String,
    side: &'a str,
    #[serde(rename = "type")]
    order_type: &'a str,
    time_in_force: &'a str,
    client_order_id: String,
}

impl TryFrom<PositionRaw> for BrokerPosition {
    type Error = TraderError;

    fn try_from(raw: PositionRaw) -> Result<Self> {
        let qty: f64 = raw.qty.parse().map_err(|_| TraderError::Broker {
            status: 200,
            message: format!("unparseable quantity '{}' for {}", raw.qty, raw.symbol),
        })?;
        let side = match raw.side.as_str() {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            other => {
                return Err(TraderError::Broker {
                    status: 200,
                    message: format!("unknown position side '{}' for {}", other, raw.symbol),
                })
            }
        };

        Ok(BrokerPosition {
            symbol: raw.symbol,
            qty: qty.abs(),
            side,
        })
    }
}

impl From<OrderRaw> for OrderAck {
    fn from(raw: OrderRaw) -> Self {
        OrderAck {
            id: raw.id,
            client_order_id: raw.client_order_id,
            status: raw.status,
        }
    }
}

// ============== Implementation ==============

impl AlpacaClient {
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(KEY_ID_HEADER, &self.credentials.key_id)
            .header(SECRET_KEY_HEADER, &self.credentials.secret_key)
    }

    /// Turn non-2xx responses into broker errors carrying Alpaca's message
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);

        Err(TraderError::Broker {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Broker for AlpacaClient {
    /// Endpoint: GET /v2/positions
    async fn list_positions(&self) -> Result<Vec<BrokerPosition>> {
        let url = format!("{}/v2/positions", self.base_url);

        let response = self.authorized(self.client.get(&url)).send().await?;
        let positions: Vec<PositionRaw> = Self::check(response).await?.json().await?;

        tracing::debug!("Broker reports {} open positions", positions.len());

        positions.into_iter().map(BrokerPosition::try_from).collect()
    }

    /// Endpoint: POST /v2/orders (market, day)
    async fn open_position(&self, symbol: &str, qty: u32, side: OrderSide) -> Result<OrderAck> {
        let url = format!("{}/v2/orders", self.base_url);
        let body = OrderRequest {
            symbol,
            qty: qty.to_string(),
            side: side.as_str(),
            order_type: "market",
            time_in_force: "day",
            client_order_id: uuid::Uuid::new_v4().to_string(),
        };

        tracing::debug!(
            symbol = %symbol,
            qty = qty,
            side = side.as_str(),
            client_order_id = %body.client_order_id,
            "Submitting market order"
        );

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        let order: OrderRaw = Self::check(response).await?.json().await?;

        Ok(order.into())
    }

    /// Endpoint: DELETE /v2/positions/{symbol}
    async fn close_position(&self, symbol: &str) -> Result<OrderAck> {
        let url = format!("{}/v2/positions/{}", self.base_url, urlencoding::encode(symbol));

        tracing::debug!(symbol = %symbol, "Closing position");

        let response = self.authorized(self.client.delete(&url)).send().await?;
        let order: OrderRaw = Self::check(response).await?.json().await?;

        Ok(order.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn test_client(server: &mockito::Server) -> AlpacaClient {
        let credentials = Credentials {
            key_id: "PKTEST".to_string(),
            secret_key: "secret".to_string(),
        };
        AlpacaClient::new(&server.url(), credentials, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_positions() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/positions")
            .match_header(KEY_ID_HEADER, "PKTEST")
            .match_header(SECRET_KEY_HEADER, "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"symbol": "AAPL", "qty": "5", "side": "long", "avg_entry_price": "100.0"},
                    {"symbol": "TSLA", "qty": "-3", "side": "short", "avg_entry_price": "250.0"}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = test_client(&server);
        let positions = client.list_positions().await.unwrap();

        mock.assert_async().await;
        assert_eq!(positions.len(), 2);
        assert_eq!(
            positions[0],
            BrokerPosition {
                symbol: "AAPL".to_string(),
                qty: 5.0,
                side: PositionSide::Long,
            }
        );
        assert_eq!(positions[1].side, PositionSide::Short);
        assert_eq!(positions[1].qty, 3.0);
    }

    #[tokio::test]
    async fn test_open_position_submits_market_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/orders")
            .match_header(KEY_ID_HEADER, "PKTEST")
            .match_body(Matcher::PartialJson(json!({
                "symbol": "AAPL",
                "qty": "5",
                "side": "buy",
                "type": "market",
                "time_in_force": "day"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"id": "order-1", "client_order_id": "abc", "status": "accepted"})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = test_client(&server);
        let ack = client
            .open_position("AAPL", 5, OrderSide::Buy)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(ack.id, "order-1");
        assert_eq!(ack.status, "accepted");
    }

    #[tokio::test]
    async fn test_close_position() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/v2/positions/AAPL")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "order-2", "status": "pending_new"}).to_string())
            .create_async()
            .await;

        let client = test_client(&server);
        let ack = client.close_position("AAPL").await.unwrap();

        mock.assert_async().await;
        assert_eq!(ack.id, "order-2");
        assert_eq!(ack.client_order_id, None);
    }

    #[tokio::test]
    async fn test_close_position_escapes_symbol() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/v2/positions/BTC%2FUSD")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "order-3", "status": "accepted"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server);
        let ack = client.close_position("BTC/USD").await.unwrap();

        mock.assert_async().await;
        assert_eq!(ack.id, "order-3");
    }

    #[tokio::test]
    async fn test_rejected_order_surfaces_broker_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/orders")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(json!({"code": 40310000, "message": "insufficient buying power"}).to_string())
            .create_async()
            .await;

        let client = test_client(&server);
        let result = client.open_position("AAPL", 5, OrderSide::Sell).await;

        match result {
            Err(TraderError::Broker { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "insufficient buying power");
            }
            other => panic!("expected broker error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_with_plain_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/positions")
            .with_status(401)
            .with_body("unauthorized.")
            .create_async()
            .await;

        let client = test_client(&server);
        let err = client.list_positions().await.unwrap_err();

        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("unauthorized."));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let credentials = Credentials {
            key_id: "k".to_string(),
            secret_key: "s".to_string(),
        };
        let client = AlpacaClient::new(
            "https://paper-api.alpaca.markets/",
            credentials,
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(client.base_url(), "https://paper-api.alpaca.markets");
    }
}
