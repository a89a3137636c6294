use super::{
    venue_errors, Balance, CancelAck, MarketDataSource, StatusReport, SubmitAck, VenueError,
    VenueGateway,
};
use crate::error::TradingError;
use crate::models::{OrderBook, OrderRequest};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const USER_AGENT: &str = "momtrader DMA client";
const REQUEST_TIMEOUT_SECS: u64 = 20;

/// Endpoints and credentials for the DMA REST API
#[derive(Debug, Clone)]
pub struct DmaSettings {
    /// Base URL for order and market data endpoints
    pub api_url: String,
    /// Base URL for the login endpoint
    pub auth_url: String,
    pub user_id: String,
    pub password: String,
}

/// Client for the direct-market-access REST API
///
/// Cheap to clone; clones share the HTTP connection pool and the bearer token.
#[derive(Clone)]
pub struct DmaClient {
    client: Client,
    settings: Arc<DmaSettings>,
    token: Arc<RwLock<Option<String>>>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    uid: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Serialize)]
struct PlaceOrderRequest<'a> {
    user_id: &'a str,
    venue: &'a str,
    side: &'a str,
    traded_asset: &'a str,
    base_asset: &'a str,
    quantity: String,
    price: String,
    order_params: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct OrderRefRequest<'a> {
    user_id: &'a str,
    venue: &'a str,
    venue_order_id: &'a str,
}

#[derive(Debug, Serialize)]
struct BalanceRequest<'a> {
    user_id: &'a str,
    venue: &'a str,
    asset: &'a str,
}

#[derive(Debug, Serialize)]
struct OrderBookRequest<'a> {
    user_id: &'a str,
    asset: &'a str,
    base_asset: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderBookResponse {
    #[serde(default)]
    data: OrderBook,
    #[serde(default)]
    errors: Option<Vec<VenueError>>,
}

impl DmaClient {
    pub fn new(settings: DmaSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            settings: Arc::new(settings),
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Build a client and log in once
    pub async fn connect(settings: DmaSettings) -> Result<Self> {
        let client = Self::new(settings)?;
        client.authenticate().await?;
        Ok(client)
    }

    pub fn user_id(&self) -> &str {
        &self.settings.user_id
    }

    /// Exchange credentials for a fresh bearer token
    pub async fn authenticate(&self) -> Result<()> {
        let url = format!("{}/authenticate", self.settings.auth_url);
        let body = LoginRequest {
            uid: &self.settings.user_id,
            password: &self.settings.password,
        };

        let response: LoginResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.token.is_empty() {
            return Err(TradingError::Gateway(
                "login returned an empty token".to_string(),
            ));
        }

        *self.token.write().await = Some(response.token);
        tracing::debug!(user = %self.settings.user_id, "Refreshed DMA token");
        Ok(())
    }

    /// Balance of `asset` held at `venue`; venue errors are left in the response
    pub async fn balance(&self, venue: &str, asset: &str) -> Result<Balance> {
        let body = BalanceRequest {
            user_id: &self.settings.user_id,
            venue,
            asset,
        };

        self.post("data/balance", &body).await
    }

    async fn bearer(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }

        self.authenticate().await?;
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| TradingError::Gateway("no token after login".to_string()))
    }

    async fn post<B, R>(&self, command: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.settings.api_url, command);
        let token = self.bearer().await?;
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response)
    }
}

#[async_trait]
impl VenueGateway for DmaClient {
    async fn submit_order(&self, request: &OrderRequest) -> Result<SubmitAck> {
        let body = PlaceOrderRequest {
            user_id: &self.settings.user_id,
            venue: &request.venue,
            side: request.side.as_str(),
            traded_asset: &request.asset,
            base_asset: &request.base_asset,
            quantity: request.size.to_string(),
            price: request.price.to_string(),
            order_params: HashMap::new(),
        };

        self.post("orders/new", &body).await
    }

    async fn order_status(&self, venue: &str, venue_order_id: &str) -> Result<StatusReport> {
        let body = OrderRefRequest {
            user_id: &self.settings.user_id,
            venue,
            venue_order_id,
        };

        self.post("orders/status", &body).await
    }

    async fn cancel_order(&self, venue: &str, venue_order_id: &str) -> Result<CancelAck> {
        let body = OrderRefRequest {
            user_id: &self.settings.user_id,
            venue,
            venue_order_id,
        };

        self.post("orders/cancel", &body).await
    }
}

#[async_trait]
impl MarketDataSource for DmaClient {
    async fn order_book(&self, asset: &str, base_asset: &str) -> Result<OrderBook> {
        let body = OrderBookRequest {
            user_id: &self.settings.user_id,
            asset,
            base_asset,
        };

        let response: OrderBookResponse = self.post("data/real-time/order-book", &body).await?;

        if let Some(reason) = venue_errors(&response.errors.unwrap_or_default()) {
            return Err(TradingError::MarketData {
                asset: asset.to_string(),
                reason,
            });
        }

        Ok(response.data)
    }
}
