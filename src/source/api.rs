//! Backend indexer client

use crate::config::BackendConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::orders::ChainOrderBook;

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Order-book-by-committee endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderBookApi: Send + Sync {
    async fn fetch_order_books(&self, committee: u64) -> CoordinatorResult<Vec<ChainOrderBook>>;
}

/// REST client for the indexer
pub struct HttpOrderBookApi {
    base_url: String,
    orders_path: String,
    client: reqwest::Client,
}

impl HttpOrderBookApi {
    pub fn new(config: &BackendConfig) -> CoordinatorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoordinatorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            orders_path: config.orders_path.clone(),
            client,
        })
    }

    fn orders_url(&self) -> String {
        format!("{}/{}", self.base_url, self.orders_path.trim_start_matches('/'))
    }
}

#[async_trait]
impl OrderBookApi for HttpOrderBookApi {
    async fn fetch_order_books(&self, committee: u64) -> CoordinatorResult<Vec<ChainOrderBook>> {
        let url = self.orders_url();
        debug!("Fetching order book for committee {} from {}", committee, url);

        let response = self
            .client
            .get(&url)
            .query(&[("committee", committee)])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoordinatorError::RateLimited {
                service: "order book indexer".to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(CoordinatorError::Transport(format!(
                "order book request failed with status {}",
                response.status()
            )));
        }

        let books = response.json::<Vec<ChainOrderBook>>().await?;
        Ok(books)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_url_joins_without_double_slash() {
        let api = HttpOrderBookApi::new(&BackendConfig {
            base_url: "http://indexer:50002/".to_string(),
            orders_path: "/v1/query/orders".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(api.orders_url(), "http://indexer:50002/v1/query/orders");
    }
}
