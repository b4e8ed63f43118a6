//! KIS Volume-Ranking Client
//!
//! `GET /uapi/domestic-stock/v1/quotations/volume-rank` returns the
//! top instruments of the KRX market by traded volume.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::messages::{CUSTOMER_TYPE_PERSONAL, RT_CD_SUCCESS, RankingResponse, TR_ID_VOLUME_RANK};
use crate::application::ports::{RankingError, RankingSource};
use crate::domain::market_data::{AccessToken, RankingEntry};
use crate::infrastructure::config::Credentials;

/// Volume-ranking endpoint path.
pub const VOLUME_RANK_PATH: &str = "/uapi/domestic-stock/v1/quotations/volume-rank";

/// Fixed query of the volume-ranking request: all KRX stocks, every price
/// band, every volume.
pub const VOLUME_RANK_QUERY: [(&str, &str); 11] = [
    ("FID_COND_MRKT_DIV_CODE", "J"),
    ("FID_COND_SCR_DIV_CODE", "20171"),
    ("FID_INPUT_ISCD", "0002"),
    ("FID_DIV_CLS_CODE", "0"),
    ("FID_BLNG_CLS_CODE", "0"),
    ("FID_TRGT_CLS_CODE", "111111111"),
    ("FID_TRGT_EXLS_CLS_CODE", "000000"),
    ("FID_INPUT_PRICE_1", "0"),
    ("FID_INPUT_PRICE_2", "0"),
    ("FID_VOL_CNT", "0"),
    ("FID_INPUT_DATE_1", "0"),
];

/// HTTP client for the volume-ranking quotation.
#[derive(Debug, Clone)]
pub struct KisRankingClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl KisRankingClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `RankingError::Transport` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, RankingError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RankingError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }
}

#[async_trait]
impl RankingSource for KisRankingClient {
    async fn fetch_ranking(&self, token: &AccessToken) -> Result<Vec<RankingEntry>, RankingError> {
        let url = format!("{}{VOLUME_RANK_PATH}", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&VOLUME_RANK_QUERY)
            .header("authorization", format!("Bearer {}", token.value()))
            .header("appkey", self.credentials.app_key())
            .header("appsecret", self.credentials.app_secret())
            .header("tr_id", TR_ID_VOLUME_RANK)
            .header("custtype", CUSTOMER_TYPE_PERSONAL)
            .send()
            .await
            .map_err(|e| RankingError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(RankingError::Unauthorized);
        }

        let text = response.text().await.map_err(|e| RankingError::Transport {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(RankingError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: RankingResponse =
            serde_json::from_str(&text).map_err(|e| RankingError::InvalidResponse {
                message: e.to_string(),
            })?;

        if envelope
            .rt_cd
            .as_deref()
            .is_some_and(|code| code != RT_CD_SUCCESS)
        {
            return Err(RankingError::Provider {
                code: envelope.msg_cd,
                message: envelope.msg1,
            });
        }

        let entries = envelope.output.unwrap_or_default();
        tracing::debug!(entries = entries.len(), "Volume ranking fetched");
        Ok(entries)
    }
}
