//! KIS Wire Message Types
//!
//! Serde types for the provider's JSON messages. Data frames on the
//! streaming socket are not JSON; see [`super::codec`] for those.
//!
//! # Message Types
//!
//! ## Streaming socket (JSON control frames)
//! - `SubscriptionRequest`: register one instrument for real-time prices
//! - `ControlFrame`: heartbeats (`PINGPONG`) and subscription acknowledgements
//!
//! ## OAuth endpoints
//! - `TokenRequest` / `TokenResponse`: REST access token
//! - `ApprovalRequest` / `ApprovalResponse`: streaming approval key
//!
//! ## Quotations endpoint
//! - `RankingResponse`: volume-ranking envelope

use serde::{Deserialize, Serialize};

use crate::domain::market_data::RankingEntry;

/// Transaction id of the real-time execution price feed.
pub const TR_ID_REALTIME_PRICE: &str = "H0STCNT0";

/// Transaction id of heartbeat control frames.
pub const TR_ID_PINGPONG: &str = "PINGPONG";

/// Transaction id of the volume-ranking query.
pub const TR_ID_VOLUME_RANK: &str = "FHPST01710000";

/// Customer type for individual accounts.
pub const CUSTOMER_TYPE_PERSONAL: &str = "P";

/// `tr_type` value that registers a subscription.
pub const TR_TYPE_REGISTER: &str = "1";

/// Provider return code meaning success.
pub const RT_CD_SUCCESS: &str = "0";

const GRANT_TYPE: &str = "client_credentials";

// =============================================================================
// Subscription Request
// =============================================================================

/// Subscription request sent on the streaming socket.
///
/// # Wire Format (JSON)
/// ```json
/// {"header":{"approval_key":"…","custtype":"P","tr_type":"1","content-type":"utf-8"},
///  "body":{"input":{"tr_id":"H0STCNT0","tr_key":"005930"}}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Session header.
    pub header: SubscriptionHeader,
    /// Request body.
    pub body: SubscriptionBody,
}

/// Header of a [`SubscriptionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionHeader {
    /// Approval key of the current connection.
    pub approval_key: String,
    /// Customer type.
    pub custtype: String,
    /// `1` registers, `2` releases.
    pub tr_type: String,
    /// Payload charset.
    #[serde(rename = "content-type")]
    pub content_type: String,
}

/// Body of a [`SubscriptionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionBody {
    /// Feed and instrument.
    pub input: SubscriptionInput,
}

/// Feed and instrument of a [`SubscriptionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInput {
    /// Feed transaction id.
    pub tr_id: String,
    /// Instrument code.
    pub tr_key: String,
}

impl SubscriptionRequest {
    /// Register `code` on the real-time price feed.
    #[must_use]
    pub fn register(approval_key: &str, code: &str) -> Self {
        Self {
            header: SubscriptionHeader {
                approval_key: approval_key.to_string(),
                custtype: CUSTOMER_TYPE_PERSONAL.to_string(),
                tr_type: TR_TYPE_REGISTER.to_string(),
                content_type: "utf-8".to_string(),
            },
            body: SubscriptionBody {
                input: SubscriptionInput {
                    tr_id: TR_ID_REALTIME_PRICE.to_string(),
                    tr_key: code.to_string(),
                },
            },
        }
    }
}

// =============================================================================
// Control Frames
// =============================================================================

/// JSON control frame received on the streaming socket.
///
/// # Wire Format (JSON)
/// ```json
/// {"header":{"tr_id":"PINGPONG","datetime":"20240612093354"}}
/// {"header":{"tr_id":"H0STCNT0","tr_key":"005930","encrypt":"N"},
///  "body":{"rt_cd":"0","msg_cd":"OPSP0000","msg1":"SUBSCRIBE SUCCESS"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    /// Frame header.
    pub header: ControlHeader,
    /// Result body, absent on heartbeats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ControlBody>,
}

/// Header of a [`ControlFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlHeader {
    /// Transaction id; `PINGPONG` for heartbeats.
    pub tr_id: String,
    /// Instrument code the frame refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tr_key: Option<String>,
    /// `Y` when subsequent data frames are encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<String>,
    /// Server timestamp, `YYYYMMDDHHMMSS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
}

/// Result body of a [`ControlFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlBody {
    /// Return code, `0` on success.
    pub rt_cd: String,
    /// Message code.
    #[serde(default)]
    pub msg_cd: String,
    /// Human-readable message.
    #[serde(default)]
    pub msg1: String,
}

impl ControlFrame {
    /// Whether this is a heartbeat that must be echoed back.
    #[must_use]
    pub fn is_pingpong(&self) -> bool {
        self.header.tr_id == TR_ID_PINGPONG
    }

    /// Whether the body reports success. Frames without a body count as
    /// successful.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.body.as_ref().is_none_or(|b| b.rt_cd == RT_CD_SUCCESS)
    }
}

// =============================================================================
// OAuth
// =============================================================================

/// Access token request for `POST /oauth2/tokenP`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    /// Always `client_credentials`.
    pub grant_type: &'static str,
    /// Application key.
    pub appkey: &'a str,
    /// Application secret.
    pub appsecret: &'a str,
}

impl<'a> TokenRequest<'a> {
    /// Build a request for the given application credentials.
    #[must_use]
    pub const fn new(appkey: &'a str, appsecret: &'a str) -> Self {
        Self {
            grant_type: GRANT_TYPE,
            appkey,
            appsecret,
        }
    }
}

/// Access token response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token.
    #[serde(default)]
    pub access_token: String,
    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Provider-reported lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Approval key request for `POST /oauth2/Approval`.
///
/// The secret travels as `secretkey` here, unlike the token endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest<'a> {
    /// Always `client_credentials`.
    pub grant_type: &'static str,
    /// Application key.
    pub appkey: &'a str,
    /// Application secret.
    pub secretkey: &'a str,
}

impl<'a> ApprovalRequest<'a> {
    /// Build a request for the given application credentials.
    #[must_use]
    pub const fn new(appkey: &'a str, secretkey: &'a str) -> Self {
        Self {
            grant_type: GRANT_TYPE,
            appkey,
            secretkey,
        }
    }
}

/// Approval key response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalResponse {
    /// Key for the streaming handshake.
    #[serde(default)]
    pub approval_key: String,
}

// =============================================================================
// Ranking
// =============================================================================

/// Envelope of the volume-ranking response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RankingResponse {
    /// Return code, `0` on success. Some responses omit it.
    #[serde(default)]
    pub rt_cd: Option<String>,
    /// Message code.
    #[serde(default)]
    pub msg_cd: String,
    /// Human-readable message.
    #[serde(default)]
    pub msg1: String,
    /// Ranking rows; absent when the provider has nothing to report.
    #[serde(default)]
    pub output: Option<Vec<RankingEntry>>,
}
