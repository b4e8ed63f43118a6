//! Market Data Types
//!
//! Value objects produced and consumed by the bridge: tick records decoded
//! from the streaming feed, ranking entries pulled from the REST feed, the
//! two upstream credentials, and the message handed to the bus.
//!
//! Tick fields stay as the provider's strings. Downstream consumers parse
//! prices and volumes themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Tick Record
// =============================================================================

/// One instrument's price/volume snapshot extracted from a streaming frame.
///
/// Serializes to the bus schema:
///
/// ```json
/// {"stockId":"005930","currentPrice":"71900","fluctuationPrice":"-100",
///  "fluctuationRate":"-0.14","fluctuationSign":"5",
///  "transactionVolume":"1","tradingTime":"093354"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRecord {
    /// Short instrument code (`MKSC_SHRN_ISCD`).
    #[serde(rename = "stockId")]
    pub instrument_code: String,
    /// Last traded price (`STCK_PRPR`).
    #[serde(rename = "currentPrice")]
    pub last_price: String,
    /// Change versus previous close (`PRDY_VRSS`).
    #[serde(rename = "fluctuationPrice")]
    pub change_amount: String,
    /// Change rate versus previous close, percent (`PRDY_CTRT`).
    #[serde(rename = "fluctuationRate")]
    pub change_rate_pct: String,
    /// Sign code of the change (`PRDY_VRSS_SIGN`), `1`..`5`.
    #[serde(rename = "fluctuationSign")]
    pub change_sign: String,
    /// Volume of this execution (`CNTG_VOL`).
    #[serde(rename = "transactionVolume")]
    pub cumulative_volume: String,
    /// Execution time, `HHMMSS` (`STCK_CNTG_HOUR`).
    #[serde(rename = "tradingTime")]
    pub trade_time: String,
}

// =============================================================================
// Ranking Entry
// =============================================================================

/// One row of the volume-ranking REST response.
///
/// Reads the provider's field names and writes camelCase names for the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// Korean instrument name.
    #[serde(rename(deserialize = "hts_kor_isnm", serialize = "htsKorIsnm"), default)]
    pub name: String,
    /// Short instrument code.
    #[serde(rename(deserialize = "mksc_shrn_iscd", serialize = "mkscShrnIscd"))]
    pub instrument_code: String,
    /// Rank, 1-based.
    #[serde(
        rename(deserialize = "data_rank", serialize = "dataRank"),
        deserialize_with = "rank_from_text_or_number"
    )]
    pub rank: u32,
    /// Current price.
    #[serde(rename(deserialize = "stck_prpr", serialize = "stckPrpr"), default)]
    pub current_price: String,
    /// Sign code of the change versus previous close.
    #[serde(
        rename(deserialize = "prdy_vrss_sign", serialize = "prdyVrssSign"),
        default
    )]
    pub change_sign: String,
    /// Change versus previous close.
    #[serde(rename(deserialize = "prdy_vrss", serialize = "prdyVrss"), default)]
    pub change_amount: String,
    /// Change rate versus previous close, percent.
    #[serde(rename(deserialize = "prdy_ctrt", serialize = "prdyCtrt"), default)]
    pub change_rate_pct: String,
    /// Accumulated volume today.
    #[serde(rename(deserialize = "acml_vol", serialize = "acmlVol"), default)]
    pub accumulated_volume: String,
    /// Previous day's volume.
    #[serde(rename(deserialize = "prdy_vol", serialize = "prdyVol"), default)]
    pub previous_volume: String,
    /// Listed share count.
    #[serde(rename(deserialize = "lstn_stcn", serialize = "lstnStcn"), default)]
    pub listed_shares: String,
    /// Average volume.
    #[serde(rename(deserialize = "avrg_vol", serialize = "avrgVol"), default)]
    pub average_volume: String,
}

/// The provider sends `data_rank` as a string; tolerate plain numbers too.
fn rank_from_text_or_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Publish Message
// =============================================================================

/// A serialized message bound for one bus topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMessage {
    /// Destination topic.
    pub topic: String,
    /// JSON body.
    pub body: String,
}

impl PublishMessage {
    /// Create a message from an already-serialized body.
    #[must_use]
    pub fn new(topic: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
        }
    }

    /// Serialize a tick record for `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn from_tick(topic: &str, tick: &TickRecord) -> Result<Self, serde_json::Error> {
        Ok(Self::new(topic, serde_json::to_string(tick)?))
    }

    /// Serialize a ranking entry for `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn from_ranking(topic: &str, entry: &RankingEntry) -> Result<Self, serde_json::Error> {
        Ok(Self::new(topic, serde_json::to_string(entry)?))
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Bearer credential for REST calls, valid until `expires_at`.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token that expires at `expires_at`.
    #[must_use]
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// The bearer value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Absolute expiry.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token may still be handed out at `now`, keeping `margin`
    /// in reserve before the expiry.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        !self.value.is_empty()
            && self
                .expires_at
                .checked_sub_signed(margin)
                .is_some_and(|renew_at| now < renew_at)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Session-scoped credential authorizing one streaming connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ApprovalKey(String);

impl ApprovalKey {
    /// Wrap a key returned by the approval endpoint.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApprovalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApprovalKey([REDACTED])")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample_tick() -> TickRecord {
        TickRecord {
            instrument_code: "005930".to_string(),
            last_price: "71900".to_string(),
            change_amount: "-100".to_string(),
            change_rate_pct: "-0.14".to_string(),
            change_sign: "5".to_string(),
            cumulative_volume: "1".to_string(),
            trade_time: "093354".to_string(),
        }
    }

    #[test]
    fn tick_serializes_to_bus_schema_in_order() {
        let message = PublishMessage::from_tick("realtime-data", &sample_tick()).unwrap();
        assert_eq!(message.topic, "realtime-data");
        assert_eq!(
            message.body,
            r#"{"stockId":"005930","currentPrice":"71900","fluctuationPrice":"-100","fluctuationRate":"-0.14","fluctuationSign":"5","transactionVolume":"1","tradingTime":"093354"}"#
        );
    }

    #[test]
    fn ranking_entry_reads_provider_names_and_writes_camel_case() {
        let json = r#"{
            "hts_kor_isnm": "삼성전자",
            "mksc_shrn_iscd": "005930",
            "data_rank": "1",
            "stck_prpr": "71900",
            "prdy_vrss_sign": "5",
            "prdy_vrss": "-100",
            "prdy_ctrt": "-0.14",
            "acml_vol": "3052507",
            "prdy_vol": "9000000",
            "lstn_stcn": "5969782550",
            "avrg_vol": "3000000",
            "vol_inrt": "33.91"
        }"#;

        let entry: RankingEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.rank, 1);
        assert_eq!(entry.instrument_code, "005930");
        assert_eq!(entry.accumulated_volume, "3052507");

        let message = PublishMessage::from_ranking("volume-rank-topic", &entry).unwrap();
        assert!(message.body.contains(r#""mkscShrnIscd":"005930""#));
        assert!(message.body.contains(r#""dataRank":1"#));
        assert!(!message.body.contains("vol_inrt"));
    }

    #[test]
    fn ranking_entry_accepts_numeric_rank() {
        let json = r#"{"mksc_shrn_iscd":"000660","data_rank":2}"#;
        let entry: RankingEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.rank, 2);
        assert!(entry.name.is_empty());
    }

    #[test]
    fn ranking_entry_rejects_garbage_rank() {
        let json = r#"{"mksc_shrn_iscd":"000660","data_rank":"first"}"#;
        assert!(serde_json::from_str::<RankingEntry>(json).is_err());
    }

    #[test]
    fn access_token_freshness_respects_margin() {
        let expires_at = Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap();
        let token = AccessToken::new("abc", expires_at);
        let margin = chrono::Duration::minutes(5);

        let early = Utc.with_ymd_and_hms(2024, 6, 12, 11, 54, 59).unwrap();
        let inside_margin = Utc.with_ymd_and_hms(2024, 6, 12, 11, 55, 0).unwrap();

        assert!(token.is_fresh(early, margin));
        assert!(!token.is_fresh(inside_margin, margin));
    }

    #[test]
    fn margin_beyond_representable_range_is_not_fresh() {
        let token = AccessToken::new("abc", DateTime::<Utc>::MIN_UTC + chrono::Duration::days(1));
        assert!(!token.is_fresh(DateTime::<Utc>::MIN_UTC, chrono::Duration::MAX));
    }

    #[test]
    fn empty_access_token_is_never_fresh() {
        let token = AccessToken::new("", Utc::now() + chrono::Duration::days(1));
        assert!(!token.is_fresh(Utc::now(), chrono::Duration::zero()));
    }

    #[test]
    fn credentials_redacted_debug() {
        let token = AccessToken::new("secret-token", Utc::now());
        let key = ApprovalKey::new("secret-key");
        assert!(!format!("{token:?}").contains("secret-token"));
        assert!(!format!("{key:?}").contains("secret-key"));
    }
}
