//! Frame Codec Module
//!
//! Decodes the streaming socket's text frames.
//!
//! - **Data frames**: `|`-delimited header and a `^`-delimited payload
//! - **Control frames**: JSON objects (heartbeats, subscription results)
//!
//! # Data Frame Format
//!
//! ```text
//! 0|H0STCNT0|002|005930^093354^71900^5^-100^-0.14^…^000660^093354^…
//! │ │        │   └─ payload: record_count × 46 fields, back to back
//! │ │        └─ record count
//! │ └─ transaction id
//! └─ encryption flag
//! ```
//!
//! Each record contributes seven fields to a [`TickRecord`]:
//!
//! | Offset | Field |
//! |---|---|
//! | 0 | instrument code |
//! | 1 | trade time |
//! | 2 | last price |
//! | 3 | change sign |
//! | 4 | change amount |
//! | 5 | change rate |
//! | 12 | execution volume |

use crate::domain::market_data::TickRecord;
use crate::infrastructure::kis::messages::ControlFrame;

/// Fields per record in a data frame payload.
pub const FIELDS_PER_RECORD: usize = 46;

const OFFSET_INSTRUMENT_CODE: usize = 0;
const OFFSET_TRADE_TIME: usize = 1;
const OFFSET_LAST_PRICE: usize = 2;
const OFFSET_CHANGE_SIGN: usize = 3;
const OFFSET_CHANGE_AMOUNT: usize = 4;
const OFFSET_CHANGE_RATE: usize = 5;
const OFFSET_VOLUME: usize = 12;

/// Decoding errors.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The record-count segment is not a non-negative integer.
    #[error("invalid record count: {0:?}")]
    InvalidRecordCount(String),

    /// The payload holds fewer fields than the record count requires.
    #[error("payload truncated: {declared} records declared, {complete} complete ({fields} fields)")]
    Truncated {
        /// Records announced by the header.
        declared: usize,
        /// Records fully present in the payload.
        complete: usize,
        /// Fields present in the payload.
        fields: usize,
    },
}

impl DecodeError {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidRecordCount(_) => "invalid_record_count",
            Self::Truncated { .. } => "truncated",
        }
    }
}

/// Result of decoding one data frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Encryption flag segment (`0` = plain).
    pub encryption_flag: String,
    /// Transaction id segment.
    pub tr_id: String,
    /// Records in payload order.
    pub records: Vec<TickRecord>,
    /// Set when the payload ended before the announced record count; the
    /// complete leading records are still in `records`.
    pub truncated: Option<DecodeError>,
}

impl DecodedFrame {
    /// Whether the frame yielded no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decoder for streaming socket frames.
#[derive(Debug, Default, Clone)]
pub struct FrameDecoder;

impl FrameDecoder {
    /// Create a new decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a `|`/`^` data frame.
    ///
    /// Frames with fewer than four `|` segments carry no records and decode
    /// to an empty frame. A payload shorter than the record count requires
    /// yields the complete leading records with `truncated` set.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidRecordCount`] if the count segment does
    /// not parse.
    pub fn decode(&self, raw: &str) -> Result<DecodedFrame, DecodeError> {
        let mut segments = raw.splitn(4, '|');
        let (Some(flag), Some(tr_id), Some(count), Some(payload)) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Ok(DecodedFrame::default());
        };

        let declared: usize = count
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidRecordCount(count.to_string()))?;

        let fields: Vec<&str> = payload.split('^').collect();
        let complete = declared.min(fields.len() / FIELDS_PER_RECORD);

        let records = fields
            .chunks_exact(FIELDS_PER_RECORD)
            .take(complete)
            .map(record_from_fields)
            .collect();

        let truncated = (complete < declared).then(|| DecodeError::Truncated {
            declared,
            complete,
            fields: fields.len(),
        });

        Ok(DecodedFrame {
            encryption_flag: flag.to_string(),
            tr_id: tr_id.to_string(),
            records,
            truncated,
        })
    }

    /// Parse a JSON control frame.
    ///
    /// Returns `None` for anything that is not a JSON object with a header.
    #[must_use]
    pub fn parse_control(&self, raw: &str) -> Option<ControlFrame> {
        let trimmed = raw.trim_start();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }
}

fn record_from_fields(fields: &[&str]) -> TickRecord {
    TickRecord {
        instrument_code: fields[OFFSET_INSTRUMENT_CODE].to_string(),
        trade_time: fields[OFFSET_TRADE_TIME].to_string(),
        last_price: fields[OFFSET_LAST_PRICE].to_string(),
        change_sign: fields[OFFSET_CHANGE_SIGN].to_string(),
        change_amount: fields[OFFSET_CHANGE_AMOUNT].to_string(),
        change_rate_pct: fields[OFFSET_CHANGE_RATE].to_string(),
        cumulative_volume: fields[OFFSET_VOLUME].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    const SAMSUNG: &str = "005930^093354^71900^5^-100^-0.14^72023.83^72100^72400^71700^71900^71800^1^3052507^219853241700^5105^6937^1832^84.90^1366314^1159996^1^0.39^20.28^090020^5^-200^090820^5^-500^092619^2^200^20230612^20^N^65945^216924^1118750^2199206^0.05^2424142^125.92^0^^72100";
    const HYNIX: &str = "000660^093354^72000^5^+500^-0.14^72023.83^72100^72400^71700^71900^71800^1^3052507^219853241700^5105^6937^1832^84.90^1366314^1159996^1^0.39^20.28^090020^5^-200^090820^5^-500^092619^2^200^20230612^20^N^65945^216924^1118750^2199206^0.05^2424142^125.92^0^^72100";

    fn frame(count: &str, payload: &str) -> String {
        format!("0|H0STCNT0|{count}|{payload}")
    }

    #[test]
    fn decode_single_record() {
        let decoded = FrameDecoder::new().decode(&frame("001", SAMSUNG)).unwrap();

        assert_eq!(decoded.encryption_flag, "0");
        assert_eq!(decoded.tr_id, "H0STCNT0");
        assert!(decoded.truncated.is_none());
        assert_eq!(
            decoded.records,
            vec![TickRecord {
                instrument_code: "005930".to_string(),
                trade_time: "093354".to_string(),
                last_price: "71900".to_string(),
                change_sign: "5".to_string(),
                change_amount: "-100".to_string(),
                change_rate_pct: "-0.14".to_string(),
                cumulative_volume: "1".to_string(),
            }]
        );
    }

    #[test]
    fn decode_two_records_in_order() {
        let payload = format!("{SAMSUNG}^{HYNIX}");
        let decoded = FrameDecoder::new().decode(&frame("002", &payload)).unwrap();

        assert_eq!(decoded.records.len(), 2);
        assert_eq!(decoded.records[0].instrument_code, "005930");
        assert_eq!(decoded.records[1].instrument_code, "000660");
        assert_eq!(decoded.records[1].last_price, "72000");
        assert_eq!(decoded.records[1].change_amount, "+500");
    }

    #[test]
    fn decode_ignores_fields_beyond_record_count() {
        let payload = format!("{SAMSUNG}^{HYNIX}");
        let decoded = FrameDecoder::new().decode(&frame("1", &payload)).unwrap();

        assert_eq!(decoded.records.len(), 1);
        assert!(decoded.truncated.is_none());
    }

    #[test]
    fn decode_short_payload_keeps_leading_records() {
        let partial: Vec<&str> = HYNIX.split('^').take(20).collect();
        let payload = format!("{SAMSUNG}^{}", partial.join("^"));

        let decoded = FrameDecoder::new().decode(&frame("002", &payload)).unwrap();

        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.records[0].instrument_code, "005930");
        assert_eq!(
            decoded.truncated,
            Some(DecodeError::Truncated {
                declared: 2,
                complete: 1,
                fields: 66,
            })
        );
    }

    #[test_case("" ; "empty")]
    #[test_case("0|H0STCNT0" ; "two segments")]
    #[test_case("0|H0STCNT0|001" ; "three segments")]
    #[test_case("hello" ; "no delimiters")]
    fn decode_fewer_than_four_segments_is_empty(raw: &str) {
        let decoded = FrameDecoder::new().decode(raw).unwrap();
        assert!(decoded.is_empty());
        assert!(decoded.truncated.is_none());
    }

    #[test_case("abc" ; "letters")]
    #[test_case("-1" ; "negative")]
    #[test_case("" ; "blank")]
    fn decode_invalid_record_count(count: &str) {
        let result = FrameDecoder::new().decode(&frame(count, SAMSUNG));
        assert_eq!(result, Err(DecodeError::InvalidRecordCount(count.to_string())));
    }

    #[test]
    fn decode_zero_records() {
        let decoded = FrameDecoder::new().decode(&frame("000", "")).unwrap();
        assert!(decoded.is_empty());
        assert!(decoded.truncated.is_none());
    }

    #[test]
    fn decode_payload_may_contain_pipes_in_last_segment() {
        let payload = SAMSUNG.replacen("^N^", "^N|x^", 1);
        let decoded = FrameDecoder::new().decode(&frame("001", &payload)).unwrap();
        assert_eq!(decoded.records.len(), 1);
    }

    #[test]
    fn parse_control_heartbeat() {
        let control = FrameDecoder::new()
            .parse_control(r#"{"header":{"tr_id":"PINGPONG","datetime":"20240612093354"}}"#)
            .unwrap();
        assert!(control.is_pingpong());
    }

    #[test]
    fn parse_control_rejects_data_frames() {
        let decoder = FrameDecoder::new();
        assert!(decoder.parse_control(&frame("001", SAMSUNG)).is_none());
        assert!(decoder.parse_control("{not json").is_none());
    }

    #[test]
    fn decode_error_reasons() {
        assert_eq!(
            DecodeError::InvalidRecordCount(String::new()).reason(),
            "invalid_record_count"
        );
        assert_eq!(
            DecodeError::Truncated {
                declared: 1,
                complete: 0,
                fields: 3
            }
            .reason(),
            "truncated"
        );
    }

    proptest! {
        #[test]
        fn decode_never_panics(raw in ".*") {
            let _ = FrameDecoder::new().decode(&raw);
        }

        #[test]
        fn record_count_is_bounded_by_payload(
            declared in 0usize..8,
            fields in 0usize..400,
        ) {
            let payload = vec!["x"; fields].join("^");
            let decoded = FrameDecoder::new()
                .decode(&frame(&declared.to_string(), &payload))
                .unwrap();

            let present = if fields == 0 { 0 } else { fields / FIELDS_PER_RECORD };
            prop_assert_eq!(decoded.records.len(), declared.min(present));
            prop_assert_eq!(decoded.truncated.is_some(), present < declared);
        }

        #[test]
        fn offsets_pick_the_right_fields(records in 1usize..5) {
            let payload = (0..records * FIELDS_PER_RECORD)
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join("^");
            let decoded = FrameDecoder::new()
                .decode(&frame(&records.to_string(), &payload))
                .unwrap();

            for (i, record) in decoded.records.iter().enumerate() {
                let base = i * FIELDS_PER_RECORD;
                prop_assert_eq!(&record.instrument_code, &base.to_string());
                prop_assert_eq!(&record.trade_time, &(base + 1).to_string());
                prop_assert_eq!(&record.last_price, &(base + 2).to_string());
                prop_assert_eq!(&record.change_sign, &(base + 3).to_string());
                prop_assert_eq!(&record.change_amount, &(base + 4).to_string());
                prop_assert_eq!(&record.change_rate_pct, &(base + 5).to_string());
                prop_assert_eq!(&record.cumulative_volume, &(base + 12).to_string());
            }
        }
    }
}
