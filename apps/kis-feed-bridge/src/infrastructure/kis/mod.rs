//! KIS Adapters
//!
//! Clients for the Korea Investment & Securities Open API:
//!
//! - **Stream**: Real-time execution prices over WebSocket (`|`/`^` codec)
//! - **Auth**: Access token and approval key over REST
//! - **Ranking**: Volume ranking quotation over REST

pub mod auth;
pub mod codec;
pub mod messages;
pub mod ranking;
pub mod reconnect;
pub mod stream;

pub use auth::KisAuthClient;
pub use codec::{DecodeError, DecodedFrame, FIELDS_PER_RECORD, FrameDecoder};
pub use messages::{ControlFrame, SubscriptionRequest};
pub use ranking::KisRankingClient;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use stream::{FrameDispatcher, StreamClientConfig, StreamClientError, StreamingFeedClient};
