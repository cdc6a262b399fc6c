//! The Ripple wire protocol.
//!
//! Server side: [`encode_frame`] turns a [`StreamEvent`] into one SSE frame
//! and [`StreamRelay`] pumps a run's events into a [`FrameSink`].
//!
//! Client side: [`SseParser`] reassembles frames from arbitrary byte chunks
//! and [`StreamConsumer`] folds the parsed events into conversation state.
//!
//! [`StreamEvent`]: ripple_core::stream::StreamEvent

pub mod consumer;
pub mod encoder;
pub mod parser;
pub mod relay;
pub mod sink;

pub use consumer::{
    ConsumerStatus, ConsumerUpdate, OPTIMISTIC_ID_PREFIX, StreamConsumer, ToolRecord,
};
pub use encoder::{KEEP_ALIVE_FRAME, encode_frame};
pub use parser::{PARSE_ERROR_MESSAGE, SseParser};
pub use relay::{RelayOutcome, StreamRelay};
pub use sink::{ChannelSink, FrameSink, RecordingSink};
