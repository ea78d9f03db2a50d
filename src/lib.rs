//! Serial terminal engine: raw Rx/Tx buffers, streaming decode, hex view,
//! batched UI refresh, scroll policy, repeat sending and control items.

pub mod buffer;
pub mod channel;
pub mod compose;
pub mod config;
pub mod control;
pub mod decode;
pub mod log;
pub mod options;
pub mod pipeline;
pub mod prefs;
pub mod refresh;
pub mod repeat;
pub mod scroll;

pub use channel::{Channel, ChannelError};
pub use pipeline::{Frontend, Pipeline};
