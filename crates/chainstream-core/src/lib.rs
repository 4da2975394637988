//! chainstream-core — block stream consumer and resumption engine.
//!
//! # Architecture
//!
//! ```text
//! Resumer::run(range, filter, handler)
//!     └── loop: StreamSession (one at a time)
//!             ├── BlockSource::connect   (transport seam)
//!             ├── decode_block           (type_url guard + prost decode)
//!             ├── BlockHandler::on_block (caller, in order)
//!             └── exit: close → release → cancel → grace → CompletionSignal
//! ```
//!
//! Transient stream errors restart a fresh session right after the last
//! delivered block; everything else ends the run.

pub mod completion;
pub mod decode;
pub mod error;
pub mod handler;
pub mod memory;
pub mod pb;
pub mod policy;
pub mod resume;
pub mod session;
pub mod source;
pub mod types;

pub use completion::{CompletionSignal, Interrupt};
pub use decode::decode_block;
pub use error::{DecodeError, RemoteCode, StreamError};
pub use handler::BlockHandler;
pub use policy::{classify, ErrorClass, RestartPolicy};
pub use resume::{Resumer, ResumerConfig, RunReport};
pub use session::{SessionEvent, SessionReport, StreamSession};
pub use source::{BlockSource, ResponseStream, StreamConnection, StreamHandle};
pub use types::{Block, BlockNumber, BlockRange, FilterExpression, Phase, StreamRequest, TerminationCause};
