// src/core/mod.rs — Session registry, generation worker and resume-aware relay

pub mod buffer;
pub mod policy;
pub mod registry;
pub mod relay;
pub mod transport;
pub mod worker;

pub use buffer::{DeltaBuffer, Snapshot};
pub use policy::ChatPolicy;
pub use registry::{Session, SessionKey, SessionRegistry};
pub use relay::{ChatRelay, OpenedRelay, RelayOutcome, RelayRequest};
pub use transport::{ChannelTransport, Frame, Transport, END_OF_STREAM};
pub use worker::{GenerationOutcome, GenerationSettings, GenerationWorker};
