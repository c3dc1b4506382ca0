pub mod assembler;
pub mod client;
pub mod events;
pub mod logging;
#[cfg(test)]
pub mod mock_client;
pub mod stream;

pub use assembler::{DeltaAssembler, RawEvent};
pub use client::{ApiClient, SYSTEM_PROMPT};
pub use events::EventStream;
