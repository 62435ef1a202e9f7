//! Byte-stream plumbing under the HTTP layer.
//!
//! - **`reader`**: [`ProtocolReader`], the CR LF line / fixed-length reader
//! - **`limited`**: [`LimitedStream`], per-request read and write byte budgets
//! - **`deferred`**: [`DeferredFlush`], holds output until the response is complete
//!
//! Per request the connection stacks them like this:
//!
//! ```text
//! ProtocolReader ──reads──▶ DeferredFlush ─▶ LimitedStream ─▶ BufWriter ─▶ client stream
//! ResponseWriter ─writes─▶ DeferredFlush ─▶ LimitedStream ─▶ BufWriter ─▶ client stream
//! ```

pub mod deferred;
pub mod limited;
pub mod reader;

pub use deferred::DeferredFlush;
pub use limited::{LimitedStream, ReadBudget};
pub use reader::{BoundReader, LineReader, ProtocolReader, ReaderOptions};
