//! IndexHub build tool executor.
//!
//! Implements the [`domain::BuildExecutor`] trait by spawning the external
//! package-index build tool as a child process:
//!
//! ```text
//! <tool> build <config> <output> [<package>]
//! ```
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning, pipe handling, and deadline enforcement
//! live here. The coordinator sees only [`domain::BuildExecutor`] and the
//! [`domain::ExecutionError`] it returns.
//!
//! ## Output
//!
//! Standard output and standard error are streamed line by line into two
//! [`LineSink`]s. Production wiring uses [`TracingSink`], which turns each line
//! into a `tracing` event inside the current build span.

pub mod process;
pub mod sink;

pub use process::{ProcessExecutor, ToolPaths};
pub use sink::{LineSink, MemorySink, OutputStream, TracingSink};
