//! Thin, pure adapter over an external test-inventory parser binary.
//!
//! The parser itself is an external collaborator: this crate only handles
//! invoking it over a `Source` and deserializing its JSON output. Errors are
//! returned uninterpreted; wrapping them as a scan-failure category is the
//! analyze orchestrator's job.

pub mod error;
pub mod mock;
pub mod models;
pub mod process;
pub mod traits;

pub use error::{ParserError, ParserResult};
pub use mock::MockParserAdapter;
pub use models::{Inventory, ParsedFile, ParsedSuite, ParsedTest, TestStatus};
pub use process::ProcessParserAdapter;
pub use traits::ParserAdapter;
