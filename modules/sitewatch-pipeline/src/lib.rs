pub mod budget;
pub mod canonicalize;
pub mod extractor;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod stats;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod triage;
pub mod validator;
