pub mod claude;
pub mod error;
pub mod schema;
pub mod util;

pub use claude::Claude;
pub use error::ApiError;
pub use schema::StructuredOutput;
