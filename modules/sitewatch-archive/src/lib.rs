//! Article text backfill: fetch a mention's URL and pull readable text out of
//! the HTML. Best effort only; callers treat every failure as "no text".

pub mod error;
pub mod fetcher;
mod readability;

pub use error::{ArchiveError, Result};
pub use fetcher::ArticleFetcher;
pub use readability::extract_article_text;
