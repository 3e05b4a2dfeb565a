mod fetcher;

pub use fetcher::{FeedFetcher, FetchOutcome};
