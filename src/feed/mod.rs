mod fetcher;

pub use fetcher::SourceFetcher;
