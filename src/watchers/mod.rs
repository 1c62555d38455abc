//! Senders that watch a source and post what is new.

pub mod codinglove;
pub mod extract;
pub mod fetch;

pub use codinglove::{CodingLove, CodingLoveSettings, ScanAbort, ScanReport};
pub use extract::{Extract, Extracted, PostExtractor};
pub use fetch::{Fetch, HttpFetcher};
