// src/source/mod.rs
pub mod csv_feed;

pub use csv_feed::CsvFeedFetcher;
