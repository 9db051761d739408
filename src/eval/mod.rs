/// Offline evaluation tooling.
///
/// - [`keywords`] fills the dataset's `keywords` column with an LLM
/// - [`harness`] queries a running service for every record and scores it
pub mod dataset;
pub mod harness;
pub mod keywords;
pub mod scoring;
