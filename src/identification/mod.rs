//! Remote book identification.
//!
//! Packages an encoded cover image as a multipart upload, sends it to the
//! identification service in one round trip and maps the JSON answer to a
//! closed [`IdentificationOutcome`]. Nothing is retried automatically; a
//! failed identification is re-triggered by a new capture.
//!
//! # Example
//!
//! ```no_run
//! use cover_scan::capture::IdentificationConfig;
//! use cover_scan::identification::{IdentificationClient, IdentificationOutcome};
//!
//! # async fn run() {
//! let client = IdentificationClient::new(IdentificationConfig::default()).unwrap();
//! match client.submit_file("cover.jpg").await {
//!     Ok(IdentificationOutcome::Success(book)) => println!("{} ({})", book.title, book.tier()),
//!     Ok(other) => println!("{other}"),
//!     Err(e) => eprintln!("not submitted: {e}"),
//! }
//! # }
//! ```

mod client;
mod outcome;
mod response;

pub use client::{
    ClientError, DatabaseHealth, IdentificationClient, Identify, ServiceHealth, SubmissionError,
};
pub use outcome::{BookMatch, ConfidenceTier, IdentificationOutcome, DEFAULT_SUGGESTION};
pub use response::{map_response, IdentificationFault};
