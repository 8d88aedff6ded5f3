mod error;
mod outcome;
mod request;
mod response;

pub use error::ErrorKind;
pub use outcome::{AttemptObserver, AttemptOutcome, AttemptRecord, CompletionRecord, LogObserver};
pub use request::Request;
pub use response::Response;

/// The crate-wide result type
pub type Result<T> = std::result::Result<T, ErrorKind>;
