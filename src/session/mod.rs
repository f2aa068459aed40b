//! Practice-session records and their storage.
//!
//! * [`RecordingSession`] - one finished recording plus its metrics.
//! * [`AngleStats`] - accumulator for the session's average arm angle.
//! * [`SessionStore`] - JSON index under the data root; owns artifact
//!   deletion.
//! * [`SessionSummarizer`] - async analysis hook run after a recording.

pub mod model;
pub mod store;
pub mod summary;

pub use model::{
    artifact_filename, default_title, thumbnail_filename, AngleStats, RecordingSession, TITLE_FORMAT,
};
pub use store::{SessionStore, StoreError, INDEX_FILE};
pub use summary::{summarize_and_store, MetricsSummarizer, SessionSummarizer};
