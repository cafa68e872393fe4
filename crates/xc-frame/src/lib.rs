//! Local tabular data for crosscheck.
//!
//! Frames hold typed, optionally-missing columns. They are read from and
//! written to delimited text (the exchange format of both the backend's
//! dataset export and the standalone scorer), either from a plain file or a
//! member of a zip archive.

pub mod column;
pub mod csv;
pub mod error;
pub mod frame;
pub mod prediction;
pub mod schema;
pub mod source;

pub use column::{format_number, Cell, Column, ColumnType};
pub use csv::{read_csv, read_csv_str, write_csv, write_csv_string, CsvOptions};
pub use error::{FrameError, Result};
pub use frame::Frame;
pub use prediction::PredictionTable;
pub use schema::{ColumnRef, Schema};
pub use source::{list_archive_members, load_frame, read_source, DataSource};
