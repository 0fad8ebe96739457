//! CSV reader producing untyped rows
//!
//! Fields are split on raw bytes and decoded one at a time, so memory stays
//! bounded to one record regardless of file size.

mod reader;

pub use reader::{RawReader, RawRow};
