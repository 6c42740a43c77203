//! Ableton Live session (`.als`) parsing.
//!
//! A session file is gzipped XML. This crate decompresses it under a size
//! cap, extracts the sample-file references and per-MIDI-clip note
//! fingerprints into a [`SessionIndex`], and computes the logical diff
//! between two sessions — which samples and clips actually changed, beyond
//! the byte-level manifest diff.
//!
//! Parsing is deliberately forgiving: Live versions vary in schema details,
//! so any XML trouble yields the partial index gathered so far rather than
//! an error.

pub mod clips;
pub mod error;
pub mod index;
pub mod logical;
pub mod reader;
pub mod samples;

pub use error::{AlsError, AlsResult};
pub use index::{build_index, SessionIndex};
pub use logical::{compute_logical_diff, AlsLogicalDiff, ClipDiff, SampleDiff};
pub use reader::{gunzip_capped, is_als, read_session_xml, top_level_als, MAX_DECOMPRESSED_BYTES};
