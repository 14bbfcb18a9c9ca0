pub mod srt;

pub use srt::{format_timestamp, output_filename, render, MEDIA_TYPE};
