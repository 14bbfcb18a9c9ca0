pub mod gate;

pub use gate::{supported_formats_list, AcceptedUpload, SubmissionGate, SUPPORTED_FORMATS};
