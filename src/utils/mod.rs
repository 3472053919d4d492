pub mod json_extract;
pub mod logging;

pub use logging::truncate_text;
