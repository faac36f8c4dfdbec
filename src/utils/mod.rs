pub mod json;
pub mod logging;

pub use json::{lenient_f64, strip_code_fences};
pub use logging::truncate_text;
