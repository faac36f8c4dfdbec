pub mod rubric_loader;

pub use rubric_loader::{load_rubric, parse_marks_list};
