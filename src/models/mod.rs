pub mod document;
pub mod grading;
pub mod loaders;
pub mod rubric;

pub use document::{Document, DocumentKind, PageData, PageImage};
pub use grading::{ExtractedText, ExtractionSource, GradingReport, GradingResult, QaPair, ReportTotals};
pub use loaders::{load_rubric, parse_marks_list};
pub use rubric::{QuestionRubric, Rubric};
