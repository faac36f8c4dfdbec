pub mod feedback;
pub mod hallucination;
pub mod image_normalizer;
pub mod qa_segmenter;
pub mod rubric_grader;
pub mod text_extractor;

pub use feedback::FeedbackWriter;
pub use hallucination::{DetectorConfig, HallucinationDetector, Verdict};
pub use image_normalizer::{ImageNormalizer, Normalized, NormalizerConfig};
pub use qa_segmenter::{QaSegmenter, SEPARATOR};
pub use rubric_grader::RubricGrader;
pub use text_extractor::TextExtractor;
