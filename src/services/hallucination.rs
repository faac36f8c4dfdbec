//! 幻觉检测 - 业务能力层
//!
//! 模型输出在被信任之前先过一遍启发式规则：
//! - 含任一推测/含糊措辞
//! - 不确定标记（`[unclear]` 与 `?`）超过文本长度的 2%
//! - 套话出现超过 2 次
//!
//! 命中任一规则的文本一律丢弃，不做部分采信。

use std::fmt;

/// 视觉模型被要求对看不清的内容使用的标记
pub const UNCLEAR_MARKER: &str = "[unclear]";

const HEDGING_PHRASES: &[&str] = &[
    "i cannot see the image clearly",
    "the image appears to be",
    "based on what i can see",
    "i'm not sure about",
    "it looks like",
    "i think this might be",
    "the text seems to be",
    "i can make out",
    "from what i can tell",
    "it appears that",
    "i believe this is",
    "this might be",
    "i'm not certain",
    "i can't quite make out",
    "the image is unclear",
    "i cannot determine",
    "i'm unable to see",
    "the text is not clear",
    "i cannot read",
    "i'm having trouble seeing",
];

const GENERIC_PHRASES: &[&str] = &[
    "this is a question about",
    "the answer is",
    "this appears to be",
    "based on the information",
    "the text shows",
    "this document contains",
];

/// 检测阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// 不确定标记数 / 字符数 超过该比例即判定
    pub max_uncertainty_ratio: f64,
    /// 套话出现次数超过该值即判定
    pub max_generic_phrases: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_uncertainty_ratio: 0.02,
            max_generic_phrases: 2,
        }
    }
}

/// 命中的规则
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Clean,
    HedgingPhrase(&'static str),
    ExcessiveUncertainty { markers: usize, chars: usize },
    GenericPhrases(usize),
}

impl Verdict {
    pub fn is_flagged(&self) -> bool {
        !matches!(self, Verdict::Clean)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Clean => write!(f, "未发现异常"),
            Verdict::HedgingPhrase(phrase) => write!(f, "含推测措辞 \"{}\"", phrase),
            Verdict::ExcessiveUncertainty { markers, chars } => {
                write!(f, "不确定标记过多 ({} / {} 字符)", markers, chars)
            }
            Verdict::GenericPhrases(count) => write!(f, "套话过多 ({} 次)", count),
        }
    }
}

/// 幻觉检测器
#[derive(Debug, Clone, Default)]
pub struct HallucinationDetector {
    config: DetectorConfig,
}

impl HallucinationDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn is_hallucinated(&self, text: &str) -> bool {
        self.verdict(text).is_flagged()
    }

    /// 按顺序检查规则，返回第一个命中的
    pub fn verdict(&self, text: &str) -> Verdict {
        let lower = text.to_lowercase();

        if let Some(phrase) = HEDGING_PHRASES.iter().copied().find(|p| lower.contains(p)) {
            return Verdict::HedgingPhrase(phrase);
        }

        let chars = text.chars().count();
        let markers = text.matches(UNCLEAR_MARKER).count() + text.matches('?').count();
        if markers as f64 > chars as f64 * self.config.max_uncertainty_ratio {
            return Verdict::ExcessiveUncertainty { markers, chars };
        }

        let generic: usize = GENERIC_PHRASES
            .iter()
            .map(|p| lower.matches(*p).count())
            .sum();
        if generic > self.config.max_generic_phrases {
            return Verdict::GenericPhrases(generic);
        }

        Verdict::Clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> HallucinationDetector {
        HallucinationDetector::default()
    }

    #[test]
    fn test_repeated_generic_phrase_is_flagged() {
        let text = "The answer is photosynthesis. The answer is light. The answer is chlorophyll in every leaf cell.";
        assert_eq!(detector().verdict(text), Verdict::GenericPhrases(3));
    }

    #[test]
    fn test_clean_transcription_passes() {
        let text = "Question 1: Define osmosis\nAnswer: Movement of water across a semi-permeable membrane.\n\
                    Question 2: Name the powerhouse of the cell\nAnswer: Mitochondria";
        assert_eq!(detector().verdict(text), Verdict::Clean);
        assert!(!detector().is_hallucinated(""));
    }

    #[test]
    fn test_hedging_phrase_is_case_insensitive() {
        let verdict = detector().verdict("It Appears That the student wrote 42.");
        assert_eq!(verdict, Verdict::HedgingPhrase("it appears that"));
        assert!(verdict.to_string().contains("it appears that"));
    }

    #[test]
    fn test_uncertainty_ratio() {
        // 100 字符中 2 个标记：恰好 2%，不判定
        let ok = format!("{}??", "a".repeat(98));
        assert!(!detector().is_hallucinated(&ok));
        // 3 个标记超过 2%
        let bad = format!("{}???", "a".repeat(97));
        assert!(matches!(
            detector().verdict(&bad),
            Verdict::ExcessiveUncertainty { markers: 3, chars: 100 }
        ));
    }

    #[test]
    fn test_custom_thresholds() {
        let strict = HallucinationDetector::new(DetectorConfig {
            max_uncertainty_ratio: 0.02,
            max_generic_phrases: 0,
        });
        assert!(strict.is_hallucinated("In short, the answer is yes and that settles it for good."));
    }
}
