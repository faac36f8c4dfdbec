use crate::models::rubric::Rubric;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从文件加载评分标准
///
/// 按扩展名选择格式：`.toml` 使用 TOML，其余按 JSON 解析
pub async fn load_rubric(rubric_path: &Path) -> Result<Rubric> {
    let content = fs::read_to_string(rubric_path)
        .await
        .with_context(|| format!("无法读取评分标准文件: {}", rubric_path.display()))?;

    let rubric = parse_rubric(&content, rubric_path)?;
    rubric
        .validate()
        .with_context(|| format!("评分标准无效: {}", rubric_path.display()))?;

    tracing::info!(
        "成功加载评分标准: {} 道题, 总分 {}",
        rubric.len(),
        rubric.total_marks()
    );

    Ok(rubric)
}

fn parse_rubric(content: &str, rubric_path: &Path) -> Result<Rubric> {
    let is_toml = rubric_path.extension().and_then(|s| s.to_str()) == Some("toml");
    if is_toml {
        toml::from_str(content)
            .with_context(|| format!("无法解析TOML评分标准: {}", rubric_path.display()))
    } else {
        serde_json::from_str(content)
            .with_context(|| format!("无法解析JSON评分标准: {}", rubric_path.display()))
    }
}

/// 解析简单模式的分值列表，例如 `"5,5,10"`
pub fn parse_marks_list(raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .with_context(|| format!("无法解析分值: {}", s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_toml_rubric() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[[questions]]
questionNumber = 1
questionText = "Explain photosynthesis"
totalMarks = 10

[questions.rubric]
process = "Mentions light, water and carbon dioxide"
"#
        )
        .unwrap();

        let rubric = load_rubric(file.path()).await.unwrap();
        assert_eq!(rubric.len(), 1);
        assert_eq!(rubric.questions[0].total_marks, 10);
        assert!(rubric.questions[0].rubric.contains_key("process"));
    }

    #[tokio::test]
    async fn test_load_json_rubric_rejects_empty() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"questions": []}}"#).unwrap();
        assert!(load_rubric(file.path()).await.is_err());
    }

    #[test]
    fn test_parse_marks_list() {
        assert_eq!(parse_marks_list("5, 5,10").unwrap(), vec![5, 5, 10]);
        assert!(parse_marks_list("5,x").is_err());
    }
}
