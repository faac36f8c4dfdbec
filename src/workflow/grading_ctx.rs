//! 答卷处理上下文
//!
//! 封装"我正在批改哪位学生的哪份答卷"这一信息

use std::fmt::Display;

/// 答卷处理上下文
#[derive(Debug, Clone)]
pub struct SubmissionCtx {
    /// 学生姓名
    pub student_name: String,

    /// 考试名称
    pub exam_title: String,

    /// 答卷在本批次中的序号（从1开始，仅用于日志显示）
    pub submission_index: usize,
}

impl SubmissionCtx {
    pub fn new(
        student_name: impl Into<String>,
        exam_title: impl Into<String>,
        submission_index: usize,
    ) -> Self {
        Self {
            student_name: student_name.into(),
            exam_title: exam_title.into(),
            submission_index,
        }
    }
}

impl Display for SubmissionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[答卷 #{} 学生 {}]",
            self.submission_index, self.student_name
        )
    }
}
