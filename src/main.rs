use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use smart_grade::config::Config;
use smart_grade::models::{load_rubric, parse_marks_list, Document};
use smart_grade::orchestrator::{App, LocalBus, SessionSettings, Submission, WorkflowSession};
use smart_grade::utils::logging;
use smart_grade::workflow::{GradingFlow, GradingMode};
use smart_grade::FileStore;

/// 扫描试卷自动批改
#[derive(Debug, Parser)]
#[command(name = "smart-grade", version, about)]
struct Cli {
    /// 日志级别（默认读取 RUST_LOG）
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 按评分标准批改一份或多份答卷
    Grade {
        /// 标准答案文档
        #[arg(long)]
        key: PathBuf,
        /// 评分标准（JSON 或 TOML）
        #[arg(long)]
        rubric: PathBuf,
        /// 学生答卷，可重复
        #[arg(long = "student", required = true)]
        students: Vec<PathBuf>,
        /// 学生姓名（只有一份答卷时生效，默认取文件名）
        #[arg(long)]
        student_name: Option<String>,
        #[arg(long, default_value = "Exam")]
        exam_title: String,
        /// 通过 agent 工作流批改
        #[arg(long)]
        workflow: bool,
    },
    /// 简单模式：只给每题满分与评分要求
    Simple {
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        student: PathBuf,
        /// 每题满分，例如 5,5,10
        #[arg(long)]
        marks: String,
        #[arg(long, default_value = "Grade for correctness and completeness.")]
        criteria: String,
        #[arg(long)]
        student_name: Option<String>,
        #[arg(long, default_value = "Exam")]
        exam_title: String,
    },
    /// 只提取文档文字
    Extract {
        #[arg(long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    logging::init_with_level(cli.log_level.as_deref());

    // 加载配置
    let config = Config::from_env();

    match cli.command {
        Command::Grade {
            key,
            rubric,
            students,
            student_name,
            exam_title,
            workflow,
        } => {
            let rubric = load_rubric(&rubric).await?;
            let submissions = submissions(students, student_name);
            if workflow {
                run_workflow(config, &key, submissions, rubric, &exam_title).await
            } else {
                let app = App::initialize(config)?;
                app.run(&key, submissions, GradingMode::Rubric(rubric), &exam_title)
                    .await?;
                Ok(())
            }
        }
        Command::Simple {
            key,
            student,
            marks,
            criteria,
            student_name,
            exam_title,
        } => {
            let total_marks = parse_marks_list(&marks)?;
            if total_marks.is_empty() {
                bail!("--marks 不能为空");
            }
            let app = App::initialize(config)?;
            let mode = GradingMode::Simple {
                total_marks,
                criteria,
            };
            app.run(&key, submissions(vec![student], student_name), mode, &exam_title)
                .await?;
            Ok(())
        }
        Command::Extract { input } => {
            let flow = GradingFlow::from_config(&config)?;
            let document = Document::from_path(&input).await?;
            let extracted = flow.extractor().extract(&document).await;
            if extracted.is_empty() {
                warn!("⚠️ 没有提取到文字: {}", input.display());
            }
            println!("{}", extracted.text);
            Ok(())
        }
    }
}

fn submissions(paths: Vec<PathBuf>, student_name: Option<String>) -> Vec<Submission> {
    match (student_name, paths.len()) {
        (Some(name), 1) => paths
            .into_iter()
            .map(|path| Submission::new(name.clone(), path))
            .collect(),
        _ => paths.into_iter().map(Submission::from_path).collect(),
    }
}

/// 通过进程内 agent 工作流逐份批改
async fn run_workflow(
    config: Config,
    key: &std::path::Path,
    submissions: Vec<Submission>,
    rubric: smart_grade::Rubric,
    exam_title: &str,
) -> Result<()> {
    config.validate_for_workflow()?;
    let flow = Arc::new(GradingFlow::from_config(&config)?);
    let bus = LocalBus::new(flow, &config);
    let mut session = WorkflowSession::new(bus, SessionSettings::from(&config));
    session.initialize().await?;

    let store = FileStore::new(&config.report_folder);
    let stats = session
        .grade_submissions(&store, key, &submissions, &rubric, exam_title)
        .await;
    logging::print_final_stats(stats.success, stats.failed, stats.total, &config.report_folder);

    info!("会话状态: {:?}", session.status());
    Ok(())
}
