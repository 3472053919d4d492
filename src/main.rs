use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use testcase_agent::utils::logging;
use testcase_agent::{App, Config};

#[derive(Parser)]
#[command(name = "testcase-agent", version, about = "多 Agent 测试用例生成服务")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// 启动 HTTP 服务（默认）
    Serve,
    /// 离线生成一次测试用例，输出 Markdown 文档
    Generate {
        /// 需求文本
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        /// 需求文件（.docx / .doc / 文本）
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// 用自然语言查询数据库（只读）
    Sql {
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load()?;
    logging::init(config.verbose_logging);

    let app = App::initialize(config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => app.serve().await?,
        Command::Generate { text, file } => {
            let requirement = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => App::read_requirement(&path)?,
                (None, None) => bail!("请通过 --text 或 --file 提供需求"),
            };
            let outcome = app.generate(&requirement).await?;
            println!("{}", outcome.markdown);
            println!("\nExcel文件: {}", outcome.export.path.display());
        }
        Command::Sql { question } => {
            let run = app.ask_sql(&question).await?;
            println!("{}", run.final_text);
        }
    }

    Ok(())
}
