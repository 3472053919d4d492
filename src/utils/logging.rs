/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// 初始化全局 tracing 订阅者
///
/// `RUST_LOG` 优先；否则按 `verbose` 选择 info / debug 级别。
/// 重复调用是安全的（测试中会多次初始化）。
pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "testcase_agent=debug,tower_http=debug"
    } else {
        "testcase_agent=info,tower_http=info"
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    let (base_url, _) = config.llm_endpoint();
    info!("{}", "=".repeat(60));
    info!("🚀 测试用例生成服务启动");
    info!("🌐 运行环境: {:?}", config.app_env);
    info!("🤖 LLM: {} @ {}", config.llm_model_name, base_url);
    info!(
        "📊 通过分数线: {} | 最大迭代次数: {}",
        config.pass_threshold, config.max_iterations
    );
    info!("📁 Excel 输出目录: {}", config.download_dir.display());
    info!("💤 会话空闲释放: {} 秒", config.session_idle_secs);
    info!("{}", "=".repeat(60));
}

/// 记录一次生成流程开始
pub fn log_run_start(thread_id: &str, requirement: &str) {
    info!("\n{}", "=".repeat(60));
    info!("[会话 {}] 📋 开始生成测试用例", thread_id);
    info!("[会话 {}] 需求: {}", thread_id, truncate_text(requirement, 80));
    info!("{}", "=".repeat(60));
}

/// 记录一次迭代开始
pub fn log_iteration_start(thread_id: &str, iteration: u32, max_iterations: u32) {
    info!("\n[会话 {}] {}", thread_id, "─".repeat(30));
    info!(
        "[会话 {}] 🔁 第 {}/{} 次生成",
        thread_id, iteration, max_iterations
    );
}

/// 记录一次生成流程结束
pub fn log_run_complete(thread_id: &str, case_count: usize, iterations: u32, score: Option<f64>) {
    info!("\n{}", "─".repeat(60));
    match score {
        Some(score) => info!(
            "[会话 {}] ✅ 完成: {} 个测试用例, 迭代 {} 次, 评审得分 {:.1}",
            thread_id, case_count, iterations, score
        ),
        None => info!(
            "[会话 {}] ✅ 完成: {} 个测试用例, 迭代 {} 次, 无评审结果",
            thread_id, case_count, iterations
        ),
    }
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("用户登录功能需求", 4), "用户登录...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(false);
        init(true);
    }
}
