//! SQL 助手：用只读数据库工具回答自然语言问题

use tracing::info;

use crate::clients::LlmClient;
use crate::error::AppResult;
use crate::services::SqlDatabase;
use crate::workflow::agent::{Agent, AgentRun, EventSender};
use crate::workflow::prompts;
use crate::workflow::tools::SqlTools;

pub const SQL_AGENT: &str = "sql_agent";

pub async fn ask_database(
    llm: &dyn LlmClient,
    db: &SqlDatabase,
    question: &str,
    max_turns: usize,
    events: Option<&EventSender>,
) -> AppResult<AgentRun> {
    info!("🗄️ SQL 助手: {}", question);
    let agent = Agent::new(SQL_AGENT, prompts::sql_prompt(), max_turns);
    let mut tools = SqlTools::new(db);
    agent.run(llm, question, &mut tools, events).await
}
