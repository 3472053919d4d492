//! 只读 SQL 工具
//!
//! 为 SQL 助手 Agent 提供表清单、表结构、查询和查询校验四个能力。
//! 只允许 SELECT：语句必须以 SELECT 开头，且不能包含任何写操作关键字
//! （子串匹配，不区分大小写）。`created_at` 这类列名也会被拒绝；
//! 这是关键字黑名单，不是 SQL 解析器级别的保证。

use std::fmt::Display;

use phf::phf_ordered_set;
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, ColumnIndex, Decode, Row, Type};
use tracing::{debug, info};

use crate::error::SqlError;

/// 禁止出现在查询中的关键字，按声明顺序检查
static FORBIDDEN_KEYWORDS: phf::OrderedSet<&'static str> = phf_ordered_set! {
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE",
};

/// 查询结果最多展示的行数
pub const MAX_DISPLAY_ROWS: usize = 1000;

/// 校验 SQL 是否为只读查询，返回去掉首尾空白的语句
pub fn validate_select(sql: &str) -> Result<&str, SqlError> {
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(SqlError::EmptyStatement);
    }

    if !sql.to_ascii_uppercase().starts_with("SELECT") {
        return Err(SqlError::NotSelect {
            prefix: sql.chars().take(20).collect(),
        });
    }

    let upper = sql.to_ascii_uppercase();
    if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().find(|k| upper.contains(**k)) {
        return Err(SqlError::ForbiddenKeyword {
            keyword: keyword.to_string(),
        });
    }

    Ok(sql)
}

enum SqlPool {
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

/// 只读数据库访问
pub struct SqlDatabase {
    pool: SqlPool,
}

/// 表结构中的一列
#[derive(Debug, Clone, serde::Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub comment: String,
}

impl SqlDatabase {
    /// 连接数据库，支持 `mysql://`（兼容 `mysql+pymysql://` 写法）和 `sqlite:`
    pub async fn connect(url: &str) -> Result<Self, SqlError> {
        let url = url.trim();
        let pool = if let Some(rest) = url.strip_prefix("mysql") {
            let rest = rest.find("://").map(|i| &rest[i..]).unwrap_or(rest);
            let normalized = format!("mysql{}", rest);
            SqlPool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(5)
                    .connect(&normalized)
                    .await?,
            )
        } else if url.starts_with("sqlite:") {
            // 内存库只存在于单个连接中
            let max_connections = if url.contains(":memory:") { 1 } else { 5 };
            SqlPool::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect(url)
                    .await?,
            )
        } else {
            return Err(SqlError::UnsupportedBackend {
                url: url.split("://").next().unwrap_or_default().to_string(),
            });
        };

        info!("✅ 数据库连接成功");
        Ok(Self { pool })
    }

    /// 绕过只读校验执行语句，只用于测试建表
    #[cfg(test)]
    pub(crate) async fn execute_unchecked(&self, sql: &str) -> Result<(), SqlError> {
        match &self.pool {
            SqlPool::MySql(pool) => sqlx::query(sql).execute(pool).await.map(|_| ())?,
            SqlPool::Sqlite(pool) => sqlx::query(sql).execute(pool).await.map(|_| ())?,
        }
        Ok(())
    }

    /// 所有表名及注释
    pub async fn table_list(&self) -> Result<String, SqlError> {
        let tables: Vec<(String, String)> = match &self.pool {
            SqlPool::MySql(pool) => {
                sqlx::query_as(
                    "SELECT CAST(TABLE_NAME AS CHAR), CAST(IFNULL(TABLE_COMMENT, '') AS CHAR) \
                     FROM information_schema.TABLES \
                     WHERE TABLE_SCHEMA = DATABASE() ORDER BY TABLE_NAME",
                )
                .fetch_all(pool)
                .await?
            }
            SqlPool::Sqlite(pool) => {
                sqlx::query_as(
                    "SELECT name, '' FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )
                .fetch_all(pool)
                .await?
            }
        };

        let mut result = format!("总共有{}张表\n", tables.len());
        for (index, (name, comment)) in tables.iter().enumerate() {
            let comment = if comment.is_empty() { "无注释" } else { comment };
            result.push_str(&format!(
                "第{}张表: 表名: {}, 注释: {}\n",
                index + 1,
                name,
                comment
            ));
        }
        Ok(result)
    }

    /// 指定表的列信息
    pub async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, SqlError> {
        let columns = match &self.pool {
            SqlPool::MySql(pool) => {
                let rows: Vec<(String, String, String, Option<String>, String)> = sqlx::query_as(
                    "SELECT CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR), \
                     CAST(IS_NULLABLE AS CHAR), CAST(COLUMN_DEFAULT AS CHAR), \
                     CAST(IFNULL(COLUMN_COMMENT, '') AS CHAR) \
                     FROM information_schema.COLUMNS \
                     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
                )
                .bind(table)
                .fetch_all(pool)
                .await?;
                rows.into_iter()
                    .map(|(name, column_type, nullable, default, comment)| ColumnInfo {
                        name,
                        column_type,
                        nullable: nullable.eq_ignore_ascii_case("YES"),
                        default,
                        comment,
                    })
                    .collect()
            }
            SqlPool::Sqlite(pool) => {
                let rows: Vec<(String, String, i64, Option<String>)> = sqlx::query_as(
                    "SELECT name, type, \"notnull\", CAST(dflt_value AS TEXT) \
                     FROM pragma_table_info(?) ORDER BY cid",
                )
                .bind(table)
                .fetch_all(pool)
                .await?;
                rows.into_iter()
                    .map(|(name, column_type, not_null, default)| ColumnInfo {
                        name,
                        column_type,
                        nullable: not_null == 0,
                        default,
                        comment: String::new(),
                    })
                    .collect()
            }
        };
        Ok(columns)
    }

    /// 多张表的结构描述
    pub async fn table_schema(&self, tables: &[String]) -> Result<String, SqlError> {
        let mut result = String::new();
        for table in tables {
            let columns = self.table_columns(table).await?;
            let columns = serde_json::to_string(&columns).unwrap_or_default();
            result.push_str(&format!("表名: {}\n表架构: {}\n", table, columns));
        }
        Ok(result)
    }

    /// 执行只读查询，返回格式化后的结果
    pub async fn query(&self, sql: &str) -> Result<String, SqlError> {
        let sql = validate_select(sql)?;
        debug!("执行查询: {}", sql);

        let (columns, rows): (Vec<String>, Vec<Vec<Value>>) = match &self.pool {
            SqlPool::MySql(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                (column_names(rows.first()), rows.iter().map(mysql_values).collect())
            }
            SqlPool::Sqlite(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                (column_names(rows.first()), rows.iter().map(sqlite_values).collect())
            }
        };
        Ok(render_rows(&columns, &rows))
    }

    /// 校验查询：关键字检查 + EXPLAIN
    pub async fn check(&self, sql: &str) -> Result<String, SqlError> {
        let sql = validate_select(sql)?;
        let explain = format!("EXPLAIN {}", sql);

        let outcome = match &self.pool {
            SqlPool::MySql(pool) => sqlx::query(&explain).fetch_optional(pool).await.map(|_| ()),
            SqlPool::Sqlite(pool) => sqlx::query(&explain).fetch_optional(pool).await.map(|_| ()),
        };

        Ok(match outcome {
            Ok(()) => "验证成功: SQL语句语法正确，是一个有效的SELECT查询语句".to_string(),
            Err(e) => explain_failure(&e.to_string()),
        })
    }
}

fn explain_failure(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("doesn't exist")
        || lower.contains("unknown column")
        || lower.contains("no such table")
        || lower.contains("no such column")
    {
        format!(
            "验证失败: SQL语句中的表名或列名不存在。错误详情: {}",
            message
        )
    } else if lower.contains("syntax error") || lower.contains("sql syntax") {
        format!("验证失败: SQL语法错误。错误详情: {}", message)
    } else {
        format!("验证失败: {}", message)
    }
}

fn column_names<R: Row>(row: Option<&R>) -> Vec<String> {
    row.map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default()
}

/// 查询结果的文本形式，超过 [`MAX_DISPLAY_ROWS`] 的部分只提示不展示
pub fn render_rows(columns: &[String], rows: &[Vec<Value>]) -> String {
    if rows.is_empty() {
        return "SQL语句执行成功，但查询结果为空".to_string();
    }

    let total = rows.len();
    let mut result = format!(
        "SQL语句执行成功，共返回 {} 行数据\n列名: {}\n",
        total,
        columns.join(", ")
    );
    if total <= MAX_DISPLAY_ROWS {
        result.push_str(&format!("所有数据（共{}行）:\n", total));
    } else {
        result.push_str(&format!(
            "前{}行数据（共{}行，已显示前{}行）:\n",
            MAX_DISPLAY_ROWS, total, MAX_DISPLAY_ROWS
        ));
    }

    for (index, row) in rows.iter().take(MAX_DISPLAY_ROWS).enumerate() {
        let fields: Vec<String> = columns
            .iter()
            .zip(row)
            .map(|(column, value)| format!("'{}': {}", column, value))
            .collect();
        result.push_str(&format!("  第{}行: {{{}}}\n", index + 1, fields.join(", ")));
    }

    if total > MAX_DISPLAY_ROWS {
        result.push_str(&format!(
            "\n注意：查询结果共{}行，已显示前{}行。如需查看所有数据，请使用LIMIT和OFFSET进行分页查询。",
            total, MAX_DISPLAY_ROWS
        ));
    }
    result
}

fn cell<'r, R, T>(row: &'r R, index: usize) -> Option<Option<T>>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(index).ok()
}

fn json<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}

fn text<T: Display>(value: Option<T>) -> Value {
    value
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}

fn bytes(value: Option<Vec<u8>>) -> Value {
    match value {
        Some(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Value::String(s),
            Err(e) => Value::String(format!("<{} bytes>", e.as_bytes().len())),
        },
        None => Value::Null,
    }
}

fn mysql_values(row: &MySqlRow) -> Vec<Value> {
    (0..row.len())
        .map(|i| {
            if let Some(v) = cell::<_, i64>(row, i) {
                json(v)
            } else if let Some(v) = cell::<_, u64>(row, i) {
                json(v)
            } else if let Some(v) = cell::<_, f64>(row, i) {
                json(v)
            } else if let Some(v) = cell::<_, String>(row, i) {
                json(v)
            } else if let Some(v) = cell::<_, chrono::NaiveDateTime>(row, i) {
                text(v)
            } else if let Some(v) = cell::<_, chrono::NaiveDate>(row, i) {
                text(v)
            } else if let Some(v) = cell::<_, chrono::NaiveTime>(row, i) {
                text(v)
            } else if let Ok(v) = row.try_get_unchecked::<Option<String>, _>(i) {
                // DECIMAL 等以文本形式传输的类型
                json(v)
            } else {
                Value::String("<unsupported>".to_string())
            }
        })
        .collect()
}

fn sqlite_values(row: &SqliteRow) -> Vec<Value> {
    (0..row.len())
        .map(|i| {
            if let Some(v) = cell::<_, i64>(row, i) {
                json(v)
            } else if let Some(v) = cell::<_, f64>(row, i) {
                json(v)
            } else if let Some(v) = cell::<_, String>(row, i) {
                json(v)
            } else if let Some(v) = cell::<_, Vec<u8>>(row, i) {
                bytes(v)
            } else {
                Value::String("<unsupported>".to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_select() {
        assert_eq!(
            validate_select("  select id, name from users  ").unwrap(),
            "select id, name from users"
        );
    }

    #[test]
    fn test_validate_rejects_non_select() {
        let err = validate_select("UPDATE users SET name = 'x'").unwrap_err();
        assert!(matches!(err, SqlError::NotSelect { .. }));
        assert!(err.to_string().contains("UPDATE users SET na"));

        assert!(matches!(validate_select("   "), Err(SqlError::EmptyStatement)));
    }

    #[test]
    fn test_validate_rejects_forbidden_keywords() {
        for sql in [
            "SELECT 1; DROP TABLE users",
            "select * from t; delete from t",
            "SELECT * FROM t WHERE 1=1; Insert into t values (1)",
            "SELECT 1;truncate t",
        ] {
            assert!(
                matches!(validate_select(sql), Err(SqlError::ForbiddenKeyword { .. })),
                "{} should be rejected",
                sql
            );
        }
    }

    #[test]
    fn test_keyword_inside_identifier_is_rejected() {
        for (sql, keyword) in [
            ("SELECT updated_at FROM t", "UPDATE"),
            ("SELECT * FROM dropdown", "DROP"),
            ("SELECT created FROM t", "CREATE"),
        ] {
            let err = validate_select(sql).unwrap_err();
            assert!(
                matches!(&err, SqlError::ForbiddenKeyword { keyword: k } if k == keyword),
                "{} should be rejected for {}",
                sql,
                keyword
            );
            assert_eq!(
                err.to_string(),
                format!("SQL语句包含危险操作 '{}'，只允许执行SELECT查询语句", keyword)
            );
        }
        assert!(validate_select("SELECT id, name FROM users WHERE id = 1").is_ok());

        // 多个关键字时报告声明顺序中的第一个
        let err = validate_select("SELECT created_at, updated_at FROM t").unwrap_err();
        assert!(matches!(err, SqlError::ForbiddenKeyword { keyword } if keyword == "UPDATE"));
    }

    #[test]
    fn test_render_rows_truncates() {
        let columns = vec!["id".to_string()];
        let rows: Vec<Vec<Value>> = (0..1001).map(|i| vec![Value::from(i)]).collect();
        let output = render_rows(&columns, &rows);
        assert!(output.contains("共返回 1001 行数据"));
        assert!(output.contains("第1000行: {'id': 999}"));
        assert!(!output.contains("第1001行"));
        assert!(output.contains("请使用LIMIT和OFFSET进行分页查询"));

        assert_eq!(render_rows(&columns, &[]), "SQL语句执行成功，但查询结果为空");
    }

    async fn sample_db() -> SqlDatabase {
        let db = SqlDatabase::connect("sqlite::memory:").await.unwrap();
        db.execute_unchecked(
            "CREATE TABLE devices (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL, note TEXT)",
        )
        .await
        .unwrap();
        db.execute_unchecked("INSERT INTO devices (name, score, note) VALUES ('iPhone', 9.5, NULL), ('Pixel', 8.0, 'android')")
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_sqlite_tools() {
        let db = sample_db().await;

        let tables = db.table_list().await.unwrap();
        assert!(tables.starts_with("总共有1张表"));
        assert!(tables.contains("表名: devices, 注释: 无注释"));

        let schema = db.table_schema(&["devices".to_string()]).await.unwrap();
        assert!(schema.contains("表名: devices"));
        assert!(schema.contains(r#""name":"name""#));

        let result = db.query("SELECT id, name, score, note FROM devices ORDER BY id").await.unwrap();
        assert!(result.contains("共返回 2 行数据"));
        assert!(result.contains(r#"第1行: {'id': 1, 'name': "iPhone", 'score': 9.5, 'note': null}"#));
    }

    #[tokio::test]
    async fn test_sqlite_check() {
        let db = sample_db().await;
        assert!(db.check("SELECT * FROM devices").await.unwrap().starts_with("验证成功"));
        assert!(db
            .check("SELECT * FROM missing_table")
            .await
            .unwrap()
            .contains("表名或列名不存在"));
        assert!(db.check("DELETE FROM devices").await.is_err());
    }

    #[tokio::test]
    async fn test_unsupported_backend() {
        let err = SqlDatabase::connect("postgres://localhost/db").await.err().unwrap();
        assert!(matches!(err, SqlError::UnsupportedBackend { .. }));
    }
}
