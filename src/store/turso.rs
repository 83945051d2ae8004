use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::ChatStore;
use crate::models::{Conversation, Message, MessageRole};

const CONVERSATION_COLUMNS: &str = "id, last_message, ai_enabled, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, role, message, created_at";

/// Positional statement argument in the Hrana wire encoding
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Arg {
    Integer { value: String },
    Text { value: String },
}

impl Arg {
    fn text(value: impl Into<String>) -> Self {
        Arg::Text { value: value.into() }
    }

    fn integer(value: i64) -> Self {
        Arg::Integer { value: value.to_string() }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Statement {
    sql: String,
    args: Vec<Arg>,
}

impl Statement {
    fn new(sql: impl Into<String>, args: Vec<Arg>) -> Self {
        Self { sql: sql.into(), args }
    }

    fn plain(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

#[derive(Debug, Default)]
struct QueryResult {
    rows: Vec<Vec<Value>>,
}

impl QueryResult {
    fn from_json(result: &Value) -> Self {
        let rows = result["rows"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| row.as_array().cloned().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();
        Self { rows }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    // Fixed-width so that ORDER BY on the text column is chronological.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn cell_str(cell: &Value) -> Option<&str> {
    cell["value"].as_str()
}

fn cell_required<'a>(row: &'a [Value], idx: usize, name: &str) -> Result<&'a str> {
    row.get(idx)
        .and_then(cell_str)
        .with_context(|| format!("Missing column {}", name))
}

fn parse_time(raw: &str, name: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Failed to parse {}", name))?
        .with_timezone(&Utc))
}

fn row_to_conversation(row: &[Value]) -> Result<Conversation> {
    let ai_enabled = cell_required(row, 2, "ai_enabled")?
        .parse::<i64>()
        .context("Invalid ai_enabled value")?;

    Ok(Conversation {
        id: cell_required(row, 0, "id")?.to_string(),
        last_message: row.get(1).and_then(cell_str).map(String::from),
        ai_enabled: ai_enabled != 0,
        created_at: parse_time(cell_required(row, 3, "created_at")?, "created_at")?,
        updated_at: parse_time(cell_required(row, 4, "updated_at")?, "updated_at")?,
    })
}

fn row_to_message(row: &[Value]) -> Result<Message> {
    let role_str = cell_required(row, 2, "role")?;
    let role = MessageRole::parse(role_str).with_context(|| format!("Invalid role: {}", role_str))?;

    Ok(Message {
        id: cell_required(row, 0, "id")?.to_string(),
        conversation_id: cell_required(row, 1, "conversation_id")?.to_string(),
        role,
        text: cell_required(row, 3, "message")?.to_string(),
        created_at: parse_time(cell_required(row, 4, "created_at")?, "created_at")?,
    })
}

fn upsert_conversation_stmt(id: &str, last_message: &str, now: DateTime<Utc>) -> Statement {
    Statement::new(
        format!(
            "INSERT INTO conversations (id, last_message, ai_enabled, created_at, updated_at) \
             VALUES (?1, ?2, 1, ?3, ?3) \
             ON CONFLICT(id) DO UPDATE SET last_message = excluded.last_message, updated_at = excluded.updated_at \
             RETURNING {}",
            CONVERSATION_COLUMNS
        ),
        vec![Arg::text(id), Arg::text(last_message), Arg::text(timestamp(now))],
    )
}

fn insert_message_stmt(message: &Message) -> Statement {
    Statement::new(
        format!("INSERT INTO messages ({}) VALUES (?1, ?2, ?3, ?4, ?5)", MESSAGE_COLUMNS),
        vec![
            Arg::text(&message.id),
            Arg::text(&message.conversation_id),
            Arg::text(message.role.as_str()),
            Arg::text(&message.text),
            Arg::text(timestamp(message.created_at)),
        ],
    )
}

/// Conversation storage on Turso (libSQL) through its HTTP pipeline API
pub struct TursoStore {
    client: Client,
    database_url: String,
    auth_token: String,
}

impl TursoStore {
    pub fn new(database_url: String, auth_token: String) -> Self {
        Self {
            client: Client::new(),
            database_url: database_url
                .trim_end_matches('/')
                .replace("libsql://", "https://"),
            // Tokens pasted from dashboards often carry trailing whitespace
            auth_token: auth_token.trim().to_string(),
        }
    }

    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str, auth_token: &str) -> Result<Self> {
        let store = Self::new(database_url.to_string(), auth_token.to_string());
        store.initialize().await?;
        Ok(store)
    }

    async fn pipeline(&self, request: Value) -> Result<Value> {
        let url = format!("{}/v2/pipeline", self.database_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(&json!({ "requests": [request, { "type": "close" }] }))
            .send()
            .await
            .context("Failed to send request to Turso")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Turso request failed with status {}: {}", status, text);
        }

        let body: Value = response.json().await.context("Invalid Turso response body")?;
        let first = body["results"]
            .as_array()
            .and_then(|r| r.first())
            .cloned()
            .context("Invalid response format")?;

        if first["type"] == "error" {
            anyhow::bail!(
                "Turso statement failed: {}",
                first["error"]["message"].as_str().unwrap_or("unknown error")
            );
        }

        Ok(first["response"]["result"].clone())
    }

    async fn execute(&self, stmt: Statement) -> Result<QueryResult> {
        debug!(sql = %stmt.sql, "turso execute");
        let result = self
            .pipeline(json!({ "type": "execute", "stmt": stmt }))
            .await?;
        Ok(QueryResult::from_json(&result))
    }

    /// Run statements inside one transaction. Every step after BEGIN only runs
    /// if its predecessor succeeded; a ROLLBACK runs if COMMIT did not.
    async fn transaction(&self, statements: Vec<Statement>) -> Result<Vec<QueryResult>> {
        let count = statements.len();
        let mut steps = vec![json!({ "stmt": Statement::plain("BEGIN IMMEDIATE") })];
        for (i, stmt) in statements.into_iter().enumerate() {
            steps.push(json!({
                "condition": { "type": "ok", "step": i },
                "stmt": stmt,
            }));
        }
        let commit_step = count + 1;
        steps.push(json!({
            "condition": { "type": "ok", "step": count },
            "stmt": Statement::plain("COMMIT"),
        }));
        steps.push(json!({
            "condition": { "type": "not", "cond": { "type": "ok", "step": commit_step } },
            "stmt": Statement::plain("ROLLBACK"),
        }));

        let result = self
            .pipeline(json!({ "type": "batch", "batch": { "steps": steps } }))
            .await?;

        if let Some(errors) = result["step_errors"].as_array() {
            if let Some(err) = errors.iter().take(commit_step + 1).find(|e| !e.is_null()) {
                anyhow::bail!(
                    "Turso transaction failed: {}",
                    err["message"].as_str().unwrap_or("unknown error")
                );
            }
        }

        let step_results = result["step_results"]
            .as_array()
            .context("Invalid batch response format")?;

        // Skip BEGIN, keep only the caller's statements.
        Ok(step_results
            .iter()
            .skip(1)
            .take(count)
            .map(QueryResult::from_json)
            .collect())
    }

    /// Initialize the database schema
    pub async fn initialize(&self) -> Result<()> {
        self.execute(Statement::plain(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                last_message TEXT,
                ai_enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        ))
        .await?;

        self.execute(Statement::plain(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                role TEXT NOT NULL CHECK (role IN ('user', 'ai', 'admin')),
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        ))
        .await?;

        self.execute(Statement::plain(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation_id
             ON messages(conversation_id, created_at)",
        ))
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ChatStore for TursoStore {
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<(Conversation, Message)> {
        let message = Message::new(conversation_id.to_string(), role, text.to_string());

        let results = self
            .transaction(vec![
                upsert_conversation_stmt(conversation_id, text, message.created_at),
                insert_message_stmt(&message),
            ])
            .await?;

        let row = results
            .first()
            .and_then(|r| r.rows.first())
            .context("Upsert returned no conversation row")?;
        let conversation = row_to_conversation(row)?;

        Ok((conversation, message))
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let result = self
            .execute(Statement::new(
                format!(
                    "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
                    MESSAGE_COLUMNS
                ),
                vec![Arg::text(conversation_id)],
            ))
            .await?;

        result.rows.iter().map(|row| row_to_message(row)).collect()
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let result = self
            .execute(Statement::plain(format!(
                "SELECT {} FROM conversations ORDER BY created_at DESC, id ASC",
                CONVERSATION_COLUMNS
            )))
            .await?;

        result.rows.iter().map(|row| row_to_conversation(row)).collect()
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let result = self
            .execute(Statement::new(
                format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS),
                vec![Arg::text(conversation_id)],
            ))
            .await?;

        result.rows.first().map(|row| row_to_conversation(row)).transpose()
    }

    async fn set_ai_enabled(
        &self,
        conversation_id: &str,
        enabled: bool,
    ) -> Result<Option<Conversation>> {
        let result = self
            .execute(Statement::new(
                format!(
                    "UPDATE conversations SET ai_enabled = ?1, updated_at = ?2 WHERE id = ?3 RETURNING {}",
                    CONVERSATION_COLUMNS
                ),
                vec![
                    Arg::integer(i64::from(enabled)),
                    Arg::text(timestamp(Utc::now())),
                    Arg::text(conversation_id),
                ],
            ))
            .await?;

        result.rows.first().map(|row| row_to_conversation(row)).transpose()
    }
}
