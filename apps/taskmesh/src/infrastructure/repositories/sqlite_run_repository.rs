use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::repositories::RunRepository;
use crate::domain::run::{AgentRunStatus, IterationRecord, NewAgent, NewIteration, NewRun, RunOutcome};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY,
        task TEXT NOT NULL,
        manager_subtasks TEXT NOT NULL,
        manager_summary TEXT,
        total_time REAL,
        total_tokens INTEGER,
        model_name TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agents (
        id TEXT PRIMARY KEY,
        run_id TEXT NOT NULL REFERENCES runs(id),
        agent_name TEXT NOT NULL,
        assigned_subtask TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        status TEXT NOT NULL,
        exit_reason TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agent_iterations (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL REFERENCES agents(id),
        iteration INTEGER NOT NULL,
        subtask_index INTEGER NOT NULL,
        prompt TEXT,
        response TEXT NOT NULL,
        duration REAL NOT NULL,
        tokens_used INTEGER NOT NULL,
        error TEXT,
        created_at TEXT NOT NULL
    )
    "#,
];

/// SQLite implementation of RunRepository
pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    /// Creates a repository over an existing pool
    ///
    /// # Arguments
    /// * `pool` - SQLx connection pool for SQLite
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and creates the schema if needed
    pub async fn connect(database_url: &str) -> Result<Self, String> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| format!("Failed to connect to database: {}", e))?;

        let repository = Self::new(pool);
        repository.init_schema().await?;
        Ok(repository)
    }

    /// Private in-memory database; one connection so every query sees the same data
    pub async fn in_memory() -> Result<Self, String> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| format!("Failed to open in-memory database: {}", e))?;

        let repository = Self::new(pool);
        repository.init_schema().await?;
        Ok(repository)
    }

    /// Creates the tables if they do not exist
    pub async fn init_schema(&self) -> Result<(), String> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .map_err(|e| format!("Failed to create schema: {}", e))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw).map_err(|e| format!("Invalid stored id {}: {}", raw, e))
}

fn iteration_from_row(row: &SqliteRow) -> Result<IterationRecord, String> {
    let read = |e: sqlx::Error| format!("Failed to read iteration: {}", e);

    Ok(IterationRecord {
        id: parse_uuid(&row.try_get::<String, _>("id").map_err(read)?)?,
        agent_id: parse_uuid(&row.try_get::<String, _>("agent_id").map_err(read)?)?,
        iteration_index: row.try_get::<i64, _>("iteration").map_err(read)? as usize,
        subtask_index: row.try_get::<i64, _>("subtask_index").map_err(read)? as usize,
        prompt: row.try_get("prompt").map_err(read)?,
        response: row.try_get("response").map_err(read)?,
        duration_secs: row.try_get("duration").map_err(read)?,
        approx_tokens: row.try_get::<i64, _>("tokens_used").map_err(read)? as usize,
        error: row.try_get("error").map_err(read)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(read)?,
    })
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn create_run(&self, run: &NewRun) -> Result<Uuid, String> {
        let id = Uuid::new_v4();
        let subtasks = serde_json::to_string(&run.subtasks)
            .map_err(|e| format!("Failed to encode subtasks: {}", e))?;

        sqlx::query(
            r#"
            INSERT INTO runs (id, task, manager_subtasks, model_name, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&run.task)
        .bind(subtasks)
        .bind(&run.model_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save run: {}", e))?;

        Ok(id)
    }

    async fn create_agent(&self, agent: &NewAgent) -> Result<Uuid, String> {
        let id = Uuid::new_v4();
        let assigned = serde_json::to_string(&agent.assigned_subtasks)
            .map_err(|e| format!("Failed to encode subtasks: {}", e))?;

        sqlx::query(
            r#"
            INSERT INTO agents (id, run_id, agent_name, assigned_subtask, started_at, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(agent.run_id.to_string())
        .bind(&agent.name)
        .bind(assigned)
        .bind(Utc::now())
        .bind(AgentRunStatus::Running.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save agent: {}", e))?;

        Ok(id)
    }

    async fn record_iteration(&self, iteration: &NewIteration) -> Result<Uuid, String> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO agent_iterations (
                id, agent_id, iteration, subtask_index, prompt, response,
                duration, tokens_used, error, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(iteration.agent_id.to_string())
        .bind(iteration.iteration_index as i64)
        .bind(iteration.subtask_index as i64)
        .bind(&iteration.prompt)
        .bind(&iteration.response)
        .bind(iteration.duration.as_secs_f64())
        .bind(iteration.approx_tokens as i64)
        .bind(&iteration.error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save iteration: {}", e))?;

        Ok(id)
    }

    async fn assigned_subtasks(&self, agent_id: Uuid) -> Result<Option<Vec<String>>, String> {
        let row = sqlx::query("SELECT assigned_subtask FROM agents WHERE id = ?")
            .bind(agent_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to find agent by id: {}", e))?;

        match row {
            Some(row) => {
                let raw: String = row
                    .try_get("assigned_subtask")
                    .map_err(|e| format!("Failed to read agent: {}", e))?;
                serde_json::from_str(&raw)
                    .map(Some)
                    .map_err(|e| format!("Stored subtasks are not a JSON list: {}", e))
            }
            None => Ok(None),
        }
    }

    async fn finish_agent(
        &self,
        agent_id: Uuid,
        status: AgentRunStatus,
        exit_reason: Option<&str>,
    ) -> Result<(), String> {
        let row = sqlx::query("SELECT status FROM agents WHERE id = ?")
            .bind(agent_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to find agent by id: {}", e))?
            .ok_or_else(|| format!("Agent not found: {}", agent_id))?;

        let current: AgentRunStatus = row
            .try_get::<String, _>("status")
            .map_err(|e| format!("Failed to read agent: {}", e))?
            .parse()?;
        if !current.can_transition_to(status) {
            return Err(format!(
                "Agent {} cannot move from {} to {}",
                agent_id, current, status
            ));
        }

        sqlx::query(
            r#"
            UPDATE agents SET status = ?, exit_reason = ?, finished_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(exit_reason)
        .bind(Utc::now())
        .bind(agent_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to update agent: {}", e))?;

        Ok(())
    }

    async fn finish_run(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<(), String> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET manager_summary = ?, total_time = ?, total_tokens = ?
            WHERE id = ?
            "#,
        )
        .bind(&outcome.manager_summary)
        .bind(outcome.total_time.as_secs_f64())
        .bind(outcome.total_tokens as i64)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to update run: {}", e))?;

        if result.rows_affected() == 0 {
            return Err(format!("Run not found: {}", run_id));
        }

        Ok(())
    }

    async fn iterations_for(&self, agent_id: Uuid) -> Result<Vec<IterationRecord>, String> {
        let rows = sqlx::query(
            r#"
            SELECT id, agent_id, iteration, subtask_index, prompt, response,
                   duration, tokens_used, error, created_at
            FROM agent_iterations
            WHERE agent_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(agent_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to find iterations: {}", e))?;

        rows.iter().map(iteration_from_row).collect()
    }
}
