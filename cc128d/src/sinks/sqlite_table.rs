use std::path::PathBuf;

use cc128_client::{
    db::{self, ChannelSample},
    domain::StampedReading,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::pipeline::{PipelineError, Sink};

/// `<database-path>:<table>`, split on the last colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTarget {
    pub database: PathBuf,
    pub table: String,
}

impl TableTarget {
    pub fn parse(target: &str) -> Result<Self, PipelineError> {
        let (database, table) = target.rsplit_once(':').ok_or_else(|| {
            PipelineError::Config(format!("missing table in database:table specification '{target}'"))
        })?;
        if database.is_empty() {
            return Err(PipelineError::Config(format!(
                "missing database in database:table specification '{target}'"
            )));
        }
        db::validate_table_name(table).map_err(|e| PipelineError::Config(e.to_string()))?;

        Ok(Self {
            database: PathBuf::from(database),
            table: table.to_string(),
        })
    }
}

/// Inserts one row per populated channel, one transaction per reading.
pub struct SqliteTableSink {
    pool: SqlitePool,
    table: String,
}

impl SqliteTableSink {
    pub async fn open(target: &str) -> Result<Self, PipelineError> {
        let target = TableTarget::parse(target)?;
        tracing::warn!(database = %target.database.display(), table = %target.table, "connecting to SQLite database");

        let options = SqliteConnectOptions::new()
            .filename(&target.database)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| PipelineError::Sink(format!("failed to open SQLite database: {e}")))?;

        db::ensure_table(&pool, &target.table)
            .await
            .map_err(|e| PipelineError::Sink(format!("failed to create table {}: {e}", target.table)))?;

        Ok(Self {
            pool,
            table: target.table,
        })
    }

    async fn insert_reading(&self, reading: &StampedReading) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for (idx, ch) in reading.reading.populated_channels() {
            let sample = ChannelSample {
                ts: reading.timestamp,
                channel: idx as i64,
                watts: f64::from(ch.watts),
            };
            db::insert_channel_sample(&mut tx, &self.table, &sample).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Sink for SqliteTableSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn append(&mut self, reading: &StampedReading) -> Result<(), PipelineError> {
        tracing::info!("writing rows to SQLite table");
        self.insert_reading(reading)
            .await
            .map_err(|e| PipelineError::Sink(format!("insert into {} failed: {e}", self.table)))
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        self.pool.close().await;
        Ok(())
    }
}
