use anyhow::Result;
use sqlx::{SqliteConnection, SqlitePool};
use time::OffsetDateTime;

/// One row of a readings table: the power seen on one channel at one instant.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ChannelSample {
    pub ts: OffsetDateTime,
    /// Zero-based channel index.
    pub channel: i64,
    pub watts: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid table name '{0}': expected letters, digits and underscores")]
pub struct InvalidTableName(pub String);

/// Table names are interpolated into SQL, so only plain identifiers are
/// accepted.
pub fn validate_table_name(table: &str) -> Result<(), InvalidTableName> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(InvalidTableName(table.to_string()))
    }
}

/// Create the readings table unless it already exists.
pub async fn ensure_table(pool: &SqlitePool, table: &str) -> Result<()> {
    validate_table_name(table)?;

    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            TS      TIMESTAMP NOT NULL,
            CHANNEL INTEGER NOT NULL,
            WATTS   FLOAT NOT NULL
        )
        "#
    );
    sqlx::query(&sql).execute(pool).await?;

    Ok(())
}

/// Insert a single channel sample. Callers own the surrounding transaction.
pub async fn insert_channel_sample(
    conn: &mut SqliteConnection,
    table: &str,
    sample: &ChannelSample,
) -> Result<()> {
    validate_table_name(table)?;

    let sql = format!(r#"INSERT INTO "{table}" (TS, CHANNEL, WATTS) VALUES (?, ?, ?)"#);
    sqlx::query(&sql)
        .bind(sample.ts)
        .bind(sample.channel)
        .bind(sample.watts)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Fetch the time-ordered samples recorded for one channel.
pub async fn channel_history(pool: &SqlitePool, table: &str, channel: i64) -> Result<Vec<ChannelSample>> {
    validate_table_name(table)?;

    let sql = format!(
        r#"
        SELECT
            TS      AS ts,
            CHANNEL AS channel,
            WATTS   AS watts
        FROM "{table}"
        WHERE CHANNEL = ?
        ORDER BY TS
        "#
    );
    let rows = sqlx::query_as::<_, ChannelSample>(&sql)
        .bind(channel)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
