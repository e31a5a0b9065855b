//! Operator subcommands over the ledger: `migrate` and `history`.

use cadastre_storage::{HistoryFilter, QueryLedger, QueryRecord, SqliteLedger};
use cadastre_verify::validate_cadastral_number;
use time::format_description::well_known::Rfc3339;

use crate::config::MEMORY_DATABASE;
use crate::OutputFormat;

#[derive(Debug, thiserror::Error)]
enum OperatorError {
    #[error("the in-memory ledger cannot be migrated or read back; pass a sqlite:// URL")]
    MemoryDatabase,
}

async fn connect(database: &str) -> Result<SqliteLedger, Box<dyn std::error::Error>> {
    if database == MEMORY_DATABASE {
        return Err(OperatorError::MemoryDatabase.into());
    }
    Ok(SqliteLedger::connect(database).await?)
}

/// `cadastre migrate`: create the ledger table and indexes.
pub(crate) async fn cmd_migrate(
    database: &str,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = connect(database).await?;
    ledger.init_schema().await?;
    ledger.close().await;
    tracing::info!(database, "schema applied");
    if !quiet {
        println!("schema applied to {database}");
    }
    Ok(())
}

/// `cadastre history`: print recorded queries in ledger order.
pub(crate) async fn cmd_history(
    database: &str,
    cadastral_number: Option<&str>,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match cadastral_number {
        Some(n) => {
            validate_cadastral_number(n)?;
            HistoryFilter::by_cadastral_number(n)
        }
        None => HistoryFilter::all(),
    };

    let ledger = connect(database).await?;
    let records = ledger.list(&filter).await;
    ledger.close().await;
    let records = records?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("no queries recorded");
            }
            for record in &records {
                println!("{}", format_record(record)?);
            }
        }
    }
    Ok(())
}

fn format_record(record: &QueryRecord) -> Result<String, time::error::Format> {
    Ok(format!(
        "#{:<6} {}  {:<25} ({:.6}, {:.6})  {:<8} {:.3}s",
        record.id,
        record.requested_at.format(&Rfc3339)?,
        record.cadastral_number,
        record.latitude,
        record.longitude,
        if record.verdict { "approved" } else { "denied" },
        record.latency().as_secs_f64(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn text_line_shows_verdict_and_latency() {
        let record = QueryRecord {
            id: 3,
            cadastral_number: "77:01:0001:123".to_string(),
            latitude: 55.75,
            longitude: 37.61,
            verdict: false,
            requested_at: datetime!(2025-03-01 12:00:00 UTC),
            resolved_at: datetime!(2025-03-01 12:00:02.5 UTC),
        };
        let line = format_record(&record).unwrap();
        assert!(line.starts_with("#3 "), "{line}");
        assert!(line.contains("2025-03-01T12:00:00Z"), "{line}");
        assert!(line.contains("(55.750000, 37.610000)"), "{line}");
        assert!(line.contains("denied"), "{line}");
        assert!(line.ends_with("2.500s"), "{line}");
    }

    #[tokio::test]
    async fn memory_database_is_refused() {
        assert!(cmd_migrate(MEMORY_DATABASE, true).await.is_err());
        assert!(cmd_history(MEMORY_DATABASE, None, OutputFormat::Text)
            .await
            .is_err());
    }
}
