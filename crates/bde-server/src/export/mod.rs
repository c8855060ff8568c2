//! Streaming exports
//!
//! Rows flow from the repository cursor straight through a format encoder
//! into an [`ExportSink`], one at a time; memory use is independent of row
//! count. NDJSON and CSV flush the sink every 100 rows and at end of
//! stream; the JSON array tracks the element boundary with a first-record
//! flag. Once the first bytes are written there is no way to signal an
//! error to the client; failures end the body and are logged server-side.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::models::{Resource, User};
use crate::repository::{Repositories, RowSink};

pub mod sink;

pub use sink::{BufferSink, ChannelSink, ExportSink};

/// Rows between sink flushes for the line-oriented formats.
const FLUSH_EVERY_ROWS: u64 = 100;

/// Fixed header for the users CSV export.
const USER_CSV_HEADER: [&str; 7] = [
    "id",
    "email",
    "name",
    "role",
    "active",
    "created_at",
    "updated_at",
];

/// Wire format for an export stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Ndjson,
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Ndjson => "ndjson",
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Ndjson => "application/x-ndjson",
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ndjson" => Ok(ExportFormat::Ndjson),
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(anyhow::anyhow!(
                "format must be one of: ndjson, json, csv"
            )),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streams resources into a sink in the requested format.
#[derive(Clone)]
pub struct ExportService {
    repos: Arc<Repositories>,
}

impl ExportService {
    pub fn new(repos: Arc<Repositories>) -> Self {
        Self { repos }
    }

    /// Row count for a resource, for callers sizing an export up front.
    pub async fn count(&self, resource: Resource) -> Result<i64> {
        match resource {
            Resource::Users => self.repos.users.count().await,
            Resource::Articles => self.repos.articles.count().await,
            Resource::Comments => self.repos.comments.count().await,
        }
    }

    /// Stream every row of `resource` into `sink` as `format`.
    ///
    /// CSV is only defined for users; other combinations are rejected
    /// before any byte is written.
    pub async fn stream(
        &self,
        resource: Resource,
        format: ExportFormat,
        sink: &mut dyn ExportSink,
    ) -> Result<()> {
        info!(resource = %resource, format = %format, "Starting export");

        let count = match (resource, format) {
            (Resource::Users, ExportFormat::Csv) => {
                let mut rows = CsvUserRows::new(sink);
                rows.start().await?;
                self.repos.users.stream_all(&mut rows).await?;
                rows.finish().await?
            }
            (_, ExportFormat::Csv) => {
                anyhow::bail!("CSV format only supported for users export")
            }
            (Resource::Users, ExportFormat::Ndjson) => {
                let mut rows = NdjsonRows::new(sink);
                self.repos.users.stream_all(&mut rows).await?;
                rows.finish().await?
            }
            (Resource::Articles, ExportFormat::Ndjson) => {
                let mut rows = NdjsonRows::new(sink);
                self.repos.articles.stream_all(&mut rows).await?;
                rows.finish().await?
            }
            (Resource::Comments, ExportFormat::Ndjson) => {
                let mut rows = NdjsonRows::new(sink);
                self.repos.comments.stream_all(&mut rows).await?;
                rows.finish().await?
            }
            (Resource::Users, ExportFormat::Json) => {
                let mut rows = JsonArrayRows::new(sink);
                rows.start().await?;
                self.repos.users.stream_all(&mut rows).await?;
                rows.finish().await?
            }
            (Resource::Articles, ExportFormat::Json) => {
                let mut rows = JsonArrayRows::new(sink);
                rows.start().await?;
                self.repos.articles.stream_all(&mut rows).await?;
                rows.finish().await?
            }
            (Resource::Comments, ExportFormat::Json) => {
                let mut rows = JsonArrayRows::new(sink);
                rows.start().await?;
                self.repos.comments.stream_all(&mut rows).await?;
                rows.finish().await?
            }
        };

        info!(count, resource = %resource, "Export completed");
        Ok(())
    }
}

/// One JSON object per row, newline-terminated.
struct NdjsonRows<'a> {
    out: &'a mut dyn ExportSink,
    count: u64,
}

impl<'a> NdjsonRows<'a> {
    fn new(out: &'a mut dyn ExportSink) -> Self {
        Self { out, count: 0 }
    }

    async fn finish(self) -> Result<u64> {
        self.out.flush().await?;
        Ok(self.count)
    }
}

#[async_trait]
impl<'a, T> RowSink<T> for NdjsonRows<'a>
where
    T: Serialize + Send + 'static,
{
    async fn accept(&mut self, row: T) -> Result<()> {
        let mut data = serde_json::to_vec(&row)?;
        data.push(b'\n');
        self.out.write(&data).await?;
        self.count += 1;
        if self.count % FLUSH_EVERY_ROWS == 0 {
            self.out.flush().await?;
        }
        Ok(())
    }
}

/// A single top-level JSON array; the boundary between elements is tracked
/// by a first-record flag so there is never a trailing comma.
struct JsonArrayRows<'a> {
    out: &'a mut dyn ExportSink,
    count: u64,
    first: bool,
}

impl<'a> JsonArrayRows<'a> {
    fn new(out: &'a mut dyn ExportSink) -> Self {
        Self {
            out,
            count: 0,
            first: true,
        }
    }

    async fn start(&mut self) -> Result<()> {
        self.out.write(b"[").await
    }

    async fn finish(self) -> Result<u64> {
        self.out.write(b"]").await?;
        self.out.flush().await?;
        Ok(self.count)
    }
}

#[async_trait]
impl<'a, T> RowSink<T> for JsonArrayRows<'a>
where
    T: Serialize + Send + 'static,
{
    async fn accept(&mut self, row: T) -> Result<()> {
        if !self.first {
            self.out.write(b",").await?;
        }
        self.first = false;

        let data = serde_json::to_vec(&row)?;
        self.out.write(&data).await?;
        self.count += 1;
        Ok(())
    }
}

/// Users as CSV with a fixed header row.
struct CsvUserRows<'a> {
    out: &'a mut dyn ExportSink,
    count: u64,
}

impl<'a> CsvUserRows<'a> {
    fn new(out: &'a mut dyn ExportSink) -> Self {
        Self { out, count: 0 }
    }

    async fn start(&mut self) -> Result<()> {
        let header = csv_line(USER_CSV_HEADER.iter().copied())?;
        self.out.write(&header).await
    }

    async fn finish(self) -> Result<u64> {
        self.out.flush().await?;
        Ok(self.count)
    }
}

#[async_trait]
impl<'a> RowSink<User> for CsvUserRows<'a> {
    async fn accept(&mut self, user: User) -> Result<()> {
        let active = if user.active { "true" } else { "false" };
        let created_at = user.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let updated_at = user.updated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let line = csv_line(
            [
                user.id.as_str(),
                user.email.as_str(),
                user.name.as_str(),
                user.role.as_str(),
                active,
                created_at.as_str(),
                updated_at.as_str(),
            ]
            .into_iter(),
        )?;
        self.out.write(&line).await?;

        self.count += 1;
        if self.count % FLUSH_EVERY_ROWS == 0 {
            self.out.flush().await?;
        }
        Ok(())
    }
}

/// Encode one CSV record (with trailing newline), quoting per RFC 4180.
fn csv_line<'f>(fields: impl Iterator<Item = &'f str>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut buf);
        writer.write_record(fields)?;
        writer.flush()?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_and_rejects() {
        assert_eq!("ndjson".parse::<ExportFormat>().unwrap(), ExportFormat::Ndjson);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn csv_line_quotes_embedded_delimiters() {
        let line = csv_line(["a", "with,comma", "with \"quote\""].into_iter()).unwrap();
        let text = String::from_utf8(line).unwrap();
        assert_eq!(text, "a,\"with,comma\",\"with \"\"quote\"\"\"\n");
    }
}
