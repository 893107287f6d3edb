//! Destinations of finished judgements.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;
use tokio::{io::AsyncWriteExt, sync::Mutex};

use super::model::Judgement;
use crate::util::names::transform_string_as_dir_name;

/// Where judgements go once they are complete.
///
/// A judgement is only ever put once it is complete; a correlation id with
/// nothing stored yet is pending.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn put(&self, correlation_id: &str, judgement: &Judgement) -> Result<()>;
}

/// Keeps judgements in memory, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: DashMap<String, Judgement>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        Self::default()
    }

    /// `None` means the judgement is still pending.
    pub fn lookup(&self, correlation_id: &str) -> Option<Judgement> {
        self.results.get(correlation_id).map(|j| j.value().clone())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn put(&self, correlation_id: &str, judgement: &Judgement) -> Result<()> {
        self.results.insert(correlation_id.to_owned(), judgement.clone());
        Ok(())
    }
}

/// Writes each judgement to `<dir>/<id>.json`.
///
/// The file appears atomically, so readers never see a partial judgement.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<DirectorySink> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;
        Ok(DirectorySink { dir })
    }

    pub fn path_of(&self, correlation_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", transform_string_as_dir_name(correlation_id)))
    }
}

#[async_trait]
impl ResultSink for DirectorySink {
    async fn put(&self, correlation_id: &str, judgement: &Judgement) -> Result<()> {
        let target = self.path_of(correlation_id);
        let tmp = self.dir.join(format!(
            ".{}.{:08x}.tmp",
            transform_string_as_dir_name(correlation_id),
            rand::random::<u32>()
        ));
        let data = serde_json::to_vec_pretty(judgement)?;
        tokio::fs::write(&tmp, data)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .with_context(|| format!("Failed to move judgement into {:?}", target))?;
        tracing::debug!(?target, "Judgement stored");
        Ok(())
    }
}

/// Prints one JSON line per judgement to standard output.
#[derive(Debug)]
pub struct StdoutSink {
    out: Mutex<tokio::io::Stdout>,
}

impl StdoutSink {
    pub fn new() -> StdoutSink {
        StdoutSink {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultSink for StdoutSink {
    async fn put(&self, _correlation_id: &str, judgement: &Judgement) -> Result<()> {
        let mut line = serde_json::to_vec(judgement)?;
        line.push(b'\n');
        // Lines of concurrent judgements must not interleave
        let mut out = self.out.lock().await;
        out.write_all(&line).await?;
        out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::model::Verdict;
    use pretty_assertions::assert_eq as pretty_eq;

    #[tokio::test]
    async fn memory_sink_reports_pending_as_none() {
        let sink = MemorySink::new();
        assert_eq!(sink.lookup("a"), None);
        let j = Judgement::compile_error("a", "main.c:1: error".into());
        sink.put("a", &j).await.unwrap();
        pretty_eq!(sink.lookup("a"), Some(j));
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn directory_sink_writes_whole_files() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path().join("out")).await.unwrap();
        let j = Judgement::internal_error("x/../y", "boom".into());
        sink.put("x/../y", &j).await.unwrap();

        let path = sink.path_of("x/../y");
        assert_eq!(path.parent().unwrap(), tmp.path().join("out"));
        let read: Judgement =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(read.verdicts(), vec![Verdict::InternalError]);

        // no temporary files left behind
        let mut entries = tokio::fs::read_dir(tmp.path().join("out")).await.unwrap();
        let mut names = vec![];
        while let Some(e) = entries.next_entry().await.unwrap() {
            names.push(e.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["x__..__y.json".to_string()]);
    }
}
