pub mod err;
pub mod model;
pub mod sink;

pub use self::err::*;
use self::{model::WorkItem, sink::ResultSink};
use crate::judge::{judge, JudgeContext};
use futures::prelude::*;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::wrappers::LinesStream;
use tracing::info_span;
use tracing_futures::Instrument;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Decode newline-delimited JSON work items.
///
/// Blank lines are ignored. Lines that fail to decode are logged and skipped,
/// and a read error ends the stream.
pub fn work_items_from_lines<R>(reader: R) -> impl Stream<Item = WorkItem>
where
    R: AsyncBufRead + Unpin,
{
    LinesStream::new(reader.lines())
        .take_while(|line| {
            let ok = match line {
                Ok(_) => true,
                Err(e) => {
                    tracing::error!("Failed to read work items: {}", e);
                    false
                }
            };
            future::ready(ok)
        })
        .filter_map(|line| async move {
            let line = line.ok()?;
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match serde_json::from_str::<WorkItem>(line) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("Skipping undecodable work item: {}", e);
                    None
                }
            }
        })
}

/// Judge every work item of `items`, at most `max_concurrent_jobs` at a time,
/// and hand each judgement to `sink`.
///
/// No new item is taken once `stop` is set; items already being judged run
/// to completion. Returns the number of judgements delivered.
pub async fn consume_work_items<S>(
    items: S,
    ctx: Arc<JudgeContext>,
    sink: Arc<dyn ResultSink>,
    max_concurrent_jobs: usize,
    stop: &AtomicBool,
) -> usize
where
    S: Stream<Item = WorkItem>,
{
    items
        .take_until(stop_requested(stop))
        .map(|item| {
            let ctx = ctx.clone();
            let sink = sink.clone();
            let span = info_span!("work_item", id = %item.correlation_id);
            async move {
                let judgement = judge(&item, &ctx).await;
                match sink.put(&item.correlation_id, &judgement).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!("Failed to store judgement: {:#}", e);
                        false
                    }
                }
            }
            .instrument(span)
        })
        .buffer_unordered(max_concurrent_jobs.max(1))
        .filter(|delivered| future::ready(*delivered))
        .count()
        .await
}

/// Resolves once `stop` has been set.
async fn stop_requested(stop: &AtomicBool) {
    let mut tick = tokio::time::interval(STOP_POLL_INTERVAL);
    while !stop.load(Ordering::SeqCst) {
        tick.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq as pretty_eq;

    #[tokio::test]
    async fn decodes_lines_and_skips_garbage() {
        let input = concat!(
            r#"{"correlationId":"a","code":"","language":"c","timeLimitMs":1,"memoryLimitMb":1}"#,
            "\n\nnot json\n",
            r#"{"commit_id":"b","code":"","language":"c","time_limit":1,"memory_limit":1,"test_cases":[]}"#,
            "\n"
        );
        let items: Vec<_> = work_items_from_lines(input.as_bytes())
            .map(|i| i.correlation_id)
            .collect()
            .await;
        pretty_eq!(items, vec!["a".to_string(), "b".to_string()]);
    }
}
