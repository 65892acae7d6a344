//! Socket server.
//!
//! Accepts connections on the cache's Unix socket and serves JSON-lines
//! requests. Each connection is a tracked task; each `list` query runs on a
//! tracked blocking thread and streams fixed-size batches back through a
//! bounded channel, so shutdown waits for in-flight queries before the store
//! is closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::Instrument;

use super::metrics;
use super::observability::spans;
use super::protocol::{self, FileItem, ListRequest, Request, Response, MAX_LINE_LENGTH};
use crate::cache::CacheHandle;
use crate::error::ServerError;
use crate::storage::{FetchOptions, PathStore};
use crate::Result;

/// Batches buffered between a query thread and its connection.
const QUERY_QUEUE_DEPTH: usize = 4;

/// How long an in-flight `list` may keep streaming after shutdown begins.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How long to try telling a client its query was abandoned.
const ABORT_NOTICE_TIMEOUT: Duration = Duration::from_millis(100);

type Connection = Framed<UnixStream, LinesCodec>;

/// Output of a query thread.
enum Chunk {
    Files(Vec<FileItem>),
    Failed(String),
}

/// Accept connections until shutdown begins.
pub async fn serve(listener: UnixListener, cache: CacheHandle) {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    tracing::info!("Server listening");
    loop {
        let accepted = tokio::select! {
            () = cache.shutdown_token().cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, _)) => {
                let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
                let conn = cache.clone();
                cache
                    .tracker()
                    .spawn(handle_connection(stream, conn).instrument(spans::connection_span(id)));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
            }
        }
    }
    tracing::debug!("Stopped accepting connections");
}

/// Serve requests on one connection until the client hangs up, a transport
/// error occurs, or shutdown begins while the connection is idle.
///
/// A response still being written when shutdown begins gets
/// [`SHUTDOWN_GRACE`] to finish before it is abandoned, so a client that
/// stopped reading cannot hold the cache open.
async fn handle_connection(stream: UnixStream, cache: CacheHandle) {
    let mut conn = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    tracing::debug!("Client connected");

    let deadline = async {
        cache.shutdown_token().cancelled().await;
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    };
    tokio::pin!(deadline);

    loop {
        let line = tokio::select! {
            () = cache.shutdown_token().cancelled() => break,
            line = conn.next() => line,
        };

        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Connection read failed");
                break;
            }
            None => break,
        };

        if line.trim().is_empty() {
            continue;
        }

        // Dropping an unfinished response also drops its query channel,
        // which stops the query thread.
        let outcome = tokio::select! {
            () = &mut deadline => {
                send_abandoned(&mut conn).await;
                break;
            }
            outcome = respond(&mut conn, &cache, &line) => outcome,
        };

        if let Err(e) = outcome {
            tracing::debug!(error = %e, "Connection closed during response");
            break;
        }
    }
    tracing::debug!("Client disconnected");
}

async fn respond(conn: &mut Connection, cache: &CacheHandle, line: &str) -> Result<()> {
    match protocol::decode::<Request>(line) {
        Ok(request) => dispatch(conn, cache, request).await,
        Err(e) => {
            send(
                conn,
                &Response::Error {
                    message: format!("invalid request: {e}"),
                },
            )
            .await
        }
    }
}

async fn dispatch(conn: &mut Connection, cache: &CacheHandle, request: Request) -> Result<()> {
    match request {
        Request::List(list) => {
            list_files(conn, cache, list)
                .instrument(spans::request_span("list"))
                .await
        }
        Request::Shutdown { restart } => {
            send(conn, &Response::ShuttingDown { restart }).await?;
            cache.shutdown(restart);
            Ok(())
        }
        Request::Status => {
            let response = match cache.status() {
                Ok(report) => Response::Status(report),
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            };
            send(conn, &response).await
        }
    }
}

/// Stream the entries of one `list` query.
async fn list_files(conn: &mut Connection, cache: &CacheHandle, request: ListRequest) -> Result<()> {
    tracing::debug!(?request, "Received list request");
    let timer = metrics::QUERY_LATENCY.start_timer();

    let batch_size = request.batch_size_or(cache.batch_size());
    let options = request.fetch_options();
    let store = cache.store().clone();
    let (tx, mut rx) = mpsc::channel(QUERY_QUEUE_DEPTH);

    cache
        .tracker()
        .spawn_blocking(move || run_query(&store, &options, batch_size, &tx));

    let mut count: u64 = 0;
    while let Some(chunk) = rx.recv().await {
        match chunk {
            Chunk::Files(files) => {
                count += files.len() as u64;
                send(conn, &Response::Files { files }).await?;
            }
            Chunk::Failed(message) => {
                metrics::QUERY_COUNT.with_label_values(&["error"]).inc();
                tracing::warn!(error = %message, "Query failed");
                return send(conn, &Response::Error { message }).await;
            }
        }
    }

    send(conn, &Response::End { count }).await?;
    timer.observe_duration();
    metrics::QUERY_COUNT.with_label_values(&["ok"]).inc();
    tracing::debug!(count, "List request complete");
    Ok(())
}

/// Tell a client its request was abandoned at shutdown, if it still reads.
async fn send_abandoned(conn: &mut Connection) {
    metrics::QUERY_COUNT.with_label_values(&["aborted"]).inc();
    tracing::warn!("Abandoning request at shutdown");

    let notice = Response::Error {
        message: "cache is shutting down".to_string(),
    };
    match tokio::time::timeout(ABORT_NOTICE_TIMEOUT, send(conn, &notice)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Failed to send shutdown notice"),
        Err(_) => tracing::debug!("Client stopped reading, skipping shutdown notice"),
    }
}

/// Run a fetch on the current (blocking) thread, pushing batches until the
/// fetch ends, fails, or the receiver goes away.
fn run_query(
    store: &PathStore,
    options: &FetchOptions,
    batch_size: usize,
    tx: &mpsc::Sender<Chunk>,
) {
    let mut batch = Vec::with_capacity(batch_size);
    for entry in store.fetch(options) {
        match entry {
            Ok(entry) => batch.push(FileItem::from(entry)),
            Err(e) => {
                if !batch.is_empty() {
                    let full = std::mem::take(&mut batch);
                    if tx.blocking_send(Chunk::Files(full)).is_err() {
                        return;
                    }
                }
                let _ = tx.blocking_send(Chunk::Failed(e.to_string()));
                return;
            }
        }

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if tx.blocking_send(Chunk::Files(full)).is_err() {
                return;
            }
        }
    }

    if !batch.is_empty() {
        let _ = tx.blocking_send(Chunk::Files(batch));
    }
}

async fn send(conn: &mut Connection, response: &Response) -> Result<()> {
    let line = protocol::encode(response)?;
    conn.send(line)
        .await
        .map_err(|e| ServerError::Request(e.to_string()).into())
}

/// Wait for a shutdown signal (SIGTERM or Ctrl+C).
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
pub async fn shutdown_signal() -> Result<()> {
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate.recv() => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreMode;
    use crate::storage::PathEntry;

    fn collect(store: &PathStore, options: &FetchOptions, batch_size: usize) -> Vec<Chunk> {
        let (tx, mut rx) = mpsc::channel(1024);
        run_query(store, options, batch_size, &tx);
        drop(tx);

        let mut chunks = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_run_query_batches() {
        let store = PathStore::in_memory(StoreMode::Sled).unwrap();
        for i in 0..25 {
            store.add(&PathEntry::file(format!("/w/{i:02}.txt"))).unwrap();
        }

        let chunks = collect(&store, &FetchOptions::all(), 10);
        let sizes: Vec<usize> = chunks
            .iter()
            .map(|chunk| match chunk {
                Chunk::Files(files) => files.len(),
                Chunk::Failed(message) => panic!("unexpected failure: {message}"),
            })
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn test_run_query_reports_closed_store() {
        let store = PathStore::in_memory(StoreMode::Sqlite).unwrap();
        store.add(&PathEntry::file("/w/a")).unwrap();
        store.close().unwrap();

        let chunks = collect(&store, &FetchOptions::all(), 10);
        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], Chunk::Failed(message) if message.contains("closed")));
    }

    #[test]
    fn test_run_query_stops_when_receiver_dropped() {
        let store = PathStore::in_memory(StoreMode::Sled).unwrap();
        for i in 0..50 {
            store.add(&PathEntry::file(format!("/w/{i:02}"))).unwrap();
        }

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        run_query(&store, &FetchOptions::all(), 5, &tx);
    }
}
