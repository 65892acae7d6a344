//! Client for a running cache.

use std::path::Path;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LinesCodec};

use super::protocol::{self, FileItem, ListRequest, Request, Response, StatusReport};
use crate::error::ServerError;
use crate::Result;

/// One connection to a cache socket.
#[derive(Debug)]
pub struct Client {
    conn: Framed<UnixStream, LinesCodec>,
}

impl Client {
    /// Connect to the cache listening on `socket`.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is listening on the socket.
    pub async fn connect(socket: impl AsRef<Path>) -> Result<Self> {
        let socket = socket.as_ref();
        let stream = UnixStream::connect(socket)
            .await
            .map_err(|e| ServerError::ConnectFailed {
                address: socket.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            conn: Framed::new(stream, LinesCodec::new()),
        })
    }

    /// Send one request.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is broken.
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let line = protocol::encode(request)?;
        self.conn
            .send(line)
            .await
            .map_err(|e| ServerError::Request(e.to_string()).into())
    }

    /// Read the next response. `None` means the server hung up.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the response is malformed.
    pub async fn recv(&mut self) -> Result<Option<Response>> {
        match self.conn.next().await {
            Some(Ok(line)) => protocol::decode(&line).map(Some),
            Some(Err(e)) => Err(ServerError::Request(e.to_string()).into()),
            None => Ok(None),
        }
    }

    /// Run a `list` query, handing each batch to `on_batch`.
    ///
    /// Returns the number of entries the server reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the server reports a failure or the stream ends
    /// early.
    pub async fn list<F>(&mut self, request: ListRequest, mut on_batch: F) -> Result<u64>
    where
        F: FnMut(Vec<FileItem>),
    {
        self.send(&Request::List(request)).await?;

        loop {
            match self.recv().await? {
                Some(Response::Files { files }) => on_batch(files),
                Some(Response::End { count }) => return Ok(count),
                Some(Response::Error { message }) => {
                    return Err(ServerError::Request(message).into());
                }
                Some(other) => {
                    return Err(ServerError::Protocol(format!("unexpected response: {other:?}")).into());
                }
                None => {
                    return Err(ServerError::Protocol("stream ended before end marker".to_string()).into());
                }
            }
        }
    }

    /// Collect a whole `list` query.
    ///
    /// # Errors
    ///
    /// See [`Client::list`].
    pub async fn list_all(&mut self, request: ListRequest) -> Result<Vec<FileItem>> {
        let mut all = Vec::new();
        self.list(request, |files| all.extend(files)).await?;
        Ok(all)
    }

    /// Ask the cache to stop. Returns the restart flag it acknowledged.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is not acknowledged.
    pub async fn shutdown(&mut self, restart: bool) -> Result<bool> {
        self.send(&Request::Shutdown { restart }).await?;
        match self.recv().await? {
            Some(Response::ShuttingDown { restart }) => Ok(restart),
            Some(Response::Error { message }) => Err(ServerError::Request(message).into()),
            other => Err(ServerError::Protocol(format!("unexpected response: {other:?}")).into()),
        }
    }

    /// Fetch the status report.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn status(&mut self) -> Result<StatusReport> {
        self.send(&Request::Status).await?;
        match self.recv().await? {
            Some(Response::Status(report)) => Ok(report),
            Some(Response::Error { message }) => Err(ServerError::Request(message).into()),
            other => Err(ServerError::Protocol(format!("unexpected response: {other:?}")).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_connect_missing_socket() {
        let tmp = TempDir::new().unwrap();
        let err = Client::connect(tmp.path().join("none.socket"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to connect"));
    }

    #[tokio::test]
    async fn test_list_reads_until_end() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("fake.socket");
        let listener = UnixListener::bind(&socket).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Framed::new(stream, LinesCodec::new());
            let request = conn.next().await.unwrap().unwrap();
            assert!(request.contains(r#""type":"list""#));

            conn.send(r#"{"type":"files","files":[{"name":"/a","dir":true}]}"#)
                .await
                .unwrap();
            conn.send(r#"{"type":"files","files":[{"name":"/a/b","dir":false}]}"#)
                .await
                .unwrap();
            conn.send(r#"{"type":"end","count":2}"#).await.unwrap();
        });

        let mut client = Client::connect(&socket).await.unwrap();
        let files = client.list_all(ListRequest::default()).await.unwrap();
        server.await.unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "/a");
        assert!(files[0].dir);
    }

    #[tokio::test]
    async fn test_list_surfaces_error() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("fake.socket");
        let listener = UnixListener::bind(&socket).unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Framed::new(stream, LinesCodec::new());
            let _ = conn.next().await;
            conn.send(r#"{"type":"error","message":"store is closed"}"#)
                .await
                .unwrap();
        });

        let mut client = Client::connect(&socket).await.unwrap();
        let err = client.list_all(ListRequest::default()).await.unwrap_err();
        assert!(err.to_string().contains("store is closed"));
    }
}
