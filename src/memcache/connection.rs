//! A single memcached connection

use crate::error::ClientError;
use crate::memcache::codec::{self, BUFFER_SIZE, MAX_LINE_SIZE, VALUE_TRAILER};
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// One memcached connection.
///
/// Commands are serialized: the stream sits behind an async mutex, so
/// concurrent callers wait for the command in flight to finish instead of
/// interleaving their frames.
pub struct Connection<S = TcpStream> {
    stream: Mutex<Option<BufStream<S>>>,
    desynced: AtomicBool,
}

impl Connection<TcpStream> {
    /// Dial `addr` over TCP
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Dial {
                target: addr.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        Ok(Self::new(stream))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already established transport
    pub fn new(stream: S) -> Self {
        Self {
            stream: Mutex::new(Some(BufStream::with_capacity(
                BUFFER_SIZE,
                BUFFER_SIZE,
                stream,
            ))),
            desynced: AtomicBool::new(false),
        }
    }

    /// True when the byte stream may no longer sit on a frame boundary: a
    /// command was abandoned mid-flight, hit a transport error or received a
    /// response that could not be framed.
    pub fn is_desynchronized(&self) -> bool {
        self.desynced.load(Ordering::Acquire)
    }

    /// Store `value` under `key`
    pub async fn set(&self, key: &str, value: &[u8]) -> Result<(), ClientError> {
        codec::validate_key(key)?;
        codec::validate_value(value)?;

        let mut guard = self.stream.lock().await;
        let stream = self.begin(&mut guard)?;

        let request = codec::encode_set(key, value);
        let line = async {
            send(stream, &request).await?;
            read_line(stream).await
        }
        .await
        .map_err(io_error("set", key))?;

        self.finish();
        codec::decode_set(&line)
    }

    /// Fetch the value stored under `key`
    pub async fn get(&self, key: &str) -> Result<Bytes, ClientError> {
        codec::validate_key(key)?;

        let mut guard = self.stream.lock().await;
        let stream = self.begin(&mut guard)?;

        let request = codec::encode_get(key);
        let header = async {
            send(stream, &request).await?;
            read_line(stream).await
        }
        .await
        .map_err(io_error("get", key))?;

        let length = match codec::parse_get_header(&header) {
            Ok(length) => length,
            Err(ClientError::NotFound) => {
                self.finish();
                return Err(ClientError::NotFound);
            }
            // the rest of the frame cannot be located; stay desynchronized
            Err(e) => return Err(e),
        };

        let frame_len = length
            .checked_add(VALUE_TRAILER.len())
            .ok_or(ClientError::InvalidHeader)?;
        let mut frame = BytesMut::zeroed(frame_len);
        stream
            .read_exact(&mut frame)
            .await
            .map_err(io_error("get", key))?;

        let value = codec::decode_get_trailer(frame, length)?;
        self.finish();
        trace!(key, len = value.len(), "get hit");
        Ok(value)
    }

    /// Remove `key`
    pub async fn delete(&self, key: &str) -> Result<(), ClientError> {
        codec::validate_key(key)?;

        let mut guard = self.stream.lock().await;
        let stream = self.begin(&mut guard)?;

        let request = codec::encode_delete(key);
        let line = async {
            send(stream, &request).await?;
            read_line(stream).await
        }
        .await
        .map_err(io_error("delete", key))?;

        self.finish();
        codec::decode_delete(&line)
    }

    /// Shut the transport down. Every later call, including another `close`,
    /// returns `ClientError::Closed`.
    pub async fn close(&self) -> Result<(), ClientError> {
        let mut guard = self.stream.lock().await;
        let mut stream = guard.take().ok_or(ClientError::Closed)?;
        stream
            .get_mut()
            .shutdown()
            .await
            .map_err(io_error("close", ""))
    }

    /// Check the stream out for one command and mark the connection as mid-frame
    fn begin<'a>(
        &self,
        guard: &'a mut Option<BufStream<S>>,
    ) -> Result<&'a mut BufStream<S>, ClientError> {
        let stream = guard.as_mut().ok_or(ClientError::Closed)?;
        if self.desynced.swap(true, Ordering::AcqRel) {
            return Err(ClientError::Desynchronized);
        }
        Ok(stream)
    }

    /// The complete response frame was consumed
    fn finish(&self) {
        self.desynced.store(false, Ordering::Release);
    }
}

async fn send<S>(stream: &mut BufStream<S>, request: &[u8]) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request).await?;
    stream.flush().await
}

/// Read one `\n`-terminated line of at most `MAX_LINE_SIZE` bytes; EOF
/// before the terminator is an error
async fn read_line<S>(stream: &mut BufStream<S>) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(64);
    let n = (&mut *stream)
        .take(MAX_LINE_SIZE as u64)
        .read_until(b'\n', &mut line)
        .await?;
    if line.last() == Some(&b'\n') {
        return Ok(line);
    }
    if n >= MAX_LINE_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "response line too long",
        ));
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed mid-response",
    ))
}

fn io_error<'a>(
    op: &'static str,
    key: &'a str,
) -> impl FnOnce(std::io::Error) -> ClientError + 'a {
    move |source| ClientError::Io {
        op,
        key: key.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_happy_paths_exact_wire_bytes() {
        let mock = Builder::new()
            .write(b"set key 0 0 5\r\n12345\r\n")
            .read(b"STORED\r\n")
            .write(b"get key\r\n")
            .read(b"VALUE key 0 5\r\n12345\r\nEND\r\n")
            .write(b"delete key\r\n")
            .read(b"DELETED\r\n")
            .write(b"delete key\r\n")
            .read(b"NOT_FOUND\r\n")
            .build();
        let conn = Connection::new(mock);

        conn.set("key", b"12345").await.unwrap();
        assert_eq!(&conn.get("key").await.unwrap()[..], b"12345");
        conn.delete("key").await.unwrap();
        assert!(matches!(
            conn.delete("key").await,
            Err(ClientError::NotFound)
        ));
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_value_split_across_reads() {
        let mock = Builder::new()
            .write(b"get key\r\n")
            .read(b"VALUE key 0 10 77\r")
            .read(b"\n01234")
            .read(b"56789\r\nE")
            .read(b"ND\r\n")
            .build();
        let conn = Connection::new(mock);

        assert_eq!(&conn.get("key").await.unwrap()[..], b"0123456789");
        assert!(!conn.is_desynchronized());
    }

    #[tokio::test]
    async fn test_get_binary_and_empty_values() {
        let mock = Builder::new()
            .write(b"get bin\r\n")
            .read(b"VALUE bin 0 4\r\n\r\n\0\xff\r\nEND\r\n")
            .write(b"get empty\r\n")
            .read(b"VALUE empty 0 0\r\n\r\nEND\r\n")
            .build();
        let conn = Connection::new(mock);

        assert_eq!(&conn.get("bin").await.unwrap()[..], b"\r\n\0\xff");
        assert!(conn.get("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_miss_keeps_connection_usable() {
        let mock = Builder::new()
            .write(b"get key\r\n")
            .read(b"END\r\n")
            .write(b"get key\r\n")
            .read(b"END\r\n")
            .build();
        let conn = Connection::new(mock);

        assert!(matches!(conn.get("key").await, Err(ClientError::NotFound)));
        assert!(!conn.is_desynchronized());
        assert!(matches!(conn.get("key").await, Err(ClientError::NotFound)));
    }

    #[tokio::test]
    async fn test_invalid_header_desynchronizes() {
        let mock = Builder::new()
            .write(b"get key\r\n")
            .read(b"VALUE key 0\r\n")
            .build();
        let conn = Connection::new(mock);

        assert!(matches!(
            conn.get("key").await,
            Err(ClientError::InvalidHeader)
        ));
        assert!(conn.is_desynchronized());
        assert!(matches!(
            conn.get("key").await,
            Err(ClientError::Desynchronized)
        ));
    }

    #[tokio::test]
    async fn test_oversized_value_header_is_rejected() {
        for (request, header) in [
            (&b"get key\r\n"[..], &b"VALUE key 0 18446744073709551615\r\n"[..]),
            (&b"get key\r\n"[..], &b"VALUE key 0 2097152\r\n"[..]),
        ] {
            let mock = Builder::new().write(request).read(header).build();
            let conn = Connection::new(mock);

            assert!(matches!(
                conn.get("key").await,
                Err(ClientError::InvalidHeader)
            ));
            assert!(conn.is_desynchronized());
        }
    }

    #[tokio::test]
    async fn test_unterminated_line_is_capped() {
        let mut flood = vec![b'x'; MAX_LINE_SIZE * 4];
        flood.extend_from_slice(b"\r\n");
        let mock = Builder::new().write(b"delete key\r\n").read(&flood).build();
        let conn = Connection::new(mock);

        match conn.delete("key").await {
            Err(ClientError::Io { op, source, .. }) => {
                assert_eq!(op, "delete");
                assert_eq!(source.kind(), std::io::ErrorKind::InvalidData);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(conn.is_desynchronized());
    }

    #[tokio::test]
    async fn test_classified_errors() {
        let mock = Builder::new()
            .write(b"set key 0 0 1\r\nx\r\n")
            .read(b"NOT_STORED\r\n")
            .write(b"delete key\r\n")
            .read(b"SERVER_ERROR busy\r\n")
            .build();
        let conn = Connection::new(mock);

        assert!(matches!(conn.set("key", b"x").await, Err(ClientError::NotStored)));
        assert!(matches!(
            conn.delete("key").await,
            Err(ClientError::UnknownResponse)
        ));
        assert!(!conn.is_desynchronized());
    }

    #[tokio::test]
    async fn test_transport_error_is_wrapped() {
        let mock = Builder::new()
            .write(b"get key\r\n")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let conn = Connection::new(mock);

        match conn.get("key").await {
            Err(ClientError::Io { op, key, source }) => {
                assert_eq!(op, "get");
                assert_eq!(key, "key");
                assert_eq!(source.kind(), std::io::ErrorKind::ConnectionReset);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(conn.is_desynchronized());
    }

    #[tokio::test]
    async fn test_eof_mid_response_is_transport_error() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let conn = Connection::new(client);

        let err = conn.delete("key").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_rejects_bad_input_without_writing() {
        let conn = Connection::new(Builder::new().build());

        assert!(matches!(
            conn.get("has space").await,
            Err(ClientError::InvalidKey(_))
        ));
        assert!(matches!(
            conn.set("key", &vec![0; codec::MAX_VALUE_SIZE + 1]).await,
            Err(ClientError::ValueTooLarge(_))
        ));
        assert!(!conn.is_desynchronized());
    }

    #[tokio::test]
    async fn test_use_after_close_fails() {
        let conn = Connection::new(Builder::new().build());
        conn.close().await.unwrap();

        assert!(matches!(conn.get("key").await, Err(ClientError::Closed)));
        assert!(matches!(conn.set("key", b"v").await, Err(ClientError::Closed)));
        assert!(matches!(conn.delete("key").await, Err(ClientError::Closed)));
        assert!(matches!(conn.close().await, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn test_concurrent_callers_do_not_interleave() {
        let (client, server) = tokio::io::duplex(1024);
        let conn = std::sync::Arc::new(Connection::new(client));

        // echo server: answers each request line once it has been fully read
        let server_task = tokio::spawn(async move {
            let mut server = tokio::io::BufStream::new(server);
            let mut seen = Vec::new();
            loop {
                let mut line = Vec::new();
                if server.read_until(b'\n', &mut line).await.unwrap() == 0 {
                    break;
                }
                seen.push(String::from_utf8(line).unwrap());
                server.write_all(b"DELETED\r\n").await.unwrap();
                server.flush().await.unwrap();
            }
            seen
        });

        let mut tasks = Vec::new();
        for i in 0..8 {
            let conn = std::sync::Arc::clone(&conn);
            tasks.push(tokio::spawn(async move {
                conn.delete(&format!("key{i}")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        conn.close().await.unwrap();

        let seen = server_task.await.unwrap();
        assert_eq!(seen.len(), 8);
        for line in seen {
            assert!(line.starts_with("delete key") && line.ends_with("\r\n"));
        }
    }
}
