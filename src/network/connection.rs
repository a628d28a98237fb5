//! Broker connection handling.
//!
//! A [`BrokerConnection`] owns one TCP session to one broker. Requests
//! are framed with a 4-byte size prefix and matched to responses by
//! correlation ID. The connection reads responses strictly in order:
//! a response left unread by a fire-and-forget request is skipped over
//! the next time the connection waits for one.
//!
//! Connections are not concurrent-safe; the [`super::BrokerPool`] hands
//! out at most one per broker behind an async lock, which serialises
//! callers.

use std::io;

use bytes::{Buf, Bytes};
use nombytes::NomBytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::ClientConfig;
use crate::encode::ToByte;
use crate::error::{Error, Result};
use crate::protocol::{parse_header_response, ApiKey, Request};
use crate::types::BrokerAddr;

/// One TCP session to one broker.
pub struct BrokerConnection {
    addr: BrokerAddr,
    config: ClientConfig,
    stream: Option<TcpStream>,
    /// Next correlation ID to assign; strictly monotonic from 0.
    correlation_id: i32,
}

impl BrokerConnection {
    /// Create an unconnected handle; the socket is dialed lazily on the
    /// first request.
    pub fn new(addr: BrokerAddr, config: ClientConfig) -> Self {
        BrokerConnection {
            addr,
            config,
            stream: None,
            correlation_id: 0,
        }
    }

    pub fn addr(&self) -> &BrokerAddr {
        &self.addr
    }

    /// Whether a live socket is currently held.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the socket; the next request re-dials.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(broker = %self.addr, "closed connection");
        }
    }

    /// Send a request and wait for its response body (after the
    /// correlation-id header).
    pub async fn request<B: ToByte>(
        &mut self,
        api_key: ApiKey,
        api_version: i16,
        body: &B,
    ) -> Result<Bytes> {
        let correlation_id = self.issue(api_key, api_version, body).await?;
        match self.await_response(correlation_id).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Send a request without waiting for the response. The broker will
    /// still reply; the unread frame is discarded by the next `request`.
    pub async fn send<B: ToByte>(
        &mut self,
        api_key: ApiKey,
        api_version: i16,
        body: &B,
    ) -> Result<()> {
        self.issue(api_key, api_version, body).await?;
        Ok(())
    }

    /// Encode and write one request, returning its correlation ID.
    async fn issue<B: ToByte>(
        &mut self,
        api_key: ApiKey,
        api_version: i16,
        body: &B,
    ) -> Result<i32> {
        let correlation_id = self.correlation_id;
        self.correlation_id = self.correlation_id.wrapping_add(1);

        let request = Request::new(
            api_key,
            api_version,
            correlation_id,
            &self.config.client_id,
            body,
        )?;
        let frame = request.encode_with_size()?;

        tracing::trace!(
            broker = %self.addr,
            api = api_key.as_str(),
            correlation_id,
            frame_len = frame.len(),
            "sending request"
        );

        if let Err(e) = self.write_frame(&frame).await {
            self.close();
            return Err(e);
        }
        Ok(correlation_id)
    }

    /// Read frames until the one answering `correlation_id` arrives.
    ///
    /// Frames with an earlier correlation ID are replies to
    /// fire-and-forget requests and are skipped; a later one means the
    /// stream is out of sync and is fatal for this connection.
    async fn await_response(&mut self, correlation_id: i32) -> Result<Bytes> {
        loop {
            let frame = self.read_frame().await?;
            let (rest, header) = parse_header_response(NomBytes::new(frame.clone()))
                .map_err(|_| Error::ParsingError(frame.clone()))?;

            if header.correlation_id == correlation_id {
                return Ok(rest.into_bytes());
            }
            if header.correlation_id < correlation_id {
                tracing::debug!(
                    broker = %self.addr,
                    stale = header.correlation_id,
                    awaiting = correlation_id,
                    "discarding unawaited response"
                );
                continue;
            }
            tracing::error!(
                broker = %self.addr,
                got = header.correlation_id,
                awaiting = correlation_id,
                "response from the future; stream out of sync"
            );
            return Err(Error::ParsingError(frame));
        }
    }

    async fn connect(&mut self) -> Result<&mut TcpStream> {
        if self.stream.is_none() {
            let endpoint = format!("{}:{}", self.addr.host, self.addr.port);
            tracing::debug!(broker = %self.addr, "dialing");

            let mut stream = timeout(self.config.connect_timeout, TcpStream::connect(&endpoint))
                .await
                .map_err(|_| Error::Io(io::ErrorKind::TimedOut))??;

            self.config
                .authenticator
                .clone()
                .authenticate(&mut stream)
                .await?;

            self.stream = Some(stream);
        }
        Ok(self.stream.as_mut().expect("just connected"))
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let socket_timeout = self.config.socket_timeout;
        let stream = self.connect().await?;

        timeout(socket_timeout, stream.write_all(frame))
            .await
            .map_err(|_| Error::Io(io::ErrorKind::TimedOut))??;
        Ok(())
    }

    /// Read one size-prefixed frame.
    async fn read_frame(&mut self) -> Result<Bytes> {
        let socket_timeout = self.config.socket_timeout;
        let max_message_size = self.config.max_message_size;
        let stream = self.connect().await?;

        let mut size_buf = [0u8; 4];
        timeout(socket_timeout, stream.read_exact(&mut size_buf))
            .await
            .map_err(|_| Error::Io(io::ErrorKind::TimedOut))??;

        let size = (&size_buf[..]).get_i32();
        if size < 0 {
            return Err(Error::ParsingError(Bytes::copy_from_slice(&size_buf)));
        }
        let size = size as usize;
        if size > max_message_size {
            tracing::error!(
                broker = %self.addr,
                size,
                max = max_message_size,
                "response frame exceeds size limit"
            );
            return Err(Error::ParsingError(Bytes::copy_from_slice(&size_buf)));
        }

        let mut data = vec![0u8; size];
        timeout(socket_timeout, stream.read_exact(&mut data))
            .await
            .map_err(|_| Error::Io(io::ErrorKind::TimedOut))??;

        Ok(Bytes::from(data))
    }
}

impl std::fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("addr", &self.addr)
            .field("connected", &self.stream.is_some())
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}
