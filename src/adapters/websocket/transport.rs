//! Non-blocking tungstenite transport.
//!
//! After the handshake the TCP stream is switched to non-blocking mode and
//! registered with the multiplexer by descriptor. Writes that cannot reach
//! the socket right away stay in tungstenite's write buffer and are flushed
//! on the next writable event; a buffer past its configured bound is a write
//! failure.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};

use tungstenite::{Error as WsError, Message, WebSocket};

use crate::ports::{ReadOutcome, Transport, TransportError};

/// A WebSocket over a non-blocking TCP stream.
pub struct WsTransport {
    socket: WebSocket<TcpStream>,
    descriptor: RawFd,
}

impl WsTransport {
    /// Wraps an upgraded socket, switching it to non-blocking mode.
    pub fn new(socket: WebSocket<TcpStream>) -> io::Result<Self> {
        let stream = socket.get_ref();
        stream.set_read_timeout(None)?;
        stream.set_write_timeout(None)?;
        stream.set_nonblocking(true)?;
        let descriptor = stream.as_raw_fd();
        Ok(Self { socket, descriptor })
    }
}

impl Transport for WsTransport {
    fn descriptor(&self) -> RawFd {
        self.descriptor
    }

    fn read_message(&mut self) -> Result<ReadOutcome, TransportError> {
        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => return Ok(ReadOutcome::Message(text.into_bytes())),
                Ok(Message::Binary(bytes)) => return Ok(ReadOutcome::Message(bytes)),
                // Pongs to pings are queued by tungstenite itself.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(_)) => return Err(TransportError::Closed),
                Err(WsError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::Drained)
                }
                Err(e) => return Err(map_error(e)),
            }
        }
    }

    /// Sends `payload` as a text frame when it is valid UTF-8, which every
    /// JSON payload is. Other bytes cannot form a legal text frame and go
    /// out as a binary frame instead of being dropped.
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let message = match std::str::from_utf8(payload) {
            Ok(text) => Message::Text(text.to_owned()),
            Err(_) => Message::Binary(payload.to_vec()),
        };
        match self.socket.send(message) {
            Ok(()) => Ok(()),
            Err(WsError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(map_error(e)),
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        match self.socket.flush() {
            Ok(()) => Ok(()),
            Err(WsError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(map_error(e)),
        }
    }

    fn close(&mut self) {
        // Best effort: the peer may be gone already.
        let _ = self.socket.close(None);
        let _ = self.socket.flush();
        let _ = self.socket.get_ref().shutdown(Shutdown::Both);
    }
}

fn map_error(error: WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        WsError::WriteBufferFull(_) => TransportError::BufferFull,
        WsError::Io(e) => TransportError::Io(e),
        other => TransportError::Protocol(other.to_string()),
    }
}
