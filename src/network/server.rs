//! TCP listener and per-connection framing
//!
//! Every frame is `MAGIC (4 bytes) | body length (u32, big endian) | JSON body`.

use crate::network::message::{Message, MAGIC};
use crate::network::peer::{PeerError, PeerHandle, PeerManager};
use bytes::{Buf, BufMut, BytesMut};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::io::{Error, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, Framed};

/// Largest accepted message body in bytes
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

const HEADER_LEN: usize = MAGIC.len() + 4;

fn invalid_data(reason: impl ToString) -> Error {
    Error::new(ErrorKind::InvalidData, reason.to_string())
}

/// Body length announced by a complete header, checked against the limits
fn body_len(header: &[u8]) -> Result<usize, Error> {
    if header[..MAGIC.len()] != MAGIC {
        return Err(invalid_data("Invalid magic bytes"));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&header[MAGIC.len()..HEADER_LEN]);
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(invalid_data(format!("Message of {} bytes is too large", len)));
    }
    Ok(len)
}

/// Length-prefixed JSON framing for [`Message`]
pub struct MessageCodec;

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.to_bytes().map_err(invalid_data)?;
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(invalid_data(format!(
                "Message of {} bytes is too large",
                body.len()
            )));
        }

        dst.reserve(HEADER_LEN + body.len());
        dst.put_slice(&MAGIC);
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = body_len(&src[..HEADER_LEN])?;
        let frame_len = HEADER_LEN + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(len);
        Message::from_bytes(&body).map(Some).map_err(invalid_data)
    }
}

/// Listening socket for inbound peers
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Listen on all interfaces; port 0 picks a free port
    pub async fn bind(port: u16) -> Result<Self, Error> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        log::info!("P2P server listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.listener.local_addr()
    }

    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), Error> {
        self.listener.accept().await
    }
}

/// Dial a peer given as `host:port`
pub async fn connect_to_peer(addr: &str) -> Result<(TcpStream, SocketAddr), PeerError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PeerError::ConnectionFailed(format!("{}: {}", addr, e)))?;
    let peer_addr = stream
        .peer_addr()
        .map_err(|e| PeerError::ConnectionFailed(e.to_string()))?;
    Ok((stream, peer_addr))
}

/// Drive one peer connection until either side closes it.
///
/// The peer is registered with `peer_manager` for the lifetime of the
/// connection and is first asked for its latest block and its mempool.
/// Removing the peer from the manager closes the connection.
/// Inbound messages are forwarded to `message_tx` tagged with `addr`.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    peer_manager: Arc<PeerManager>,
    message_tx: mpsc::Sender<(SocketAddr, Message)>,
    outbound: bool,
) -> Result<(), PeerError> {
    let mut framed = Framed::new(stream, MessageCodec);
    let (tx, mut outgoing) = mpsc::channel::<Message>(100);
    peer_manager.add_peer(PeerHandle { addr, tx }, outbound).await?;

    let result: Result<(), PeerError> = async {
        framed.send(Message::QueryLatest).await?;
        framed.send(Message::QueryMempool).await?;

        loop {
            tokio::select! {
                queued = outgoing.recv() => match queued {
                    Some(msg) => framed.send(msg).await?,
                    // Handle dropped by the peer manager
                    None => {
                        log::info!("Closing connection to {}", addr);
                        return Ok(());
                    }
                },
                incoming = framed.next() => match incoming {
                    Some(Ok(msg)) => {
                        if message_tx.send((addr, msg)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(PeerError::IoError(e)),
                    None => {
                        log::info!("Peer {} disconnected", addr);
                        return Ok(());
                    }
                },
            }
        }
    }
    .await;

    peer_manager.remove_peer(&addr).await;
    result
}
