//! TCP relay for SOCKS5 CONNECT command
//!
//! Handles TCP CONNECT requests by establishing a connection to the target
//! and relaying data bidirectionally.

use super::command::send_reply;
use super::consts::RELAY_GRACE_PERIOD;
use super::types::{AddrSpec, Request};
use crate::error::{ReplyCode, Socks5Error};
use crate::transport::Connector;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Handle TCP CONNECT command
///
/// This function:
/// 1. Dials the effective destination through `connector`
/// 2. Sends a success reply carrying the outbound local address
/// 3. Relays data bidirectionally between client and target
///
/// A failed dial is answered with `connectionRefused`, `networkUnreachable`
/// or `hostUnreachable` depending on the error.
pub async fn handle_connect<S>(
    mut client: S,
    request: &Request,
    connector: &dyn Connector,
) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let dest = &request.dest_addr;

    let dial_result = match dest.socket_addr() {
        Some(addr) => {
            debug!("Connecting to target: {}", addr);
            connector.dial(addr).await
        }
        None => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "destination has no address",
        )),
    };

    let target = match dial_result {
        Ok(target) => target,
        Err(e) => {
            let reply = ReplyCode::from(&e);
            send_reply(&mut client, reply, Some(dest)).await?;
            return Err(Socks5Error::ConnectFailed {
                dest: dest.to_string(),
                reply,
                source: e,
            });
        }
    };

    let bind_addr = match target.local_addr() {
        Ok(addr) => AddrSpec::from(addr),
        Err(e) => {
            debug!("Outbound local address unavailable: {}", e);
            AddrSpec::unspecified()
        }
    };

    send_reply(&mut client, ReplyCode::Succeeded, Some(&bind_addr)).await?;

    info!("SOCKS5 tunnel established to {}", dest);

    relay(client, target).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ClientToTarget,
    TargetToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToTarget => write!(f, "client->target"),
            Direction::TargetToClient => write!(f, "target->client"),
        }
    }
}

type Outcome = (Direction, io::Result<u64>);

/// Relay data bidirectionally between two streams
///
/// Each direction runs as its own task and reports on a two-slot channel
/// once its source ends. The first report ends the relay: both tasks are
/// aborted, which drops every half and closes both streams.
pub async fn relay<A, B>(client: A, target: B) -> Result<(), Socks5Error>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (target_read, target_write) = tokio::io::split(target);

    let (tx, mut rx) = mpsc::channel::<Outcome>(2);

    let upstream = tokio::spawn(copy_one_way(
        Direction::ClientToTarget,
        client_read,
        target_write,
        tx.clone(),
    ));
    let downstream = tokio::spawn(copy_one_way(
        Direction::TargetToClient,
        target_read,
        client_write,
        tx,
    ));

    let first = rx.recv().await;

    upstream.abort();
    downstream.abort();
    let _ = upstream.await;
    let _ = downstream.await;

    match first {
        Some((direction, Ok(bytes))) => {
            debug!("{} finished: {} bytes", direction, bytes);
            Ok(())
        }
        Some((direction, Err(e))) => {
            debug!("{} error: {}", direction, e);
            Err(e.into())
        }
        None => Ok(()),
    }
}

async fn copy_one_way<R, W>(direction: Direction, mut reader: R, mut writer: W, tx: mpsc::Sender<Outcome>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = tokio::io::copy(&mut reader, &mut writer).await;
    if result.is_ok() {
        // Propagate EOF to the other side
        let _ = writer.shutdown().await;
    }

    tokio::time::sleep(RELAY_GRACE_PERIOD).await;
    let _ = tx.send((direction, result)).await;
}
