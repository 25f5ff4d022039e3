//! UDP broadcast transport
//!
//! Each datagram carries the sender's hardware address ahead of the command
//! bytes, standing in for the source-address metadata a radio stack reports:
//!
//! ```text
//! +--------+--------+-----+--------+--------+-----------
//! | src[0] | src[1] | ... | src[5] | opcode | payload...
//! +--------+--------+-----+--------+--------+-----------
//! ```

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tally_core::HardwareAddress;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::queue::FrameSender;
use crate::{Frame, Radio, RadioError};

/// Length of the source-address header in every datagram
const HEADER_LEN: usize = 6;

/// Largest datagram we expect; commands are far smaller
const MAX_DATAGRAM: usize = 250;

/// Pause after a failed receive, doubled per consecutive failure
const RECEIVE_BACKOFF_MIN: Duration = Duration::from_millis(10);
const RECEIVE_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Delay before retrying after `failures` consecutive receive errors
fn receive_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    RECEIVE_BACKOFF_MIN
        .saturating_mul(1 << shift)
        .min(RECEIVE_BACKOFF_MAX)
}

/// UDP stand-in for the connectionless radio link
pub struct UdpRadio {
    socket: Arc<UdpSocket>,
    peers: Vec<SocketAddr>,
    address: HardwareAddress,
}

impl UdpRadio {
    /// Bind a broadcast-capable socket. Frames are sent to every peer
    /// (typically a single subnet broadcast address).
    pub async fn bind(
        bind: SocketAddr,
        peers: Vec<SocketAddr>,
        address: HardwareAddress,
    ) -> Result<Self, RadioError> {
        let socket = UdpSocket::bind(bind).await?;
        socket.set_broadcast(true)?;
        debug!(bind = %bind, peers = peers.len(), address = %address, "UDP radio bound");
        Ok(Self {
            socket: Arc::new(socket),
            peers,
            address,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RadioError> {
        Ok(self.socket.local_addr()?)
    }

    /// Start the receive task. Every well-formed datagram from another
    /// station is offered to `queue`; the task ends when the queue's consumer
    /// is dropped.
    pub fn spawn_receiver(&self, queue: FrameSender) -> JoinHandle<()> {
        let socket = self.socket.clone();
        let own = self.address;
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            let mut failures = 0u32;
            loop {
                let (len, from) = match socket.recv_from(&mut buf).await {
                    Ok(received) => {
                        failures = 0;
                        received
                    }
                    Err(e) => {
                        if queue.is_closed() {
                            break;
                        }
                        failures = failures.saturating_add(1);
                        if failures == 1 {
                            warn!(error = %e, "UDP receive failed");
                        } else {
                            debug!(error = %e, failures = failures, "UDP receive still failing");
                        }
                        tokio::time::sleep(receive_backoff(failures)).await;
                        continue;
                    }
                };
                let Some(frame) = parse_datagram(&buf[..len]) else {
                    trace!(from = %from, len = len, "Ignoring short datagram");
                    continue;
                };
                if frame.source == own {
                    continue;
                }
                if !queue.offer(frame) && queue.is_closed() {
                    debug!("Receive queue closed, stopping UDP receiver");
                    break;
                }
            }
        })
    }
}

impl Radio for UdpRadio {
    fn address(&self) -> HardwareAddress {
        self.address
    }

    /// Send to every peer. A failure for one peer does not stop the rest;
    /// the first failure is reported.
    fn broadcast(&self, frame: &[u8]) -> Result<(), RadioError> {
        let datagram = build_datagram(&self.address, frame);
        let mut first_error = None;
        for peer in &self.peers {
            if let Err(e) = self.socket.try_send_to(&datagram, *peer) {
                trace!(peer = %peer, error = %e, "UDP send failed");
                let error = if e.kind() == ErrorKind::WouldBlock {
                    RadioError::Busy
                } else {
                    RadioError::Io(e)
                };
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn build_datagram(source: &HardwareAddress, frame: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(HEADER_LEN + frame.len());
    datagram.extend_from_slice(source.octets());
    datagram.extend_from_slice(frame);
    datagram
}

/// Split a datagram into source address and command bytes. A datagram with
/// no command byte is rejected.
fn parse_datagram(datagram: &[u8]) -> Option<Frame> {
    if datagram.len() <= HEADER_LEN {
        return None;
    }
    let source = HardwareAddress::from_slice(&datagram[..HEADER_LEN])?;
    Some(Frame {
        source,
        bytes: datagram[HEADER_LEN..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::frame_queue;

    #[test]
    fn test_datagram_framing() {
        let src = HardwareAddress([1, 2, 3, 4, 5, 6]);
        let datagram = build_datagram(&src, &[2]);
        assert_eq!(datagram, vec![1, 2, 3, 4, 5, 6, 2]);
        assert_eq!(
            parse_datagram(&datagram),
            Some(Frame {
                source: src,
                bytes: vec![2]
            })
        );
        assert_eq!(parse_datagram(&datagram[..6]), None);
    }

    #[tokio::test]
    async fn test_loopback_delivery() {
        let a_addr = HardwareAddress([0xaa; 6]);
        let b_addr = HardwareAddress([0xbb; 6]);

        let b = UdpRadio::bind("127.0.0.1:0".parse().unwrap(), Vec::new(), b_addr)
            .await
            .unwrap();
        let b_local = b.local_addr().unwrap();
        let (tx, mut rx) = frame_queue(8);
        let _task = b.spawn_receiver(tx);

        let a = UdpRadio::bind("127.0.0.1:0".parse().unwrap(), vec![b_local], a_addr)
            .await
            .unwrap();
        a.broadcast(&[2]).unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.source, a_addr);
        assert_eq!(frame.bytes, vec![2]);
    }

    #[test]
    fn test_receive_backoff_grows_and_caps() {
        assert_eq!(receive_backoff(1), Duration::from_millis(10));
        assert_eq!(receive_backoff(2), Duration::from_millis(20));
        assert_eq!(receive_backoff(5), Duration::from_millis(160));
        assert_eq!(receive_backoff(8), RECEIVE_BACKOFF_MAX);
        assert_eq!(receive_backoff(u32::MAX), RECEIVE_BACKOFF_MAX);
    }

    #[tokio::test]
    async fn test_failed_peer_does_not_block_the_rest() {
        let b_addr = HardwareAddress([0xbb; 6]);
        let b = UdpRadio::bind("127.0.0.1:0".parse().unwrap(), Vec::new(), b_addr)
            .await
            .unwrap();
        let b_local = b.local_addr().unwrap();
        let (tx, mut rx) = frame_queue(8);
        let _task = b.spawn_receiver(tx);

        // Port 0 is never a valid destination
        let unreachable: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let a = UdpRadio::bind(
            "127.0.0.1:0".parse().unwrap(),
            vec![unreachable, b_local],
            HardwareAddress([0xaa; 6]),
        )
        .await
        .unwrap();
        assert!(a.broadcast(&[2]).is_err());

        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.bytes, vec![2]);
    }
}
