//! Packet source — live capture collaborator.
//!
//! The pipeline never sees libpcap or wire formats. A `PacketSource`
//! yields `RawPacket` values: a flat parse result with optional network
//! and transport layers, mirroring how capture tools expose packets with
//! partially populated fields. `DumpcapSource` is the live
//! implementation: it spawns `dumpcap` writing a pcap stream to stdout,
//! slices each frame with etherparse on a reader thread, and hands the
//! results over a channel.

use std::future::Future;
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

use pcap_parser::{create_reader, Linktype, PcapBlockOwned, PcapError};
use tokio::sync::mpsc;

/// Network-layer fields of a captured packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLayer {
    pub src: String,
    pub dst: String,
}

/// Transport-layer fields of a captured packet.
///
/// Ports are kept as raw strings: the extractor owns integer parsing and
/// treats a malformed port as a reason to drop the whole packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportLayer {
    pub label: String,
    pub src_port: Option<String>,
    pub dst_port: Option<String>,
    pub flags: Option<String>,
}

/// One captured packet as the source surfaced it. Any layer may be
/// missing; even `length` is optional because a truncated capture can
/// fail to report it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPacket {
    pub network: Option<NetworkLayer>,
    pub transport: Option<TransportLayer>,
    pub length: Option<String>,
}

/// Errors from capture-source setup and streaming.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Failed to spawn capture process `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Capture process exposes no stdout pipe")]
    NoStdout,

    #[error("Pcap stream error: {0}")]
    Stream(String),
}

/// A lazy, potentially infinite sequence of captured packets.
///
/// `next_packet` resolves to `None` when the underlying capture ends
/// (file sources drain, live sources normally never do).
pub trait PacketSource {
    fn next_packet(&mut self) -> impl Future<Output = Option<RawPacket>> + Send;
}

// ═══════════════════════════════════════════════════════════
// DumpcapSource — live capture via a spawned dumpcap
// ═══════════════════════════════════════════════════════════

/// Live packet source backed by a `dumpcap` child process.
///
/// A dedicated reader thread parses the pcap stream and pushes decoded
/// `RawPacket`s into an unbounded channel; `next_packet` just receives.
/// Dropping the source kills the child process.
pub struct DumpcapSource {
    child: Child,
    rx: mpsc::UnboundedReceiver<RawPacket>,
}

impl DumpcapSource {
    /// Start capturing on `interface`. Spawn failure is fatal — the
    /// pipeline cannot run without a capture source.
    pub fn new(interface: &str) -> Result<Self, CaptureError> {
        let mut child = Command::new("dumpcap")
            .args(["-i", interface, "-F", "pcap", "-n", "-q", "-w", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                command: format!("dumpcap -i {interface}"),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(CaptureError::NoStdout)?;
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || read_pcap_stream(stdout, tx));

        tracing::info!(interface, "Live capture started");
        Ok(Self { child, rx })
    }
}

impl PacketSource for DumpcapSource {
    fn next_packet(&mut self) -> impl Future<Output = Option<RawPacket>> + Send {
        self.rx.recv()
    }
}

impl Drop for DumpcapSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Blocking pcap reader loop. Exits when the stream ends, the stream is
/// malformed beyond recovery, or the receiving side hung up.
fn read_pcap_stream<R: Read>(input: R, tx: mpsc::UnboundedSender<RawPacket>) {
    let mut reader = match create_reader(65536, input) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to open pcap stream");
            return;
        }
    };

    // Updated once the legacy header arrives; dumpcap -F pcap always
    // sends it first.
    let mut linktype = Linktype::ETHERNET;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(hdr) => linktype = hdr.network,
                    PcapBlockOwned::Legacy(frame) => {
                        if tx.send(decode_frame(linktype, frame.data)).is_err() {
                            // Pipeline is gone; stop reading.
                            return;
                        }
                    }
                    PcapBlockOwned::NG(_) => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                if reader.refill().is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = ?e, "Pcap stream error, stopping capture");
                break;
            }
        }
    }
    tracing::info!("Capture stream ended");
}

/// Slice one captured frame into a `RawPacket`. Frames we cannot slice
/// still surface with their length so the extractor can apply its
/// defaults.
pub(crate) fn decode_frame(linktype: Linktype, data: &[u8]) -> RawPacket {
    use etherparse::{NetSlice, SlicedPacket, TransportSlice};

    let mut raw = RawPacket {
        length: Some(data.len().to_string()),
        ..RawPacket::default()
    };

    let sliced = if linktype == Linktype::ETHERNET {
        SlicedPacket::from_ethernet(data).ok()
    } else if linktype == Linktype::LINUX_SLL {
        // 16-byte SLL pseudo-header, then the IP packet.
        data.get(16..).and_then(|ip| SlicedPacket::from_ip(ip).ok())
    } else if linktype == Linktype::RAW {
        SlicedPacket::from_ip(data).ok()
    } else {
        None
    };

    let Some(sliced) = sliced else {
        return raw;
    };

    raw.network = match &sliced.net {
        Some(NetSlice::Ipv4(v4)) => Some(NetworkLayer {
            src: v4.header().source_addr().to_string(),
            dst: v4.header().destination_addr().to_string(),
        }),
        Some(NetSlice::Ipv6(v6)) => Some(NetworkLayer {
            src: v6.header().source_addr().to_string(),
            dst: v6.header().destination_addr().to_string(),
        }),
        None => None,
    };

    raw.transport = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            let header = tcp.to_header();
            Some(TransportLayer {
                label: "TCP".to_string(),
                src_port: Some(header.source_port.to_string()),
                dst_port: Some(header.destination_port.to_string()),
                flags: tcp_flags(&header),
            })
        }
        Some(TransportSlice::Udp(udp)) => Some(TransportLayer {
            label: "UDP".to_string(),
            src_port: Some(udp.source_port().to_string()),
            dst_port: Some(udp.destination_port().to_string()),
            flags: None,
        }),
        Some(_) | None => None,
    };

    raw
}

fn tcp_flags(header: &etherparse::TcpHeader) -> Option<String> {
    let mut set = Vec::new();
    if header.syn {
        set.push("SYN");
    }
    if header.ack {
        set.push("ACK");
    }
    if header.fin {
        set.push("FIN");
    }
    if header.rst {
        set.push("RST");
    }
    if header.psh {
        set.push("PSH");
    }
    if header.urg {
        set.push("URG");
    }
    if set.is_empty() {
        None
    } else {
        Some(set.join("|"))
    }
}
