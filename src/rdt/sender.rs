use std::io::{Read, Seek, SeekFrom};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::{Config, PACKET_SIZE};
use crate::rdt::congestion::CongestionControl;
use crate::rdt::errors::RdtError;
use crate::rdt::flags::CtrlFlags;
use crate::rdt::header::SegmentHeader;
use crate::rdt::seq::SeqTracker;
use crate::rdt::window::{Outstanding, SendWindow};
use crate::sock::handshake::Handshake;
use crate::sock::udp::UdpLink;

/// Sender state shared between the engine loop and the ACK listener.
/// Every read-modify-write on the window or the counters happens under
/// this one lock.
#[derive(Debug)]
struct Shared {
    window: SendWindow,
    flow: CongestionControl,
    /// Receiver-advertised window, refreshed from every ACK.
    rwnd: u16,
    /// Bytes retired from the window by cumulative acknowledgment; the
    /// transfer is complete once this reaches the file size.
    bytes_retired: u64,
}

/// Transmit `fsize` bytes from `source` over an established connection.
///
/// Runs the send engine on the calling thread and the ACK listener on a
/// second, scoped thread. Returns once every byte has been read, sent,
/// and cumulatively acknowledged.
pub fn send_file<R: Read + Seek>(
    link: &UdpLink,
    source: &mut R,
    fsize: u64,
    shake: &Handshake,
    cfg: &Config,
) -> Result<(), RdtError> {
    link.set_read_timeout(Some(cfg.rto))?;

    let shared = Mutex::new(Shared {
        window: SendWindow::new(),
        flow: CongestionControl::new(cfg),
        rwnd: shake.remote.rwnd,
        bytes_retired: 0,
    });
    let ready = Condvar::new();
    let stop = AtomicBool::new(false);
    let init_seq = shake.local.seq;

    thread::scope(|s| {
        let listener = s.spawn(|| listen_acks(link, init_seq, &shared, &ready, &stop, cfg));

        let run = run_engine(link, source, fsize, init_seq, &shared, &ready, cfg);

        stop.store(true, Ordering::Relaxed);
        ready.notify_all();
        listener.join().expect("ACK listener panicked");
        run
    })
}

fn run_engine<R: Read + Seek>(
    link: &UdpLink,
    source: &mut R,
    fsize: u64,
    init_seq: u16,
    shared: &Mutex<Shared>,
    ready: &Condvar,
    cfg: &Config,
) -> Result<(), RdtError> {
    let mut bytes_read = 0u64;
    let mut guard = shared.lock().unwrap();

    loop {
        // Done once the file is exhausted and every byte retired
        if bytes_read == fsize && guard.bytes_retired == fsize {
            break;
        }

        // Admit new data up to the lesser of the congestion window and
        // the receiver-advertised window
        let limit = guard.flow.cwnd().min(guard.rwnd as u32) as u64;
        while bytes_read < fsize
            && guard.window.in_flight() + cfg.payload_size as u64 <= limit
        {
            let want = cfg.payload_size.min((fsize - bytes_read) as usize);
            let mut chunk = vec![0u8; want];
            source.seek(SeekFrom::Start(bytes_read))?;
            source.read_exact(&mut chunk)?;

            let seq = init_seq.wrapping_add(bytes_read as u16);
            debug!(
                seq,
                offset = bytes_read,
                len = want,
                cwnd = guard.flow.cwnd(),
                ssthresh = guard.flow.ssthresh(),
                "sending data segment"
            );
            guard.window.record(bytes_read, seq, want as u16, Instant::now());
            link.send_segment(&data_header(seq, want as u16), &chunk)?;
            bytes_read += want as u64;
        }

        // Scan for outstanding segments older than the RTO
        let now = Instant::now();
        let expired: Vec<(usize, Outstanding)> = guard
            .window
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, seg)| now.duration_since(seg.sent_at) >= cfg.rto)
            .collect();

        if !expired.is_empty() {
            guard.flow.on_timeout();
            debug!(
                count = expired.len(),
                cwnd = guard.flow.cwnd(),
                ssthresh = guard.flow.ssthresh(),
                "retransmission timeout, backing off"
            );
        }
        for (index, seg) in expired {
            // A failure here abandons this segment for the current pass;
            // the unchanged timestamp retries it on the next one
            match retransmit(link, source, &seg) {
                Ok(()) => guard.window.touch(index, Instant::now()),
                Err(err) => {
                    warn!(%err, offset = seg.offset, "retransmission failed, will retry")
                }
            }
        }

        // Park until the listener changes something or the oldest
        // outstanding segment hits its RTO
        let wait = guard
            .window
            .iter()
            .map(|seg| seg.sent_at + cfg.rto)
            .min()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(cfg.rto)
            .max(Duration::from_millis(1));
        guard = ready.wait_timeout(guard, wait).unwrap().0;
    }
    drop(guard);

    info!(bytes = fsize, "transfer complete, all data acknowledged");

    // Courtesy close notice; the receiver may already be gone
    let fin = SegmentHeader {
        seq: init_seq.wrapping_add(fsize as u16),
        ack: 0,
        ctrl: CtrlFlags::FIN,
        len: 0,
        window: 0,
    };
    let _ = link.send_segment(&fin, &[]);

    Ok(())
}

fn data_header(seq: u16, len: u16) -> SegmentHeader {
    SegmentHeader {
        seq,
        ack: 0,
        ctrl: CtrlFlags::empty(),
        len,
        window: 0,
    }
}

/// Re-read the original bytes at the segment's recorded offset and send
/// them again under the original sequence number.
fn retransmit<R: Read + Seek>(
    link: &UdpLink,
    source: &mut R,
    seg: &Outstanding,
) -> Result<(), RdtError> {
    let mut chunk = vec![0u8; seg.len as usize];
    source.seek(SeekFrom::Start(seg.offset))?;
    source.read_exact(&mut chunk)?;

    debug!(seq = seg.seq, offset = seg.offset, "sending data segment (retransmission)");
    link.send_segment(&data_header(seg.seq, seg.len), &chunk)?;
    Ok(())
}

/// Consume acknowledgments: retire covered segments, grow the congestion
/// window, and adopt the receiver's advertised window.
fn listen_acks(
    link: &UdpLink,
    init_seq: u16,
    shared: &Mutex<Shared>,
    ready: &Condvar,
    stop: &AtomicBool,
    cfg: &Config,
) {
    let mut tracker = SeqTracker::new(init_seq, cfg.wrap_threshold);
    let mut buf = [0u8; PACKET_SIZE];

    while !stop.load(Ordering::Relaxed) {
        let hdr = match link.recv_segment(&mut buf) {
            Ok(hdr) => hdr,
            Err(err) if err.is_timeout() => continue,
            Err(RdtError::Header(err)) => {
                warn!(%err, "ignoring malformed segment");
                continue;
            }
            Err(err) => {
                error!(%err, "cannot receive ACK segments, aborting");
                process::exit(2);
            }
        };
        if !hdr.ctrl.contains(CtrlFlags::ACK) || hdr.ctrl.contains(CtrlFlags::SYN) {
            continue;
        }

        let acked = tracker.resolve(hdr.ack);
        let mut guard = shared.lock().unwrap();
        let retired = guard.window.retire_through(acked);
        guard.bytes_retired += retired;
        if retired > 0 {
            guard.flow.on_ack();
        }
        guard.rwnd = hdr.window;
        debug!(
            ack = hdr.ack,
            acked,
            retired,
            cwnd = guard.flow.cwnd(),
            rwnd = guard.rwnd,
            "ACK received"
        );
        ready.notify_all();
    }
}
