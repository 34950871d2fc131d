use std::io::{Seek, SeekFrom, Write};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;

use tracing::{debug, error, info, trace, warn};

use crate::config::{Config, HEADER_SIZE, PACKET_SIZE};
use crate::rdt::errors::RdtError;
use crate::rdt::flags::CtrlFlags;
use crate::rdt::header::SegmentHeader;
use crate::rdt::reassembly::ReassemblyBuffer;
use crate::rdt::seq::SeqTracker;
use crate::sock::handshake::Handshake;
use crate::sock::udp::UdpLink;

/// Receiver state shared between the delivery engine and the data
/// listener. Insertion, the duplicate-offset scan, and cursor advances
/// all happen under this one lock.
#[derive(Debug)]
struct Shared {
    buffer: ReassemblyBuffer,
    /// Next contiguous byte offset expected by the delivery engine.
    cursor: u64,
}

/// Receive `fsize` bytes over an established connection into `sink`.
///
/// Runs the delivery engine on the calling thread and the data listener
/// on a second, scoped thread. Returns once every byte up to `fsize` has
/// been written at its offset.
pub fn recv_file<W: Write + Seek>(
    link: &UdpLink,
    sink: &mut W,
    fsize: u64,
    shake: &Handshake,
    cfg: &Config,
) -> Result<(), RdtError> {
    link.set_read_timeout(Some(cfg.rto))?;

    let shared = Mutex::new(Shared {
        buffer: ReassemblyBuffer::new(cfg.reassembly_capacity()),
        cursor: 0,
    });
    let ready = Condvar::new();
    let stop = AtomicBool::new(false);
    // First wire sequence number the sender will use for data
    let init_ack = shake.remote.seq;

    thread::scope(|s| {
        let listener = s.spawn(|| listen_data(link, init_ack, &shared, &ready, &stop, cfg));

        let run = run_engine(sink, fsize, &shared, &ready);

        // Grace period: keep re-acknowledging tail retransmissions so the
        // sender can observe completion before the listener goes away
        thread::sleep(2 * cfg.rto);
        stop.store(true, Ordering::Relaxed);
        listener.join().expect("data listener panicked");
        run
    })
}

fn run_engine<W: Write + Seek>(
    sink: &mut W,
    fsize: u64,
    shared: &Mutex<Shared>,
    ready: &Condvar,
) -> Result<(), RdtError> {
    let mut guard = shared.lock().unwrap();

    while guard.cursor < fsize {
        // Drain every buffered segment that lines up with the cursor
        loop {
            let cursor = guard.cursor;
            let Some(seg) = guard.buffer.take_ready(cursor) else {
                break;
            };
            sink.seek(SeekFrom::Start(seg.offset))?;
            sink.write_all(&seg.data)?;
            guard.cursor += seg.data.len() as u64;
            trace!(
                offset = seg.offset,
                len = seg.data.len(),
                cursor = guard.cursor,
                "delivered segment"
            );
        }
        if guard.cursor >= fsize {
            break;
        }
        guard = ready.wait(guard).unwrap();
    }
    drop(guard);

    sink.flush()?;
    info!(bytes = fsize, "file fully delivered");
    Ok(())
}

/// Consume data segments: buffer them for in-order delivery and answer
/// each with a cumulative acknowledgment carrying the current
/// flow-control advertisement.
fn listen_data(
    link: &UdpLink,
    init_ack: u16,
    shared: &Mutex<Shared>,
    ready: &Condvar,
    stop: &AtomicBool,
    cfg: &Config,
) {
    let mut tracker = SeqTracker::new(init_ack, cfg.wrap_threshold);
    // Cumulative acknowledgment value, as sent on the wire
    let mut next_ack = init_ack;
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
                error!(%err, "cannot receive data segments, aborting");
                process::exit(2);
            }
        };

        if hdr.ctrl.contains(CtrlFlags::FIN) {
            debug!("FIN received, sender is done");
            break;
        }
        if hdr.ctrl.contains(CtrlFlags::SYN) {
            // Lost handshake ACK: the completing acknowledgment doubles
            // as the handshake's third message
            send_ack(link, next_ack, cfg.init_rwnd);
            continue;
        }
        if hdr.len == 0 {
            continue;
        }

        let offset = tracker.resolve(hdr.seq);
        let len = hdr.len as usize;
        debug!(seq = hdr.seq, offset, len, "received data segment");

        let mut guard = shared.lock().unwrap();
        if offset < guard.cursor {
            // Duplicate of already-delivered data: refresh the cumulative
            // acknowledgment to the cursor and re-send it
            next_ack = init_ack.wrapping_add(guard.cursor as u16);
            let advertised = advertised_window(&guard, cfg);
            drop(guard);
            debug!(ack = next_ack, "re-sending ACK for delivered data");
            send_ack(link, next_ack, advertised);
            continue;
        }

        let at_cursor = offset == guard.cursor;
        let inserted = guard
            .buffer
            .insert(offset, &buf[HEADER_SIZE..HEADER_SIZE + len]);
        if inserted {
            if at_cursor {
                next_ack = hdr.seq.wrapping_add(hdr.len);
            }
            ready.notify_all();
        }
        let advertised = advertised_window(&guard, cfg);
        drop(guard);

        debug!(ack = next_ack, window = advertised, "sending ACK");
        send_ack(link, next_ack, advertised);
    }

    // Unblock the engine in case it is parked on an empty buffer
    ready.notify_all();
}

/// Remaining reassembly capacity in bytes, capped at the handshake-time
/// advertisement.
fn advertised_window(shared: &Shared, cfg: &Config) -> u16 {
    let free = (cfg.reassembly_capacity() - shared.buffer.len()) * cfg.payload_size;
    free.min(cfg.init_rwnd as usize) as u16
}

fn send_ack(link: &UdpLink, ack: u16, window: u16) {
    let hdr = SegmentHeader {
        seq: 0,
        ack,
        ctrl: CtrlFlags::ACK,
        len: 0,
        window,
    };
    if let Err(err) = link.send_segment(&hdr, &[]) {
        error!(%err, "cannot send ACK segment, aborting");
        process::exit(2);
    }
}
