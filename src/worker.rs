//! Per-port busy-poll RX worker.
//!
//! One worker thread owns one ingress port's sessions for the lifetime of
//! a start/stop cycle. The loop pulls a bounded batch from the PTP RX
//! queue, dispatches PTP frames to sessions by VLAN, ticks every session's
//! state machine, and yields briefly before polling again. The stop flag
//! is checked once per iteration; the current batch always finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;

use crate::clock::{Clock, Timeouts};
use crate::config::{PTP_RX_QUEUE, RX_BURST_SIZE};
use crate::net::{FramePool, PtpNic};
use crate::session::{Session, TxPath};
use crate::wire::frame;
use crate::wire::message::{PtpMessage, PtpMessageBody};

/// Sleep applied when a poll returns nothing, to back off the busy loop a
/// little without giving up latency on a loaded queue.
const IDLE_POLL_SLEEP: Duration = Duration::from_micros(50);

/// Receive-side tallies for the paced debug line.
#[derive(Default)]
struct WorkerCounters {
    total_rx: u64,
    ptp_rx: u64,
    non_ptp_rx: u64,
    no_session: u64,
    undecodable: u64,
    sync_seen: u64,
    delay_req_seen: u64,
    delay_resp_seen: u64,
}

/// Worker entry point. Returns the sessions to the control surface on
/// shutdown.
pub(crate) fn worker_main(
    port_id: u16,
    mut sessions: Vec<Session>,
    nic: &Arc<dyn PtpNic>,
    clock: &Arc<dyn Clock>,
    pool: &Arc<FramePool>,
    timeouts: Timeouts,
    stop: &Arc<AtomicBool>,
) -> Vec<Session> {
    tracing::info!(
        port_id,
        sessions = sessions.len(),
        queue = PTP_RX_QUEUE,
        "PTP worker starting"
    );

    let mut batch: Vec<Bytes> = Vec::with_capacity(RX_BURST_SIZE);
    let mut counters = WorkerCounters::default();
    let debug_interval = timeouts.tick_hz.saturating_mul(5);
    let mut last_debug = clock.ticks();

    while !stop.load(Ordering::Relaxed) {
        batch.clear();
        let received = nic.rx_burst(port_id, PTP_RX_QUEUE, &mut batch, RX_BURST_SIZE);
        counters.total_rx += received as u64;

        for raw in batch.drain(..) {
            // T2 candidates, sampled as close to the dequeue as we can
            // get: wall clock for offset math, ticks for pacing math.
            let t2_wall_ns = clock.wall_ns();
            let t2_ticks = clock.ticks();
            dispatch_frame(&raw, &mut sessions, &mut counters, t2_wall_ns, t2_ticks);
        }

        let now = clock.ticks();
        let tx = TxPath {
            nic: nic.as_ref(),
            pool: pool.as_ref(),
            clock: clock.as_ref(),
        };
        for session in &mut sessions {
            session.tick(now, &timeouts, &tx);
        }

        if now.saturating_sub(last_debug) > debug_interval {
            tracing::debug!(
                port_id,
                total = counters.total_rx,
                ptp = counters.ptp_rx,
                non_ptp = counters.non_ptp_rx,
                no_session = counters.no_session,
                undecodable = counters.undecodable,
                sync = counters.sync_seen,
                delay_req = counters.delay_req_seen,
                delay_resp = counters.delay_resp_seen,
                "PTP RX worker counters"
            );
            last_debug = now;
        }

        if received == 0 {
            thread::sleep(IDLE_POLL_SLEEP);
        }
        std::hint::spin_loop();
    }

    tracing::info!(port_id, "PTP worker stopping");
    sessions
}

/// Classify one frame, find its session by VLAN, and invoke the handler.
fn dispatch_frame(
    raw: &[u8],
    sessions: &mut [Session],
    counters: &mut WorkerCounters,
    t2_wall_ns: u64,
    t2_ticks: u64,
) {
    let Some(ptp) = frame::parse_ptp_frame(raw) else {
        counters.non_ptp_rx += 1;
        return;
    };
    counters.ptp_rx += 1;

    let Some(session) = sessions
        .iter_mut()
        .find(|s| s.config().rx_vlan == ptp.vlan_id)
    else {
        counters.no_session += 1;
        tracing::trace!(vlan_id = ptp.vlan_id, "PTP frame with no matching session");
        return;
    };

    match PtpMessage::decode(ptp.payload) {
        Ok(msg) => match msg.body {
            PtpMessageBody::Sync { origin_timestamp } => {
                counters.sync_seen += 1;
                session.handle_sync(&msg.header, origin_timestamp, t2_wall_ns, t2_ticks);
            }
            PtpMessageBody::DelayResp {
                receive_timestamp,
                requesting_port_identity,
            } => {
                counters.delay_resp_seen += 1;
                session.handle_delay_resp(
                    &msg.header,
                    receive_timestamp,
                    requesting_port_identity,
                    t2_ticks,
                );
            }
            PtpMessageBody::DelayReq { .. } => {
                counters.delay_req_seen += 1;
            }
            // One-step mode: Follow_Up carries nothing we need. Announce
            // is dropped without BMCA.
            PtpMessageBody::FollowUp { .. } | PtpMessageBody::Announce => {}
        },
        Err(err) => {
            counters.undecodable += 1;
            tracing::trace!(vlan_id = ptp.vlan_id, %err, "undecodable PTP frame dropped");
        }
    }
}
