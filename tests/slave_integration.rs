//! End-to-end tests for the PTP slave engine.
//!
//! Each test runs the real worker threads against the scriptable NIC and
//! the manual clock: master frames are injected into the PTP RX queue,
//! emitted `Delay_Req` frames are read back out of the TX log, and time
//! only moves when the test advances it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fabric_ptp::config::{PTP_RX_QUEUE, PTP_TX_QUEUE};
use fabric_ptp::flow::pattern_cascade;
use fabric_ptp::testing::{FakeNic, ManualClock, TxFrame};
use fabric_ptp::wire::frame::{parse_ptp_frame, ETHERTYPE_PTP, ETHERTYPE_VLAN};
use fabric_ptp::wire::message::{PortIdentity, PtpMessage};
use fabric_ptp::wire::timestamp::PtpTimestamp;
use fabric_ptp::{PtpEngine, SessionConfig, SessionStats};

const HZ: u64 = 1_000_000_000;

fn master_identity() -> PortIdentity {
    PortIdentity::new(0x0001_0203_0405_0607, 1)
}

/// Wrap a PTP message in the VLAN-tagged Ethernet frame the fabric
/// delivers.
fn tagged(vlan_id: u16, ptp: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(18 + ptp.len());
    frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x20]); // dst
    frame.extend_from_slice(&[0x2C, 0x1A, 0x00, 0x00, 0x00, 0x01]); // src
    frame.extend_from_slice(&ETHERTYPE_VLAN.to_be_bytes());
    frame.extend_from_slice(&vlan_id.to_be_bytes());
    frame.extend_from_slice(&ETHERTYPE_PTP.to_be_bytes());
    frame.extend_from_slice(ptp);
    frame
}

fn sync_frame(vlan_id: u16, seq: u16, ts: PtpTimestamp) -> Vec<u8> {
    let mut msg = PtpMessage::sync(master_identity(), seq, ts);
    msg.header.domain_number = 10;
    tagged(vlan_id, &msg.encode())
}

fn delay_resp_frame(vlan_id: u16, seq: u16, ts: PtpTimestamp) -> Vec<u8> {
    // The master echoes a requesting identity of its own invention; the
    // slave must not care.
    let msg = PtpMessage::delay_resp(master_identity(), seq, ts, PortIdentity::default());
    tagged(vlan_id, &msg.encode())
}

struct Rig {
    engine: PtpEngine,
    nic: Arc<FakeNic>,
    clock: Arc<ManualClock>,
}

impl Rig {
    fn start(configs: &[SessionConfig]) -> Self {
        let nic = Arc::new(FakeNic::new());
        let clock = Arc::new(ManualClock::new(HZ));
        let mut engine = PtpEngine::new(nic.clone(), clock.clone());
        engine.init().unwrap();
        engine.configure(configs).unwrap();
        engine.start().unwrap();
        Self { engine, nic, clock }
    }

    fn session() -> SessionConfig {
        SessionConfig {
            rx_port_id: 5,
            rx_vlan: 225,
            tx_port_id: 2,
            tx_vlan: 97,
            tx_vl_idx: 4420,
        }
    }

    fn row(&self, vlan_id: u16) -> SessionStats {
        let mut out = [SessionStats::default(); 32];
        let n = self.engine.snapshot_stats(&mut out);
        out[..n]
            .iter()
            .find(|row| row.vlan_id == vlan_id)
            .copied()
            .expect("session not in snapshot")
    }

    /// Poll a predicate against real time while the manual clock stands
    /// still.
    fn wait_for(&self, what: &str, mut pred: impl FnMut(&Self) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if pred(self) {
                return;
            }
            std::thread::sleep(Duration::from_micros(200));
        }
        panic!("timed out waiting for: {what}");
    }

    fn wait_for_state(&self, vlan_id: u16, state: &str) {
        self.wait_for(&format!("vlan {vlan_id} state {state}"), |rig| {
            rig.row(vlan_id).state_name == state
        });
    }

    /// Drive one full Sync → Delay_Req → Delay_Resp cycle with the seed
    /// scenario's timestamps. Returns the emitted `Delay_Req`.
    fn run_happy_cycle(&self) -> TxFrame {
        self.wait_for_state(225, "LISTENING");

        // Master Sync: origin 100.5 s, received 50 µs later.
        self.clock.set_wall_ns(100_500_050_000);
        self.nic.push_rx(
            5,
            PTP_RX_QUEUE,
            sync_frame(225, 1, PtpTimestamp::new(100, 500_000_000)),
        );
        self.wait_for_state(225, "SYNC_RECV");

        // 150 ms later the worker emits the Delay_Req; T3 wall clock is
        // pinned first.
        let already_sent = self.nic.sent().len();
        self.clock.set_wall_ns(100_500_200_000);
        self.clock.advance_ticks(150_000_000);
        self.wait_for("Delay_Req emission", |rig| {
            rig.nic.sent().len() > already_sent
        });
        let sent = self.nic.sent();
        let req = sent.last().unwrap().clone();
        assert_eq!(req.port_id, 2, "Delay_Req must leave through the TX port");
        assert_eq!(req.queue_id, PTP_TX_QUEUE);

        // Master's receive timestamp comes back in the Delay_Resp, bound
        // by sequence id.
        let seq = parse_ptp_seq(&req.data);
        self.nic.push_rx(
            5,
            PTP_RX_QUEUE,
            delay_resp_frame(225, seq, PtpTimestamp::new(100, 650_100_000)),
        );
        self.wait_for_state(225, "SYNCED");
        req
    }
}

fn parse_ptp_seq(frame: &[u8]) -> u16 {
    let ptp = parse_ptp_frame(frame).expect("emitted frame must be PTP");
    PtpMessage::decode(ptp.payload)
        .expect("emitted frame must decode")
        .header
        .sequence_id
}

// ===== Seed scenario 1: happy path =====

#[test]
fn test_happy_path_offset_and_delay() {
    let mut rig = Rig::start(&[Rig::session()]);
    rig.run_happy_cycle();

    let row = rig.row(225);
    assert!(row.is_synced);
    assert_eq!(row.state_name, "SYNCED");
    // offset = ((t2-t1) - (t4-t3)) / 2 = (50_000 - 149_900_000) / 2
    assert_eq!(row.offset_ns, -74_925_000);
    // delay = ((t2-t1) + (t4-t3)) / 2
    assert_eq!(row.delay_ns, 74_975_000);
    assert_eq!(row.sync_rx, 1);
    assert_eq!(row.delay_req_tx, 1);
    assert_eq!(row.delay_resp_rx, 1);

    rig.engine.stop();
}

#[test]
fn test_emitted_delay_req_wire_format() {
    let mut rig = Rig::start(&[Rig::session()]);
    let req = rig.run_happy_cycle();

    assert_eq!(req.data.len(), 124);
    // Fabric routing: VL-index 4420 in the destination MAC tail.
    assert_eq!(&req.data[0..6], &[0x03, 0x00, 0x00, 0x00, 0x11, 0x44]);
    assert_eq!(&req.data[6..12], &[0x02, 0x00, 0x00, 0x00, 0x00, 0x20]);
    let parsed = parse_ptp_frame(&req.data).unwrap();
    assert_eq!(parsed.vlan_id, 97);
    let msg = PtpMessage::decode(parsed.payload).unwrap();
    assert_eq!(msg.header.message_length, 106);
    assert_eq!(msg.header.domain_number, 10);
    assert_eq!(msg.header.flags, 0x0102);
    assert_eq!(msg.header.source_port_identity, PortIdentity::SLAVE_FIXED);

    rig.engine.stop();
}

// ===== Seed scenario 2: stale Delay_Resp =====

#[test]
fn test_stale_delay_resp_is_ignored() {
    let mut rig = Rig::start(&[Rig::session()]);
    rig.wait_for_state(225, "LISTENING");

    rig.clock.set_wall_ns(100_500_050_000);
    rig.nic.push_rx(
        5,
        PTP_RX_QUEUE,
        sync_frame(225, 5, PtpTimestamp::new(100, 500_000_000)),
    );
    rig.wait_for_state(225, "SYNC_RECV");
    rig.clock.advance_ticks(100_000_000);
    rig.wait_for("Delay_Req emission", |r| !r.nic.sent().is_empty());
    let seq = parse_ptp_seq(&rig.nic.sent()[0].data);

    let before = rig.row(225);
    rig.nic.push_rx(
        5,
        PTP_RX_QUEUE,
        delay_resp_frame(225, seq.wrapping_sub(1), PtpTimestamp::new(100, 650_100_000)),
    );
    // Give the worker real time to drain the frame; the clock stays put.
    std::thread::sleep(Duration::from_millis(20));

    let after = rig.row(225);
    assert_eq!(after.state_name, "DELAY_SENT");
    assert_eq!(after.delay_resp_rx, before.delay_resp_rx);
    assert!(!after.is_synced);

    rig.engine.stop();
}

// ===== Seed scenario 3: Sync timeout =====

#[test]
fn test_sync_timeout_drops_to_listening() {
    let mut rig = Rig::start(&[Rig::session()]);
    rig.run_happy_cycle();
    assert!(rig.row(225).is_synced);

    // 3.01 s of silence.
    rig.clock.advance_ticks(3_010_000_000);
    rig.wait_for_state(225, "LISTENING");

    let row = rig.row(225);
    assert!(!row.is_synced);

    rig.engine.stop();
}

// ===== Seed scenario 4: empty T4 =====

#[test]
fn test_empty_t4_synced_with_zero_math() {
    let mut rig = Rig::start(&[Rig::session()]);
    rig.wait_for_state(225, "LISTENING");

    rig.clock.set_wall_ns(100_500_050_000);
    rig.nic.push_rx(
        5,
        PTP_RX_QUEUE,
        sync_frame(225, 1, PtpTimestamp::new(100, 500_000_000)),
    );
    rig.wait_for_state(225, "SYNC_RECV");
    rig.clock.advance_ticks(100_000_000);
    rig.wait_for("Delay_Req emission", |r| !r.nic.sent().is_empty());
    let seq = parse_ptp_seq(&rig.nic.sent()[0].data);

    rig.nic
        .push_rx(5, PTP_RX_QUEUE, delay_resp_frame(225, seq, PtpTimestamp::ZERO));
    rig.wait_for_state(225, "SYNCED");

    let row = rig.row(225);
    assert!(row.is_synced);
    assert_eq!(row.offset_ns, 0);
    assert_eq!(row.delay_ns, 0);

    rig.engine.stop();
}

// ===== Seed scenario 5: wrong VLAN =====

#[test]
fn test_unknown_vlan_is_dropped() {
    let configs: Vec<SessionConfig> = (0..4)
        .map(|i| SessionConfig {
            rx_port_id: 5,
            rx_vlan: 225 + i,
            tx_port_id: 2,
            tx_vlan: 97 + i,
            tx_vl_idx: 4420 + 2 * i,
        })
        .collect();
    let mut rig = Rig::start(&configs);
    rig.wait_for_state(225, "LISTENING");

    rig.nic.push_rx(
        5,
        PTP_RX_QUEUE,
        sync_frame(99, 1, PtpTimestamp::new(100, 0)),
    );
    std::thread::sleep(Duration::from_millis(20));

    let mut out = [SessionStats::default(); 32];
    let n = rig.engine.snapshot_stats(&mut out);
    assert_eq!(n, 4);
    for row in &out[..n] {
        assert_eq!(row.sync_rx, 0, "vlan {} must see nothing", row.vlan_id);
        assert_eq!(row.state_name, "LISTENING");
    }

    rig.engine.stop();
}

// ===== Seed scenario 6: flow-rule fallback cascade =====

#[test]
fn test_flow_rule_fallback_cascade() {
    let nic = Arc::new(FakeNic::new());
    let clock = Arc::new(ManualClock::new(HZ));
    // The NIC refuses the unconstrained-outer pattern on port 5.
    nic.reject_pattern(5, pattern_cascade()[0]);

    let mut engine = PtpEngine::new(nic.clone(), clock);
    engine.init().unwrap();
    engine.configure(&[Rig::session()]).unwrap();
    engine.start().unwrap();

    let rules = nic.installed_rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].pattern, pattern_cascade()[1]);
    let handle = rules[0].handle;

    engine.stop();
    assert!(nic.installed_rules().is_empty());
    assert_eq!(nic.destroyed_rules().len(), 1);
    assert_eq!(nic.destroyed_rules()[0].handle, handle);
}

#[test]
fn test_start_succeeds_with_all_patterns_rejected() {
    let nic = Arc::new(FakeNic::new());
    let clock = Arc::new(ManualClock::new(HZ));
    for pattern in pattern_cascade() {
        nic.reject_pattern(5, pattern);
    }

    let mut engine = PtpEngine::new(nic.clone(), clock);
    engine.init().unwrap();
    engine.configure(&[Rig::session()]).unwrap();
    // The port shares the default queue; start is not fatal.
    engine.start().unwrap();
    assert!(nic.installed_rules().is_empty());
    engine.stop();
}

// ===== Snapshot laws =====

#[test]
fn test_snapshot_idempotent_without_traffic() {
    let mut rig = Rig::start(&[Rig::session()]);
    rig.run_happy_cycle();

    let a = rig.row(225);
    std::thread::sleep(Duration::from_millis(10));
    let b = rig.row(225);
    assert_eq!(a, b);

    rig.engine.stop();
}

#[test]
fn test_reset_stats_clears_counters_keeps_state() {
    let mut rig = Rig::start(&[Rig::session()]);
    rig.run_happy_cycle();

    rig.engine.reset_stats();
    let row = rig.row(225);
    assert_eq!(row.sync_rx, 0);
    assert_eq!(row.delay_req_tx, 0);
    assert_eq!(row.delay_resp_rx, 0);
    // The completed cycle and its math survive.
    assert_eq!(row.state_name, "SYNCED");
    assert!(row.is_synced);
    assert_eq!(row.offset_ns, -74_925_000);

    rig.engine.stop();
}

// ===== Multi-cycle and invariants =====

#[test]
fn test_consecutive_cycles_advance_sequence() {
    let mut rig = Rig::start(&[Rig::session()]);
    rig.run_happy_cycle();

    // A second Sync restarts the cycle from SYNCED.
    rig.clock.set_wall_ns(101_500_050_000);
    rig.nic.push_rx(
        5,
        PTP_RX_QUEUE,
        sync_frame(225, 2, PtpTimestamp::new(101, 500_000_000)),
    );
    rig.wait_for_state(225, "SYNC_RECV");
    let sent_before = rig.nic.sent().len();
    rig.clock.set_wall_ns(101_500_200_000);
    rig.clock.advance_ticks(150_000_000);
    rig.wait_for("second Delay_Req", |r| r.nic.sent().len() > sent_before);

    let sent = rig.nic.sent();
    let seq0 = parse_ptp_seq(&sent[sent.len() - 2].data);
    let seq1 = parse_ptp_seq(&sent[sent.len() - 1].data);
    assert_eq!(seq1, seq0.wrapping_add(1));

    let row = rig.row(225);
    assert!(row.delay_req_tx >= row.delay_resp_rx);

    rig.engine.stop();
}

#[test]
fn test_delay_resp_timeout_then_recovery() {
    let mut rig = Rig::start(&[Rig::session()]);
    rig.wait_for_state(225, "LISTENING");

    rig.clock.set_wall_ns(100_500_050_000);
    rig.nic.push_rx(
        5,
        PTP_RX_QUEUE,
        sync_frame(225, 1, PtpTimestamp::new(100, 500_000_000)),
    );
    rig.wait_for_state(225, "SYNC_RECV");
    rig.clock.advance_ticks(100_000_000);
    rig.wait_for("Delay_Req emission", |r| !r.nic.sent().is_empty());

    // No Delay_Resp for 2.01 s: one-way reachability.
    rig.clock.advance_ticks(2_010_000_000);
    rig.wait_for_state(225, "LISTENING");
    assert!(!rig.row(225).is_synced);

    // The master comes back and the session recovers fully.
    rig.clock.set_wall_ns(200_500_050_000);
    rig.nic.push_rx(
        5,
        PTP_RX_QUEUE,
        sync_frame(225, 9, PtpTimestamp::new(200, 500_000_000)),
    );
    rig.wait_for_state(225, "SYNC_RECV");
    let sent_before = rig.nic.sent().len();
    rig.clock.set_wall_ns(200_500_200_000);
    rig.clock.advance_ticks(150_000_000);
    rig.wait_for("recovery Delay_Req", |r| r.nic.sent().len() > sent_before);
    let seq = parse_ptp_seq(&rig.nic.sent().last().unwrap().data);
    rig.nic.push_rx(
        5,
        PTP_RX_QUEUE,
        delay_resp_frame(225, seq, PtpTimestamp::new(200, 650_100_000)),
    );
    rig.wait_for_state(225, "SYNCED");

    rig.engine.stop();
}

#[test]
fn test_follow_up_and_announce_are_ignored() {
    let mut rig = Rig::start(&[Rig::session()]);
    rig.wait_for_state(225, "LISTENING");

    // Follow_Up (two-step leftovers) and Announce must not disturb state.
    let mut follow_up =
        PtpMessage::sync(master_identity(), 3, PtpTimestamp::new(50, 0)).encode();
    follow_up[0] = (follow_up[0] & 0xF0) | 0x08;
    rig.nic.push_rx(5, PTP_RX_QUEUE, tagged(225, &follow_up));

    let mut announce =
        PtpMessage::sync(master_identity(), 4, PtpTimestamp::new(51, 0)).encode();
    announce[0] = (announce[0] & 0xF0) | 0x0B;
    rig.nic.push_rx(5, PTP_RX_QUEUE, tagged(225, &announce));

    std::thread::sleep(Duration::from_millis(20));
    let row = rig.row(225);
    assert_eq!(row.state_name, "LISTENING");
    assert_eq!(row.sync_rx, 0);

    rig.engine.stop();
}
