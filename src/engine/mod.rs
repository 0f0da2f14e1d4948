//! Protocol engine: dispatch core, outbound commands, and the polling loop.
//!
//! One [`Engine`] instance owns one bus connection. The embedding
//! application constructs it with the transport and the node's unique id,
//! then drives it from its main loop:
//!
//! ```text
//! loop {
//!     engine.poll(now_ms);       // read one frame, tick the retry queue
//!     engine.handle_pending();   // dispatch the decoded message, if any
//! }
//! ```
//!
//! Everything is synchronous and non-blocking; at most one decoded message
//! is buffered between `poll` and `handle_pending`.

mod callbacks;
mod features;
mod nodes;
mod secure_ack;

pub use callbacks::{
    AccessoryAckHandler, AccessoryStateHandler, AddressReportHandler, BoosterDiagnosticHandler,
    BoosterStatusHandler, Callbacks, CvReportHandler, DriveAckHandler, FwUpdateStatusHandler,
    OccupancyHandler, OccupancyMultipleHandler, PomAckHandler, SpeedReportHandler,
    VendorAckHandler, VendorDataHandler,
};
pub use features::{Feature, FeatureTable, MAX_FEATURES};
pub use nodes::{MAX_NODES, NodeTable, Registration};
pub use secure_ack::{MAX_PENDING, SecureAckQueue};

use tracing::{debug, trace};

use crate::protocol::{
    MAX_PAYLOAD_LEN, Message, MessageType, SYS_MAGIC, UNIQUE_ID_LEN, codec, cs, feature, pom,
};
use crate::transport::ByteStream;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Node table capacity, clamped to `1..=MAX_NODES`.
    pub max_nodes: usize,
    /// Milliseconds before an unconfirmed occupancy report is retransmitted.
    pub secure_ack_timeout_ms: u32,
    /// Retransmissions before an unconfirmed report is dropped.
    pub secure_ack_max_retries: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_nodes: MAX_NODES,
            secure_ack_timeout_ms: 250,
            secure_ack_max_retries: 3,
        }
    }
}

/// Node-side protocol engine for one bus connection.
pub struct Engine<S: ByteStream> {
    stream: S,
    unique_id: [u8; UNIQUE_ID_LEN],
    system_enabled: bool,
    logged_in: bool,
    track_state: u8,
    features: FeatureTable,
    nodes: NodeTable,
    secure_ack: SecureAckQueue,
    callbacks: Callbacks,
    inbox: Option<Message>,
}

impl<S: ByteStream> Engine<S> {
    /// Create an engine with default configuration.
    pub fn new(stream: S, unique_id: [u8; UNIQUE_ID_LEN]) -> Self {
        Self::with_config(stream, unique_id, &Config::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(stream: S, unique_id: [u8; UNIQUE_ID_LEN], config: &Config) -> Self {
        let mut features = FeatureTable::new();
        // Capabilities every node of this firmware generation advertises.
        features.set(feature::FW_UPDATE_SUPPORT, 1);
        features.set(feature::STRING_SIZE, 32);
        features.set(feature::MSG_RECEIVE_COUNT, 4);

        Self {
            stream,
            unique_id,
            system_enabled: true,
            logged_in: false,
            track_state: cs::TRACK_OFF,
            features,
            nodes: NodeTable::new(unique_id, config.max_nodes),
            secure_ack: SecureAckQueue::new(
                config.secure_ack_timeout_ms,
                config.secure_ack_max_retries,
            ),
            callbacks: Callbacks::default(),
            inbox: None,
        }
    }

    /// This node's 7-byte unique identifier.
    #[must_use]
    pub const fn unique_id(&self) -> &[u8; UNIQUE_ID_LEN] {
        &self.unique_id
    }

    /// Whether non-system messages are currently processed.
    #[must_use]
    pub const fn system_enabled(&self) -> bool {
        self.system_enabled
    }

    /// Whether this node has received a logon acknowledgement.
    #[must_use]
    pub const fn logged_in(&self) -> bool {
        self.logged_in
    }

    /// Last commanded track power state.
    #[must_use]
    pub const fn track_state(&self) -> u8 {
        self.track_state
    }

    /// The node registry (host role).
    #[must_use]
    pub const fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Borrow the underlying stream.
    #[must_use]
    pub const fn stream(&self) -> &S {
        &self.stream
    }

    /// Mutably borrow the underlying stream.
    ///
    /// Tests use this to inspect captured frames on an in-memory transport.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Store a feature value (silently dropped when the table is full).
    pub fn set_feature(&mut self, id: u8, value: u8) {
        self.features.set(id, value);
    }

    /// Read a feature value, 0 when absent.
    #[must_use]
    pub fn get_feature(&self, id: u8) -> u8 {
        self.features.get(id)
    }

    // --- Polling loop -----------------------------------------------------

    /// One engine cycle: attempt a single frame decode, then run time-based
    /// retry maintenance.
    ///
    /// `now` is a wrapping millisecond counter and must be non-decreasing
    /// (modulo wraparound). A decoded message replaces any unconsumed
    /// predecessor; the engine buffers at most one message at a time.
    pub fn poll(&mut self, now: u32) {
        if self.stream.available() > 0 {
            match codec::decode(&mut self.stream) {
                Ok(msg) => {
                    trace!(
                        msg_type = msg.type_byte(),
                        msg_num = msg.msg_num(),
                        "frame decoded"
                    );
                    self.inbox = Some(msg);
                }
                // Bus noise is routine: drop the frame and resynchronize
                // on the next start magic.
                Err(err) => debug!(%err, "frame dropped"),
            }
        }

        if self.features.get(feature::SECURE_ACK) != 0 {
            let stream = &mut self.stream;
            self.secure_ack.tick(now, |msg| {
                for &byte in codec::encode(msg).iter() {
                    stream.write(byte);
                }
            });
        }
    }

    /// Whether a decoded message is waiting to be processed.
    #[must_use]
    pub const fn message_available(&self) -> bool {
        self.inbox.is_some()
    }

    /// Take the buffered message without dispatching it.
    pub fn take_message(&mut self) -> Option<Message> {
        self.inbox.take()
    }

    /// Dispatch and consume the buffered message, if any.
    pub fn handle_pending(&mut self) {
        if let Some(msg) = self.inbox.take() {
            self.handle(&msg);
        }
    }

    // --- Dispatch core ----------------------------------------------------

    /// Interpret one decoded message against current state.
    ///
    /// Enable/disable are always actionable; while disabled every other
    /// message is discarded. Unknown types are ignored for forward
    /// compatibility.
    pub fn handle(&mut self, msg: &Message) {
        let Some(ty) = msg.message_type() else {
            trace!(msg_type = msg.type_byte(), "ignoring unknown message type");
            return;
        };

        match ty {
            MessageType::SysEnable => {
                self.system_enabled = true;
                debug!("system enabled");
                return;
            }
            MessageType::SysDisable => {
                self.system_enabled = false;
                debug!("system disabled");
                return;
            }
            _ => {}
        }
        if !self.system_enabled {
            return;
        }

        let p = msg.payload();
        match ty {
            MessageType::SysGetMagic => {
                self.respond(MessageType::SysMagic, msg.msg_num(), &[SYS_MAGIC]);
            }
            MessageType::SysGetPVersion => {
                let (major, minor) = crate::PROTOCOL_VERSION;
                self.respond(MessageType::SysPVersion, msg.msg_num(), &[minor, major]);
            }
            MessageType::SysGetUniqueId => {
                let uid = self.unique_id;
                self.respond(MessageType::SysUniqueId, msg.msg_num(), &uid);
            }

            MessageType::NodetabGetall => self.handle_nodetab_getall(msg),
            MessageType::NodetabGetnext => self.handle_nodetab_getnext(msg),
            MessageType::Logon => self.handle_logon(msg),
            MessageType::LogonAck => {
                self.logged_in = true;
                self.nodes.reset_to_self();
                debug!("logon acknowledged by host");
            }

            MessageType::FeatureGetall => {
                self.features.rewind();
                let count = self.features.len() as u8;
                self.respond(MessageType::FeatureCount, msg.msg_num(), &[count]);
            }
            MessageType::FeatureGetnext => match self.features.next_entry() {
                Some(entry) => {
                    self.respond(MessageType::Feature, msg.msg_num(), &[entry.id, entry.value]);
                }
                None => self.respond(MessageType::FeatureNa, msg.msg_num(), &[255]),
            },
            MessageType::FeatureGet => {
                let id = byte(p, 0);
                match self.features.lookup(id) {
                    Some(value) => {
                        self.respond(MessageType::Feature, msg.msg_num(), &[id, value]);
                    }
                    None => self.respond(MessageType::FeatureNa, msg.msg_num(), &[id]),
                }
            }
            MessageType::FeatureSet => {
                let id = byte(p, 0);
                self.features.set(id, byte(p, 1));
                let value = self.features.get(id);
                self.respond(MessageType::Feature, msg.msg_num(), &[id, value]);
            }

            MessageType::CsState => self.track_state = byte(p, 0),
            MessageType::CsDriveAck => {
                if let Some(cb) = self.callbacks.drive_ack.as_mut() {
                    cb(word(p, 0), byte(p, 2));
                }
            }
            MessageType::CsAccessoryAck => {
                if let Some(cb) = self.callbacks.accessory_ack.as_mut() {
                    cb(word(p, 0), byte(p, 2));
                }
            }
            MessageType::CsPomAck => {
                // Status sits behind the 5-byte extended address block.
                if let Some(cb) = self.callbacks.pom_ack.as_mut() {
                    cb(word(p, 0), byte(p, 5));
                }
            }

            MessageType::BmOcc => {
                if let Some(cb) = self.callbacks.occupancy.as_mut() {
                    cb(byte(p, 0), true);
                }
            }
            MessageType::BmFree => {
                if let Some(cb) = self.callbacks.occupancy.as_mut() {
                    cb(byte(p, 0), false);
                }
            }
            MessageType::BmMultiple => {
                if let Some(cb) = self.callbacks.occupancy_multiple.as_mut() {
                    let bitmap = if p.len() > 2 { &p[2..] } else { &[][..] };
                    cb(byte(p, 0), byte(p, 1), bitmap);
                }
            }
            MessageType::BmAddress => {
                if let Some(cb) = self.callbacks.address_report.as_mut() {
                    cb(byte(p, 0), word(p, 2));
                }
            }
            MessageType::BmSpeed => {
                if let Some(cb) = self.callbacks.speed_report.as_mut() {
                    cb(word(p, 0), word(p, 2));
                }
            }
            MessageType::BmCv => {
                if let Some(cb) = self.callbacks.cv_report.as_mut() {
                    cb(word(p, 0), word(p, 3), byte(p, 5));
                }
            }

            MessageType::BmMirrorOcc | MessageType::BmMirrorFree
            | MessageType::BmMirrorMultiple => {
                self.secure_ack.acknowledge(ty, byte(p, 0));
            }

            MessageType::AccessoryState | MessageType::AccessoryNotify => {
                if let Some(cb) = self.callbacks.accessory_state.as_mut() {
                    cb(byte(p, 0), byte(p, 1));
                }
            }

            MessageType::BoostStat => {
                if let Some(cb) = self.callbacks.booster_status.as_mut() {
                    cb(byte(p, 0));
                }
            }
            MessageType::BoostDiagnostic => {
                // One (type, value) pair per 3 payload bytes; a truncated
                // final pair is taken with a zero high byte.
                if let Some(cb) = self.callbacks.booster_diagnostic.as_mut() {
                    let mut i = 0;
                    while i + 1 < p.len() {
                        cb(p[i], word(p, i + 1));
                        i += 3;
                    }
                }
            }

            MessageType::FwUpdateStat => {
                if let Some(cb) = self.callbacks.fw_update_status.as_mut() {
                    cb(byte(p, 0), byte(p, 1));
                }
            }

            MessageType::Vendor => self.handle_vendor_data(msg),
            MessageType::VendorAck => {
                if let Some(cb) = self.callbacks.vendor_ack.as_mut() {
                    cb(msg.first_address(), byte(p, 0));
                }
            }

            // Downstream commands this node does not serve.
            _ => {}
        }
    }

    fn handle_nodetab_getall(&mut self, msg: &Message) {
        if !self.logged_in {
            // A node count is withheld until the requester has logged on.
            debug!("node table query before logon, ignoring");
            return;
        }
        let version = self.nodes.version();
        let count = self.nodes.count() as u8;
        self.respond(MessageType::NodetabCount, msg.msg_num(), &[version, count]);
    }

    fn handle_nodetab_getnext(&mut self, msg: &Message) {
        let index = byte(msg.payload(), 0);
        let entry = if self.logged_in {
            self.nodes.entry(index as usize).copied()
        } else {
            None
        };
        match entry {
            Some(uid) => {
                let mut body = [0u8; 2 + UNIQUE_ID_LEN];
                body[0] = self.nodes.version();
                body[1] = index;
                body[2..].copy_from_slice(&uid);
                self.respond(MessageType::Nodetab, msg.msg_num(), &body);
            }
            None => self.respond(MessageType::NodeNa, msg.msg_num(), &[index]),
        }
    }

    /// Host-side logon handling: assign a table slot, acknowledge, announce.
    fn handle_logon(&mut self, msg: &Message) {
        let p = msg.payload();
        if p.len() < UNIQUE_ID_LEN {
            debug!(len = p.len(), "short logon request, ignoring");
            return;
        }
        let mut uid = [0u8; UNIQUE_ID_LEN];
        uid.copy_from_slice(&p[..UNIQUE_ID_LEN]);

        match self.nodes.register(uid) {
            Registration::Added(index) => {
                let mut body = [0u8; 2 + UNIQUE_ID_LEN];
                body[0] = self.nodes.version();
                body[1] = index;
                body[2..].copy_from_slice(&uid);
                self.respond(MessageType::LogonAck, msg.msg_num(), &body);
                // Announce the newcomer to every other bus listener.
                self.respond(MessageType::NodeNew, 0, &body);
                debug!(index, "node logged on");
            }
            Registration::Duplicate | Registration::Full => {}
        }
    }

    fn handle_vendor_data(&mut self, msg: &Message) {
        let Some(cb) = self.callbacks.vendor_data.as_mut() else {
            return;
        };
        let p = msg.payload();
        let text = p.strip_suffix(&[0]).unwrap_or(p);
        let Ok(text) = std::str::from_utf8(text) else {
            debug!("vendor data is not valid UTF-8, ignoring");
            return;
        };
        let Some((name, value)) = text.split_once('=') else {
            debug!(text, "vendor data without separator, ignoring");
            return;
        };
        cb(msg.first_address(), name, value);
    }

    // --- Outbound commands ------------------------------------------------

    /// Broadcast a system-enable command.
    pub fn enable(&mut self) {
        self.command(MessageType::SysEnable, &[]);
    }

    /// Broadcast a system-disable command.
    pub fn disable(&mut self) {
        self.command(MessageType::SysDisable, &[]);
    }

    /// Send a logon request carrying this node's unique id.
    pub fn logon(&mut self) {
        let uid = self.unique_id;
        self.command(MessageType::Logon, &uid);
    }

    /// Command the track power state (`cs::TRACK_OFF` / `STOP` / `GO`).
    pub fn set_track_state(&mut self, state: u8) {
        self.track_state = state;
        self.command(MessageType::CsSetState, &[state]);
    }

    /// Send a drive order: decoder address, speed step, function bits.
    pub fn drive(&mut self, address: u16, speed: u8, functions: u8) {
        let [lo, hi] = address.to_le_bytes();
        self.command(
            MessageType::CsDrive,
            &[lo, hi, cs::DRIVE_FORMAT_DCC128, speed, functions],
        );
    }

    /// Send a command-station accessory order.
    pub fn cs_accessory(&mut self, address: u16, aspect: u8) {
        let [lo, hi] = address.to_le_bytes();
        self.command(MessageType::CsAccessory, &[lo, hi, aspect]);
    }

    /// Write one CV byte on the main track (`cv` is 1-based).
    pub fn pom_write_byte(&mut self, address: u16, cv: u16, value: u8) {
        let [addr_lo, addr_hi] = address.to_le_bytes();
        let [cv_lo, cv_hi] = cv.saturating_sub(1).to_le_bytes();
        self.command(
            MessageType::CsPom,
            &[
                addr_lo, addr_hi, 0, 0, 0,
                pom::WR_BYTE,
                cv_lo, cv_hi, 0,
                value, 0, 0,
            ],
        );
    }

    /// Set a native accessory aspect.
    pub fn set_accessory(&mut self, number: u8, aspect: u8) {
        self.command(MessageType::AccessorySet, &[number, aspect]);
    }

    /// Query a native accessory aspect.
    pub fn get_accessory(&mut self, number: u8) {
        self.command(MessageType::AccessoryGet, &[number]);
    }

    /// Switch a booster on or off. Node 0 addresses every booster.
    pub fn set_booster_state(&mut self, on: bool, node: u8) {
        let ty = if on {
            MessageType::BoostOn
        } else {
            MessageType::BoostOff
        };
        self.transmit(&Message::addressed(node, ty.as_u8(), 0, &[]));
    }

    /// Query booster status.
    pub fn query_booster(&mut self, node: u8) {
        self.transmit(&Message::addressed(node, MessageType::BoostQuery.as_u8(), 0, &[]));
    }

    /// Enter vendor configuration mode on a node.
    pub fn vendor_enable(&mut self, node: u8) {
        self.transmit(&Message::addressed(node, MessageType::VendorEnable.as_u8(), 0, &[]));
    }

    /// Leave vendor configuration mode on a node.
    pub fn vendor_disable(&mut self, node: u8) {
        self.transmit(&Message::addressed(node, MessageType::VendorDisable.as_u8(), 0, &[]));
    }

    /// Read a vendor configuration value by name.
    pub fn vendor_get(&mut self, node: u8, name: &str) {
        let (buf, len) = vendor_payload(name, None);
        self.transmit(&Message::addressed(
            node,
            MessageType::VendorGet.as_u8(),
            0,
            &buf[..len],
        ));
    }

    /// Write a vendor configuration value (`name=value` on the wire).
    pub fn vendor_set(&mut self, node: u8, name: &str, value: &str) {
        let (buf, len) = vendor_payload(name, Some(value));
        self.transmit(&Message::addressed(
            node,
            MessageType::VendorSet.as_u8(),
            0,
            &buf[..len],
        ));
    }

    /// Send a firmware update operation to a node.
    pub fn firmware_update_operation(&mut self, node: u8, op: u8, data: &[u8]) {
        let mut body = [0u8; MAX_PAYLOAD_LEN];
        body[0] = op;
        let take = data.len().min(MAX_PAYLOAD_LEN - 1);
        body[1..=take].copy_from_slice(&data[..take]);
        self.transmit(&Message::addressed(
            node,
            MessageType::FwUpdateOp.as_u8(),
            0,
            &body[..=take],
        ));
    }

    /// Report a detector state change.
    ///
    /// With the secure-ack feature enabled the report enters the retry pool
    /// and is retransmitted until the host mirrors it back or retries are
    /// exhausted. A full pool drops the report entirely, transmission
    /// included; an unsupervised report would defeat the delivery guarantee
    /// the feature advertises.
    pub fn report_occupancy(&mut self, detector: u8, occupied: bool, now: u32) {
        let ty = if occupied {
            MessageType::BmOcc
        } else {
            MessageType::BmFree
        };
        let msg = Message::broadcast(ty.as_u8(), 0, &[detector]);
        if self.features.get(feature::SECURE_ACK) != 0 && !self.secure_ack.enqueue(msg, now) {
            return;
        }
        self.transmit(&msg);
    }

    // --- Callback registration --------------------------------------------

    /// Register or clear the drive acknowledgement handler.
    pub fn on_drive_ack(&mut self, handler: Option<DriveAckHandler>) {
        self.callbacks.drive_ack = handler;
    }

    /// Register or clear the command-station accessory acknowledgement handler.
    pub fn on_accessory_ack(&mut self, handler: Option<AccessoryAckHandler>) {
        self.callbacks.accessory_ack = handler;
    }

    /// Register or clear the programming-on-main acknowledgement handler.
    pub fn on_pom_ack(&mut self, handler: Option<PomAckHandler>) {
        self.callbacks.pom_ack = handler;
    }

    /// Register or clear the booster status handler.
    pub fn on_booster_status(&mut self, handler: Option<BoosterStatusHandler>) {
        self.callbacks.booster_status = handler;
    }

    /// Register or clear the booster diagnostic handler.
    pub fn on_booster_diagnostic(&mut self, handler: Option<BoosterDiagnosticHandler>) {
        self.callbacks.booster_diagnostic = handler;
    }

    /// Register or clear the single-detector occupancy handler.
    pub fn on_occupancy(&mut self, handler: Option<OccupancyHandler>) {
        self.callbacks.occupancy = handler;
    }

    /// Register or clear the bitmap occupancy handler.
    pub fn on_occupancy_multiple(&mut self, handler: Option<OccupancyMultipleHandler>) {
        self.callbacks.occupancy_multiple = handler;
    }

    /// Register or clear the address report handler.
    pub fn on_address(&mut self, handler: Option<AddressReportHandler>) {
        self.callbacks.address_report = handler;
    }

    /// Register or clear the speed report handler.
    pub fn on_speed_update(&mut self, handler: Option<SpeedReportHandler>) {
        self.callbacks.speed_report = handler;
    }

    /// Register or clear the CV readback handler.
    pub fn on_cv_update(&mut self, handler: Option<CvReportHandler>) {
        self.callbacks.cv_report = handler;
    }

    /// Register or clear the native accessory state handler.
    pub fn on_accessory_state(&mut self, handler: Option<AccessoryStateHandler>) {
        self.callbacks.accessory_state = handler;
    }

    /// Register or clear the vendor acknowledgement handler.
    pub fn on_vendor_ack(&mut self, handler: Option<VendorAckHandler>) {
        self.callbacks.vendor_ack = handler;
    }

    /// Register or clear the vendor data handler.
    pub fn on_vendor_data(&mut self, handler: Option<VendorDataHandler>) {
        self.callbacks.vendor_data = handler;
    }

    /// Register or clear the firmware update status handler.
    pub fn on_firmware_update_status(&mut self, handler: Option<FwUpdateStatusHandler>) {
        self.callbacks.fw_update_status = handler;
    }

    // --- Transmission -----------------------------------------------------

    /// Send a broadcast command with the given payload.
    fn command(&mut self, ty: MessageType, payload: &[u8]) {
        self.transmit(&Message::broadcast(ty.as_u8(), 0, payload));
    }

    /// Send a response echoing the requester's sequence number.
    fn respond(&mut self, ty: MessageType, msg_num: u8, payload: &[u8]) {
        self.transmit(&Message::broadcast(ty.as_u8(), msg_num, payload));
    }

    fn transmit(&mut self, msg: &Message) {
        let frame = codec::encode(msg);
        trace!(
            msg_type = msg.type_byte(),
            wire_len = frame.len(),
            "transmitting frame"
        );
        for &byte in frame.iter() {
            self.stream.write(byte);
        }
    }
}

/// Payload byte accessor tolerating short payloads (reads as zero).
fn byte(payload: &[u8], index: usize) -> u8 {
    payload.get(index).copied().unwrap_or(0)
}

/// Little-endian 16-bit payload accessor, missing bytes read as zero.
fn word(payload: &[u8], index: usize) -> u16 {
    u16::from_le_bytes([byte(payload, index), byte(payload, index + 1)])
}

/// Pack `name` (and optionally `=value`) plus a NUL terminator into a
/// payload buffer, truncating to the payload capacity.
fn vendor_payload(name: &str, value: Option<&str>) -> ([u8; MAX_PAYLOAD_LEN], usize) {
    let mut buf = [0u8; MAX_PAYLOAD_LEN];
    let mut len = 0;
    let push = |bytes: &[u8], buf: &mut [u8; MAX_PAYLOAD_LEN], len: &mut usize| {
        let take = bytes.len().min(MAX_PAYLOAD_LEN - 1 - *len);
        buf[*len..*len + take].copy_from_slice(&bytes[..take]);
        *len += take;
    };
    push(name.as_bytes(), &mut buf, &mut len);
    if let Some(value) = value {
        push(b"=", &mut buf, &mut len);
        push(value.as_bytes(), &mut buf, &mut len);
    }
    buf[len] = 0;
    len += 1;
    (buf, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{booster, crc, fw};
    use crate::transport::LoopbackStream;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SELF_ID: [u8; 7] = [0x80, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];

    fn engine() -> Engine<LoopbackStream> {
        Engine::new(LoopbackStream::new(), SELF_ID)
    }

    /// Frame raw content bytes the way a bus partner would.
    fn frame(content: &[u8]) -> Vec<u8> {
        let mut wire = vec![0xFE];
        for &b in content.iter().chain(std::iter::once(&crc::compute(content))) {
            if b == 0xFE || b == 0xFD {
                wire.push(0xFD);
                wire.push(b ^ 0x20);
            } else {
                wire.push(b);
            }
        }
        wire.push(0xFE);
        wire
    }

    /// Feed one frame and run a full poll/dispatch cycle.
    fn receive(engine: &mut Engine<LoopbackStream>, content: &[u8]) {
        let wire = frame(content);
        engine.stream_mut().push(&wire);
        engine.poll(0);
        engine.handle_pending();
    }

    fn sent(engine: &mut Engine<LoopbackStream>) -> Vec<u8> {
        engine.stream_mut().drain()
    }

    #[test]
    fn responds_to_get_magic() {
        let mut node = engine();
        receive(&mut node, &[0x03, 0x00, 0x01, 0x01]);
        assert_eq!(sent(&mut node), frame(&[0x04, 0x00, 0x01, 0x81, 0xAF]));
    }

    #[test]
    fn responds_to_get_p_version() {
        let mut node = engine();
        receive(&mut node, &[0x03, 0x00, 0x02, 0x02]);
        // Minor byte first.
        assert_eq!(sent(&mut node), frame(&[0x05, 0x00, 0x02, 0x82, 0x01, 0x00]));
    }

    #[test]
    fn responds_to_get_unique_id() {
        let mut node = engine();
        receive(&mut node, &[0x03, 0x00, 0x03, 0x03]);
        let mut expected = vec![0x0A, 0x00, 0x03, 0x83];
        expected.extend_from_slice(&SELF_ID);
        assert_eq!(sent(&mut node), frame(&expected));
    }

    #[test]
    fn system_gate_blocks_everything_but_enable() {
        let mut node = engine();
        receive(&mut node, &[0x03, 0x00, 0x00, 0x05]);
        assert!(!node.system_enabled());

        // A representative query gets no response while disabled.
        receive(&mut node, &[0x03, 0x00, 0x01, 0x01]);
        assert!(sent(&mut node).is_empty());

        receive(&mut node, &[0x03, 0x00, 0x00, 0x04]);
        assert!(node.system_enabled());
        receive(&mut node, &[0x03, 0x00, 0x01, 0x01]);
        assert!(!sent(&mut node).is_empty());
    }

    #[test]
    fn feature_iteration_sequence() {
        let mut node = engine();

        receive(&mut node, &[0x03, 0x00, 0x0C, 0x0B]);
        assert_eq!(sent(&mut node), frame(&[0x04, 0x00, 0x0C, 0x8C, 3]));

        // Three defaults in insertion order, then NOT_AVAILABLE(255).
        for (num, id, value) in [(2u8, 0u8, 1u8), (3, 1, 32), (4, 2, 4)] {
            receive(&mut node, &[0x03, 0x00, num, 0x0C]);
            assert_eq!(sent(&mut node), frame(&[0x05, 0x00, num, 0x8D, id, value]));
        }
        receive(&mut node, &[0x03, 0x00, 5, 0x0C]);
        assert_eq!(sent(&mut node), frame(&[0x04, 0x00, 5, 0x8E, 255]));
    }

    #[test]
    fn feature_get_and_set() {
        let mut node = engine();

        receive(&mut node, &[0x04, 0x00, 20, 0x0D, feature::STRING_SIZE]);
        assert_eq!(
            sent(&mut node),
            frame(&[0x05, 0x00, 20, 0x8D, feature::STRING_SIZE, 32])
        );

        receive(&mut node, &[0x04, 0x00, 21, 0x0D, 99]);
        assert_eq!(sent(&mut node), frame(&[0x04, 0x00, 21, 0x8E, 99]));

        receive(&mut node, &[0x05, 0x00, 30, 0x0E, feature::STRING_SIZE, 64]);
        assert_eq!(node.get_feature(feature::STRING_SIZE), 64);
        assert_eq!(
            sent(&mut node),
            frame(&[0x05, 0x00, 30, 0x8D, feature::STRING_SIZE, 64])
        );
    }

    #[test]
    fn track_state_follows_cs_state() {
        let mut node = engine();
        receive(&mut node, &[0x04, 0x00, 0x00, 0xC8, cs::TRACK_GO]);
        assert_eq!(node.track_state(), cs::TRACK_GO);
    }

    #[test]
    fn set_track_state_wire_format() {
        let mut node = engine();
        node.set_track_state(cs::TRACK_OFF);
        assert_eq!(
            sent(&mut node),
            vec![0xFE, 0x04, 0x00, 0x00, 0x48, 0x00, 0x96, 0xFE]
        );
        node.set_track_state(cs::TRACK_STOP);
        assert_eq!(
            sent(&mut node),
            vec![0xFE, 0x04, 0x00, 0x00, 0x48, 0x01, 0xC8, 0xFE]
        );
        node.set_track_state(cs::TRACK_GO);
        assert_eq!(
            sent(&mut node),
            vec![0xFE, 0x04, 0x00, 0x00, 0x48, 0x02, 0x2A, 0xFE]
        );
    }

    #[test]
    fn drive_command_wire_format() {
        let mut node = engine();
        node.drive(3, 100, 0x10);
        assert_eq!(
            sent(&mut node),
            frame(&[0x08, 0x00, 0x00, 0x40, 3, 0, 2, 100, 0x10])
        );
    }

    #[test]
    fn drive_ack_invokes_callback() {
        let mut node = engine();
        let seen = Rc::new(RefCell::new(None));
        let probe = Rc::clone(&seen);
        node.on_drive_ack(Some(Box::new(move |addr, status| {
            *probe.borrow_mut() = Some((addr, status));
        })));

        receive(&mut node, &[0x06, 0x00, 0x00, 0xC0, 0x03, 0x00, 0x01]);
        assert_eq!(*seen.borrow(), Some((3, 1)));
    }

    #[test]
    fn drive_ack_without_callback_is_ignored() {
        let mut node = engine();
        receive(&mut node, &[0x06, 0x00, 0x00, 0xC0, 0x03, 0x00, 0x01]);
        assert!(sent(&mut node).is_empty());
    }

    #[test]
    fn clearing_a_callback_disables_it() {
        let mut node = engine();
        let count = Rc::new(RefCell::new(0));
        let probe = Rc::clone(&count);
        node.on_occupancy(Some(Box::new(move |_, _| *probe.borrow_mut() += 1)));

        receive(&mut node, &[0x04, 0x00, 0x01, 0xA0, 12]);
        node.on_occupancy(None);
        receive(&mut node, &[0x04, 0x00, 0x01, 0xA0, 12]);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn pom_write_byte_layout() {
        let mut node = engine();
        node.pom_write_byte(1234, 56, 78);
        let [lo, hi] = 1234u16.to_le_bytes();
        assert_eq!(
            sent(&mut node),
            frame(&[15, 0x00, 0x00, 0x42, lo, hi, 0, 0, 0, 3, 55, 0, 0, 78, 0, 0])
        );
    }

    #[test]
    fn pom_ack_status_offset() {
        let mut node = engine();
        let seen = Rc::new(RefCell::new(None));
        let probe = Rc::clone(&seen);
        node.on_pom_ack(Some(Box::new(move |addr, status| {
            *probe.borrow_mut() = Some((addr, status));
        })));

        receive(&mut node, &[9, 0, 0, 0xC2, 0xD2, 0x04, 0, 0, 0, 1]);
        assert_eq!(*seen.borrow(), Some((1234, 1)));
    }

    #[test]
    fn occupancy_callbacks() {
        let mut node = engine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let probe = Rc::clone(&seen);
        node.on_occupancy(Some(Box::new(move |det, occ| {
            probe.borrow_mut().push((det, occ));
        })));

        receive(&mut node, &[0x04, 0x00, 0x01, 0xA0, 12]);
        receive(&mut node, &[0x04, 0x00, 0x01, 0xA1, 15]);
        assert_eq!(*seen.borrow(), vec![(12, true), (15, false)]);
    }

    #[test]
    fn multi_occupancy_bitmap() {
        let mut node = engine();
        let seen = Rc::new(RefCell::new(None));
        let probe = Rc::clone(&seen);
        node.on_occupancy_multiple(Some(Box::new(move |base, size, bitmap| {
            *probe.borrow_mut() = Some((base, size, bitmap.to_vec()));
        })));

        receive(&mut node, &[0x07, 0x00, 0x01, 0xA2, 8, 2, 0xAA, 0x55]);
        assert_eq!(*seen.borrow(), Some((8, 2, vec![0xAA, 0x55])));
    }

    #[test]
    fn address_speed_and_cv_reports() {
        let mut node = engine();
        let addr = Rc::new(RefCell::new(None));
        let speed = Rc::new(RefCell::new(None));
        let cv = Rc::new(RefCell::new(None));
        let (pa, ps, pc) = (Rc::clone(&addr), Rc::clone(&speed), Rc::clone(&cv));
        node.on_address(Some(Box::new(move |det, a| {
            *pa.borrow_mut() = Some((det, a));
        })));
        node.on_speed_update(Some(Box::new(move |a, s| {
            *ps.borrow_mut() = Some((a, s));
        })));
        node.on_cv_update(Some(Box::new(move |a, c, v| {
            *pc.borrow_mut() = Some((a, c, v));
        })));

        receive(&mut node, &[0x07, 0x00, 0x00, 0xA3, 23, 0, 1, 4]);
        receive(&mut node, &[0x07, 0x00, 0x00, 0xA6, 4, 0, 0x90, 0x01]);
        receive(&mut node, &[0x09, 0x00, 0x00, 0xA5, 3, 0, 0, 5, 0, 0xAB]);

        assert_eq!(*addr.borrow(), Some((23, 1025)));
        assert_eq!(*speed.borrow(), Some((4, 400)));
        assert_eq!(*cv.borrow(), Some((3, 5, 0xAB)));
    }

    #[test]
    fn accessory_state_and_notify_share_a_callback() {
        let mut node = engine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let probe = Rc::clone(&seen);
        node.on_accessory_state(Some(Box::new(move |num, aspect| {
            probe.borrow_mut().push((num, aspect));
        })));

        receive(&mut node, &[0x05, 0x00, 0x00, 0xB8, 7, 0]);
        receive(&mut node, &[0x05, 0x00, 0x00, 0xB9, 12, 1]);
        assert_eq!(*seen.borrow(), vec![(7, 0), (12, 1)]);
    }

    #[test]
    fn booster_diagnostic_fires_once_per_pair() {
        let mut node = engine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let probe = Rc::clone(&seen);
        node.on_booster_diagnostic(Some(Box::new(move |ty, value| {
            probe.borrow_mut().push((ty, value));
        })));

        // Two pairs, the second truncated to (type, low byte).
        receive(
            &mut node,
            &[0x08, 0x00, 0x00, 0xD2, booster::DIAG_CURRENT, 0x34, 0x08, booster::DIAG_VOLTAGE, 18],
        );
        assert_eq!(
            *seen.borrow(),
            vec![(booster::DIAG_CURRENT, 2100), (booster::DIAG_VOLTAGE, 18)]
        );
    }

    #[test]
    fn booster_commands_wire_format() {
        let mut node = engine();
        node.set_booster_state(true, 0);
        assert_eq!(sent(&mut node), frame(&[0x03, 0x00, 0x00, 0x50]));
        node.set_booster_state(false, 1);
        assert_eq!(sent(&mut node), frame(&[0x04, 0x01, 0x00, 0x00, 0x51]));
        node.query_booster(1);
        assert_eq!(sent(&mut node), frame(&[0x04, 0x01, 0x00, 0x00, 0x52]));
    }

    #[test]
    fn vendor_commands_wire_format() {
        let mut node = engine();
        node.vendor_enable(10);
        assert_eq!(sent(&mut node), frame(&[0x04, 0x0A, 0x00, 0x00, 0x70]));
        node.vendor_disable(10);
        assert_eq!(sent(&mut node), frame(&[0x04, 0x0A, 0x00, 0x00, 0x71]));

        node.vendor_get(10, "test_name");
        let mut expected = vec![0x0E, 0x0A, 0x00, 0x00, 0x73];
        expected.extend_from_slice(b"test_name\0");
        assert_eq!(sent(&mut node), frame(&expected));

        node.vendor_set(10, "test_name", "test_value");
        let mut expected = vec![0x19, 0x0A, 0x00, 0x00, 0x72];
        expected.extend_from_slice(b"test_name=test_value\0");
        assert_eq!(sent(&mut node), frame(&expected));
    }

    #[test]
    fn vendor_data_and_ack_callbacks() {
        let mut node = engine();
        let data = Rc::new(RefCell::new(None));
        let ack = Rc::new(RefCell::new(None));
        let (pd, pa) = (Rc::clone(&data), Rc::clone(&ack));
        node.on_vendor_data(Some(Box::new(move |n, name, value| {
            *pd.borrow_mut() = Some((n, name.to_string(), value.to_string()));
        })));
        node.on_vendor_ack(Some(Box::new(move |n, status| {
            *pa.borrow_mut() = Some((n, status));
        })));

        let mut content = vec![0x19, 0x0A, 0x00, 0x00, 0xF0];
        content.extend_from_slice(b"test_name=test_value\0");
        receive(&mut node, &content);
        receive(&mut node, &[0x05, 0x0A, 0x00, 0x00, 0xF1, 0x01]);

        assert_eq!(
            *data.borrow(),
            Some((10, "test_name".to_string(), "test_value".to_string()))
        );
        assert_eq!(*ack.borrow(), Some((10, 1)));
    }

    #[test]
    fn firmware_update_operation_wire_format() {
        let mut node = engine();
        let uid = [0x81, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        node.firmware_update_operation(1, fw::OP_ENTER, &uid);
        let mut expected = vec![0x0C, 0x01, 0x00, 0x00, 0x30, fw::OP_ENTER];
        expected.extend_from_slice(&uid);
        assert_eq!(sent(&mut node), frame(&expected));
    }

    #[test]
    fn firmware_status_callback_with_optional_detail() {
        let mut node = engine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let probe = Rc::clone(&seen);
        node.on_firmware_update_status(Some(Box::new(move |status, detail| {
            probe.borrow_mut().push((status, detail));
        })));

        receive(&mut node, &[0x04, 0x00, 0x00, 0xB0, fw::STAT_READY]);
        receive(&mut node, &[0x05, 0x00, 0x00, 0xB0, fw::STAT_ERROR, 42]);
        assert_eq!(*seen.borrow(), vec![(fw::STAT_READY, 0), (fw::STAT_ERROR, 42)]);
    }

    #[test]
    fn node_table_queries_require_logon() {
        let mut node = engine();
        receive(&mut node, &[0x03, 0x00, 0x01, 0x06]);
        assert!(sent(&mut node).is_empty());

        // GETNEXT still answers, with NOT_AVAILABLE.
        receive(&mut node, &[0x04, 0x00, 0x02, 0x07, 0x00]);
        assert_eq!(sent(&mut node), frame(&[0x04, 0x00, 0x02, 0x88, 0x00]));
    }

    #[test]
    fn node_table_queries_after_logon_ack() {
        let mut node = engine();
        receive(&mut node, &[0x03, 0x00, 0x00, 0x8B]);
        assert!(node.logged_in());

        receive(&mut node, &[0x03, 0x00, 0x01, 0x06]);
        assert_eq!(sent(&mut node), frame(&[0x05, 0x00, 0x01, 0x86, 0x00, 0x01]));

        receive(&mut node, &[0x04, 0x00, 0x02, 0x07, 0x00]);
        let mut expected = vec![0x0C, 0x00, 0x02, 0x87, 0x00, 0x00];
        expected.extend_from_slice(&SELF_ID);
        assert_eq!(sent(&mut node), frame(&expected));

        // Out of range index.
        receive(&mut node, &[0x04, 0x00, 0x03, 0x07, 0x09]);
        assert_eq!(sent(&mut node), frame(&[0x04, 0x00, 0x03, 0x88, 0x09]));
    }

    #[test]
    fn logon_sends_outbound_logon_request() {
        let mut node = engine();
        node.logon();
        let mut expected = vec![0x0A, 0x00, 0x00, 0x0A];
        expected.extend_from_slice(&SELF_ID);
        assert_eq!(sent(&mut node), frame(&expected));
    }

    #[test]
    fn unknown_message_types_are_ignored() {
        let mut node = engine();
        receive(&mut node, &[0x04, 0x00, 0x00, 0x5F, 0x77]);
        assert!(sent(&mut node).is_empty());
        assert!(node.system_enabled());
    }
}
