//! Message type enumeration and fixed protocol code points.
//!
//! Every numeric value in this module is part of the wire contract with
//! existing bus partners and must not change.

use std::fmt;

/// Known bus message types.
///
/// Downstream (host to node) commands occupy the lower half, upstream
/// responses and spontaneous reports the upper half. The engine keeps the
/// raw byte inside [`super::Message`] so that unknown types flow through
/// untouched; this enum only exists at the dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Request the fixed system magic value.
    SysGetMagic = 0x01,
    /// Request the protocol version.
    SysGetPVersion = 0x02,
    /// Request the node unique id.
    SysGetUniqueId = 0x03,
    /// Enable message processing on the node.
    SysEnable = 0x04,
    /// Disable message processing on the node.
    SysDisable = 0x05,
    /// Query the node table size.
    NodetabGetall = 0x06,
    /// Query one node table entry.
    NodetabGetnext = 0x07,
    /// Logon request from a fresh node.
    Logon = 0x0A,
    /// Begin feature iteration, returns the feature count.
    FeatureGetall = 0x0B,
    /// Fetch the next feature during iteration.
    FeatureGetnext = 0x0C,
    /// Fetch one feature by id.
    FeatureGet = 0x0D,
    /// Store one feature value.
    FeatureSet = 0x0E,

    /// Mirrored confirmation of a multi-occupancy report.
    BmMirrorMultiple = 0x20,
    /// Mirrored confirmation of an occupied report.
    BmMirrorOcc = 0x21,
    /// Mirrored confirmation of a free report.
    BmMirrorFree = 0x22,

    /// Firmware update operation request.
    FwUpdateOp = 0x30,

    /// Set a native accessory aspect.
    AccessorySet = 0x38,
    /// Query a native accessory aspect.
    AccessoryGet = 0x39,

    /// Command-station drive order.
    CsDrive = 0x40,
    /// Command-station accessory order.
    CsAccessory = 0x41,
    /// Command-station programming-on-main order.
    CsPom = 0x42,
    /// Command the track power state.
    CsSetState = 0x48,

    /// Switch a booster on.
    BoostOn = 0x50,
    /// Switch a booster off.
    BoostOff = 0x51,
    /// Query booster status.
    BoostQuery = 0x52,

    /// Enable vendor-specific configuration mode.
    VendorEnable = 0x70,
    /// Leave vendor-specific configuration mode.
    VendorDisable = 0x71,
    /// Write a vendor configuration value.
    VendorSet = 0x72,
    /// Read a vendor configuration value.
    VendorGet = 0x73,

    /// System magic response.
    SysMagic = 0x81,
    /// Protocol version response.
    SysPVersion = 0x82,
    /// Unique id response.
    SysUniqueId = 0x83,
    /// Node table count response.
    NodetabCount = 0x86,
    /// Node table entry response.
    Nodetab = 0x87,
    /// Node table entry not available.
    NodeNa = 0x88,
    /// Broadcast announcement of a newly logged-on node.
    NodeNew = 0x89,
    /// Broadcast announcement of a lost node.
    NodeLost = 0x8A,
    /// Logon acknowledgement carrying the assigned table slot.
    LogonAck = 0x8B,
    /// Feature count response.
    FeatureCount = 0x8C,
    /// Feature value response.
    Feature = 0x8D,
    /// Feature not available.
    FeatureNa = 0x8E,

    /// Detector reports occupied.
    BmOcc = 0xA0,
    /// Detector reports free.
    BmFree = 0xA1,
    /// Bitmap report for a run of detectors.
    BmMultiple = 0xA2,
    /// Decoder address seen by a detector.
    BmAddress = 0xA3,
    /// CV readback report.
    BmCv = 0xA5,
    /// Speed report.
    BmSpeed = 0xA6,

    /// Firmware update status report.
    FwUpdateStat = 0xB0,
    /// Native accessory state response.
    AccessoryState = 0xB8,
    /// Spontaneous native accessory change.
    AccessoryNotify = 0xB9,

    /// Drive order acknowledgement.
    CsDriveAck = 0xC0,
    /// Command-station accessory acknowledgement.
    CsAccessoryAck = 0xC1,
    /// Programming-on-main acknowledgement.
    CsPomAck = 0xC2,
    /// Track power state report.
    CsState = 0xC8,

    /// Booster status report.
    BoostStat = 0xD0,
    /// Booster diagnostic report, one or more (type, value) pairs.
    BoostDiagnostic = 0xD2,

    /// Vendor configuration data (`name=value`).
    Vendor = 0xF0,
    /// Vendor operation acknowledgement.
    VendorAck = 0xF1,
}

impl MessageType {
    /// Convert from the raw wire byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::SysGetMagic),
            0x02 => Some(Self::SysGetPVersion),
            0x03 => Some(Self::SysGetUniqueId),
            0x04 => Some(Self::SysEnable),
            0x05 => Some(Self::SysDisable),
            0x06 => Some(Self::NodetabGetall),
            0x07 => Some(Self::NodetabGetnext),
            0x0A => Some(Self::Logon),
            0x0B => Some(Self::FeatureGetall),
            0x0C => Some(Self::FeatureGetnext),
            0x0D => Some(Self::FeatureGet),
            0x0E => Some(Self::FeatureSet),
            0x20 => Some(Self::BmMirrorMultiple),
            0x21 => Some(Self::BmMirrorOcc),
            0x22 => Some(Self::BmMirrorFree),
            0x30 => Some(Self::FwUpdateOp),
            0x38 => Some(Self::AccessorySet),
            0x39 => Some(Self::AccessoryGet),
            0x40 => Some(Self::CsDrive),
            0x41 => Some(Self::CsAccessory),
            0x42 => Some(Self::CsPom),
            0x48 => Some(Self::CsSetState),
            0x50 => Some(Self::BoostOn),
            0x51 => Some(Self::BoostOff),
            0x52 => Some(Self::BoostQuery),
            0x70 => Some(Self::VendorEnable),
            0x71 => Some(Self::VendorDisable),
            0x72 => Some(Self::VendorSet),
            0x73 => Some(Self::VendorGet),
            0x81 => Some(Self::SysMagic),
            0x82 => Some(Self::SysPVersion),
            0x83 => Some(Self::SysUniqueId),
            0x86 => Some(Self::NodetabCount),
            0x87 => Some(Self::Nodetab),
            0x88 => Some(Self::NodeNa),
            0x89 => Some(Self::NodeNew),
            0x8A => Some(Self::NodeLost),
            0x8B => Some(Self::LogonAck),
            0x8C => Some(Self::FeatureCount),
            0x8D => Some(Self::Feature),
            0x8E => Some(Self::FeatureNa),
            0xA0 => Some(Self::BmOcc),
            0xA1 => Some(Self::BmFree),
            0xA2 => Some(Self::BmMultiple),
            0xA3 => Some(Self::BmAddress),
            0xA5 => Some(Self::BmCv),
            0xA6 => Some(Self::BmSpeed),
            0xB0 => Some(Self::FwUpdateStat),
            0xB8 => Some(Self::AccessoryState),
            0xB9 => Some(Self::AccessoryNotify),
            0xC0 => Some(Self::CsDriveAck),
            0xC1 => Some(Self::CsAccessoryAck),
            0xC2 => Some(Self::CsPomAck),
            0xC8 => Some(Self::CsState),
            0xD0 => Some(Self::BoostStat),
            0xD2 => Some(Self::BoostDiagnostic),
            0xF0 => Some(Self::Vendor),
            0xF1 => Some(Self::VendorAck),
            _ => None,
        }
    }

    /// Convert to the raw wire byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// For a mirrored confirmation type, the report type it confirms.
    #[must_use]
    pub const fn mirrored_report(self) -> Option<Self> {
        match self {
            Self::BmMirrorOcc => Some(Self::BmOcc),
            Self::BmMirrorFree => Some(Self::BmFree),
            Self::BmMirrorMultiple => Some(Self::BmMultiple),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Feature ids advertised by a node.
pub mod feature {
    /// Firmware update supported (1) or not (0).
    pub const FW_UPDATE_SUPPORT: u8 = 0;
    /// Maximum string length accepted in vendor messages.
    pub const STRING_SIZE: u8 = 1;
    /// Number of messages the node can buffer.
    pub const MSG_RECEIVE_COUNT: u8 = 2;
    /// Occupancy reports require a mirrored confirmation when non-zero.
    pub const SECURE_ACK: u8 = 3;
}

/// Command-station code points.
pub mod cs {
    /// Track power off.
    pub const TRACK_OFF: u8 = 0x00;
    /// Track powered, all locos stopped.
    pub const TRACK_STOP: u8 = 0x01;
    /// Normal operation.
    pub const TRACK_GO: u8 = 0x02;
    /// Drive format byte for 128 speed steps.
    pub const DRIVE_FORMAT_DCC128: u8 = 0x02;
}

/// Programming-on-main opcodes.
pub mod pom {
    /// Read a CV block.
    pub const RD_BLOCK: u8 = 0x00;
    /// Read a single CV byte.
    pub const RD_BYTE: u8 = 0x01;
    /// Write a single CV bit.
    pub const WR_BIT: u8 = 0x02;
    /// Write a single CV byte.
    pub const WR_BYTE: u8 = 0x03;
}

/// Booster status and diagnostic code points.
pub mod booster {
    /// Output off.
    pub const STATE_OFF: u8 = 0x00;
    /// Output off after a short circuit.
    pub const STATE_OFF_SHORT: u8 = 0x01;
    /// Output on.
    pub const STATE_ON: u8 = 0x80;
    /// Output on, current limiter active.
    pub const STATE_ON_LIMIT: u8 = 0x81;
    /// Diagnostic pair carries output current (mA).
    pub const DIAG_CURRENT: u8 = 0x00;
    /// Diagnostic pair carries output voltage.
    pub const DIAG_VOLTAGE: u8 = 0x01;
    /// Diagnostic pair carries temperature.
    pub const DIAG_TEMP: u8 = 0x02;
}

/// Firmware update opcodes and status codes.
pub mod fw {
    /// Enter update mode, payload carries the target unique id.
    pub const OP_ENTER: u8 = 0x00;
    /// Leave update mode.
    pub const OP_EXIT: u8 = 0x01;
    /// Select the destination memory.
    pub const OP_SETDEST: u8 = 0x02;
    /// Transfer a data record.
    pub const OP_DATA: u8 = 0x03;
    /// Finish the transfer.
    pub const OP_DONE: u8 = 0x04;

    /// Node is ready for data.
    pub const STAT_READY: u8 = 0x00;
    /// Node left update mode.
    pub const STAT_EXIT: u8 = 0x01;
    /// Data record accepted.
    pub const STAT_DATA: u8 = 0x02;
    /// Update failed, detail byte carries the error code.
    pub const STAT_ERROR: u8 = 0xFF;
}
