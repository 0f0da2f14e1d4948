//! Optional callback slots for acknowledgement and report messages.
//!
//! One slot per event kind. Re-registration overwrites the previous handler
//! and registering `None` clears it; dispatch silently skips empty slots.

use std::fmt;

/// Drive acknowledgement: decoder address and status.
pub type DriveAckHandler = Box<dyn FnMut(u16, u8)>;
/// Command-station accessory acknowledgement: accessory address and status.
pub type AccessoryAckHandler = Box<dyn FnMut(u16, u8)>;
/// Programming-on-main acknowledgement: decoder address and status.
pub type PomAckHandler = Box<dyn FnMut(u16, u8)>;
/// Booster status report.
pub type BoosterStatusHandler = Box<dyn FnMut(u8)>;
/// Booster diagnostic pair: diagnostic type and value.
pub type BoosterDiagnosticHandler = Box<dyn FnMut(u8, u16)>;
/// Single-detector occupancy change: detector number and occupied flag.
pub type OccupancyHandler = Box<dyn FnMut(u8, bool)>;
/// Bitmap occupancy report: base detector, bit count, raw bitmap.
pub type OccupancyMultipleHandler = Box<dyn FnMut(u8, u8, &[u8])>;
/// Decoder address seen by a detector: detector number and address.
pub type AddressReportHandler = Box<dyn FnMut(u8, u16)>;
/// Speed report: decoder address and speed.
pub type SpeedReportHandler = Box<dyn FnMut(u16, u16)>;
/// CV readback: decoder address, CV number, value.
pub type CvReportHandler = Box<dyn FnMut(u16, u16, u8)>;
/// Native accessory state: accessory number and aspect.
pub type AccessoryStateHandler = Box<dyn FnMut(u8, u8)>;
/// Vendor acknowledgement: node address and status.
pub type VendorAckHandler = Box<dyn FnMut(u8, u8)>;
/// Vendor configuration data: node address, name, value.
pub type VendorDataHandler = Box<dyn FnMut(u8, &str, &str)>;
/// Firmware update status: status code and detail byte.
pub type FwUpdateStatusHandler = Box<dyn FnMut(u8, u8)>;

/// Registered handlers, one optional slot per event kind.
#[derive(Default)]
pub struct Callbacks {
    pub(crate) drive_ack: Option<DriveAckHandler>,
    pub(crate) accessory_ack: Option<AccessoryAckHandler>,
    pub(crate) pom_ack: Option<PomAckHandler>,
    pub(crate) booster_status: Option<BoosterStatusHandler>,
    pub(crate) booster_diagnostic: Option<BoosterDiagnosticHandler>,
    pub(crate) occupancy: Option<OccupancyHandler>,
    pub(crate) occupancy_multiple: Option<OccupancyMultipleHandler>,
    pub(crate) address_report: Option<AddressReportHandler>,
    pub(crate) speed_report: Option<SpeedReportHandler>,
    pub(crate) cv_report: Option<CvReportHandler>,
    pub(crate) accessory_state: Option<AccessoryStateHandler>,
    pub(crate) vendor_ack: Option<VendorAckHandler>,
    pub(crate) vendor_data: Option<VendorDataHandler>,
    pub(crate) fw_update_status: Option<FwUpdateStatusHandler>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("drive_ack", &self.drive_ack.is_some())
            .field("accessory_ack", &self.accessory_ack.is_some())
            .field("pom_ack", &self.pom_ack.is_some())
            .field("booster_status", &self.booster_status.is_some())
            .field("booster_diagnostic", &self.booster_diagnostic.is_some())
            .field("occupancy", &self.occupancy.is_some())
            .field("occupancy_multiple", &self.occupancy_multiple.is_some())
            .field("address_report", &self.address_report.is_some())
            .field("speed_report", &self.speed_report.is_some())
            .field("cv_report", &self.cv_report.is_some())
            .field("accessory_state", &self.accessory_state.is_some())
            .field("vendor_ack", &self.vendor_ack.is_some())
            .field("vendor_data", &self.vendor_data.is_some())
            .field("fw_update_status", &self.fw_update_status.is_some())
            .finish()
    }
}
