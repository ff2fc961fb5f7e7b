//! Well-known control identifiers from `<linux/v4l2-controls.h>`
//!
//! Drivers are free to expose any subset of these, plus private controls.

pub const USER_BASE: u32 = 0x0098_0900;

pub const BRIGHTNESS: u32 = USER_BASE;
pub const CONTRAST: u32 = USER_BASE + 1;
pub const SATURATION: u32 = USER_BASE + 2;
pub const HUE: u32 = USER_BASE + 3;
pub const AUTO_WHITE_BALANCE: u32 = USER_BASE + 12;
pub const DO_WHITE_BALANCE: u32 = USER_BASE + 13;
pub const RED_BALANCE: u32 = USER_BASE + 14;
pub const BLUE_BALANCE: u32 = USER_BASE + 15;
pub const GAMMA: u32 = USER_BASE + 16;
pub const EXPOSURE: u32 = USER_BASE + 17;
pub const AUTOGAIN: u32 = USER_BASE + 18;
pub const GAIN: u32 = USER_BASE + 19;
pub const HFLIP: u32 = USER_BASE + 20;
pub const VFLIP: u32 = USER_BASE + 21;
pub const POWER_LINE_FREQUENCY: u32 = USER_BASE + 24;
pub const HUE_AUTO: u32 = USER_BASE + 25;
pub const WHITE_BALANCE_TEMPERATURE: u32 = USER_BASE + 26;
pub const SHARPNESS: u32 = USER_BASE + 27;
pub const BACKLIGHT_COMPENSATION: u32 = USER_BASE + 28;

pub const CAMERA_BASE: u32 = 0x009a_0900;

pub const EXPOSURE_AUTO: u32 = CAMERA_BASE + 1;
pub const EXPOSURE_ABSOLUTE: u32 = CAMERA_BASE + 2;
pub const EXPOSURE_AUTO_PRIORITY: u32 = CAMERA_BASE + 3;
pub const PAN_RELATIVE: u32 = CAMERA_BASE + 4;
pub const TILT_RELATIVE: u32 = CAMERA_BASE + 5;
pub const PAN_ABSOLUTE: u32 = CAMERA_BASE + 8;
pub const TILT_ABSOLUTE: u32 = CAMERA_BASE + 9;
pub const FOCUS_ABSOLUTE: u32 = CAMERA_BASE + 10;
pub const FOCUS_AUTO: u32 = CAMERA_BASE + 12;
pub const ZOOM_ABSOLUTE: u32 = CAMERA_BASE + 13;
