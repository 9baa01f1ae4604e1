//! Outbound simulator commands.
//!
//! The simulator listens for a registered window message carrying two
//! 32-bit words:
//!
//! ```text
//! wparam = code | arg1 << 16
//! lparam = arg2 | arg3 << 16
//! ```
//!
//! Every argument is a 16-bit slot. Payloads that need 32 bits (frame
//! numbers, session times, force feedback in 16.16 fixed point) are split
//! low half into `arg2` and high half into `arg3`, which puts the whole
//! value in `lparam`. This module only packs commands; a [`CommandSink`]
//! delivers them.

use serde::{Deserialize, Serialize};

use crate::{Result, TelemetryError};

/// Message codes understood by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum BroadcastMessage {
    CamSwitchPos = 0,
    CamSwitchNum = 1,
    CamSetState = 2,
    ReplaySetPlaySpeed = 3,
    ReplaySetPlayPosition = 4,
    ReplaySearch = 5,
    ReplaySetState = 6,
    ReloadTextures = 7,
    ChatCommand = 8,
    PitCommand = 9,
    TelemCommand = 10,
    FfbCommand = 11,
    ReplaySearchSessionTime = 12,
    VideoCapture = 13,
}

/// Camera state bits for [`BroadcastCommand::cam_set_state`].
pub mod camera_state {
    pub const IS_SESSION_SCREEN: u16 = 0x0001;
    pub const IS_SCENIC_ACTIVE: u16 = 0x0002;
    pub const CAM_TOOL_ACTIVE: u16 = 0x0004;
    pub const UI_HIDDEN: u16 = 0x0008;
    pub const USE_AUTO_SHOT_SELECTION: u16 = 0x0010;
    pub const USE_TEMPORARY_EDITS: u16 = 0x0020;
    pub const USE_KEY_ACCELERATION: u16 = 0x0040;
    pub const USE_KEY_10X_ACCELERATION: u16 = 0x0080;
    pub const USE_MOUSE_AIM_MODE: u16 = 0x0100;
}

/// Special camera targets accepted in place of a car position or number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum CameraFocus {
    AtIncident = -3,
    AtLeader = -2,
    AtExciting = -1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ReplayPosMode {
    Begin = 0,
    Current = 1,
    End = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ReplaySearchMode {
    ToStart = 0,
    ToEnd = 1,
    PrevSession = 2,
    NextSession = 3,
    PrevLap = 4,
    NextLap = 5,
    PrevFrame = 6,
    NextFrame = 7,
    PrevIncident = 8,
    NextIncident = 9,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ReplayStateMode {
    /// Clear any data in the replay tape
    EraseTape = 0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ChatCommandMode {
    /// Send a chat macro; the macro number goes in `arg2`
    Macro = 0,
    BeginChat = 1,
    Reply = 2,
    Cancel = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum PitCommandMode {
    /// Clear all pit checkboxes
    Clear = 0,
    /// Clean the windshield, using one tear off
    Windshield = 1,
    /// Add fuel, optionally the amount in liters
    Fuel = 2,
    /// Change left front tire, optionally the pressure in kPa
    LF = 3,
    RF = 4,
    LR = 5,
    RR = 6,
    ClearTires = 7,
    FastRepair = 8,
    ClearWindshield = 9,
    ClearFastRepair = 10,
    ClearFuel = 11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum TelemCommandMode {
    Stop = 0,
    Start = 1,
    Restart = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum FfbCommandMode {
    /// Maximum force in Nm when the wheel is set to automatic scaling
    MaxForce = 0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum VideoCaptureMode {
    ScreenShot = 0,
    Start = 1,
    End = 2,
    Toggle = 3,
    ShowTimer = 4,
    HideTimer = 5,
}

const RELOAD_ALL_TEXTURES: u16 = 0;
const RELOAD_CAR_TEXTURE: u16 = 1;

/// Camera target: a car position or number, or one of the special targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraTarget {
    Car(u16),
    Focus(CameraFocus),
}

impl CameraTarget {
    fn slot(self) -> u16 {
        match self {
            CameraTarget::Car(value) => value,
            CameraTarget::Focus(focus) => focus as i16 as u16,
        }
    }
}

/// One command in the four-slot form the simulator expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BroadcastCommand {
    pub message: BroadcastMessage,
    pub arg1: u16,
    pub arg2: u16,
    pub arg3: u16,
}

fn split(value: u32) -> (u16, u16) {
    ((value & 0xFFFF) as u16, (value >> 16) as u16)
}

impl BroadcastCommand {
    pub fn new(message: BroadcastMessage, arg1: u16, arg2: u16, arg3: u16) -> Self {
        Self { message, arg1, arg2, arg3 }
    }

    fn wide(message: BroadcastMessage, arg1: u16, payload: u32) -> Self {
        let (low, high) = split(payload);
        Self::new(message, arg1, low, high)
    }

    /// Message words `(wparam, lparam)`.
    pub fn pack(&self) -> (u32, u32) {
        let wparam = u32::from(self.message as u16) | (u32::from(self.arg1) << 16);
        let lparam = u32::from(self.arg2) | (u32::from(self.arg3) << 16);
        (wparam, lparam)
    }

    /// Switch to the car at race `position` using camera `group` and `camera`.
    pub fn cam_switch_pos(position: CameraTarget, group: u16, camera: u16) -> Self {
        Self::new(BroadcastMessage::CamSwitchPos, position.slot(), group, camera)
    }

    /// Switch to the car showing `car_number`, as written on the car.
    pub fn cam_switch_num(car_number: &str, group: u16, camera: u16) -> Result<Self> {
        let padded = pad_car_number(car_number).ok_or_else(|| TelemetryError::Parse {
            context: "car number".to_string(),
            details: format!("'{car_number}' is not a car number"),
        })?;
        let slot = u16::try_from(padded).map_err(|_| TelemetryError::Parse {
            context: "car number".to_string(),
            details: format!("'{car_number}' does not fit a command slot"),
        })?;
        Ok(Self::new(BroadcastMessage::CamSwitchNum, slot, group, camera))
    }

    /// Switch to a special camera target.
    pub fn cam_switch_focus(focus: CameraFocus, group: u16, camera: u16) -> Self {
        Self::new(BroadcastMessage::CamSwitchNum, CameraTarget::Focus(focus).slot(), group, camera)
    }

    /// Set camera state bits from [`camera_state`].
    pub fn cam_set_state(state: u16) -> Self {
        Self::new(BroadcastMessage::CamSetState, state, 0, 0)
    }

    /// Play at `speed`; in slow motion the speed is the divisor.
    pub fn replay_set_play_speed(speed: i16, slow_motion: bool) -> Self {
        Self::new(BroadcastMessage::ReplaySetPlaySpeed, speed as u16, u16::from(slow_motion), 0)
    }

    pub fn replay_set_play_position(mode: ReplayPosMode, frame: u32) -> Self {
        Self::wide(BroadcastMessage::ReplaySetPlayPosition, mode as u16, frame)
    }

    pub fn replay_search(mode: ReplaySearchMode) -> Self {
        Self::new(BroadcastMessage::ReplaySearch, mode as u16, 0, 0)
    }

    pub fn replay_set_state(mode: ReplayStateMode) -> Self {
        Self::new(BroadcastMessage::ReplaySetState, mode as u16, 0, 0)
    }

    pub fn reload_all_textures() -> Self {
        Self::new(BroadcastMessage::ReloadTextures, RELOAD_ALL_TEXTURES, 0, 0)
    }

    pub fn reload_texture(car_idx: u16) -> Self {
        Self::new(BroadcastMessage::ReloadTextures, RELOAD_CAR_TEXTURE, car_idx, 0)
    }

    pub fn chat_command(mode: ChatCommandMode) -> Self {
        Self::new(BroadcastMessage::ChatCommand, mode as u16, 0, 0)
    }

    /// Send chat macro `macro_num`, 1 through 15 in the simulator's UI.
    pub fn chat_macro(macro_num: u16) -> Self {
        Self::new(BroadcastMessage::ChatCommand, ChatCommandMode::Macro as u16, macro_num, 0)
    }

    /// Pit service request; `value` is liters of fuel or tire pressure in
    /// kPa where the mode takes one, zero otherwise.
    pub fn pit_command(mode: PitCommandMode, value: u16) -> Self {
        Self::new(BroadcastMessage::PitCommand, mode as u16, value, 0)
    }

    pub fn telem_command(mode: TelemCommandMode) -> Self {
        Self::new(BroadcastMessage::TelemCommand, mode as u16, 0, 0)
    }

    /// Force feedback command with `value` sent as 16.16 fixed point.
    pub fn ffb_command(mode: FfbCommandMode, value: f32) -> Self {
        let fixed = (f64::from(value) * 65536.0) as i32;
        Self::wide(BroadcastMessage::FfbCommand, mode as u16, fixed as u32)
    }

    /// Jump to `session_time_ms` into session `session_num`.
    pub fn replay_search_session_time(session_num: u16, session_time_ms: u32) -> Self {
        Self::wide(BroadcastMessage::ReplaySearchSessionTime, session_num, session_time_ms)
    }

    pub fn video_capture(mode: VideoCaptureMode) -> Self {
        Self::new(BroadcastMessage::VideoCapture, mode as u16, 0, 0)
    }
}

/// Encode a car number as the simulator does, keeping leading zeros
/// distinct: `"1"` is 1, `"01"` is 2001 and `"001"` is 3001.
///
/// Returns `None` for empty or non-numeric input.
pub fn pad_car_number(car_number: &str) -> Option<i32> {
    if car_number.is_empty() || !car_number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let num: i32 = car_number.parse().ok()?;
    let mut zeros = car_number.bytes().take_while(|&b| b == b'0').count();
    // A number made only of zeros keeps one as its value
    if zeros == car_number.len() {
        zeros -= 1;
    }
    if zeros == 0 {
        return Some(num);
    }

    let place = if num > 99 {
        3
    } else if num > 9 {
        2
    } else {
        1
    };
    i32::try_from(zeros).ok()?.checked_add(place)?.checked_mul(1000)?.checked_add(num)
}

/// Delivers packed commands to the simulator.
pub trait CommandSink {
    /// Send one command; `true` when it was handed off.
    fn send_command(&self, command: &BroadcastCommand) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        sent: RefCell<Vec<(u32, u32)>>,
    }

    impl CommandSink for RecordingSink {
        fn send_command(&self, command: &BroadcastCommand) -> bool {
            self.sent.borrow_mut().push(command.pack());
            true
        }
    }

    #[test]
    fn car_numbers_keep_leading_zeros() {
        assert_eq!(pad_car_number("1"), Some(1));
        assert_eq!(pad_car_number("01"), Some(2001));
        assert_eq!(pad_car_number("001"), Some(3001));
        assert_eq!(pad_car_number("010"), Some(3010));
        assert_eq!(pad_car_number("0"), Some(0));
        assert_eq!(pad_car_number("00"), Some(2000));
        assert_eq!(pad_car_number("099"), Some(3099));
        assert_eq!(pad_car_number("0100"), Some(4100));
        assert_eq!(pad_car_number("123"), Some(123));
        assert_eq!(pad_car_number(""), None);
        assert_eq!(pad_car_number("7a"), None);
        assert_eq!(pad_car_number("-1"), None);
    }

    #[test]
    fn words_pack_code_and_arguments() {
        let command = BroadcastCommand::cam_switch_pos(CameraTarget::Car(3), 2, 1);
        assert_eq!(command.pack(), (3 << 16, 2 | 1 << 16));

        let command = BroadcastCommand::cam_switch_num("01", 5, 0).unwrap();
        assert_eq!(command.pack(), (1 | 2001 << 16, 5));

        let command = BroadcastCommand::pit_command(PitCommandMode::Fuel, 40);
        assert_eq!(command.pack(), (9 | 2 << 16, 40));
    }

    #[test]
    fn special_camera_targets_are_negative() {
        let command = BroadcastCommand::cam_switch_focus(CameraFocus::AtLeader, 1, 0);
        assert_eq!(command.arg1, 0xFFFE);
        assert_eq!(command.pack().0, 1 | 0xFFFE_0000);
    }

    #[test]
    fn wide_payloads_span_lparam() {
        let command =
            BroadcastCommand::replay_set_play_position(ReplayPosMode::Begin, 0x0012_3456);
        assert_eq!((command.arg2, command.arg3), (0x3456, 0x0012));
        assert_eq!(command.pack(), (4, 0x0012_3456));

        let command = BroadcastCommand::replay_search_session_time(2, 90_000);
        assert_eq!(command.pack(), (12 | 2 << 16, 90_000));
    }

    #[test]
    fn ffb_force_is_fixed_point() {
        let command = BroadcastCommand::ffb_command(FfbCommandMode::MaxForce, 12.5);
        assert_eq!(command.pack(), (11, 819_200));
    }

    #[test]
    fn slow_motion_flag_uses_arg2() {
        let command = BroadcastCommand::replay_set_play_speed(4, true);
        assert_eq!(command.pack(), (3 | 4 << 16, 1));

        let reverse = BroadcastCommand::replay_set_play_speed(-2, false);
        assert_eq!(reverse.pack().0, 3 | 0xFFFE_0000);
    }

    #[test]
    fn chat_and_texture_commands_pick_their_mode() {
        assert_eq!(BroadcastCommand::chat_macro(7).pack(), (8, 7));
        let cancel = BroadcastCommand::chat_command(ChatCommandMode::Cancel);
        assert_eq!(cancel.pack(), (8 | 3 << 16, 0));
        assert_eq!(BroadcastCommand::reload_texture(12).pack(), (7 | 1 << 16, 12));
        assert_eq!(BroadcastCommand::reload_all_textures().pack(), (7, 0));
        assert_eq!(
            BroadcastCommand::video_capture(VideoCaptureMode::Toggle).pack(),
            (13 | 3 << 16, 0)
        );
    }

    #[test]
    fn invalid_car_numbers_are_rejected() {
        assert!(BroadcastCommand::cam_switch_num("x1", 1, 0).is_err());
        let too_wide = format!("{}1", "0".repeat(70));
        assert!(BroadcastCommand::cam_switch_num(&too_wide, 1, 0).is_err());
    }

    #[test]
    fn sinks_receive_packed_words() {
        let sink = RecordingSink::default();
        assert!(sink.send_command(&BroadcastCommand::telem_command(TelemCommandMode::Restart)));
        assert!(sink.send_command(&BroadcastCommand::cam_set_state(
            camera_state::CAM_TOOL_ACTIVE | camera_state::UI_HIDDEN
        )));
        assert_eq!(*sink.sent.borrow(), vec![(10 | 2 << 16, 0), (2 | 0x000C << 16, 0)]);
    }
}
