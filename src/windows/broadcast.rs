//! Command broadcast through the window message queue

use tracing::{debug, warn};
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    HWND_BROADCAST, RegisterWindowMessageW, SendNotifyMessageW,
};
use windows::core::PCWSTR;

use super::wide_string;
use crate::broadcast::{BroadcastCommand, CommandSink};
use crate::{Result, TelemetryError};

/// Registered window message the simulator listens for.
pub const BROADCAST_MESSAGE_NAME: &str = "IRSDK_BROADCASTMSG";

/// Posts commands to every top-level window, the simulator among them.
#[derive(Debug, Clone, Copy)]
pub struct MessageSink {
    message_id: u32,
}

impl MessageSink {
    pub fn register() -> Result<Self> {
        let name = wide_string(BROADCAST_MESSAGE_NAME);
        let message_id = unsafe { RegisterWindowMessageW(PCWSTR::from_raw(name.as_ptr())) };
        if message_id == 0 {
            let error = windows::core::Error::from_thread();
            return Err(TelemetryError::windows_api_error("RegisterWindowMessageW", error));
        }

        debug!(message_id, "Registered broadcast message");
        Ok(Self { message_id })
    }

    pub fn message_id(&self) -> u32 {
        self.message_id
    }
}

impl CommandSink for MessageSink {
    fn send_command(&self, command: &BroadcastCommand) -> bool {
        let (wparam, lparam) = command.pack();
        let sent = unsafe {
            SendNotifyMessageW(
                HWND_BROADCAST,
                self.message_id,
                WPARAM(wparam as usize),
                LPARAM(lparam as i32 as isize),
            )
        };

        match sent {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, message = ?command.message, "Failed to broadcast command");
                false
            }
        }
    }
}
