use super::CommandChannel;
use crate::error::{BridgeError, BridgeResult};
use tracing::debug;

/// Firmware queues carry fixed-size messages, NUL padded.
pub const MESSAGE_SIZE: usize = 1024;

/// Pad a command to the fixed queue message size.
pub fn pad_message(command: &str) -> Option<Vec<u8>> {
    if command.len() > MESSAGE_SIZE {
        return None;
    }
    let mut message = Vec::with_capacity(MESSAGE_SIZE);
    message.extend_from_slice(command.as_bytes());
    message.resize(MESSAGE_SIZE, 0);
    Some(message)
}

/// POSIX message queue command channel. Each send opens the queue, writes one
/// message and closes it again.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixQueue;

impl CommandChannel for PosixQueue {
    fn send(&self, channel: &str, command: &str) -> BridgeResult<()> {
        let message = pad_message(command).ok_or_else(|| BridgeError::CommandChannel {
            channel: channel.to_string(),
            reason: format!("command longer than {MESSAGE_SIZE} bytes"),
        })?;

        debug!(channel = %channel, command = %command, "Sending device command");
        send_raw(channel, &message).map_err(|e| BridgeError::CommandChannel {
            channel: channel.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(target_os = "linux")]
fn send_raw(channel: &str, message: &[u8]) -> std::io::Result<()> {
    use std::ffi::CString;
    use std::io;

    let name = CString::new(format!("/{channel}"))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
    let mq = unsafe { libc::mq_open(name.as_ptr(), libc::O_WRONLY) };
    if mq == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `message` outlives the call and `mq` is an open descriptor.
    let sent = unsafe {
        libc::mq_send(
            mq,
            message.as_ptr() as *const libc::c_char,
            message.len(),
            0,
        )
    };
    let result = if sent == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    };

    // SAFETY: `mq` was returned by a successful mq_open above.
    unsafe {
        libc::mq_close(mq);
    }
    result
}

#[cfg(not(target_os = "linux"))]
fn send_raw(_channel: &str, _message: &[u8]) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "POSIX message queues are only supported on Linux",
    ))
}
