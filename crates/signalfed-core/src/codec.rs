//! JSON encode/decode for signaling frames, with a shared frame-size limit.

use crate::constants::MAX_FRAME_SIZE;
use crate::error::{Error, Result};
use crate::message::{ClientMessage, ServerMessage};

pub fn encode_client(msg: &ClientMessage) -> Result<String> {
    serde_json::to_string(msg).map_err(Error::Encode)
}

pub fn encode_server(msg: &ServerMessage) -> Result<String> {
    serde_json::to_string(msg).map_err(Error::Encode)
}

pub fn decode_client(text: &str) -> Result<ClientMessage> {
    check_frame_size(text)?;
    serde_json::from_str(text).map_err(Error::Decode)
}

pub fn decode_server(text: &str) -> Result<ServerMessage> {
    check_frame_size(text)?;
    serde_json::from_str(text).map_err(Error::Decode)
}

fn check_frame_size(text: &str) -> Result<()> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge {
            size: text.len(),
            limit: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}
