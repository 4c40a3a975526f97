use super::messages::{ClientMessage, ServerMessage};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum wire message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    MessageTooLarge(usize),
    Serialize(String),
    Deserialize(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::MessageTooLarge(size) => {
                write!(f, "message too large: {size} bytes (max {MAX_MESSAGE_SIZE})")
            },
            Self::Serialize(e) => write!(f, "serialize error: {e}"),
            Self::Deserialize(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a `ClientMessage` into its JSON envelope.
pub fn encode_client_message(msg: &ClientMessage) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(msg).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(text.len()));
    }
    Ok(text)
}

/// Encode a `ServerMessage` into its JSON envelope.
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(msg).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode a JSON envelope into a `ClientMessage`.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    check_inbound(text)?;
    serde_json::from_str(text).map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

/// Decode a JSON envelope into a `ServerMessage`.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    check_inbound(text)?;
    serde_json::from_str(text).map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

fn check_inbound(text: &str) -> Result<(), ProtocolError> {
    if text.trim().is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(text.len()));
    }
    Ok(())
}
