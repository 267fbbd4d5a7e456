// Inbound IPC classification. Never fails: whatever is not a valid packet is a log line.

use crate::models::Packet;

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Packet(Packet),
    Log(String),
}

/// Classifies one newline-delimited message from the worker.
pub fn classify(line: &str) -> Inbound {
    let trimmed = line.trim();
    if trimmed.starts_with('{')
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed)
        && let Some(packet) = Packet::from_value(&value)
    {
        return Inbound::Packet(packet);
    }
    Inbound::Log(line.trim_end().to_string())
}
