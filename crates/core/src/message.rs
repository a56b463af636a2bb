use serde::{Deserialize, Serialize};

/// Progress of a streamed reply. Serialized as `0 | 1 | 2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Done,
}

impl From<MessageStatus> for u8 {
    fn from(s: MessageStatus) -> Self {
        match s {
            MessageStatus::Pending => 0,
            MessageStatus::Streaming => 1,
            MessageStatus::Done => 2,
        }
    }
}

impl TryFrom<u8> for MessageStatus {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(MessageStatus::Pending),
            1 => Ok(MessageStatus::Streaming),
            2 => Ok(MessageStatus::Done),
            other => Err(format!("invalid message status {other}")),
        }
    }
}

/// One incremental delta (or the final state) of a single logical reply.
///
/// `index` tells apart concurrent reply threads for vendors that stream more
/// than one choice; most vendors only ever emit `0`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiMessage {
    pub role: String,
    pub content: String,
    pub index: u32,
    pub status: MessageStatus,
}

impl AiMessage {
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            index: 0,
            status: MessageStatus::Streaming,
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == MessageStatus::Done
    }
}
