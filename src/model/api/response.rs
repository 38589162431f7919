use serde::Serialize;

/// The uniform response envelope: `{success, message?, ...payload}`.
///
/// Every endpoint returns this shape. Domain rejections ("voting closed",
/// "already voted") are `success: false` with a specific message and a 200
/// status; infrastructure failures are converted by the [`Error`] responder
/// into the same shape with a generic message.
///
/// [`Error`]: crate::error::Error
#[derive(Debug, Serialize)]
pub struct Envelope<T = ()> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T> Envelope<T> {
    /// A successful response carrying a payload.
    pub fn success(payload: T) -> Self {
        Self {
            success: true,
            message: None,
            payload: Some(payload),
        }
    }

    /// A successful response with both a message and a payload.
    pub fn success_with(message: impl Into<String>, payload: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            payload: Some(payload),
        }
    }

    /// A domain-level rejection. Not an error: the request was understood
    /// and the answer is "no".
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            payload: None,
        }
    }
}

impl Envelope<()> {
    /// A successful response carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            payload: None,
        }
    }
}
