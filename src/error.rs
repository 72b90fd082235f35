use thiserror::Error;

/// Error taxonomy for the realtime chat layer.
///
/// Validation errors are raised before anything reaches the transport;
/// transport errors are surfaced to callers and logged, never fatal.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message content is empty")]
    EmptyContent,

    #[error("user {user_id} is not a party of booking {booking_id}")]
    NoCounterpart { booking_id: String, user_id: String },

    #[error("unknown booking: {0}")]
    UnknownBooking(String),

    #[error("session has not completed setup")]
    NotRegistered,

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("storage error: {0}")]
    Storage(String),
}
