use thiserror::Error;

/// Failures reported by [`Message`](crate::Message) operations.
///
/// Apart from [`TypeMismatch`](MessageError::TypeMismatch), a failing
/// operation records its error on the cursor, readable via
/// [`Message::last_error`](crate::Message::last_error). A type mismatch
/// leaves both the position and the recorded error untouched so that
/// peek-then-dispatch loops can probe readers without disturbing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MessageError {
    /// An empty buffer where backing storage is required.
    #[error("message buffer must not be empty")]
    InvalidArgument,

    /// Seek target beyond the end of the buffer.
    #[error("attempt to seek outside message bounds")]
    OutOfBounds,

    /// No bytes left to read a tag.
    #[error("the message has no more data left to read")]
    Eof,

    /// A length prefix or payload extends past the end of the buffer.
    #[error("the message is not large enough to read the expected amount of data")]
    Truncated,

    /// The tag carries a zero or reserved type code.
    #[error("value type is not a recognized wire type")]
    InvalidType,

    /// A write would exceed the cursor's remaining capacity.
    #[error("the message is not large enough to write the specified value")]
    InsufficientSpace,

    /// A typed read against a value of a different type, nullness, or
    /// list-ness.
    #[error("value does not match the requested type, nullness, or list-ness")]
    TypeMismatch,

    /// A write descriptor violating the null/list/payload invariants.
    #[error("value descriptor fields are inconsistent")]
    InvalidValue,
}

/// Failures reported by [`Channel`](crate::Channel) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Slot size is zero or not a power of two.
    #[error("slot size must be a power of two")]
    InvalidSlotSize,

    /// Ingress region length violates the sizing rules.
    #[error("ingress size is invalid")]
    InvalidIngressSize,

    /// Egress region length violates the sizing rules.
    #[error("egress size is invalid")]
    InvalidEgressSize,

    /// Neither an ingress nor an egress region was provided.
    #[error("at least one of ingress or egress must be provided")]
    MissingRegion,

    /// Send-side operation on a channel configured without an egress.
    #[error("channel has no egress")]
    NoEgress,

    /// Receive-side operation on a channel configured without an ingress.
    #[error("channel has no ingress")]
    NoIngress,

    /// Every egress slot is outstanding; clears once the peer returns one.
    #[error("channel is full")]
    Full,

    /// No ingress slot has been published; clears once the peer sends.
    #[error("channel is empty")]
    Empty,

    /// The message's slot address or length does not match the channel's
    /// next slot (foreign or stale cursor).
    #[error("message does not match the channel's next slot")]
    InvalidMessage,
}

impl ChannelError {
    /// Returns `true` for conditions that clear on their own as the peer
    /// makes progress; callers may poll.
    #[inline]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Full | Self::Empty)
    }
}
