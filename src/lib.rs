//! ringxchg - zero-copy message exchange over lock-free SPSC rings.
//!
//! Two tightly coupled pieces:
//!
//! - **Codec**: a compact, self-describing binary format for primitive
//!   scalars and homogeneous lists, driven through a positional
//!   [`Message`] cursor. Values carry a 1-byte tag (type, nullness,
//!   list-ness, list-size class) followed by an optional length prefix
//!   and a packed payload.
//! - **Channel**: a full-duplex pair of single-producer/single-consumer
//!   slot rings over caller-provided memory. [`Channel::prepare`] hands
//!   the producer a cursor bound directly to the next ring slot and
//!   [`Channel::receive`] hands the consumer a cursor over a published
//!   slot, so messages are composed and decoded in place - no
//!   intermediate copy.
//!
//! # Key properties
//!
//! - Wait-free fast path: a few loads, a compare, a copy, one fenced
//!   store. No locks, no syscalls, no internal retries.
//! - Cached shadow indices keep cross-core traffic off the hot path.
//! - FIFO per ring; `Full`/`Empty` are transient and pollable.
//! - List reads borrow ring memory (`ListView`) instead of copying.
//!
//! # Example
//!
//! ```
//! use ringxchg::{Channel, Region, WireType};
//!
//! // One region per direction; both endpoints attach to the same pair.
//! let upstream = Region::for_slots(64, 64);
//! let downstream = Region::for_slots(64, 64);
//!
//! let mut client = Channel::new(64, Some(&downstream), Some(&upstream))?;
//! let mut server = Channel::new(64, Some(&upstream), Some(&downstream))?;
//!
//! // Compose a message directly inside the next egress slot.
//! let mut request = client.prepare()?;
//! request.write_u16(7)?;
//! request.write_f32_list(&[0.5, -1.5])?;
//! request.write_null(WireType::U64)?;
//! client.send(&request)?;
//!
//! // Decode it in place on the peer.
//! let mut message = server.receive()?;
//! assert_eq!(message.read_u16()?, 7);
//! assert_eq!(message.read_f32_list()?.to_vec(), vec![0.5, -1.5]);
//! assert_eq!(message.read_null()?, WireType::U64);
//! server.release(&message)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod channel;
mod error;
mod invariants;
mod message;
mod region;
mod ring;
mod tag;

pub use channel::Channel;
pub use error::{ChannelError, MessageError};
pub use message::{ListView, Message, Peek, RawValue, Scalar, ValueRef};
pub use region::{Region, REGION_HEADER};
pub use tag::WireType;
