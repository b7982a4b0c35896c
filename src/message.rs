use std::marker::PhantomData;
use std::slice;

use crate::error::MessageError;
use crate::tag::{lsz_for_count, lsz_to_bytes, Tag, WireType};

// =============================================================================
// WIRE FORMAT
// =============================================================================
//
// Every value is `tag [length] [payload]`:
//
// - `tag` is one byte: type code in bits [0..3], list-size class in
//   [4..5], is-list in bit 6, is-null in bit 7.
// - `length` is the element count, 0/1/2/8 bytes little-endian, present
//   only for a non-null list with a nonzero count.
// - `payload` is absent for nulls and empty lists, one scalar for a
//   scalar value, and count × scalar for a list.
//
// Multi-byte scalars travel in host byte order; payloads are moved with
// bytewise copies, so the stream imposes no alignment on either side.
//
// =============================================================================

mod sealed {
    pub trait Sealed {}
}

/// A primitive that can travel on the wire as a tagged scalar or as a
/// list element. Implemented for `bool` and the fixed-width numeric
/// types; the trait is sealed.
pub trait Scalar: Copy + sealed::Sealed {
    /// Wire type code for this primitive.
    const WIRE: WireType;
    /// Encoded size in bytes; equals `Self::WIRE.scalar_size()`.
    const SIZE: usize;
    /// Reads one value from `bytes[..Self::SIZE]` in host byte order.
    fn load(bytes: &[u8]) -> Self;
    /// Writes the value into `out[..Self::SIZE]` in host byte order.
    fn store(self, out: &mut [u8]);
}

macro_rules! impl_scalar {
    ($($ty:ty => $wire:ident),+ $(,)?) => {$(
        impl sealed::Sealed for $ty {}

        impl Scalar for $ty {
            const WIRE: WireType = WireType::$wire;
            const SIZE: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn load(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_ne_bytes(raw)
            }

            #[inline]
            fn store(self, out: &mut [u8]) {
                out[..Self::SIZE].copy_from_slice(&self.to_ne_bytes());
            }
        }
    )+};
}

impl_scalar! {
    i8 => I8, u8 => U8, i16 => I16, u16 => U16,
    i32 => I32, u32 => U32, i64 => I64, u64 => U64,
    f32 => F32, f64 => F64,
}

impl sealed::Sealed for bool {}

impl Scalar for bool {
    const WIRE: WireType = WireType::Bool;
    const SIZE: usize = 1;

    #[inline]
    fn load(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    #[inline]
    fn store(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }
}

/// A packed byte view of a scalar slice.
fn scalar_bytes<T: Scalar>(list: &[T]) -> &[u8] {
    // SAFETY: Scalar is sealed over plain fixed-width primitives with
    // size_of::<T>() == T::SIZE and no padding, so every byte of the
    // slice is initialized and validly readable as u8.
    unsafe { slice::from_raw_parts(list.as_ptr().cast::<u8>(), list.len() * T::SIZE) }
}

/// A zero-copy typed view over a list payload inside a cursor's buffer.
///
/// The wire packs payloads without padding, so elements may be
/// unaligned; accessors copy each element out bytewise. The view borrows
/// the cursor and is invalidated when the cursor is rebound or the
/// backing slot is returned to its ring.
#[derive(Debug, Clone, Copy)]
pub struct ListView<'m, T: Scalar> {
    bytes: &'m [u8],
    count: usize,
    _marker: PhantomData<T>,
}

impl<'m, T: Scalar> ListView<'m, T> {
    fn new(bytes: &'m [u8], count: usize) -> Self {
        debug_assert_eq!(bytes.len(), count * T::SIZE);
        Self {
            bytes,
            count,
            _marker: PhantomData,
        }
    }

    /// Number of elements in the list.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` for the empty (but non-null) list.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The raw payload bytes.
    #[inline]
    pub fn as_bytes(&self) -> &'m [u8] {
        self.bytes
    }

    /// Copies out the element at `index`, if any.
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.count {
            return None;
        }
        Some(T::load(&self.bytes[index * T::SIZE..]))
    }

    /// Iterates over the elements by value.
    pub fn iter(&self) -> impl Iterator<Item = T> + 'm
    where
        T: 'm,
    {
        let bytes = self.bytes;
        (0..self.count).map(move |i| T::load(&bytes[i * T::SIZE..]))
    }

    /// Copies the list out into an owned vector.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

/// Shape of the next value in a message, as reported by [`Message::peek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peek {
    /// Scalar type of the value (or of the list's elements).
    pub wire_type: WireType,
    /// Whether the value is null.
    pub is_null: bool,
    /// Whether the value is a list.
    pub is_list: bool,
    /// Element count for a non-null list; zero otherwise.
    pub list_len: u64,
}

/// A decoded value: its shape plus a payload borrowed from the cursor's
/// buffer (zero-copy). The payload is empty for nulls and empty lists.
#[derive(Debug, Clone, Copy)]
pub struct RawValue<'m> {
    pub wire_type: WireType,
    pub is_null: bool,
    pub is_list: bool,
    pub list_len: u64,
    pub payload: &'m [u8],
}

/// A value descriptor to encode; `payload` bytes are copied verbatim.
///
/// The descriptor must be internally consistent: a null value carries no
/// payload and no count, a scalar carries exactly one scalar's bytes,
/// and a list carries `list_len` scalars' worth.
#[derive(Debug, Clone, Copy)]
pub struct ValueRef<'a> {
    pub wire_type: WireType,
    pub is_null: bool,
    pub is_list: bool,
    pub list_len: u64,
    pub payload: &'a [u8],
}

/// Outcome of parsing the next value's framing without advancing.
struct Parsed {
    tag: Tag,
    wire: WireType,
    count: u64,
    payload_start: usize,
    end: usize,
}

/// A positional cursor for encoding and decoding tagged values in a
/// bound byte buffer.
///
/// The cursor owns no memory: it borrows the slice it was created over,
/// or, when produced by [`Channel::prepare`](crate::Channel::prepare)
/// or [`Channel::receive`](crate::Channel::receive), points directly
/// into a ring slot, so values are composed and read in place.
#[derive(Debug)]
pub struct Message<'m> {
    data: *mut u8,
    len: usize,
    pos: usize,
    err: Option<MessageError>,
    _buf: PhantomData<&'m mut [u8]>,
}

impl<'m> Message<'m> {
    /// Binds a cursor over `buf` with the position at zero.
    ///
    /// # Errors
    ///
    /// [`MessageError::InvalidArgument`] if `buf` is empty.
    pub fn new(buf: &'m mut [u8]) -> Result<Self, MessageError> {
        if buf.is_empty() {
            return Err(MessageError::InvalidArgument);
        }
        Ok(Self {
            data: buf.as_mut_ptr(),
            len: buf.len(),
            pos: 0,
            err: None,
            _buf: PhantomData,
        })
    }

    /// Binds a cursor over raw slot memory.
    ///
    /// # Safety
    ///
    /// `data` must be valid for reads and writes of `len > 0` bytes for
    /// the lifetime `'m`, and the ring protocol must guarantee this
    /// endpoint exclusive access to those bytes while the cursor lives.
    pub(crate) unsafe fn from_raw_parts(data: *mut u8, len: usize) -> Self {
        debug_assert!(!data.is_null() && len > 0);
        Self {
            data,
            len,
            pos: 0,
            err: None,
            _buf: PhantomData,
        }
    }

    #[inline]
    fn bytes(&self) -> &[u8] {
        // SAFETY: `data` is valid for `len` bytes for 'm and this
        // endpoint holds exclusive access per the cursor contract.
        unsafe { slice::from_raw_parts(self.data, self.len) }
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as `bytes`, and `&mut self` rules out aliasing views.
        unsafe { slice::from_raw_parts_mut(self.data, self.len) }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.data
    }

    /// Records `err` as the cursor's last error and hands it back.
    #[inline]
    fn fail(&mut self, err: MessageError) -> MessageError {
        self.err = Some(err);
        err
    }

    /// Rewinds the position to zero and clears the error state. The
    /// buffer binding is preserved.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.err = None;
    }

    /// Current position, in bytes from the start of the buffer.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total capacity of the bound buffer, in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Moves the position to `position`. Seeking to exactly the buffer
    /// length (natural end-of-message) is allowed.
    ///
    /// # Errors
    ///
    /// [`MessageError::OutOfBounds`] beyond the end; position unchanged.
    pub fn seek(&mut self, position: usize) -> Result<(), MessageError> {
        if position > self.len {
            return Err(self.fail(MessageError::OutOfBounds));
        }
        self.pos = position;
        self.err = None;
        Ok(())
    }

    /// The error recorded by the last failing operation, if any.
    #[inline]
    pub fn last_error(&self) -> Option<MessageError> {
        self.err
    }

    /// Parses the framing of the next value without moving the position
    /// or touching the error state.
    fn parse_next(&self) -> Result<Parsed, MessageError> {
        let buf = self.bytes();
        let mut pos = self.pos;

        if pos >= self.len {
            return Err(MessageError::Eof);
        }
        let tag = Tag::from_byte(buf[pos]);
        pos += 1;

        let mut count: u64 = 0;
        if !tag.null && tag.list && tag.lsz > 0 {
            let nr = lsz_to_bytes(tag.lsz);
            if self.len - pos < nr {
                return Err(MessageError::Truncated);
            }
            let mut raw = [0u8; 8];
            raw[..nr].copy_from_slice(&buf[pos..pos + nr]);
            count = u64::from_le_bytes(raw);
            pos += nr;
        }

        let wire = tag.wire_type()?;

        let payload_len = if tag.null {
            0
        } else if tag.list {
            usize::try_from(count)
                .ok()
                .and_then(|n| n.checked_mul(wire.scalar_size()))
                .ok_or(MessageError::Truncated)?
        } else {
            wire.scalar_size()
        };

        if self.len - pos < payload_len {
            return Err(MessageError::Truncated);
        }

        Ok(Parsed {
            tag,
            wire,
            count,
            payload_start: pos,
            end: pos + payload_len,
        })
    }

    /// Reports the shape of the next value without advancing. Verifies
    /// that the length prefix and payload fit: if `peek` succeeds, the
    /// matching typed read on this cursor is guaranteed to succeed.
    ///
    /// # Errors
    ///
    /// [`MessageError::Eof`] when no tag byte is left,
    /// [`MessageError::Truncated`] when the prefix or payload overruns
    /// the buffer, [`MessageError::InvalidType`] on a reserved type code.
    pub fn peek(&mut self) -> Result<Peek, MessageError> {
        match self.parse_next() {
            Ok(p) => {
                self.err = None;
                Ok(Peek {
                    wire_type: p.wire,
                    is_null: p.tag.null,
                    is_list: p.tag.list,
                    list_len: p.count,
                })
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Decodes the next value and advances past it. The payload borrow
    /// points into the cursor's buffer; an empty non-null list yields a
    /// zero-length payload with `list_len == 0`, distinct from a null
    /// list (`is_null` set).
    pub fn read_value(&mut self) -> Result<RawValue<'_>, MessageError> {
        let p = match self.parse_next() {
            Ok(p) => p,
            Err(e) => return Err(self.fail(e)),
        };
        self.pos = p.end;
        self.err = None;
        let payload = &self.bytes()[p.payload_start..p.end];
        Ok(RawValue {
            wire_type: p.wire,
            is_null: p.tag.null,
            is_list: p.tag.list,
            list_len: p.count,
            payload,
        })
    }

    /// Encodes `value` at the current position and advances past it.
    ///
    /// # Errors
    ///
    /// [`MessageError::InvalidValue`] when the descriptor is
    /// inconsistent, [`MessageError::InsufficientSpace`] when the tag,
    /// length prefix, and payload do not fit in the remaining capacity.
    /// The position is unchanged on failure.
    pub fn write_value(&mut self, value: &ValueRef<'_>) -> Result<(), MessageError> {
        if value.is_null {
            if !value.payload.is_empty() || value.list_len != 0 {
                return Err(self.fail(MessageError::InvalidValue));
            }
        } else {
            let expected = if value.is_list {
                match usize::try_from(value.list_len)
                    .ok()
                    .and_then(|n| n.checked_mul(value.wire_type.scalar_size()))
                {
                    Some(n) => n,
                    None => return Err(self.fail(MessageError::InvalidValue)),
                }
            } else {
                value.wire_type.scalar_size()
            };
            if value.payload.len() != expected {
                return Err(self.fail(MessageError::InvalidValue));
            }
            if !value.is_list && value.list_len != 0 {
                return Err(self.fail(MessageError::InvalidValue));
            }
        }

        let lsz = if value.is_list && !value.is_null {
            lsz_for_count(value.list_len)
        } else {
            0
        };
        let nr = lsz_to_bytes(lsz);

        let needed = 1 + nr + value.payload.len();
        if self.len - self.pos < needed {
            return Err(self.fail(MessageError::InsufficientSpace));
        }

        let tag = Tag {
            code: value.wire_type.code(),
            lsz,
            list: value.is_list,
            null: value.is_null,
        };

        let mut pos = self.pos;
        let buf = self.bytes_mut();
        buf[pos] = tag.to_byte();
        pos += 1;
        buf[pos..pos + nr].copy_from_slice(&value.list_len.to_le_bytes()[..nr]);
        pos += nr;
        buf[pos..pos + value.payload.len()].copy_from_slice(value.payload);
        pos += value.payload.len();

        self.pos = pos;
        self.err = None;
        Ok(())
    }

    /// Reads the tag byte at the cursor without advancing, for the typed
    /// readers' shape checks. Records `Eof` when no byte is left.
    fn peek_tag(&mut self) -> Result<Tag, MessageError> {
        if self.pos >= self.len {
            return Err(self.fail(MessageError::Eof));
        }
        Ok(Tag::from_byte(self.bytes()[self.pos]))
    }

    /// Reads a null scalar, returning its declared type.
    ///
    /// Fails with [`MessageError::TypeMismatch`] when the next value is
    /// not a null scalar; position and error state stay untouched.
    pub fn read_null(&mut self) -> Result<WireType, MessageError> {
        let tag = self.peek_tag()?;
        if tag.list || !tag.null {
            return Err(MessageError::TypeMismatch);
        }
        Ok(self.read_value()?.wire_type)
    }

    /// Reads a null list, returning its declared element type.
    pub fn read_null_list(&mut self) -> Result<WireType, MessageError> {
        let tag = self.peek_tag()?;
        if !tag.list || !tag.null {
            return Err(MessageError::TypeMismatch);
        }
        Ok(self.read_value()?.wire_type)
    }

    /// Reads a non-null, non-list value of `T`'s wire type, copying the
    /// scalar out of the buffer.
    ///
    /// Fails with [`MessageError::TypeMismatch`] when the next value has
    /// a different shape; position and error state stay untouched.
    pub fn read_scalar<T: Scalar>(&mut self) -> Result<T, MessageError> {
        let tag = self.peek_tag()?;
        if tag.list || tag.null || tag.code != T::WIRE.code() {
            return Err(MessageError::TypeMismatch);
        }
        let value = self.read_value()?;
        Ok(T::load(value.payload))
    }

    /// Reads a non-null list of `T`'s wire type, yielding a borrowed
    /// view into the buffer. An empty list yields a zero-length view.
    pub fn read_list<T: Scalar>(&mut self) -> Result<ListView<'_, T>, MessageError> {
        let tag = self.peek_tag()?;
        if !tag.list || tag.null || tag.code != T::WIRE.code() {
            return Err(MessageError::TypeMismatch);
        }
        let value = self.read_value()?;
        #[allow(clippy::cast_possible_truncation)]
        let count = value.list_len as usize;
        Ok(ListView::new(value.payload, count))
    }

    /// Writes a null scalar of the given type (one tag byte).
    pub fn write_null(&mut self, wire_type: WireType) -> Result<(), MessageError> {
        self.write_value(&ValueRef {
            wire_type,
            is_null: true,
            is_list: false,
            list_len: 0,
            payload: &[],
        })
    }

    /// Writes a null list of the given element type (one tag byte).
    pub fn write_null_list(&mut self, wire_type: WireType) -> Result<(), MessageError> {
        self.write_value(&ValueRef {
            wire_type,
            is_null: true,
            is_list: true,
            list_len: 0,
            payload: &[],
        })
    }

    /// Writes a non-null scalar.
    pub fn write_scalar<T: Scalar>(&mut self, value: T) -> Result<(), MessageError> {
        let mut raw = [0u8; 8];
        value.store(&mut raw);
        self.write_value(&ValueRef {
            wire_type: T::WIRE,
            is_null: false,
            is_list: false,
            list_len: 0,
            payload: &raw[..T::SIZE],
        })
    }

    /// Writes a non-null list; the empty list encodes as a bare tag.
    pub fn write_list<T: Scalar>(&mut self, list: &[T]) -> Result<(), MessageError> {
        self.write_value(&ValueRef {
            wire_type: T::WIRE,
            is_null: false,
            is_list: true,
            list_len: list.len() as u64,
            payload: scalar_bytes(list),
        })
    }
}

macro_rules! typed_accessors {
    ($($ty:ty => $read:ident, $read_list:ident, $write:ident, $write_list:ident;)+) => {
        impl Message<'_> {$(
            #[doc = concat!("Reads a non-null `", stringify!($ty), "` scalar.")]
            #[inline]
            pub fn $read(&mut self) -> Result<$ty, MessageError> {
                self.read_scalar::<$ty>()
            }

            #[doc = concat!("Reads a non-null `", stringify!($ty), "` list as a borrowed view.")]
            #[inline]
            pub fn $read_list(&mut self) -> Result<ListView<'_, $ty>, MessageError> {
                self.read_list::<$ty>()
            }

            #[doc = concat!("Writes a `", stringify!($ty), "` scalar.")]
            #[inline]
            pub fn $write(&mut self, value: $ty) -> Result<(), MessageError> {
                self.write_scalar(value)
            }

            #[doc = concat!("Writes a `", stringify!($ty), "` list.")]
            #[inline]
            pub fn $write_list(&mut self, list: &[$ty]) -> Result<(), MessageError> {
                self.write_list(list)
            }
        )+}
    };
}

typed_accessors! {
    bool => read_bool, read_bool_list, write_bool, write_bool_list;
    i8 => read_i8, read_i8_list, write_i8, write_i8_list;
    u8 => read_u8, read_u8_list, write_u8, write_u8_list;
    i16 => read_i16, read_i16_list, write_i16, write_i16_list;
    u16 => read_u16, read_u16_list, write_u16, write_u16_list;
    i32 => read_i32, read_i32_list, write_i32, write_i32_list;
    u32 => read_u32, read_u32_list, write_u32, write_u32_list;
    i64 => read_i64, read_i64_list, write_i64, write_i64_list;
    u64 => read_u64, read_u64_list, write_u64, write_u64_list;
    f32 => read_f32, read_f32_list, write_f32, write_f32_list;
    f64 => read_f64, read_f64_list, write_f64, write_f64_list;
}
