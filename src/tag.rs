use crate::error::MessageError;

/// Scalar datatype of a value on the wire.
///
/// Occupies the low 4 bits of the tag byte. Code `0` means "invalid" and
/// codes `12..=15` are unassigned; writers never emit either, and readers
/// reject both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// 1-byte boolean
    Bool = 1,
    /// 1-byte signed integer
    I8 = 2,
    /// 1-byte unsigned integer
    U8 = 3,
    /// 2-byte signed integer
    I16 = 4,
    /// 2-byte unsigned integer
    U16 = 5,
    /// 4-byte signed integer
    I32 = 6,
    /// 4-byte unsigned integer
    U32 = 7,
    /// 8-byte signed integer
    I64 = 8,
    /// 8-byte unsigned integer
    U64 = 9,
    /// 4-byte floating-point number
    F32 = 10,
    /// 8-byte floating-point number
    F64 = 11,
}

impl WireType {
    /// Decodes a 4-bit type code. Returns `None` for zero and the
    /// reserved codes.
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Bool,
            2 => Self::I8,
            3 => Self::U8,
            4 => Self::I16,
            5 => Self::U16,
            6 => Self::I32,
            7 => Self::U32,
            8 => Self::I64,
            9 => Self::U64,
            10 => Self::F32,
            11 => Self::F64,
            _ => return None,
        })
    }

    /// The 4-bit code carried in the tag byte.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Encoded size of one scalar of this type, in bytes.
    pub const fn scalar_size(self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

const TYPE_MASK: u8 = 0x0F;
const LSZ_SHIFT: u32 = 4;
const LSZ_MASK: u8 = 0x03;
const LIST_BIT: u8 = 1 << 6;
const NULL_BIT: u8 = 1 << 7;

/// The unpacked tag byte: bits `[0..3]` type code, `[4..5]` list-size
/// class, bit 6 is-list, bit 7 is-null.
///
/// `code` is kept raw here so that shape checks (null/list bits) can run
/// before the type code is validated; readers resolve it via
/// [`Tag::wire_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tag {
    pub code: u8,
    pub lsz: u8,
    pub list: bool,
    pub null: bool,
}

impl Tag {
    #[inline]
    pub(crate) fn from_byte(byte: u8) -> Self {
        Self {
            code: byte & TYPE_MASK,
            lsz: (byte >> LSZ_SHIFT) & LSZ_MASK,
            list: byte & LIST_BIT != 0,
            null: byte & NULL_BIT != 0,
        }
    }

    #[inline]
    pub(crate) fn to_byte(self) -> u8 {
        self.code
            | (self.lsz << LSZ_SHIFT)
            | if self.list { LIST_BIT } else { 0 }
            | if self.null { NULL_BIT } else { 0 }
    }

    /// Resolves the type code, rejecting zero and the reserved codes.
    #[inline]
    pub(crate) fn wire_type(self) -> Result<WireType, MessageError> {
        WireType::from_code(self.code).ok_or(MessageError::InvalidType)
    }
}

/// Size class for a list of `count` elements: no prefix for an empty
/// list, one byte for small counts, two for medium, eight otherwise.
/// There is no 4-byte form.
pub(crate) const fn lsz_for_count(count: u64) -> u8 {
    if count == 0 {
        0
    } else if count <= 0xFF {
        1
    } else if count <= 0xFFFF {
        2
    } else {
        3
    }
}

/// Number of length-prefix bytes occupied by a size class.
pub(crate) const fn lsz_to_bytes(lsz: u8) -> usize {
    match lsz {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 8,
    }
}
