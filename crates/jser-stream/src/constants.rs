//! Wire constants: stream header, opcodes and class-descriptor flags.

use std::fmt;

use bitflags::bitflags;

pub const STREAM_MAGIC: u16 = 0xaced;
pub const STREAM_VERSION: u16 = 5;

/// Handle of the first element registered after the header or a reset.
pub const BASE_WIRE_HANDLE: u32 = 0x7e_0000;

/// Largest payload of a short block-data record.
pub const MAX_SHORT_BLOCK: usize = 0xff;

/// Largest encoded length of a short string or `utf` field.
pub const MAX_SHORT_UTF: usize = 0xffff;

/// Opcode bytes that drive stream dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Null = 0x70,
    Reference = 0x71,
    ClassDesc = 0x72,
    Object = 0x73,
    String = 0x74,
    Array = 0x75,
    Class = 0x76,
    BlockData = 0x77,
    EndBlockData = 0x78,
    Reset = 0x79,
    BlockDataLong = 0x7a,
    Exception = 0x7b,
    LongString = 0x7c,
    ProxyClassDesc = 0x7d,
    Enum = 0x7e,
}

impl Opcode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        let op = match byte {
            0x70 => Opcode::Null,
            0x71 => Opcode::Reference,
            0x72 => Opcode::ClassDesc,
            0x73 => Opcode::Object,
            0x74 => Opcode::String,
            0x75 => Opcode::Array,
            0x76 => Opcode::Class,
            0x77 => Opcode::BlockData,
            0x78 => Opcode::EndBlockData,
            0x79 => Opcode::Reset,
            0x7a => Opcode::BlockDataLong,
            0x7b => Opcode::Exception,
            0x7c => Opcode::LongString,
            0x7d => Opcode::ProxyClassDesc,
            0x7e => Opcode::Enum,
            _ => return None,
        };
        Some(op)
    }

    #[inline]
    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Null => "TC_NULL",
            Opcode::Reference => "TC_REFERENCE",
            Opcode::ClassDesc => "TC_CLASSDESC",
            Opcode::Object => "TC_OBJECT",
            Opcode::String => "TC_STRING",
            Opcode::Array => "TC_ARRAY",
            Opcode::Class => "TC_CLASS",
            Opcode::BlockData => "TC_BLOCKDATA",
            Opcode::EndBlockData => "TC_ENDBLOCKDATA",
            Opcode::Reset => "TC_RESET",
            Opcode::BlockDataLong => "TC_BLOCKDATALONG",
            Opcode::Exception => "TC_EXCEPTION",
            Opcode::LongString => "TC_LONGSTRING",
            Opcode::ProxyClassDesc => "TC_PROXYCLASSDESC",
            Opcode::Enum => "TC_ENUM",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02x})", self.name(), self.byte())
    }
}

bitflags! {
    /// Class-descriptor flags byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClassFlags: u8 {
        const WRITE_METHOD = 0x01;
        const SERIALIZABLE = 0x02;
        const EXTERNALIZABLE = 0x04;
        const BLOCK_DATA = 0x08;
        const ENUM = 0x10;
    }
}

impl ClassFlags {
    /// Serializable with no custom write method: class data is just the
    /// declared field values with no annotation.
    pub fn is_plain_serializable(self) -> bool {
        self.contains(ClassFlags::SERIALIZABLE) && !self.contains(ClassFlags::WRITE_METHOD)
    }

    /// Whether the class contributes an entry to an object's per-class data.
    pub fn has_class_data(self) -> bool {
        self.intersects(ClassFlags::SERIALIZABLE | ClassFlags::EXTERNALIZABLE)
    }
}
