use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

/// Closed enumeration of every base type the language supports. The
/// discriminants occupy the reserved low range of the TypeID space.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(u32)]
pub enum ScalarKind {
    Byte = 0x01,
    Word,
    Long,
    Quad,
    Octa,
    SFloat = 0x10,
    TFloat,
    DFloat,
    GFloat,
    HFloat,
    XFloat,
    FFloat,
    SFloatComplex = 0x18,
    TFloatComplex,
    DFloatComplex,
    GFloatComplex,
    HFloatComplex,
    XFloatComplex,
    FFloatComplex,
    Decimal = 0x20,
    Bitfield = 0x28,
    BitfieldByte,
    BitfieldWord,
    BitfieldLong,
    BitfieldQuad,
    BitfieldOcta,
    Char = 0x30,
    CharVary,
    CharStar,
    Addr = 0x38,
    AddrLong,
    AddrQuad,
    AddrHw,
    Ptr = 0x40,
    PtrLong,
    PtrQuad,
    PtrHw,
    Any = 0x48,
    Void,
    Boolean,
    Structure = 0x50,
    Union,
    Enum,
    Entry,
}

impl ScalarKind {
    /// Natural size in bytes. Address families depend on the target
    /// pointer width.
    pub fn size_bytes(self, pointer_bytes: u32) -> u32 {
        use ScalarKind::*;
        match self {
            Byte => 1,
            Word => 2,
            Long => 4,
            Quad => 8,
            Octa => 16,
            SFloat | FFloat => 4,
            TFloat | DFloat | GFloat => 8,
            HFloat | XFloat => 16,
            SFloatComplex | FFloatComplex => 8,
            TFloatComplex | DFloatComplex | GFloatComplex => 16,
            HFloatComplex | XFloatComplex => 32,
            Decimal => 1,
            Bitfield | BitfieldByte => 1,
            BitfieldWord => 2,
            BitfieldLong => 4,
            BitfieldQuad => 8,
            BitfieldOcta => 16,
            Char | CharVary => 1,
            CharStar => 0,
            Addr | AddrHw | Ptr | PtrHw => pointer_bytes,
            AddrLong | PtrLong => 4,
            AddrQuad | PtrQuad => 8,
            Any | Void | Structure | Union | Entry => 0,
            Boolean => 1,
            Enum => 4,
        }
    }

    /// Default tag letter used when no explicit tag was supplied.
    pub fn default_tag(self) -> &'static str {
        use ScalarKind::*;
        match self {
            Byte => "B",
            Word => "W",
            Long => "L",
            Quad => "Q",
            Octa => "O",
            SFloat | FFloat => "F",
            TFloat => "T",
            DFloat => "D",
            GFloat => "G",
            HFloat => "H",
            XFloat => "X",
            SFloatComplex | FFloatComplex => "FC",
            TFloatComplex => "TC",
            DFloatComplex => "DC",
            GFloatComplex => "GC",
            HFloatComplex => "HC",
            XFloatComplex => "XC",
            Decimal => "P",
            Bitfield | BitfieldByte | BitfieldWord | BitfieldLong
            | BitfieldQuad | BitfieldOcta => "V",
            Char | CharStar => "C",
            CharVary => "T",
            Addr | AddrLong | AddrQuad | AddrHw => "A",
            Ptr | PtrLong | PtrQuad | PtrHw => "PS",
            Boolean => "B",
            Enum => "N",
            Structure | Union => "R",
            Any | Void | Entry => "",
        }
    }

    /// Signedness when the source says nothing.
    pub fn default_signed(self) -> bool {
        use ScalarKind::*;
        matches!(
            self,
            Byte | Word
                | Long
                | Quad
                | Octa
                | SFloat
                | TFloat
                | DFloat
                | GFloat
                | HFloat
                | XFloat
                | FFloat
                | SFloatComplex
                | TFloatComplex
                | DFloatComplex
                | GFloatComplex
                | HFloatComplex
                | XFloatComplex
                | FFloatComplex
                | Decimal
        )
    }

    /// Natural alignment: the scalar size for power-of-two scalars,
    /// byte alignment for strings and decimal.
    pub fn natural_alignment(self, pointer_bytes: u32) -> u32 {
        use ScalarKind::*;
        match self {
            Decimal | Char | CharVary | CharStar => 1,
            other => other.size_bytes(pointer_bytes).clamp(1, 16),
        }
    }

    pub fn is_bitfield(self) -> bool {
        use ScalarKind::*;
        matches!(
            self,
            Bitfield | BitfieldByte | BitfieldWord | BitfieldLong
                | BitfieldQuad | BitfieldOcta
        )
    }

    /// Host width for the explicitly sized bitfield kinds; `None` for
    /// the generic kind, whose host the packer may promote.
    pub fn bitfield_host_bytes(self) -> Option<u32> {
        use ScalarKind::*;
        match self {
            BitfieldByte => Some(1),
            BitfieldWord => Some(2),
            BitfieldLong => Some(4),
            BitfieldQuad => Some(8),
            BitfieldOcta => Some(16),
            _ => None,
        }
    }

    /// Address and pointer families; items of these kinds may carry an
    /// aggregate subtype, which then must be based.
    pub fn is_address(self) -> bool {
        use ScalarKind::*;
        matches!(
            self,
            Addr | AddrLong | AddrQuad | AddrHw | Ptr | PtrLong | PtrQuad
                | PtrHw
        )
    }

    pub fn is_char(self) -> bool {
        use ScalarKind::*;
        matches!(self, Char | CharVary | CharStar)
    }
}
