//! Datatype handles and the layout facts the collectives need.
//!
//! Derived datatypes are shared, immutable objects behind an `Arc`. Each one
//! keeps the arguments it was constructed from (see [`contents`]) and the
//! computed size, bounds and contiguity. Packing of non-contiguous layouts
//! belongs to the datatype engine and is not done here.

mod contents;

pub use contents::{Combiner, Contents, Envelope, get_contents, get_envelope};

use std::fmt;
use std::sync::Arc;

/// Address-sized signed integer used for byte displacements.
pub type Aint = isize;

/// Predefined primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Byte,
    Char,
    Short,
    Int,
    Long,
    LongLong,
    Float,
    Double,
    LongDouble,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
}

impl Builtin {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Builtin::Byte | Builtin::Char | Builtin::Int8 | Builtin::Uint8 => 1,
            Builtin::Short | Builtin::Int16 | Builtin::Uint16 => 2,
            Builtin::Int | Builtin::Float | Builtin::Int32 | Builtin::Uint32 => 4,
            Builtin::Long
            | Builtin::LongLong
            | Builtin::Double
            | Builtin::Int64
            | Builtin::Uint64 => 8,
            Builtin::LongDouble => 16,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Builtin::Byte => "byte",
            Builtin::Char => "char",
            Builtin::Short => "short",
            Builtin::Int => "int",
            Builtin::Long => "long",
            Builtin::LongLong => "long_long",
            Builtin::Float => "float",
            Builtin::Double => "double",
            Builtin::LongDouble => "long_double",
            Builtin::Int8 => "int8",
            Builtin::Int16 => "int16",
            Builtin::Int32 => "int32",
            Builtin::Int64 => "int64",
            Builtin::Uint8 => "uint8",
            Builtin::Uint16 => "uint16",
            Builtin::Uint32 => "uint32",
            Builtin::Uint64 => "uint64",
        }
    }
}

/// The five legacy value/index pair types used by MINLOC/MAXLOC.
///
/// They behave like named types for introspection even though they are not
/// primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairType {
    FloatInt,
    DoubleInt,
    LongInt,
    ShortInt,
    LongDoubleInt,
}

impl PairType {
    pub const fn size_in_bytes(self) -> usize {
        match self {
            PairType::FloatInt => 8,
            PairType::DoubleInt | PairType::LongInt => 12,
            PairType::ShortInt => 6,
            PairType::LongDoubleInt => 20,
        }
    }

    /// Extent including trailing alignment padding.
    pub const fn extent(self) -> usize {
        match self {
            PairType::FloatInt | PairType::ShortInt => 8,
            PairType::DoubleInt | PairType::LongInt => 16,
            PairType::LongDoubleInt => 32,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            PairType::FloatInt => "float_int",
            PairType::DoubleInt => "double_int",
            PairType::LongInt => "long_int",
            PairType::ShortInt => "short_int",
            PairType::LongDoubleInt => "long_double_int",
        }
    }
}

/// A user-constructed datatype: its constructor arguments plus layout.
pub struct DerivedType {
    contents: Contents,
    size: usize,
    lb: Aint,
    extent: Aint,
    contiguous: bool,
}

impl DerivedType {
    pub fn contents(&self) -> &Contents {
        &self.contents
    }
}

/// Handle to a datatype.
///
/// Cloning a derived handle shares the underlying object and bumps its
/// reference count; dropping the clone releases it.
#[derive(Clone)]
pub enum Datatype {
    Builtin(Builtin),
    Pair(PairType),
    Derived(Arc<DerivedType>),
}

impl PartialEq for Datatype {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datatype::Builtin(a), Datatype::Builtin(b)) => a == b,
            (Datatype::Pair(a), Datatype::Pair(b)) => a == b,
            (Datatype::Derived(a), Datatype::Derived(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Datatype {}

impl From<Builtin> for Datatype {
    fn from(b: Builtin) -> Self {
        Datatype::Builtin(b)
    }
}

impl From<PairType> for Datatype {
    fn from(p: PairType) -> Self {
        Datatype::Pair(p)
    }
}

impl fmt::Debug for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::Builtin(b) => write!(f, "Builtin({})", b.name()),
            Datatype::Pair(p) => write!(f, "Pair({})", p.name()),
            Datatype::Derived(d) => f
                .debug_struct("Derived")
                .field("combiner", &d.contents.combiner())
                .field("size", &d.size)
                .field("extent", &d.extent)
                .finish(),
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::Builtin(b) => f.write_str(b.name()),
            Datatype::Pair(p) => f.write_str(p.name()),
            Datatype::Derived(d) => write!(f, "{}", d.contents.combiner()),
        }
    }
}

impl Datatype {
    pub const BYTE: Datatype = Datatype::Builtin(Builtin::Byte);
    pub const INT: Datatype = Datatype::Builtin(Builtin::Int);
    pub const DOUBLE: Datatype = Datatype::Builtin(Builtin::Double);

    /// Bytes of actual data in one element (holes excluded).
    pub fn size(&self) -> usize {
        match self {
            Datatype::Builtin(b) => b.size_in_bytes(),
            Datatype::Pair(p) => p.size_in_bytes(),
            Datatype::Derived(d) => d.size,
        }
    }

    /// Lower bound in bytes relative to the buffer address.
    pub fn lb(&self) -> Aint {
        match self {
            Datatype::Builtin(_) | Datatype::Pair(_) => 0,
            Datatype::Derived(d) => d.lb,
        }
    }

    /// Stride in bytes between consecutive elements of this type.
    pub fn extent(&self) -> Aint {
        match self {
            Datatype::Builtin(b) => b.size_in_bytes() as Aint,
            Datatype::Pair(p) => p.extent() as Aint,
            Datatype::Derived(d) => d.extent,
        }
    }

    /// True when `count` elements occupy exactly `count * size()` bytes
    /// without holes, starting at `lb()`.
    pub fn is_contiguous(&self) -> bool {
        match self {
            Datatype::Builtin(_) => true,
            Datatype::Pair(p) => p.size_in_bytes() == p.extent(),
            Datatype::Derived(d) => d.contiguous,
        }
    }

    /// Number of live handles to a derived type; `None` for named types,
    /// which are not reference counted.
    pub fn ref_count(&self) -> Option<usize> {
        match self {
            Datatype::Derived(d) => Some(Arc::strong_count(d)),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    /// Same layout as `old`, distinct handle.
    pub fn dup(old: &Datatype) -> Datatype {
        Self::derive(
            Contents::new(Combiner::Dup, vec![], vec![], vec![old.clone()]),
            Layout {
                size: old.size(),
                lb: old.lb(),
                extent: old.extent(),
                contiguous: old.is_contiguous(),
            },
        )
    }

    /// `count` consecutive copies of `old`.
    pub fn contiguous(count: i32, old: &Datatype) -> Datatype {
        let n = non_negative(count, "count");
        let blocks = [Block {
            disp: 0,
            len: n,
            ty: old,
        }];
        Self::derive(
            Contents::new(Combiner::Contiguous, vec![count], vec![], vec![old.clone()]),
            Layout::of_blocks(&blocks),
        )
    }

    /// `count` blocks of `blocklength` elements, `stride` elements apart.
    pub fn vector(count: i32, blocklength: i32, stride: i32, old: &Datatype) -> Datatype {
        let ext = old.extent();
        let bl = non_negative(blocklength, "blocklength");
        let blocks: Vec<Block<'_>> = (0..non_negative(count, "count"))
            .map(|i| Block {
                disp: i as Aint * stride as Aint * ext,
                len: bl,
                ty: old,
            })
            .collect();
        Self::derive(
            Contents::new(
                Combiner::Vector,
                vec![count, blocklength, stride],
                vec![],
                vec![old.clone()],
            ),
            Layout::of_blocks(&blocks),
        )
    }

    /// Like [`Datatype::vector`] with the stride given in bytes.
    pub fn hvector(count: i32, blocklength: i32, stride: Aint, old: &Datatype) -> Datatype {
        let bl = non_negative(blocklength, "blocklength");
        let blocks: Vec<Block<'_>> = (0..non_negative(count, "count"))
            .map(|i| Block {
                disp: i as Aint * stride,
                len: bl,
                ty: old,
            })
            .collect();
        Self::derive(
            Contents::new(
                Combiner::Hvector,
                vec![count, blocklength],
                vec![stride],
                vec![old.clone()],
            ),
            Layout::of_blocks(&blocks),
        )
    }

    /// Blocks of varying length at element displacements.
    pub fn indexed(blocklengths: &[i32], displacements: &[i32], old: &Datatype) -> Datatype {
        assert_eq!(blocklengths.len(), displacements.len());
        let ext = old.extent();
        let blocks: Vec<Block<'_>> = blocklengths
            .iter()
            .zip(displacements)
            .map(|(&bl, &d)| Block {
                disp: d as Aint * ext,
                len: non_negative(bl, "blocklength"),
                ty: old,
            })
            .collect();
        let mut ints = Vec::with_capacity(1 + 2 * blocklengths.len());
        ints.push(blocklengths.len() as i32);
        ints.extend_from_slice(blocklengths);
        ints.extend_from_slice(displacements);
        Self::derive(
            Contents::new(Combiner::Indexed, ints, vec![], vec![old.clone()]),
            Layout::of_blocks(&blocks),
        )
    }

    /// Blocks of varying length at byte displacements.
    pub fn hindexed(blocklengths: &[i32], displacements: &[Aint], old: &Datatype) -> Datatype {
        assert_eq!(blocklengths.len(), displacements.len());
        let blocks: Vec<Block<'_>> = blocklengths
            .iter()
            .zip(displacements)
            .map(|(&bl, &d)| Block {
                disp: d,
                len: non_negative(bl, "blocklength"),
                ty: old,
            })
            .collect();
        let mut ints = Vec::with_capacity(1 + blocklengths.len());
        ints.push(blocklengths.len() as i32);
        ints.extend_from_slice(blocklengths);
        Self::derive(
            Contents::new(
                Combiner::Hindexed,
                ints,
                displacements.to_vec(),
                vec![old.clone()],
            ),
            Layout::of_blocks(&blocks),
        )
    }

    /// Equal-length blocks at element displacements.
    pub fn indexed_block(blocklength: i32, displacements: &[i32], old: &Datatype) -> Datatype {
        let ext = old.extent();
        let bl = non_negative(blocklength, "blocklength");
        let blocks: Vec<Block<'_>> = displacements
            .iter()
            .map(|&d| Block {
                disp: d as Aint * ext,
                len: bl,
                ty: old,
            })
            .collect();
        let mut ints = Vec::with_capacity(2 + displacements.len());
        ints.push(displacements.len() as i32);
        ints.push(blocklength);
        ints.extend_from_slice(displacements);
        Self::derive(
            Contents::new(Combiner::IndexedBlock, ints, vec![], vec![old.clone()]),
            Layout::of_blocks(&blocks),
        )
    }

    /// Equal-length blocks at byte displacements.
    pub fn hindexed_block(blocklength: i32, displacements: &[Aint], old: &Datatype) -> Datatype {
        let bl = non_negative(blocklength, "blocklength");
        let blocks: Vec<Block<'_>> = displacements
            .iter()
            .map(|&d| Block {
                disp: d,
                len: bl,
                ty: old,
            })
            .collect();
        Self::derive(
            Contents::new(
                Combiner::HindexedBlock,
                vec![displacements.len() as i32, blocklength],
                displacements.to_vec(),
                vec![old.clone()],
            ),
            Layout::of_blocks(&blocks),
        )
    }

    /// Heterogeneous blocks, each with its own type and byte displacement.
    pub fn create_struct(
        blocklengths: &[i32],
        displacements: &[Aint],
        types: &[Datatype],
    ) -> Datatype {
        assert_eq!(blocklengths.len(), displacements.len());
        assert_eq!(blocklengths.len(), types.len());
        let blocks: Vec<Block<'_>> = blocklengths
            .iter()
            .zip(displacements)
            .zip(types)
            .map(|((&bl, &d), ty)| Block {
                disp: d,
                len: non_negative(bl, "blocklength"),
                ty,
            })
            .collect();
        let mut ints = Vec::with_capacity(1 + blocklengths.len());
        ints.push(blocklengths.len() as i32);
        ints.extend_from_slice(blocklengths);
        Self::derive(
            Contents::new(
                Combiner::Struct,
                ints,
                displacements.to_vec(),
                types.to_vec(),
            ),
            Layout::of_blocks(&blocks),
        )
    }

    /// `old` with its lower bound and extent overridden.
    pub fn resized(old: &Datatype, lb: Aint, extent: Aint) -> Datatype {
        let contiguous = old.is_contiguous() && lb == old.lb() && extent == old.extent();
        Self::derive(
            Contents::new(Combiner::Resized, vec![], vec![lb, extent], vec![old.clone()]),
            Layout {
                size: old.size(),
                lb,
                extent,
                contiguous,
            },
        )
    }

    fn derive(contents: Contents, layout: Layout) -> Datatype {
        Datatype::Derived(Arc::new(DerivedType {
            contents,
            size: layout.size,
            lb: layout.lb,
            extent: layout.extent,
            contiguous: layout.contiguous,
        }))
    }
}

fn non_negative(v: i32, what: &str) -> usize {
    assert!(v >= 0, "negative {what} {v} passed to datatype constructor");
    v as usize
}

/// `len` elements of `ty` at byte offset `disp`.
struct Block<'a> {
    disp: Aint,
    len: usize,
    ty: &'a Datatype,
}

struct Layout {
    size: usize,
    lb: Aint,
    extent: Aint,
    contiguous: bool,
}

impl Layout {
    /// Bounds and contiguity of a sequence of blocks, in declaration order.
    ///
    /// Contiguous means every block type is contiguous, each non-empty block
    /// starts where the previous one ended, and the resulting extent equals
    /// the data size.
    fn of_blocks(blocks: &[Block<'_>]) -> Self {
        let mut size = 0usize;
        let mut lb: Option<Aint> = None;
        let mut ub: Option<Aint> = None;
        let mut contiguous = true;
        let mut next_start: Option<Aint> = None;

        for b in blocks.iter().filter(|b| b.len > 0) {
            size += b.len * b.ty.size();
            let start = b.disp + b.ty.lb();
            let end = start + b.len as Aint * b.ty.extent();
            lb = Some(lb.map_or(start, |l| l.min(start)));
            ub = Some(ub.map_or(end, |u| u.max(end)));

            if !b.ty.is_contiguous() || next_start.is_some_and(|s| s != start) {
                contiguous = false;
            }
            next_start = Some(end);
        }

        let lb = lb.unwrap_or(0);
        let extent = ub.unwrap_or(0) - lb;
        Self {
            size,
            lb,
            extent,
            contiguous: contiguous && extent == size as Aint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sizes() {
        assert_eq!(Datatype::INT.size(), 4);
        assert_eq!(Datatype::DOUBLE.extent(), 8);
        assert_eq!(Datatype::from(Builtin::LongDouble).size(), 16);
        assert!(Datatype::BYTE.is_contiguous());
        assert!(Datatype::BYTE.ref_count().is_none());
    }

    #[test]
    fn test_pair_type_contiguity() {
        assert!(Datatype::from(PairType::FloatInt).is_contiguous());
        assert!(!Datatype::from(PairType::DoubleInt).is_contiguous());
        assert!(Datatype::from(PairType::ShortInt).ref_count().is_none());
    }

    #[test]
    fn test_contiguous_layout() {
        let t = Datatype::contiguous(4, &Datatype::INT);
        assert_eq!(t.size(), 16);
        assert_eq!(t.extent(), 16);
        assert_eq!(t.lb(), 0);
        assert!(t.is_contiguous());
    }

    #[test]
    fn test_vector_layout() {
        // 3 blocks of 2 ints, stride 4 ints: extent = (2*4 + 2) * 4 bytes.
        let t = Datatype::vector(3, 2, 4, &Datatype::INT);
        assert_eq!(t.size(), 24);
        assert_eq!(t.extent(), 40);
        assert!(!t.is_contiguous());

        let dense = Datatype::vector(3, 2, 2, &Datatype::INT);
        assert!(dense.is_contiguous());
    }

    #[test]
    fn test_hindexed_negative_displacement() {
        let t = Datatype::hindexed(&[1, 1], &[-8, 0], &Datatype::DOUBLE);
        assert_eq!(t.lb(), -8);
        assert_eq!(t.extent(), 16);
        assert!(t.is_contiguous());
    }

    #[test]
    fn test_struct_layout() {
        let t = Datatype::create_struct(&[1, 2], &[0, 8], &[Datatype::DOUBLE, Datatype::INT]);
        assert_eq!(t.size(), 16);
        assert_eq!(t.extent(), 16);
        assert!(t.is_contiguous());

        let gap = Datatype::create_struct(&[1, 1], &[0, 8], &[Datatype::INT, Datatype::INT]);
        assert_eq!(gap.size(), 8);
        assert_eq!(gap.extent(), 12);
        assert!(!gap.is_contiguous());
    }

    #[test]
    fn test_resized_breaks_contiguity() {
        let t = Datatype::resized(&Datatype::INT, 0, 8);
        assert_eq!(t.size(), 4);
        assert_eq!(t.extent(), 8);
        assert!(!t.is_contiguous());
    }

    #[test]
    fn test_zero_count_is_empty() {
        let t = Datatype::contiguous(0, &Datatype::INT);
        assert_eq!(t.size(), 0);
        assert_eq!(t.extent(), 0);
    }

    #[test]
    fn test_nested_handle_shares_ownership() {
        let inner = Datatype::contiguous(2, &Datatype::INT);
        assert_eq!(inner.ref_count(), Some(1));
        let outer = Datatype::vector(2, 1, 3, &inner);
        assert_eq!(inner.ref_count(), Some(2));
        drop(outer);
        assert_eq!(inner.ref_count(), Some(1));
    }

    #[test]
    fn test_equality_is_identity_for_derived() {
        let a = Datatype::contiguous(2, &Datatype::INT);
        let b = Datatype::contiguous(2, &Datatype::INT);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(Datatype::INT, Datatype::from(Builtin::Int));
    }
}
