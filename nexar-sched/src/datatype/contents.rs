use super::{Aint, Datatype};
use crate::error::{Result, SchedError};
use std::fmt;

/// Constructor that produced a datatype.
///
/// Discriminants match the MPICH `MPI_COMBINER_*` values so they can cross
/// an ABI boundary unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Combiner {
    Named = 1,
    Dup = 2,
    Contiguous = 3,
    Vector = 4,
    Hvector = 6,
    Indexed = 7,
    Hindexed = 9,
    IndexedBlock = 10,
    Struct = 12,
    Resized = 18,
    HindexedBlock = 19,
}

impl Combiner {
    pub const fn name(self) -> &'static str {
        match self {
            Combiner::Named => "named",
            Combiner::Dup => "dup",
            Combiner::Contiguous => "contiguous",
            Combiner::Vector => "vector",
            Combiner::Hvector => "hvector",
            Combiner::Indexed => "indexed",
            Combiner::Hindexed => "hindexed",
            Combiner::IndexedBlock => "indexed_block",
            Combiner::Struct => "struct",
            Combiner::Resized => "resized",
            Combiner::HindexedBlock => "hindexed_block",
        }
    }
}

impl fmt::Display for Combiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Constructor arguments of a derived datatype, fixed at construction.
pub struct Contents {
    combiner: Combiner,
    ints: Vec<i32>,
    addrs: Vec<Aint>,
    types: Vec<Datatype>,
}

impl Contents {
    pub(super) fn new(
        combiner: Combiner,
        ints: Vec<i32>,
        addrs: Vec<Aint>,
        types: Vec<Datatype>,
    ) -> Self {
        Self {
            combiner,
            ints,
            addrs,
            types,
        }
    }

    pub fn combiner(&self) -> Combiner {
        self.combiner
    }

    pub fn ints(&self) -> &[i32] {
        &self.ints
    }

    pub fn addrs(&self) -> &[Aint] {
        &self.addrs
    }

    pub fn types(&self) -> &[Datatype] {
        &self.types
    }
}

/// Argument counts and combiner of a datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub num_integers: usize,
    pub num_addresses: usize,
    pub num_datatypes: usize,
    pub combiner: Combiner,
}

/// Report how a datatype was built and how large its argument arrays are.
///
/// Built-ins and the legacy pair types report `Combiner::Named` with empty
/// arrays.
pub fn get_envelope(datatype: &Datatype) -> Envelope {
    match datatype {
        Datatype::Builtin(_) | Datatype::Pair(_) => Envelope {
            num_integers: 0,
            num_addresses: 0,
            num_datatypes: 0,
            combiner: Combiner::Named,
        },
        Datatype::Derived(d) => {
            let c = d.contents();
            Envelope {
                num_integers: c.ints.len(),
                num_addresses: c.addrs.len(),
                num_datatypes: c.types.len(),
                combiner: c.combiner,
            }
        }
    }
}

/// Copy the constructor arguments of a derived datatype into the caller's
/// arrays. The capacity of each category is the length of its slice.
///
/// Every nested handle written to `types` is a new shared reference; the
/// caller releases it by dropping it. If any slice is too short, nothing is
/// written and `SchedError::InsufficientBuffer` is returned.
///
/// # Panics
/// If `datatype` is a built-in or one of the legacy pair types. Callers
/// check [`get_envelope`] first.
pub fn get_contents(
    datatype: &Datatype,
    ints: &mut [i32],
    addrs: &mut [Aint],
    types: &mut [Option<Datatype>],
) -> Result<()> {
    let derived = match datatype {
        Datatype::Derived(d) => d,
        other => panic!("get_contents called on named datatype {other}"),
    };
    let c = derived.contents();

    if ints.len() < c.ints.len() || addrs.len() < c.addrs.len() || types.len() < c.types.len() {
        return Err(SchedError::InsufficientBuffer {
            ints: c.ints.len(),
            addrs: c.addrs.len(),
            types: c.types.len(),
            max_ints: ints.len(),
            max_addrs: addrs.len(),
            max_types: types.len(),
        });
    }

    ints[..c.ints.len()].copy_from_slice(&c.ints);
    addrs[..c.addrs.len()].copy_from_slice(&c.addrs);
    for (slot, ty) in types.iter_mut().zip(&c.types) {
        *slot = Some(ty.clone());
    }

    Ok(())
}
