/// Position of one rank in a k-nomial tree over relative ranks `0..size`.
///
/// Relative rank 0 is the root. A rank's subtree is the contiguous range
/// `[rank, rank + subtree_len)`, which is what lets scatter forward one
/// contiguous slice of chunks to each child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnomialTree {
    pub rank: u32,
    pub size: u32,
    pub k: u32,
    pub parent: Option<u32>,
    /// `(child, subtree_len)`, largest subtree first.
    pub children: Vec<(u32, u32)>,
    pub subtree_len: u32,
}

impl KnomialTree {
    pub fn new(rank: u32, size: u32, k: u32) -> Self {
        assert!(k >= 2, "tree radix must be at least 2, got {k}");
        assert!(rank < size, "relative rank {rank} outside tree of size {size}");

        // Smallest power of k at which `rank` has a nonzero digit.
        let mut mask: u64 = 1;
        let (rank64, size64, k64) = (rank as u64, size as u64, k as u64);
        let mut parent = None;
        while mask < size64 {
            let span = mask * k64;
            if rank64 % span != 0 {
                parent = Some((rank64 - rank64 % span) as u32);
                break;
            }
            mask = span;
        }

        let subtree_len = if parent.is_some() {
            mask.min(size64 - rank64) as u32
        } else {
            size
        };

        let mut children = Vec::new();
        let mut step = mask;
        while step > 1 {
            step /= k64;
            for j in (1..k64).rev() {
                let child = rank64 + j * step;
                if child < size64 {
                    children.push((child as u32, step.min(size64 - child) as u32));
                }
            }
        }
        // Within a level the farthest child owns the smallest tail, so
        // order strictly by subtree length.
        children.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Self {
            rank,
            size,
            k,
            parent,
            children,
            subtree_len,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Rank relative to `root`.
pub fn relative(rank: u32, root: u32, size: u32) -> u32 {
    (rank + size - root) % size
}

/// Absolute rank of relative rank `rel`.
pub fn absolute(rel: u32, root: u32, size: u32) -> u32 {
    (rel + root) % size
}
