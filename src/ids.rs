/// Hands out synthetic OSM identifiers.
///
/// Node and way ids come from two independent counters that start at -1 and
/// decrease by one per allocation, so every id of a run is issued once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    next_node: i64,
    next_way: i64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator {
            next_node: -1,
            next_way: -1,
        }
    }

    pub fn next_node_id(&mut self) -> i64 {
        let id = self.next_node;
        self.next_node -= 1;
        id
    }

    pub fn next_way_id(&mut self) -> i64 {
        let id = self.next_way;
        self.next_way -= 1;
        id
    }

    /// Reserves a block of ids and returns an allocator that issues exactly them.
    ///
    /// The parent skips past the block, so ids issued afterwards continue
    /// where the block ends.
    pub fn reserve(&mut self, nodes: usize, ways: usize) -> IdAllocator {
        let block = self.clone();
        self.next_node -= nodes as i64;
        self.next_way -= ways as i64;
        block
    }

    /// Number of node ids issued so far.
    pub fn nodes_issued(&self) -> u64 {
        (-1 - self.next_node) as u64
    }

    /// Number of way ids issued so far.
    pub fn ways_issued(&self) -> u64 {
        (-1 - self.next_way) as u64
    }
}
