use std::fmt;

/// Counters for one pass over one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub collection: String,
    pub scanned: u64,
    pub inserted: u64,
    pub failed: u64,
    pub skipped: u64,
    pub relations_inserted: u64,
    pub relation_failed: u64,
    pub relations_skipped: u64,
    pub duration_ms: u64,
}

impl CollectionStats {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Fold a per-document delta into these totals.
    pub fn merge(&mut self, delta: &CollectionStats) {
        self.scanned += delta.scanned;
        self.inserted += delta.inserted;
        self.failed += delta.failed;
        self.skipped += delta.skipped;
        self.relations_inserted += delta.relations_inserted;
        self.relation_failed += delta.relation_failed;
        self.relations_skipped += delta.relations_skipped;
    }
}

impl fmt::Display for CollectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] scanned={} inserted={} skipped={} failed={} relations_inserted={} relations_skipped={} relation_failed={}",
            self.collection,
            self.scanned,
            self.inserted,
            self.skipped,
            self.failed,
            self.relations_inserted,
            self.relations_skipped,
            self.relation_failed,
        )
    }
}
