use std::collections::BTreeMap;

use serde::Serialize;

use gvault_types::{Kind, KindFamily};

use crate::archive::{Archive, Inner};
use crate::error::ArchiveResult;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub kind: Kind,
    pub objects: usize,
    /// Bytes of this kind's object records, headers included.
    pub payload_bytes: u64,
    /// Sum of reference counts.
    pub references: u64,
    /// Objects waiting for compaction.
    pub unreferenced: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FamilyStats {
    pub family: KindFamily,
    pub objects: usize,
    pub payload_bytes: u64,
    /// Bytes of object records that still have references.
    pub live_bytes: u64,
    /// Segment length, including delta records and unreferenced objects.
    pub segment_bytes: u64,
}

/// Per-kind and per-family counts and sizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    /// Kinds with at least one stored object, in tag order.
    pub kinds: Vec<KindStats>,
    /// Every family, in family order.
    pub families: Vec<FamilyStats>,
}

impl ArchiveStats {
    pub fn objects(&self) -> usize {
        self.families.iter().map(|f| f.objects).sum()
    }

    pub fn segment_bytes(&self) -> u64 {
        self.families.iter().map(|f| f.segment_bytes).sum()
    }

    /// Segment bytes not taken up by a referenced object's record.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.families
            .iter()
            .map(|f| f.segment_bytes.saturating_sub(f.live_bytes))
            .sum()
    }
}

impl Archive {
    pub fn stats(&self) -> ArchiveResult<ArchiveStats> {
        self.with_open(|inner| Ok(inner.stats()))
    }
}

impl Inner {
    fn stats(&self) -> ArchiveStats {
        let mut kinds: BTreeMap<Kind, KindStats> = BTreeMap::new();
        let mut families: Vec<FamilyStats> = KindFamily::ALL
            .into_iter()
            .map(|family| FamilyStats {
                family,
                objects: 0,
                payload_bytes: 0,
                live_bytes: 0,
                segment_bytes: self.segment_len(family),
            })
            .collect();

        for entry in self.manifest.entries() {
            let kind = kinds.entry(entry.kind()).or_insert_with(|| KindStats {
                kind: entry.kind(),
                objects: 0,
                payload_bytes: 0,
                references: 0,
                unreferenced: 0,
            });
            kind.objects += 1;
            kind.payload_bytes += entry.locator.length;
            kind.references += entry.ref_count;
            if entry.ref_count == 0 {
                kind.unreferenced += 1;
            }

            let family = &mut families[entry.family().index()];
            family.objects += 1;
            family.payload_bytes += entry.locator.length;
            if entry.ref_count > 0 {
                family.live_bytes += entry.locator.length;
            }
        }

        ArchiveStats {
            kinds: kinds.into_values().collect(),
            families,
        }
    }
}
