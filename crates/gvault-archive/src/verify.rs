use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{info, warn};

use gvault_manifest::ManifestEntry;
use gvault_store::{CancelToken, StoreError, StoreResult};
use gvault_types::{KindFamily, ObjectIdentity};

use crate::archive::{Archive, Inner};
use crate::error::ArchiveResult;

/// Which stored objects [`Archive::verify`] re-checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyScope {
    All,
    /// A uniformly random sample of at most this many objects.
    Sample(usize),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum Problem {
    /// Checksum, decoding or digest check failed.
    CorruptPayload { reason: String },
    /// The object's record lies outside its segment.
    ManifestInconsistent { reason: String },
    /// The object holds a reference on something no longer stored.
    DanglingReference { missing: ObjectIdentity },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerifyIssue {
    pub identity: ObjectIdentity,
    #[serde(flatten)]
    pub problem: Problem,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Objects in the archive when verification started.
    pub total: usize,
    pub checked: usize,
    pub issues: Vec<VerifyIssue>,
    /// Stopped early by the cancel token.
    pub cancelled: bool,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Archive {
    /// Re-read stored objects, recompute their digests and check that every
    /// object they refer to is still stored.
    ///
    /// Problems with individual objects are collected in the report; only
    /// I/O failures abort. The token is checked between objects.
    pub fn verify(&self, scope: VerifyScope, cancel: &CancelToken) -> ArchiveResult<VerifyReport> {
        self.with_open(|inner| inner.verify(scope, cancel))
    }
}

impl Inner {
    fn verify(&self, scope: VerifyScope, cancel: &CancelToken) -> ArchiveResult<VerifyReport> {
        let mut entries = self.manifest.entries();
        let mut report = VerifyReport {
            total: entries.len(),
            ..VerifyReport::default()
        };
        if let VerifyScope::Sample(n) = scope {
            if n < entries.len() {
                let mut rng = rand::thread_rng();
                let mut sample: Vec<ManifestEntry> =
                    entries.choose_multiple(&mut rng, n).cloned().collect();
                sample.sort_by_key(|e| e.identity);
                entries = sample;
            }
        }

        for entry in &entries {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let problem = match self.verify_payload(entry) {
                Ok(()) => None,
                Err(StoreError::CorruptPayload { reason, .. }) => {
                    Some(Problem::CorruptPayload { reason })
                }
                Err(StoreError::ManifestInconsistent(reason)) => {
                    Some(Problem::ManifestInconsistent { reason })
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(problem) = problem {
                warn!(identity = %entry.identity, ?problem, "verification failed");
                report.issues.push(VerifyIssue {
                    identity: entry.identity,
                    problem,
                });
            }
            for missing in entry
                .references
                .iter()
                .filter(|r| !self.manifest.contains(r))
            {
                warn!(identity = %entry.identity, %missing, "dangling reference");
                report.issues.push(VerifyIssue {
                    identity: entry.identity,
                    problem: Problem::DanglingReference { missing: *missing },
                });
            }
            report.checked += 1;
        }

        info!(
            checked = report.checked,
            total = report.total,
            issues = report.issues.len(),
            cancelled = report.cancelled,
            "verification finished"
        );
        Ok(report)
    }

    fn verify_payload(&self, entry: &ManifestEntry) -> StoreResult<()> {
        match entry.family() {
            KindFamily::Topology => self.topology.verify(entry),
            family => self.geometry[family.index()].verify(entry),
        }
    }
}
