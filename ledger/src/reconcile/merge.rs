use std::collections::{btree_map::Entry, BTreeMap};

use alloy::primitives::U256;

use super::{
    event::{CanonicalEvent, EventKind},
    record::{CommitInfo, LifecycleRecord, NaturalKey},
};

/// Merge `events`, in arrival order, into `existing`.
///
/// Commit convergence runs for the event's block number after every event,
/// so feeding the events in one batch or in several consecutive batches gives
/// the same records. The output is sorted by natural key.
pub fn merge<R, E>(existing: R, events: E) -> Vec<LifecycleRecord>
where
    R: IntoIterator<Item = LifecycleRecord>,
    E: IntoIterator<Item = CanonicalEvent>,
{
    let mut book = RecordBook::from_records(existing);
    for event in events {
        book.apply(event);
    }
    book.converge_all();
    book.into_records()
}

/// Fold record sets of lower level partitions into a roll-up.
///
/// Records with the same natural key collapse into one: request, commit and
/// refund are kept from the first partition that has them, responses are
/// unioned by transaction hash, `createdAt` is the earliest and `updatedAt`
/// the latest.
pub fn fold_partitions<P>(partitions: P) -> Vec<LifecycleRecord>
where
    P: IntoIterator,
    P::Item: IntoIterator<Item = LifecycleRecord>,
{
    let mut book = RecordBook::default();
    for records in partitions {
        for record in records {
            book.absorb(record);
        }
    }
    book.converge_all();
    book.into_records()
}

#[derive(Debug, Default)]
struct RecordBook {
    records: BTreeMap<NaturalKey, LifecycleRecord>,
}

impl RecordBook {
    fn from_records(records: impl IntoIterator<Item = LifecycleRecord>) -> Self {
        let mut book = Self::default();
        for record in records {
            book.absorb(record);
        }
        book
    }

    fn into_records(self) -> Vec<LifecycleRecord> {
        self.records.into_values().collect()
    }

    fn absorb(&mut self, record: LifecycleRecord) {
        match self.records.entry(record.key()) {
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
            Entry::Occupied(mut entry) => fill_from(entry.get_mut(), record),
        }
    }

    fn apply(&mut self, event: CanonicalEvent) {
        let key = event.key();
        let at = event.observed_at;
        let record = self
            .records
            .entry(key)
            .or_insert_with(|| LifecycleRecord::new(event.chain_id, key, at));

        let changed = match event.kind {
            EventKind::Request { request, .. } => replace(&mut record.request, request),
            EventKind::Response { response, .. } => {
                if record.has_response(&response.emitted.transaction_hash) {
                    false
                } else {
                    record.responses.push(response);
                    true
                }
            }
            EventKind::Commit { commit } => {
                let commit = CommitInfo {
                    emitted: commit,
                    observed_at: at,
                };
                record.set_commit(&commit)
            }
            EventKind::Refund { refund, .. } => replace(&mut record.refund, refund),
        };

        if changed {
            record.touch(at);
        }

        self.converge(key.block_number());
    }

    fn converge_all(&mut self) {
        let mut blocks = self
            .records
            .keys()
            .map(NaturalKey::block_number)
            .collect::<Vec<_>>();
        blocks.dedup();

        for block_number in blocks {
            self.converge(block_number);
        }
    }

    /// Make every header-indexed record of `block_number` share one commit.
    ///
    /// The most recently observed commit of the block, placeholder included,
    /// is copied to the records that lack it or disagree. A commit-only
    /// placeholder is removed once the block has header-indexed records.
    fn converge(&mut self, block_number: U256) {
        let headers = self
            .records
            .range(NaturalKey::header(block_number, U256::ZERO)..)
            .take_while(|(key, _)| !key.is_committed() && key.block_number() == block_number)
            .map(|(key, _)| *key)
            .collect::<Vec<_>>();

        if headers.is_empty() {
            return;
        }

        let placeholder = self
            .records
            .remove(&NaturalKey::committed(block_number))
            .and_then(|placeholder| placeholder.commit);

        // Ties go to the placeholder, then to the lowest header index.
        let commit = placeholder
            .iter()
            .chain(
                headers
                    .iter()
                    .filter_map(|key| self.records.get(key).and_then(|r| r.commit.as_ref())),
            )
            .fold(None::<&CommitInfo>, |latest, commit| match latest {
                Some(latest) if latest.observed_at >= commit.observed_at => Some(latest),
                _ => Some(commit),
            })
            .cloned();

        let Some(commit) = commit else {
            return;
        };

        for key in headers {
            if let Some(record) = self.records.get_mut(&key) {
                record.set_commit(&commit);
            }
        }
    }
}

/// Overwrite `slot` with `value`. Returns whether it changed.
fn replace<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}

fn fill_from(target: &mut LifecycleRecord, other: LifecycleRecord) {
    if target.request.is_none() {
        target.request = other.request;
    }

    for response in other.responses {
        if !target.has_response(&response.emitted.transaction_hash) {
            target.responses.push(response);
        }
    }

    if target.commit.is_none() {
        target.commit = other.commit;
    }

    if target.refund.is_none() {
        target.refund = other.refund;
    }

    target.created_at = target.created_at.min(other.created_at);
    target.updated_at = target.updated_at.max(other.updated_at);
}
