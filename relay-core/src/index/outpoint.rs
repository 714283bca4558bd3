//! Typed accessor for the `outpoints` column family (spec §4.C).

use crate::codec::{Outpoint, OutpointRecord, RequestId};
use crate::error::Result;
use crate::store::{Store, WriteGuard, CF_OUTPOINTS};

pub struct OutpointIndex;

impl OutpointIndex {
    pub fn get(store: &Store, prevout: Outpoint) -> Result<Option<OutpointRecord>> {
        let key = prevout.key_bytes();
        match store.get(CF_OUTPOINTS, &key)? {
            Some(bytes) => Ok(Some(OutpointRecord::decode(&bytes, prevout)?)),
            None => Ok(None),
        }
    }

    pub fn has(store: &Store, prevout: Outpoint) -> Result<bool> {
        store.has(CF_OUTPOINTS, &prevout.key_bytes())
    }

    pub fn delete(store: &Store, prevout: Outpoint) -> Result<()> {
        store.delete(CF_OUTPOINTS, &prevout.key_bytes())
    }

    pub fn iter(store: &Store) -> impl Iterator<Item = Result<OutpointRecord>> + '_ {
        store.iter(CF_OUTPOINTS).map(|res| {
            let (key, value) = res?;
            let prevout = Outpoint::from_key_bytes(&key)?;
            OutpointRecord::decode(&value, prevout)
        })
    }

    /// Union semantics: extend the existing record's request set (keeping
    /// any `nextout` evidence already stamped by the match engine), or
    /// create a fresh record.
    pub fn stage_put(
        store: &Store,
        guard: &mut WriteGuard<'_>,
        incoming: OutpointRecord,
    ) -> Result<OutpointRecord> {
        let merged = match Self::get(store, incoming.prevout)? {
            Some(mut existing) => {
                for id in incoming.requests {
                    if !existing.requests.contains(&id) {
                        existing.requests.push(id);
                    }
                }
                existing
            }
            None => incoming,
        };
        guard.put(CF_OUTPOINTS, &merged.prevout.key_bytes(), &merged.encode());
        Ok(merged)
    }

    /// Stamp `nextout` on an existing record once its prevout is observed
    /// being spent (spec §4.E, §9 Open Question 5 — resolved as "wire it
    /// up"). A no-op if the record doesn't exist: the match engine only
    /// calls this after a confirmed (non-false-positive) filter hit.
    pub fn stage_stamp_nextout(
        store: &Store,
        guard: &mut WriteGuard<'_>,
        prevout: Outpoint,
        nextout: Outpoint,
    ) -> Result<Option<OutpointRecord>> {
        match Self::get(store, prevout)? {
            Some(mut existing) => {
                existing.nextout = nextout;
                guard.put(CF_OUTPOINTS, &existing.prevout.key_bytes(), &existing.encode());
                Ok(Some(existing))
            }
            None => Ok(None),
        }
    }

    /// Undo a `nextout` stamp made by a now-disconnected block (spec §9
    /// Open Question 2).
    pub fn stage_clear_nextout(
        store: &Store,
        guard: &mut WriteGuard<'_>,
        prevout: Outpoint,
    ) -> Result<Option<OutpointRecord>> {
        Self::stage_stamp_nextout(store, guard, prevout, Outpoint::zero())
    }

    pub fn put(store: &Store, rec: OutpointRecord) -> Result<OutpointRecord> {
        let mut guard = store.start()?;
        let merged = Self::stage_put(store, &mut guard, rec)?;
        guard.commit()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;

    fn with_tmp_store<T>(op: impl FnOnce(Store) -> T) -> T {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let out = op(store);
        Store::destroy(dir.path()).unwrap();
        out
    }

    fn outpoint(byte: u8, index: u32) -> Outpoint {
        Outpoint {
            txid: Txid::from_byte_array([byte; 32]),
            index,
        }
    }

    #[test]
    fn union_semantics_regardless_of_insertion_order() {
        with_tmp_store(|store| {
            let op = outpoint(0xaa, 0);
            OutpointIndex::put(
                &store,
                OutpointRecord::new(op, vec![RequestId([2; 32])]),
            )
            .unwrap();
            OutpointIndex::put(
                &store,
                OutpointRecord::new(op, vec![RequestId([1; 32])]),
            )
            .unwrap();

            let merged = OutpointIndex::get(&store, op).unwrap().unwrap();
            assert_eq!(
                merged.requests,
                vec![RequestId([2; 32]), RequestId([1; 32])]
            );
        });
    }

    #[test]
    fn stamping_nextout_preserves_request_set() {
        with_tmp_store(|store| {
            let prevout = outpoint(0x01, 0);
            OutpointIndex::put(
                &store,
                OutpointRecord::new(prevout, vec![RequestId([1; 32])]),
            )
            .unwrap();

            let next = outpoint(0x02, 3);
            let mut guard = store.start().unwrap();
            OutpointIndex::stage_stamp_nextout(&store, &mut guard, prevout, next).unwrap();
            guard.commit().unwrap();

            let rec = OutpointIndex::get(&store, prevout).unwrap().unwrap();
            assert_eq!(rec.nextout, next);
            assert_eq!(rec.requests, vec![RequestId([1; 32])]);
        });
    }

    #[test]
    fn stamping_nextout_on_missing_record_is_a_no_op() {
        with_tmp_store(|store| {
            let prevout = outpoint(0x01, 0);
            let mut guard = store.start().unwrap();
            let result =
                OutpointIndex::stage_stamp_nextout(&store, &mut guard, prevout, outpoint(0x02, 0))
                    .unwrap();
            guard.commit().unwrap();
            assert!(result.is_none());
            assert!(OutpointIndex::get(&store, prevout).unwrap().is_none());
        });
    }
}
