//! Typed accessor for the `scripts` column family (spec §4.C).

use crate::codec::{RequestId, ScriptRecord};
use crate::error::Result;
use crate::store::{Store, WriteGuard, CF_SCRIPTS};

pub struct ScriptIndex;

impl ScriptIndex {
    pub fn get(store: &Store, hash: &[u8; 32]) -> Result<Option<ScriptRecord>> {
        match store.get(CF_SCRIPTS, hash)? {
            Some(bytes) => Ok(Some(ScriptRecord::decode(&bytes, *hash)?)),
            None => Ok(None),
        }
    }

    pub fn has(store: &Store, hash: &[u8; 32]) -> Result<bool> {
        store.has(CF_SCRIPTS, hash)
    }

    pub fn delete(store: &Store, hash: &[u8; 32]) -> Result<()> {
        store.delete(CF_SCRIPTS, hash)
    }

    pub fn iter(store: &Store) -> impl Iterator<Item = Result<ScriptRecord>> + '_ {
        store.iter(CF_SCRIPTS).map(|res| {
            let (key, value) = res?;
            let hash: [u8; 32] = key
                .as_ref()
                .try_into()
                .map_err(|_| crate::error::Error::Codec("script key wrong length".into()))?;
            ScriptRecord::decode(&value, hash)
        })
    }

    /// Union semantics: extend the existing record's request set, or create
    /// a fresh record. Idempotent for a repeated (hash, id) pair. Stages the
    /// write into `guard` without committing.
    pub fn stage_put(
        store: &Store,
        guard: &mut WriteGuard<'_>,
        incoming: ScriptRecord,
    ) -> Result<ScriptRecord> {
        let merged = match Self::get(store, &incoming.hash)? {
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
        guard.put(CF_SCRIPTS, &merged.hash, &merged.encode());
        Ok(merged)
    }

    /// Convenience entry point matching spec §4.C's standalone `put_script`.
    pub fn put(store: &Store, rec: ScriptRecord) -> Result<ScriptRecord> {
        let mut guard = store.start()?;
        let merged = Self::stage_put(store, &mut guard, rec)?;
        guard.commit()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::ScriptBuf;

    fn with_tmp_store<T>(op: impl FnOnce(Store) -> T) -> T {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let out = op(store);
        Store::destroy(dir.path()).unwrap();
        out
    }

    #[test]
    fn put_then_get_round_trips() {
        with_tmp_store(|store| {
            let script = ScriptBuf::from_bytes(vec![0x51]);
            let rec = ScriptRecord::new(script, vec![RequestId([1; 32])]);
            let hash = rec.hash;
            ScriptIndex::put(&store, rec.clone()).unwrap();

            let fetched = ScriptIndex::get(&store, &hash).unwrap().unwrap();
            assert_eq!(fetched, rec);
        });
    }

    #[test]
    fn union_semantics_extend_request_set_regardless_of_order() {
        with_tmp_store(|store| {
            let script = ScriptBuf::from_bytes(vec![0x51]);
            let hash = crate::codec::script_hash(script.as_bytes());

            ScriptIndex::put(
                &store,
                ScriptRecord::new(script.clone(), vec![RequestId([1; 32])]),
            )
            .unwrap();
            ScriptIndex::put(
                &store,
                ScriptRecord::new(script.clone(), vec![RequestId([2; 32])]),
            )
            .unwrap();

            let merged = ScriptIndex::get(&store, &hash).unwrap().unwrap();
            assert_eq!(
                merged.requests,
                vec![RequestId([1; 32]), RequestId([2; 32])]
            );
        });
    }

    #[test]
    fn put_is_idempotent_for_repeated_pair() {
        with_tmp_store(|store| {
            let script = ScriptBuf::from_bytes(vec![0x51]);
            let hash = crate::codec::script_hash(script.as_bytes());
            for _ in 0..2 {
                ScriptIndex::put(
                    &store,
                    ScriptRecord::new(script.clone(), vec![RequestId([1; 32])]),
                )
                .unwrap();
            }
            let merged = ScriptIndex::get(&store, &hash).unwrap().unwrap();
            assert_eq!(merged.requests, vec![RequestId([1; 32])]);
        });
    }
}
