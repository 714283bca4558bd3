//! Typed accessor for the `requests` column family (spec §4.C).

use crate::codec::{Request, RequestId};
use crate::error::Result;
use crate::store::{Store, WriteGuard, CF_REQUESTS};

const MAX_ID: [u8; 32] = [0xff; 32];

pub struct RequestIndex;

impl RequestIndex {
    pub fn get(store: &Store, id: RequestId) -> Result<Option<Request>> {
        match store.get(CF_REQUESTS, &id.0)? {
            Some(bytes) => Ok(Some(Request::decode(&bytes, id)?)),
            None => Ok(None),
        }
    }

    pub fn has(store: &Store, id: RequestId) -> Result<bool> {
        store.has(CF_REQUESTS, &id.0)
    }

    pub fn delete(store: &Store, id: RequestId) -> Result<()> {
        store.delete(CF_REQUESTS, &id.0)
    }

    pub fn iter(store: &Store) -> impl Iterator<Item = Result<Request>> + '_ {
        store.iter(CF_REQUESTS).map(|res| {
            let (key, value) = res?;
            let id: [u8; 32] = key
                .as_ref()
                .try_into()
                .map_err(|_| crate::error::Error::Codec("request key wrong length".into()))?;
            Request::decode(&value, RequestId(id))
        })
    }

    /// Greatest id ≤ `id_max`, by lexicographic order on the 32-byte id.
    pub fn latest_under(store: &Store, id_max: RequestId) -> Result<Option<Request>> {
        let mut iter = store.iter_rev_from(CF_REQUESTS, &id_max.0);
        match iter.next() {
            None => Ok(None),
            Some(res) => {
                let (key, value) = res?;
                let id: [u8; 32] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| crate::error::Error::Codec("request key wrong length".into()))?;
                Ok(Some(Request::decode(&value, RequestId(id))?))
            }
        }
    }

    /// The request with the greatest id currently persisted.
    pub fn latest(store: &Store) -> Result<Option<Request>> {
        Self::latest_under(store, RequestId(MAX_ID))
    }

    /// Stage a Request write inside an existing batch. Duplicate ids are
    /// silently overwritten (spec §9 Open Question 3 — no `force` flag in
    /// this version).
    pub fn stage_put(guard: &mut WriteGuard<'_>, req: &Request) {
        guard.put(CF_REQUESTS, &req.id.0, &req.encode());
    }

    pub fn put(store: &Store, req: &Request) -> Result<()> {
        let mut guard = store.start()?;
        Self::stage_put(&mut guard, req);
        guard.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Outpoint;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;

    fn with_tmp_store<T>(op: impl FnOnce(Store) -> T) -> T {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let out = op(store);
        Store::destroy(dir.path()).unwrap();
        out
    }

    fn req(id: u8) -> Request {
        Request {
            id: RequestId([id; 32]),
            address: [0; 20],
            value: 1,
            spends: Some(Outpoint {
                txid: Txid::from_byte_array([id; 32]),
                index: 0,
            }),
            pays: None,
            timestamp: 100,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        with_tmp_store(|store| {
            let r = req(5);
            RequestIndex::put(&store, &r).unwrap();
            let fetched = RequestIndex::get(&store, r.id).unwrap().unwrap();
            assert_eq!(fetched, r);
        });
    }

    #[test]
    fn latest_under_returns_greatest_id_leq_bound() {
        with_tmp_store(|store| {
            for id in [1, 5, 10, 20] {
                RequestIndex::put(&store, &req(id)).unwrap();
            }
            let found = RequestIndex::latest_under(&store, RequestId([12; 32]))
                .unwrap()
                .unwrap();
            assert_eq!(found.id, RequestId([10; 32]));

            let found_exact = RequestIndex::latest_under(&store, RequestId([5; 32]))
                .unwrap()
                .unwrap();
            assert_eq!(found_exact.id, RequestId([5; 32]));

            assert!(RequestIndex::latest_under(&store, RequestId([0; 32]))
                .unwrap()
                .is_none());
        });
    }

    #[test]
    fn latest_reflects_greatest_id_after_put() {
        with_tmp_store(|store| {
            RequestIndex::put(&store, &req(3)).unwrap();
            RequestIndex::put(&store, &req(9)).unwrap();
            let latest = RequestIndex::latest(&store).unwrap().unwrap();
            assert_eq!(latest.id, RequestId([9; 32]));
        });
    }

    #[test]
    fn duplicate_id_silently_overwrites() {
        with_tmp_store(|store| {
            let mut r = req(1);
            RequestIndex::put(&store, &r).unwrap();
            r.value = 999;
            RequestIndex::put(&store, &r).unwrap();

            let fetched = RequestIndex::get(&store, r.id).unwrap().unwrap();
            assert_eq!(fetched.value, 999);
        });
    }
}
