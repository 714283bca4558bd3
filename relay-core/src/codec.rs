//! Deterministic binary encoding of the three persisted record types and the
//! key layout shared with the host node's indexer namespace (spec §4.A).
//!
//! Integers are little-endian except where the on-disk key space calls for
//! big-endian so that lexicographic key order matches numeric order (the
//! `index` half of an outpoint key). Hashes keep their canonical internal
//! byte order; the reversed "display-endian" hex convention used on the wire
//! is a presentation concern and lives at the HTTP boundary, not here.

use bitcoin::hashes::Hash;
use bitcoin::{ScriptBuf, Txid};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

/// scriptPubKeys longer than this are rejected by the request manager.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// A client-chosen 32-byte subscription identifier.
///
/// Stored and compared in this byte order; displayed reversed (like a
/// Bitcoin hash) at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub [u8; 32]);

impl RequestId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter().rev() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl RequestId {
    /// Parses the same display-endian hex this type's `Display` emits (spec
    /// §6: ids are display-endian on the wire, canonical order in storage).
    pub fn from_display_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::Codec(format!("malformed request id hex: {e}")))?;
        bytes.reverse();
        Ok(RequestId(bytes))
    }
}

/// A transaction output reference: `(txid, vout)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outpoint {
    pub txid: Txid,
    pub index: u32,
}

impl Outpoint {
    pub fn zero() -> Self {
        Outpoint {
            txid: Txid::all_zeros(),
            index: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// The 36-byte `txid || index(BE)` form used both as the `o` column
    /// family key and as the Bloom filter membership item.
    pub fn key_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(Txid::as_ref(&self.txid));
        out[32..].copy_from_slice(&self.index.to_be_bytes());
        out
    }

    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 36 {
            return Err(Error::Codec(format!(
                "outpoint key wrong length: {}",
                bytes.len()
            )));
        }
        let mut txid_bytes = [0u8; 32];
        txid_bytes.copy_from_slice(&bytes[..32]);
        let index = u32::from_be_bytes(bytes[32..].try_into().unwrap());
        Ok(Outpoint {
            txid: Txid::from_byte_array(txid_bytes),
            index,
        })
    }
}

/// SHA-256 of a raw scriptPubKey; the `s` column family key.
pub fn script_hash(script: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(script);
    digest.into()
}

fn write_varint(buf: &mut Vec<u8>, n: u64) {
    // Bitcoin CompactSize encoding.
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let tag = *bytes
        .get(*pos)
        .ok_or_else(|| Error::Codec("varint: truncated".into()))?;
    *pos += 1;
    match tag {
        0xfd => {
            let v = read_u16(bytes, pos)?;
            Ok(v as u64)
        }
        0xfe => {
            let v = read_u32(bytes, pos)?;
            Ok(v as u64)
        }
        0xff => read_u64(bytes, pos),
        n => Ok(n as u64),
    }
}

fn read_bytes<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .ok_or_else(|| Error::Codec("length overflow".into()))?;
    let slice = bytes
        .get(*pos..end)
        .ok_or_else(|| Error::Codec("truncated record".into()))?;
    *pos = end;
    Ok(slice)
}

fn read_array32(bytes: &[u8], pos: &mut usize) -> Result<[u8; 32]> {
    let slice = read_bytes(bytes, pos, 32)?;
    Ok(slice.try_into().unwrap())
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let slice = read_bytes(bytes, pos, 4)?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u16(bytes: &[u8], pos: &mut usize) -> Result<u16> {
    let slice = read_bytes(bytes, pos, 2)?;
    Ok(u16::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let slice = read_bytes(bytes, pos, 8)?;
    Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}

fn encode_request_ids(buf: &mut Vec<u8>, ids: &[RequestId]) {
    buf.extend_from_slice(&(ids.len() as u32).to_le_bytes());
    for id in ids {
        buf.extend_from_slice(&id.0);
    }
}

fn decode_request_ids(bytes: &[u8], pos: &mut usize) -> Result<Vec<RequestId>> {
    let count = read_u32(bytes, pos)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(RequestId(read_array32(bytes, pos)?));
    }
    Ok(out)
}

/// Reverse index from a scriptPubKey to the Requests referencing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRecord {
    pub hash: [u8; 32],
    pub script: ScriptBuf,
    pub requests: Vec<RequestId>,
}

impl ScriptRecord {
    pub fn new(script: ScriptBuf, requests: Vec<RequestId>) -> Self {
        let hash = script_hash(script.as_bytes());
        ScriptRecord {
            hash,
            script,
            requests,
        }
    }

    /// `u32 count || count * (32-byte request-id) || varint len || len * u8 script`
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.requests.len() * 32 + 5 + self.script.len());
        encode_request_ids(&mut buf, &self.requests);
        write_varint(&mut buf, self.script.len() as u64);
        buf.extend_from_slice(self.script.as_bytes());
        buf
    }

    /// Decoding is parameterised by the key's hash, not re-derived from the
    /// payload (spec §4.A).
    pub fn decode(bytes: &[u8], hash: [u8; 32]) -> Result<Self> {
        let mut pos = 0;
        let requests = decode_request_ids(bytes, &mut pos)?;
        let len = read_varint(bytes, &mut pos)? as usize;
        let script_bytes = read_bytes(bytes, &mut pos, len)?;
        Ok(ScriptRecord {
            hash,
            script: ScriptBuf::from_bytes(script_bytes.to_vec()),
            requests,
        })
    }
}

/// Reverse index from an outpoint to the Requests referencing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutpointRecord {
    pub prevout: Outpoint,
    pub nextout: Outpoint,
    pub requests: Vec<RequestId>,
}

impl OutpointRecord {
    pub fn new(prevout: Outpoint, requests: Vec<RequestId>) -> Self {
        OutpointRecord {
            prevout,
            nextout: Outpoint::zero(),
            requests,
        }
    }

    /// `32-byte nextout.txid || u32 nextout.index || u32 count || count * (32-byte request-id)`
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 4 + 4 + self.requests.len() * 32);
        buf.extend_from_slice(Txid::as_ref(&self.nextout.txid));
        buf.extend_from_slice(&self.nextout.index.to_le_bytes());
        encode_request_ids(&mut buf, &self.requests);
        buf
    }

    /// The prevout is carried in the key, not the value.
    pub fn decode(bytes: &[u8], prevout: Outpoint) -> Result<Self> {
        let mut pos = 0;
        let nextout_txid = read_array32(bytes, &mut pos)?;
        let nextout_index = read_u32(bytes, &mut pos)?;
        let requests = decode_request_ids(bytes, &mut pos)?;
        Ok(OutpointRecord {
            prevout,
            nextout: Outpoint {
                txid: Txid::from_byte_array(nextout_txid),
                index: nextout_index,
            },
            requests,
        })
    }
}

/// The client-visible subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: RequestId,
    pub address: [u8; 20],
    pub value: u64,
    pub spends: Option<Outpoint>,
    pub pays: Option<ScriptBuf>,
    pub timestamp: u32,
}

impl Request {
    /// Spec invariant: at least one of `spends`, `pays` is present.
    pub fn validate(&self) -> Result<()> {
        if self.spends.is_none() && self.pays.is_none() {
            return Err(Error::Validation(
                "request must set at least one of spends/pays".into(),
            ));
        }
        if let Some(script) = &self.pays {
            if script.len() > MAX_SCRIPT_SIZE {
                return Err(Error::Validation(format!(
                    "script exceeds MAX_SCRIPT_SIZE ({} > {})",
                    script.len(),
                    MAX_SCRIPT_SIZE
                )));
            }
        }
        Ok(())
    }

    /// `20-byte address || u64 value || 32-byte spends.txid || u32 spends.index
    ///  || u32 timestamp || varint len || len * u8 pays`
    pub fn encode(&self) -> Vec<u8> {
        let spends = self.spends.unwrap_or_else(Outpoint::zero);
        let pays = self.pays.as_ref().map(|s| s.as_bytes()).unwrap_or(&[]);

        let mut buf = Vec::with_capacity(20 + 8 + 32 + 4 + 4 + 5 + pays.len());
        buf.extend_from_slice(&self.address);
        buf.extend_from_slice(&self.value.to_le_bytes());
        buf.extend_from_slice(Txid::as_ref(&spends.txid));
        buf.extend_from_slice(&spends.index.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        write_varint(&mut buf, pays.len() as u64);
        buf.extend_from_slice(pays);
        buf
    }

    /// The id is carried in the key, not the value.
    pub fn decode(bytes: &[u8], id: RequestId) -> Result<Self> {
        let mut pos = 0;
        let address: [u8; 20] = read_bytes(bytes, &mut pos, 20)?.try_into().unwrap();
        let value = read_u64(bytes, &mut pos)?;
        let spends_txid = read_array32(bytes, &mut pos)?;
        let spends_index = read_u32(bytes, &mut pos)?;
        let timestamp = read_u32(bytes, &mut pos)?;
        let len = read_varint(bytes, &mut pos)? as usize;
        let pays_bytes = read_bytes(bytes, &mut pos, len)?;

        let spends = {
            let outpoint = Outpoint {
                txid: Txid::from_byte_array(spends_txid),
                index: spends_index,
            };
            if outpoint.is_zero() {
                None
            } else {
                Some(outpoint)
            }
        };
        let pays = if pays_bytes.is_empty() {
            None
        } else {
            Some(ScriptBuf::from_bytes(pays_bytes.to_vec()))
        };

        Ok(Request {
            id,
            address,
            value,
            spends,
            pays,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_txid(byte: u8) -> Txid {
        Txid::from_byte_array([byte; 32])
    }

    #[test]
    fn script_record_round_trips() {
        let script = ScriptBuf::from_hex(
            "76a914c22a601f8a1f4cc20bdc595447b6aeaf4b6cd31288ac",
        )
        .unwrap();
        let rec = ScriptRecord::new(
            script,
            vec![RequestId([1; 32]), RequestId([2; 32])],
        );
        let encoded = rec.encode();
        let decoded = ScriptRecord::decode(&encoded, rec.hash).unwrap();
        assert_eq!(rec, decoded);
        assert_eq!(decoded.hash, script_hash(decoded.script.as_bytes()));
    }

    #[test]
    fn outpoint_record_round_trips() {
        let prevout = Outpoint {
            txid: dummy_txid(0xaa),
            index: 7,
        };
        let mut rec = OutpointRecord::new(prevout, vec![RequestId([3; 32])]);
        rec.nextout = Outpoint {
            txid: dummy_txid(0xbb),
            index: 1,
        };
        let encoded = rec.encode();
        let decoded = OutpointRecord::decode(&encoded, prevout).unwrap();
        assert_eq!(rec, decoded);
    }

    #[test]
    fn request_round_trips_with_both_fields() {
        let req = Request {
            id: RequestId([9; 32]),
            address: [7; 20],
            value: 123_456,
            spends: Some(Outpoint {
                txid: dummy_txid(0xcc),
                index: 3,
            }),
            pays: Some(ScriptBuf::from_bytes(vec![0x76, 0xa9, 0x14])),
            timestamp: 1_700_000_000,
        };
        req.validate().unwrap();
        let encoded = req.encode();
        let decoded = Request::decode(&encoded, req.id).unwrap();
        assert_eq!(req, decoded);
    }

    #[test]
    fn request_round_trips_with_only_spends() {
        let req = Request {
            id: RequestId([1; 32]),
            address: [0; 20],
            value: 0,
            spends: Some(Outpoint {
                txid: dummy_txid(0x01),
                index: 0,
            }),
            pays: None,
            timestamp: 42,
        };
        let encoded = req.encode();
        let decoded = Request::decode(&encoded, req.id).unwrap();
        assert_eq!(req, decoded);
        assert!(decoded.pays.is_none());
    }

    #[test]
    fn request_rejects_empty_reference() {
        let req = Request {
            id: RequestId([1; 32]),
            address: [0; 20],
            value: 0,
            spends: None,
            pays: None,
            timestamp: 0,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_rejects_oversized_script() {
        let req = Request {
            id: RequestId([1; 32]),
            address: [0; 20],
            value: 0,
            spends: None,
            pays: Some(ScriptBuf::from_bytes(vec![0u8; MAX_SCRIPT_SIZE + 1])),
            timestamp: 0,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_id_displays_reversed_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        bytes[31] = 0xff;
        let id = RequestId(bytes);
        let text = id.to_string();
        assert!(text.starts_with("ff"));
        assert!(text.ends_with("01"));
    }

    #[test]
    fn request_id_display_hex_round_trips() {
        let id = RequestId([0x42; 32]);
        let parsed = RequestId::from_display_hex(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn varint_round_trips_across_size_classes() {
        for n in [0u64, 1, 252, 253, 0xffff, 0x1_0000, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, n);
            let mut pos = 0;
            assert_eq!(read_varint(&buf, &mut pos).unwrap(), n);
            assert_eq!(pos, buf.len());
        }
    }
}
