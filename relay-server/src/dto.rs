//! Wire shapes for the HTTP boundary (spec §6). Hex fields are display-endian
//! for hashes (`Txid`'s own `FromStr`/`Display` already reverse); `RequestId`
//! gets the same convention via `RequestId::from_display_hex`.

use std::str::FromStr;

use bitcoin::{ScriptBuf, Txid};
use relay_core::{Error, Outpoint, OutpointRecord, Request, RequestId, Result, ScriptRecord};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct OutpointDto {
    pub txid: String,
    pub index: u32,
}

impl OutpointDto {
    pub fn from_core(o: &Outpoint) -> Self {
        OutpointDto {
            txid: o.txid.to_string(),
            index: o.index,
        }
    }

    pub fn into_core(self) -> Result<Outpoint> {
        let txid = Txid::from_str(&self.txid)
            .map_err(|e| Error::Validation(format!("malformed txid: {e}")))?;
        Ok(Outpoint {
            txid,
            index: self.index,
        })
    }
}

#[derive(Serialize, Deserialize)]
pub struct RequestDto {
    pub id: String,
    pub address: String,
    pub value: u64,
    pub spends: Option<OutpointDto>,
    pub pays: Option<String>,
    /// Ignored on input: the system stamps this at persistence time so a
    /// client can't forge it (spec §4.F). Still emitted on output.
    #[serde(skip_deserializing, default)]
    pub timestamp: u32,
}

impl RequestDto {
    pub fn from_core(req: &Request) -> Self {
        RequestDto {
            id: req.id.to_string(),
            address: hex::encode(req.address),
            value: req.value,
            spends: req.spends.as_ref().map(OutpointDto::from_core),
            pays: req.pays.as_ref().map(|s| hex::encode(s.as_bytes())),
            timestamp: req.timestamp,
        }
    }

    pub fn into_core(self) -> Result<Request> {
        let id = RequestId::from_display_hex(&self.id)?;
        let mut address = [0u8; 20];
        let decoded = hex::decode(&self.address)
            .map_err(|e| Error::Validation(format!("malformed address hex: {e}")))?;
        if decoded.len() != 20 {
            return Err(Error::Validation(format!(
                "address must be 20 bytes, got {}",
                decoded.len()
            )));
        }
        address.copy_from_slice(&decoded);

        let spends = self.spends.map(|o| o.into_core()).transpose()?;
        let pays = self
            .pays
            .map(|hex_str| {
                hex::decode(&hex_str)
                    .map(ScriptBuf::from_bytes)
                    .map_err(|e| Error::Validation(format!("malformed script hex: {e}")))
            })
            .transpose()?;

        Ok(Request {
            id,
            address,
            value: self.value,
            spends,
            pays,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Serialize)]
pub struct OutpointRecordDto {
    pub prevout: OutpointDto,
    pub nextout: OutpointDto,
    pub requests: Vec<String>,
}

impl OutpointRecordDto {
    pub fn from_core(rec: &OutpointRecord) -> Self {
        OutpointRecordDto {
            prevout: OutpointDto::from_core(&rec.prevout),
            nextout: OutpointDto::from_core(&rec.nextout),
            requests: rec.requests.iter().map(|r| r.to_string()).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct ScriptRecordDto {
    pub hash: String,
    pub script: String,
    pub requests: Vec<String>,
}

impl ScriptRecordDto {
    pub fn from_core(rec: &ScriptRecord) -> Self {
        ScriptRecordDto {
            hash: hex::encode(rec.hash),
            script: hex::encode(rec.script.as_bytes()),
            requests: rec.requests.iter().map(|r| r.to_string()).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct AddOutcomeDto {
    pub request: RequestDto,
    pub outpoint: Option<OutpointRecordDto>,
    pub script: Option<ScriptRecordDto>,
    pub rescan: Option<u32>,
}

#[derive(Serialize)]
pub struct StatusDto {
    pub latest: Option<RequestDto>,
    pub height: Option<u32>,
    pub tip: Option<String>,
}

#[derive(Serialize)]
pub struct RequestsSatisfiedDto {
    pub txid: String,
    pub height: u32,
    pub satisfied: Vec<String>,
}

impl RequestsSatisfiedDto {
    pub fn from_core(ev: &relay_core::RequestsSatisfied) -> Self {
        RequestsSatisfiedDto {
            txid: ev.txid.to_string(),
            height: ev.height,
            satisfied: ev.satisfied.iter().map(|id| id.to_string()).collect(),
        }
    }
}

#[derive(Deserialize)]
pub struct PutRequestBody {
    #[serde(flatten)]
    pub request: RequestDto,
    /// Drives a rescan from this height after the request is persisted
    /// (spec §6 `PUT /relay/request`).
    pub height: Option<u32>,
}

#[derive(Deserialize)]
pub struct DeleteRequestBody {
    pub id: String,
}

#[derive(Deserialize)]
pub struct RescanBody {
    pub height: u32,
}
