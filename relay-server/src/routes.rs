//! HTTP routes (spec §6). Each handler is a thin translation to a core op;
//! no business logic lives here.

use std::str::FromStr;

use axum::extract::{Json, Path, State};
use axum::response::IntoResponse;
use bitcoin::Txid;
use relay_core::{Error, OutpointIndex, RequestId, RequestIndex, ScriptIndex};

use crate::dto::{
    AddOutcomeDto, DeleteRequestBody, OutpointDto, OutpointRecordDto, PutRequestBody,
    RequestDto, RescanBody, ScriptRecordDto, StatusDto,
};
use crate::error::ApiError;
use crate::rescan_handle;
use crate::state::AppState;

pub async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let latest = RequestIndex::latest(&state.relay.store)?.map(|r| RequestDto::from_core(&r));
    let tip = state.chain.tip()?;
    Ok(Json(StatusDto {
        latest,
        height: tip.map(|t| t.height),
        tip: tip.map(|t| t.hash.to_string()),
    }))
}

pub async fn latest(
    State(state): State<AppState>,
    Path(max_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = RequestId::from_display_hex(&max_id)?;
    let found = RequestIndex::latest_under(&state.relay.store, id)?;
    match found {
        Some(req) => Ok(Json(RequestDto::from_core(&req))),
        None => Err(Error::NotFound.into()),
    }
}

pub async fn rescan(
    State(state): State<AppState>,
    Json(body): Json<RescanBody>,
) -> Result<impl IntoResponse, ApiError> {
    let next = rescan_handle::run(&state, body.height, None).await?;
    Ok(Json(serde_json::json!({ "next_height": next })))
}

pub async fn get_outpoint(
    State(state): State<AppState>,
    Path((hash, index)): Path<(String, u32)>,
) -> Result<impl IntoResponse, ApiError> {
    let txid = Txid::from_str(&hash).map_err(|e| Error::Validation(format!("malformed txid: {e}")))?;
    let prevout = relay_core::Outpoint { txid, index };
    match OutpointIndex::get(&state.relay.store, prevout)? {
        Some(rec) => Ok(Json(OutpointRecordDto::from_core(&rec))),
        None => Err(Error::NotFound.into()),
    }
}

pub async fn get_script(
    State(state): State<AppState>,
    Path(script_hex): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let script = hex::decode(&script_hex)
        .map_err(|e| Error::Validation(format!("malformed script hex: {e}")))?;
    let hash = relay_core::script_hash(&script);
    match ScriptIndex::get(&state.relay.store, &hash)? {
        Some(rec) => Ok(Json(ScriptRecordDto::from_core(&rec))),
        None => Err(Error::NotFound.into()),
    }
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id_hex): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = RequestId::from_display_hex(&id_hex)?;
    match RequestIndex::get(&state.relay.store, id)? {
        Some(req) => Ok(Json(RequestDto::from_core(&req))),
        None => Err(Error::NotFound.into()),
    }
}

pub async fn list_requests(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let mut out = Vec::new();
    for req in RequestIndex::iter(&state.relay.store) {
        out.push(RequestDto::from_core(&req?));
    }
    Ok(Json(out))
}

pub async fn put_request(
    State(state): State<AppState>,
    Json(body): Json<PutRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.request.into_core()?;
    let outcome = state.requests.add_request(req).await?;

    let rescan_next = match body.height {
        Some(from) => {
            // Scope the rescan to this Request's own outpoint/script so it
            // doesn't also notify on every other Request's past matches.
            let prevout_key = outcome
                .outpoint
                .as_ref()
                .map(|rec| rec.prevout.key_bytes().to_vec());
            let script_bytes = outcome
                .script
                .as_ref()
                .map(|rec| rec.script.as_bytes().to_vec());
            let predicate = move |candidate: &[u8]| {
                prevout_key.as_deref() == Some(candidate)
                    || script_bytes.as_deref() == Some(candidate)
            };
            Some(rescan_handle::run(&state, from, Some(&predicate)).await?)
        }
        None => None,
    };

    Ok(Json(AddOutcomeDto {
        request: RequestDto::from_core(&outcome.request),
        outpoint: outcome.outpoint.as_ref().map(OutpointRecordDto::from_core),
        script: outcome.script.as_ref().map(ScriptRecordDto::from_core),
        rescan: rescan_next,
    }))
}

pub async fn delete_request(
    State(state): State<AppState>,
    Json(body): Json<DeleteRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let id = RequestId::from_display_hex(&body.id)?;
    state.requests.delete_request(id).await?;
    Ok(())
}

pub async fn wipe(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.requests.wipe(state.filter_params).await?;
    Ok(())
}
