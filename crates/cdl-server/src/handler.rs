use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use cdl_ledger::{IntegrityReport, Ledger, LedgerStats, NewDocument};
use cdl_types::{
    Block, ConditionKind, ContractId, ContractType, Digest, Document, DocumentId, SmartContract,
    VerificationResult,
};

use crate::error::{ServerError, ServerResult};

pub type AppState = Arc<Ledger>;

#[derive(Debug, Deserialize)]
pub struct RegisterDocumentRequest {
    pub document_type: String,
    pub subject_id: String,
    pub payload: serde_json::Value,
    pub issuer_id: String,
    #[serde(default)]
    pub issuer_role: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateContractRequest {
    #[serde(rename = "type")]
    pub contract_type: ContractType,
    pub conditions: Vec<ConditionKind>,
    pub creator: String,
}

/// A block without its document bodies.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockSummary {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: Digest,
    pub hash: Digest,
    pub nonce: u64,
    pub merkle_root: Digest,
    pub document_ids: Vec<DocumentId>,
}

impl From<&Block> for BlockSummary {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index,
            timestamp: block.timestamp,
            previous_hash: block.previous_hash,
            hash: block.hash,
            nonce: block.nonce,
            merkle_root: block.merkle_root,
            document_ids: block.documents.iter().map(|d| d.id).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SealResponse {
    pub sealed: bool,
    pub block: Option<BlockSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContractDecision {
    pub contract_id: ContractId,
    pub result: bool,
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "cdl-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn register_document(
    State(ledger): State<AppState>,
    Json(body): Json<RegisterDocumentRequest>,
) -> ServerResult<(StatusCode, Json<Document>)> {
    let mut request =
        NewDocument::new(body.document_type, body.subject_id, body.payload, body.issuer_id);
    if let Some(role) = body.issuer_role {
        request = request.with_issuer_role(role);
    }
    if let Some(expires_at) = body.expires_at {
        request = request.expiring_at(expires_at);
    }
    let document = ledger.register_document(request)?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn get_document(
    State(ledger): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Document>> {
    let id = parse_id::<DocumentId>(&id)?;
    Ok(Json(ledger.require_document(&id)?))
}

pub async fn revoke_document(
    State(ledger): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RevokeRequest>>,
) -> ServerResult<Json<Document>> {
    let id = parse_id::<DocumentId>(&id)?;
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    Ok(Json(ledger.revoke_document(&id, &reason)?))
}

pub async fn verify_document(
    State(ledger): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<VerificationResult>> {
    let id = parse_id::<DocumentId>(&id)?;
    Ok(Json(ledger.verify_document(&id)))
}

pub async fn subject_documents(
    State(ledger): State<AppState>,
    Path(subject): Path<String>,
) -> ServerResult<Json<Vec<Document>>> {
    Ok(Json(ledger.documents_for_subject(&subject)?))
}

pub async fn seal_block(State(ledger): State<AppState>) -> ServerResult<Json<SealResponse>> {
    let block = ledger.seal_in_background().await?;
    Ok(Json(SealResponse {
        sealed: block.is_some(),
        block: block.as_deref().map(BlockSummary::from),
    }))
}

pub async fn list_chain(State(ledger): State<AppState>) -> ServerResult<Json<Vec<BlockSummary>>> {
    let blocks = ledger.blocks()?;
    Ok(Json(blocks.iter().map(|b| BlockSummary::from(b.as_ref())).collect()))
}

pub async fn verify_chain(State(ledger): State<AppState>) -> ServerResult<Json<IntegrityReport>> {
    Ok(Json(ledger.verify_chain_integrity()?))
}

pub async fn create_contract(
    State(ledger): State<AppState>,
    Json(body): Json<CreateContractRequest>,
) -> ServerResult<(StatusCode, Json<SmartContract>)> {
    let contract = ledger.create_contract(body.contract_type, body.conditions, &body.creator)?;
    Ok((StatusCode::CREATED, Json(contract)))
}

pub async fn get_contract(
    State(ledger): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<SmartContract>> {
    let id = parse_id::<ContractId>(&id)?;
    ledger
        .get_contract(&id)?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("contract {id}")))
}

pub async fn evaluate_contract(
    State(ledger): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<ContractDecision>> {
    let id = parse_id::<ContractId>(&id)?;
    let result = ledger.evaluate_contract(&id)?;
    Ok(Json(ContractDecision {
        contract_id: id,
        result,
    }))
}

pub async fn execute_contract(
    State(ledger): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<ContractDecision>> {
    let id = parse_id::<ContractId>(&id)?;
    let result = ledger.try_execute_contract(&id)?;
    Ok(Json(ContractDecision {
        contract_id: id,
        result,
    }))
}

pub async fn stats(State(ledger): State<AppState>) -> ServerResult<Json<LedgerStats>> {
    Ok(Json(ledger.stats()?))
}

fn parse_id<T>(raw: &str) -> ServerResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| ServerError::BadRequest(e.to_string()))
}
