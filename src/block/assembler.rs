use alloy_primitives::{Bytes, B256, U256};
use alloy_rlp::{Decodable, Header as RlpHeader};
use thiserror::Error;
use tracing::debug;

use super::{
    container::{assemble, uncles_hash},
    overrides::OverrideSet,
};
use crate::{
    error::HarnessError,
    metrics::{start_timer_vec, stop_timer, BLOCK_HARNESS_TIMES},
    seal::{SealEngine, SealError, Strictness},
    types::{
        field::{encode_fields, FieldError, FieldKind, FieldValue, HeaderField, SparseFieldSet},
        header::Header,
        transaction::Transaction,
    },
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderConstructionError {
    #[error("error importing block header: {0}")]
    Field(#[from] FieldError),

    #[error("error decoding header fields: {0}")]
    Decode(#[from] alloy_rlp::Error),
}

/// What [`recalculate`] does besides re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalcMode {
    /// Keep every field as it is.
    None,
    /// Refresh the uncle hash and mine a new seal.
    Update,
    /// Verify the encoded block against the header.
    Verify,
    UpdateAndVerify,
}

impl RecalcMode {
    pub fn updates(&self) -> bool {
        matches!(self, RecalcMode::Update | RecalcMode::UpdateAndVerify)
    }

    pub fn verifies(&self) -> bool {
        matches!(self, RecalcMode::Verify | RecalcMode::UpdateAndVerify)
    }
}

/// Outcome of [`recalculate`]. A failed verification is reported, it does not abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recalculated {
    pub bytes: Vec<u8>,
    pub verification: Result<(), SealError>,
}

/// Build a header from a sparse field set. Absent fields keep their defaults.
pub fn construct_header(
    fields: &SparseFieldSet,
    state_root: Option<B256>,
) -> Result<Header, HeaderConstructionError> {
    let template = encode_fields(fields, state_root)?;

    let mut buf = template.encoded.as_slice();
    let list = RlpHeader::decode(&mut buf)?;
    if !list.list {
        return Err(alloy_rlp::Error::UnexpectedString.into());
    }

    let mut header = Header::default();
    for (field, _) in &template.fields {
        let value = match field.kind() {
            FieldKind::Numeric(_) => FieldValue::Numeric(U256::decode(&mut buf)?),
            FieldKind::Fixed(_) => FieldValue::Fixed(Bytes::decode(&mut buf)?.to_vec()),
            FieldKind::Bytes => FieldValue::Bytes(Bytes::decode(&mut buf)?.to_vec()),
        };
        header.set_field(*field, &value)?;
    }
    if !buf.is_empty() {
        return Err(alloy_rlp::Error::UnexpectedLength.into());
    }

    Ok(header)
}

/// Re-derive the parts of `header` that depend on the block contents and encode the block.
///
/// Zero difficulty under an updating mode is fatal: no bytes are produced and `header` is left
/// as it was.
pub fn recalculate(
    header: &mut Header,
    transactions: &[Transaction],
    uncles: &[Header],
    mode: RecalcMode,
    seal_engine: &dyn SealEngine,
    preserved: &OverrideSet,
) -> Result<Recalculated, HarnessError> {
    let timer = start_timer_vec(&BLOCK_HARNESS_TIMES, &["recalculate"]);
    if mode.updates() {
        if header.difficulty.is_zero() {
            stop_timer(timer);
            return Err(HarnessError::ZeroDifficulty);
        }
        let mut updated = header.clone();
        if !uncles.is_empty() && !preserved.contains(HeaderField::UncleHash) {
            updated.uncles_hash = uncles_hash(uncles);
        }
        *header = seal_engine.mine(&updated)?;
        debug!(hash = %header.hash(), number = header.number, "Resealed header");
    }

    let bytes = assemble(header, transactions, uncles);
    let verification = match mode.verifies() {
        true => seal_engine.verify(Strictness::CheckNothingNew, header, None, Some(&bytes)),
        false => Ok(()),
    };
    stop_timer(timer);

    Ok(Recalculated {
        bytes,
        verification,
    })
}
