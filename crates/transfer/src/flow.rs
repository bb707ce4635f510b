//! Flow contract call encoding and receipt decoding for [`Submitter`]
//! implementations.
//!
//! [`Submitter`]: crate::Submitter

use alloy_primitives::{B256, Bytes};
use alloy_sol_types::SolCall;
use zgs_contracts::{IFlow, decode_submit_log};
use zgs_primitives::SubmissionDescriptor;

use crate::{error::ContractError, node::SubmitReceipt};

/// ABI encoded `submit` call for `descriptor`.
pub fn submit_calldata(descriptor: &SubmissionDescriptor) -> Bytes {
    IFlow::submitCall {
        submission: descriptor.into(),
    }
    .abi_encode()
    .into()
}

/// Extracts the receipt of a submission from the logs of its transaction.
///
/// `logs` yields `(topics, data)` pairs; the first flow `Submit` event wins.
pub fn receipt_from_logs<'a>(
    tx_hash: B256,
    root: B256,
    logs: impl IntoIterator<Item = (&'a [B256], &'a [u8])>,
) -> Result<SubmitReceipt, ContractError> {
    logs.into_iter()
        .find_map(|(topics, data)| decode_submit_log(topics, data).ok())
        .map(|log| SubmitReceipt {
            tx_hash,
            root,
            tx_seq: log.submission_index,
        })
        .ok_or(ContractError::MissingSubmitLog { tx_hash })
}
