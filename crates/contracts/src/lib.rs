//! 0G storage contract bindings and deployment information.
//!
//! This crate provides type-safe Solidity contract bindings using Alloy's `sol!` macro,
//! along with deployment information for the networks whose addresses are published.
//!
//! # Deployment Information
//!
//! ```
//! use zgs_contracts::testnet;
//!
//! let flow = testnet::FLOW;
//! assert_ne!(flow.address, alloy_primitives::Address::ZERO);
//! ```
//!
//! # Contract Bindings
//!
//! A [`SubmissionDescriptor`] converts straight into the flow contract's
//! `Submission` struct:
//!
//! ```
//! use alloy_sol_types::SolCall;
//! use zgs_contracts::IFlow;
//! use zgs_primitives::FileHandle;
//!
//! let file = FileHandle::from_bytes(vec![1u8; 1000]);
//! let descriptor = file.submission(Vec::new()).unwrap();
//! let call = IFlow::submitCall { submission: (&descriptor).into() };
//! let encoded = call.abi_encode();
//! assert_eq!(&encoded[..4], &IFlow::submitCall::SELECTOR);
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use alloy_primitives::{Address, B256, U256, address};
use alloy_sol_types::{SolEvent, sol};
use zgs_primitives::{SubmissionDescriptor, SubmissionNode};

// Deployment Info Macro

/// Macro to define a contract deployment struct.
macro_rules! define_deployment {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name {
            /// Contract address.
            pub address: Address,
        }

        impl $name {
            /// Creates a new deployment.
            #[must_use]
            pub const fn new(address: Address) -> Self {
                Self { address }
            }
        }
    };
}

// Deployment Information Types

define_deployment!(
    /// Flow contract deployment information.
    Flow
);

define_deployment!(
    /// Mine contract deployment information.
    Mine
);

define_deployment!(
    /// Reward contract deployment information.
    Reward
);

// Storage Contract Interfaces

sol! {
    /// Flow contract interface.
    ///
    /// Appends file commitments to the storage log. The returned and emitted
    /// submission index is the transaction sequence nodes key uploads by.
    #[derive(Debug, PartialEq, Eq)]
    interface IFlow {
        struct SubmissionNode {
            bytes32 root;
            uint256 height;
        }

        struct Submission {
            uint256 length;
            bytes tags;
            SubmissionNode[] nodes;
        }

        function submit(Submission submission) external payable returns (
            uint256,
            bytes32,
            uint256,
            uint256
        );
        function batchSubmit(Submission[] submissions) external payable returns (
            uint256[] indexes,
            bytes32[] digests,
            uint256[] startIndexes,
            uint256[] lengths
        );
        function market() external view returns (address);

        event Submit(
            address indexed sender,
            bytes32 indexed identity,
            uint256 submissionIndex,
            uint256 startPos,
            uint256 length,
            Submission submission
        );
    }

    /// Fixed price market contract interface.
    #[derive(Debug, PartialEq, Eq)]
    interface IMarket {
        function pricePerSector() external view returns (uint256);
    }
}

impl From<&SubmissionNode> for IFlow::SubmissionNode {
    fn from(node: &SubmissionNode) -> Self {
        Self {
            root: node.root,
            height: U256::from(node.height),
        }
    }
}

impl From<&SubmissionDescriptor> for IFlow::Submission {
    fn from(descriptor: &SubmissionDescriptor) -> Self {
        Self {
            length: U256::from(descriptor.length),
            tags: descriptor.tags.clone().into(),
            nodes: descriptor.nodes.iter().map(Into::into).collect(),
        }
    }
}

/// The fields of a `Submit` event a client needs after submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubmitLog {
    /// Account that submitted.
    pub sender: Address,
    /// Submission identity digest.
    pub identity: B256,
    /// Index of the submission in the log, the transaction sequence.
    pub submission_index: u64,
    /// First flow entry of the submission.
    pub start_pos: u64,
    /// Number of flow entries taken.
    pub length: u64,
}

/// Decodes a raw `Submit` log.
///
/// Fails if the topics do not belong to a `Submit` event or the data is
/// malformed.
pub fn decode_submit_log(
    topics: &[B256],
    data: &[u8],
) -> Result<SubmitLog, alloy_sol_types::Error> {
    let event = IFlow::Submit::decode_raw_log(topics.iter().copied(), data)?;
    Ok(SubmitLog {
        sender: event.sender,
        identity: event.identity,
        submission_index: event.submissionIndex.saturating_to(),
        start_pos: event.startPos.saturating_to(),
        length: event.length.saturating_to(),
    })
}

// 0G Galileo Testnet Deployments

/// 0G Galileo testnet contract deployments.
pub mod testnet {
    use super::*;

    /// Flow contract.
    pub const FLOW: Flow = Flow::new(address!("22E03a6A89B950F1c82ec5e74F8eCa321a105296"));

    /// Mine contract.
    pub const MINE: Mine = Mine::new(address!("00A9E9604b0538e06b268Fb297Df333337f9593b"));

    /// Reward contract.
    pub const REWARD: Reward = Reward::new(address!("A97B57b4BdFEA2D0a25e535bd849ad4e6C440A69"));
}
