//! Canonical primitive types shared by every crate in the workspace.
//!
//! Rule: no `String` identifiers in issuance or settlement state. Addresses,
//! token ids, and transaction hashes are fixed-size byte newtypes that are
//! cheap to copy, deterministic to serialize, and safe to use as map keys.

pub mod primitives;

pub use primitives::{
    unix_now, whole, Address, Amount, BlockHeight, Timestamp, TokenId, TxHash, AMOUNT_DECIMALS,
    UNIT,
};
