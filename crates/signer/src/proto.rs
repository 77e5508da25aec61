//! The host request/response protocol and the collaborator interfaces the
//! signer drives.
//!
//! Scheduling is single-threaded cooperative: the signer suspends exactly at
//! the points where it needs data, by handing a [`TxRequest`] to the
//! [`Host`] and resuming with the typed reply. Ordering is strict and total;
//! a reply of the wrong kind is fatal.

use coldsign_core::hashes::Txid;

use crate::{
    coins::CoinParams,
    error::SignError,
    types::{DerivationPath, PrevInput, PrevTxMeta, TxInput, TxOutput, TxOutputBin},
};

/// What the signer is asking the host for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestKind {
    /// One input of the transaction being signed, or of a previous tx.
    TxInput,
    /// One output of the transaction being signed, or of a previous tx.
    TxOutput,
    /// The metadata of a previous transaction.
    TxMeta,
    /// A chunk of a previous transaction's extra data.
    TxExtraData,
    /// Nothing further; the transaction is complete.
    TxFinished,
}

/// Addressing details for a request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestDetails {
    /// Index of the requested entity within its vector.
    pub request_index: u32,
    /// Set when the request targets a previous transaction.
    pub tx_hash: Option<Txid>,
    /// Byte offset of the requested extra-data chunk.
    pub extra_data_offset: u32,
    /// Byte length of the requested extra-data chunk.
    pub extra_data_len: u32,
}

/// A fragment of the signed transaction stream, riding on a request.
///
/// Concatenating every fragment in emission order yields the final
/// serialized transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Serialized {
    /// Which input the attached signature belongs to.
    pub signature_index: Option<u32>,
    /// A DER signature produced for `signature_index`.
    pub signature: Option<Vec<u8>>,
    /// The next bytes of the serialized transaction.
    pub serialized_tx: Vec<u8>,
}

/// A request to the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxRequest {
    /// What is being requested.
    pub kind: RequestKind,
    /// Which entity is being requested.
    pub details: RequestDetails,
    /// Stream bytes produced since the previous request.
    pub serialized: Option<Serialized>,
}

/// The host's typed reply to a [`TxRequest`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxAck {
    /// An input of the transaction being signed.
    Input(TxInput),
    /// An output of the transaction being signed.
    Output(TxOutput),
    /// An input of a previous transaction.
    PrevInput(PrevInput),
    /// An output of a previous transaction, in binary form.
    PrevOutput(TxOutputBin),
    /// Previous-transaction metadata.
    Meta(PrevTxMeta),
    /// A chunk of previous-transaction extra data.
    ExtraData(Vec<u8>),
    /// Acknowledgement of the final request.
    Finished,
}

/// The data pump on the other side of the wire.
///
/// The host must answer the request it was just sent; the signer treats a
/// reply of the wrong kind as fatal. Transport timeouts surface as errors
/// from this trait and abort the session.
pub trait Host {
    /// Answer one request.
    fn request(&mut self, req: TxRequest) -> Result<TxAck, SignError>;
}

/// The user-confirmation surface.
///
/// Each method blocks until the user decides and returns whether they
/// approved. A `false` return is translated into
/// [`SignError::ActionCancelled`] by the signer.
pub trait Confirmer {
    /// Confirm one non-change output: destination and amount.
    fn confirm_output(&mut self, output: &TxOutput, coin: &CoinParams) -> Result<bool, SignError>;

    /// Warn about an input path outside the standard layout for its script
    /// type.
    fn confirm_foreign_path(&mut self, path: &DerivationPath) -> Result<bool, SignError>;

    /// Confirm a fee above the coin's per-kilobyte threshold.
    fn confirm_fee_over_threshold(
        &mut self,
        fee: u64,
        coin: &CoinParams,
    ) -> Result<bool, SignError>;

    /// Confirm a non-zero locktime.
    fn confirm_nondefault_locktime(&mut self, lock_time: u32) -> Result<bool, SignError>;

    /// Confirm the total being spent and the fee. Always shown.
    fn confirm_total(&mut self, spending: u64, fee: i64, coin: &CoinParams)
        -> Result<bool, SignError>;
}
