//! Settlement ledger client interface.
//!
//! The ledger client moves value between accounts and resolves cross-ledger
//! amounts. It is an external collaborator; the payment layer only consumes
//! this trait through the settlement adapter.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tollgate_primitives::{AccountId, Amount, PeerIdentity};

use crate::LedgerError;

/// Memo key carrying the correlating peer's public key.
pub const MEMO_PUBLIC_KEY: &str = "public_key";

/// Memo attached to a ledger transfer.
///
/// Ledgers deliver memos either as structured data or as a JSON-encoded
/// string; both forms are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Memo {
    /// Memo as delivered in text form.
    Text(String),
    /// Structured memo.
    Json(serde_json::Value),
}

impl Memo {
    /// Memo tagging a transfer with a peer's public key.
    pub fn tag(peer: &PeerIdentity) -> Self {
        Memo::Json(serde_json::json!({ MEMO_PUBLIC_KEY: peer.to_string() }))
    }
}

/// Parameters of an outgoing payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentParams {
    /// Amount debited from our account, in our unit.
    pub source_amount: Amount,
    /// Account to pay.
    pub destination_account: AccountId,
    /// Memo delivered to the recipient: identifies us as the payer.
    pub destination_memo: Memo,
    /// Memo kept on our side: identifies the peer we paid.
    pub source_memo: Memo,
}

/// Ledger acknowledgement of a submitted payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// Ledger reference for the transfer.
    pub reference: String,
}

/// Settlement notification pushed by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerNotification {
    /// Ledger reference for the transfer.
    pub reference: String,
    /// Debited account.
    pub source_account: AccountId,
    /// Credited account.
    pub destination_account: AccountId,
    /// Amount moved.
    pub amount: Amount,
    /// Memo attached by the payer, if any.
    pub memo: Option<Memo>,
}

/// Client for an external settlement ledger.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Resolve our account and connect to the ledger's notification feed.
    async fn connect(&self) -> Result<AccountId, LedgerError>;

    /// Look up how much we must send for `destination` to receive
    /// `destination_amount` (path finding across ledgers).
    async fn quote_source_amount(
        &self,
        destination: &AccountId,
        destination_amount: Amount,
    ) -> Result<Amount, LedgerError>;

    /// Submit a payment. Resolves once the ledger has accepted or rejected it.
    async fn send_payment(&self, params: PaymentParams) -> Result<PaymentReceipt, LedgerError>;

    /// Take the settlement notification stream.
    ///
    /// Returns `None` if it has already been taken.
    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<LedgerNotification>>;

    /// Unsubscribe from the notification feed.
    async fn disconnect(&self) {}
}
