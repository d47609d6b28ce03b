//! Payment record store contract and an in-memory implementation.
//!
//! The store is the persisted source of truth for payment status, external
//! identifiers, account affinity and wallet balances. Two operations carry
//! the exactly-once guarantee and must be atomic in any implementation:
//!
//! - [`PaymentStore::compare_and_set_status`]: a compare-and-swap on the
//!   status of one payment. Only the caller whose expectation matches wins.
//! - [`PaymentStore::credit_wallet`]: balance update plus ledger append,
//!   refusing a second entry for the same payment id.

use crate::error::{Error, Result};
use crate::gateway::AccountIndex;
use crate::payment::record::{OwnerId, PaymentId, PaymentRecord, WalletTransaction};
use crate::payment::status::CanonicalStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Outcome of a wallet credit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Balance changed and the ledger entry was appended.
    Credited(WalletTransaction),
    /// A ledger entry for this payment already exists; nothing changed.
    AlreadyCredited(WalletTransaction),
    /// The owner has no wallet.
    OwnerNotFound,
}

/// Persistence contract consumed by the reconciliation engine.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new record. Fails if the reference code is already taken.
    async fn insert(&self, record: PaymentRecord) -> Result<()>;

    /// Fetch a record by internal id.
    async fn get(&self, id: PaymentId) -> Result<Option<PaymentRecord>>;

    /// Fetch a record by gateway reference code.
    async fn find_by_reference(&self, reference_code: &str) -> Result<Option<PaymentRecord>>;

    /// All records of `owner_id` whose status is not terminal, oldest first.
    async fn list_unsettled(&self, owner_id: OwnerId) -> Result<Vec<PaymentRecord>>;

    /// Owners that have at least one non-terminal record.
    async fn owners_with_unsettled(&self) -> Result<Vec<OwnerId>>;

    /// Record the account that last answered for this payment.
    async fn set_affinity(&self, id: PaymentId, account: AccountIndex) -> Result<()>;

    /// Atomically move `id` from `expected` to `next`.
    ///
    /// Returns `false` without writing if the current status differs from
    /// `expected`. `paid_at` is stored when given.
    async fn compare_and_set_status(
        &self,
        id: PaymentId,
        expected: CanonicalStatus,
        next: CanonicalStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Atomically add `delta` to the owner's balance and append one ledger
    /// entry referencing `payment_id`.
    async fn credit_wallet(
        &self,
        owner_id: OwnerId,
        delta: Decimal,
        description: String,
        payment_id: PaymentId,
    ) -> Result<CreditOutcome>;

    /// Current wallet balance, `None` if the owner has no wallet.
    async fn wallet_balance(&self, owner_id: OwnerId) -> Result<Option<Decimal>>;

    /// Ledger entries of an owner, oldest first.
    async fn ledger_entries(&self, owner_id: OwnerId) -> Result<Vec<WalletTransaction>>;
}

#[derive(Default)]
struct Inner {
    payments: HashMap<PaymentId, PaymentRecord>,
    by_reference: HashMap<String, PaymentId>,
    wallets: HashMap<OwnerId, Decimal>,
    ledger: Vec<WalletTransaction>,
}

/// Process-local store. Every operation runs under one lock, which makes
/// the compare-and-set and the credit trivially atomic.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a wallet for `owner_id` with the given opening balance.
    /// Existing wallets are left untouched.
    pub fn open_wallet(&self, owner_id: OwnerId, balance: Decimal) {
        self.inner.lock().wallets.entry(owner_id).or_insert(balance);
    }

    /// Number of stored payment records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().payments.len()
    }

    /// Check if the store holds no payment records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().payments.is_empty()
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert(&self, record: PaymentRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.by_reference.contains_key(&record.reference_code) {
            return Err(Error::Store(format!(
                "reference code already exists: {}",
                record.reference_code
            )));
        }
        inner
            .by_reference
            .insert(record.reference_code.clone(), record.id);
        inner.payments.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<PaymentRecord>> {
        Ok(self.inner.lock().payments.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference_code: &str) -> Result<Option<PaymentRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .by_reference
            .get(reference_code)
            .and_then(|id| inner.payments.get(id))
            .cloned())
    }

    async fn list_unsettled(&self, owner_id: OwnerId) -> Result<Vec<PaymentRecord>> {
        let inner = self.inner.lock();
        let mut records: Vec<PaymentRecord> = inner
            .payments
            .values()
            .filter(|r| r.owner_id == owner_id && !r.status.is_terminal())
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn owners_with_unsettled(&self) -> Result<Vec<OwnerId>> {
        let inner = self.inner.lock();
        let owners: BTreeSet<OwnerId> = inner
            .payments
            .values()
            .filter(|r| !r.status.is_terminal())
            .map(|r| r.owner_id)
            .collect();
        Ok(owners.into_iter().collect())
    }

    async fn set_affinity(&self, id: PaymentId, account: AccountIndex) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .payments
            .get_mut(&id)
            .ok_or_else(|| Error::PaymentNotFound(id.to_string()))?;
        record.account_affinity = Some(account);
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        id: PaymentId,
        expected: CanonicalStatus,
        next: CanonicalStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();
        let record = inner
            .payments
            .get_mut(&id)
            .ok_or_else(|| Error::PaymentNotFound(id.to_string()))?;

        if record.status != expected {
            debug!(
                payment_id = %id,
                expected = %expected,
                actual = %record.status,
                "status compare-and-set lost"
            );
            return Ok(false);
        }

        record.status = next;
        if paid_at.is_some() {
            record.paid_at = paid_at;
        }
        Ok(true)
    }

    async fn credit_wallet(
        &self,
        owner_id: OwnerId,
        delta: Decimal,
        description: String,
        payment_id: PaymentId,
    ) -> Result<CreditOutcome> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(existing) = inner
            .ledger
            .iter()
            .find(|tx| tx.related_payment_id == Some(payment_id))
        {
            return Ok(CreditOutcome::AlreadyCredited(existing.clone()));
        }

        let Some(balance) = inner.wallets.get_mut(&owner_id) else {
            return Ok(CreditOutcome::OwnerNotFound);
        };

        let tx = WalletTransaction::new(owner_id, *balance, delta, description, Some(payment_id))?;
        *balance = tx.balance_after;
        inner.ledger.push(tx.clone());
        Ok(CreditOutcome::Credited(tx))
    }

    async fn wallet_balance(&self, owner_id: OwnerId) -> Result<Option<Decimal>> {
        Ok(self.inner.lock().wallets.get(&owner_id).copied())
    }

    async fn ledger_entries(&self, owner_id: OwnerId) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .inner
            .lock()
            .ledger
            .iter()
            .filter(|tx| tx.owner_id == owner_id)
            .cloned()
            .collect())
    }
}
