//! The wallet ledger - single writer path for all balances
//!
//! Every balance mutation in the engine flows through [`Ledger::transfer`]
//! or [`Ledger::transfer_batch`]; no component writes a balance directly.
//! Guarantees:
//! - Atomicity: a batch fully applies (debit, credits, records) or not at all
//! - Idempotency: a committed `transaction_id` replays its original result
//! - No negative balances: the debit is validated before anything mutates
//! - Per-wallet serialization: wallets are locked in stable id order

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use tessera_core::{LedgerError, TokenAmount, Wallet, WalletError};

use crate::transaction::{TransactionRecord, TransferKind, TransferLeg};

/// Ledger tuning knobs
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How long a transfer waits for a contended wallet lock before
    /// reporting `ConcurrentModification`
    pub lock_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(500),
        }
    }
}

/// Ledger operation counters
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    pub transfers_committed: AtomicU64,
    pub replays_served: AtomicU64,
    pub insufficient_funds: AtomicU64,
    pub idempotency_conflicts: AtomicU64,
    pub lock_conflicts: AtomicU64,
}

/// Point-in-time conservation check over the whole ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConservationReport {
    /// Sum of all wallet balances
    pub wallet_total: TokenAmount,
    /// Minted minus burned across the transaction log
    pub net_minted: TokenAmount,
}

impl ConservationReport {
    /// Value is neither created nor destroyed outside mint/burn
    pub fn holds(&self) -> bool {
        self.wallet_total == self.net_minted
    }
}

/// In-memory wallet ledger
///
/// Wallets table keyed by user id, append-only transaction log, committed
/// index keyed by idempotency key, secondary index by related session.
pub struct Ledger {
    config: LedgerConfig,
    wallets: DashMap<Uuid, Arc<Mutex<Wallet>>>,
    /// Idempotency key -> committed record
    committed: DashMap<String, TransactionRecord>,
    /// Append-only, in commit order
    log: Mutex<Vec<TransactionRecord>>,
    /// related_session -> transaction ids, in commit order
    session_index: DashMap<Uuid, Vec<String>>,
    metrics: LedgerMetrics,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            wallets: DashMap::new(),
            committed: DashMap::new(),
            log: Mutex::new(Vec::new()),
            session_index: DashMap::new(),
            metrics: LedgerMetrics::default(),
        }
    }

    // ------------------------------------------------------------------
    // Wallet administration
    // ------------------------------------------------------------------

    /// Create the wallet for a user if it does not exist yet
    pub fn register_wallet(&self, user_id: Uuid) -> Wallet {
        let entry = self
            .wallets
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(Wallet::new(user_id))));
        let wallet = entry.value().lock().clone();
        wallet
    }

    /// Remove a wallet after account deletion; requires a reconciled
    /// (zero) balance
    pub fn remove_wallet(&self, user_id: Uuid) -> Result<(), LedgerError> {
        if !self.wallets.contains_key(&user_id) {
            return Err(LedgerError::WalletNotFound { wallet_id: user_id });
        }
        match self.wallets.remove_if(&user_id, |_, w| w.lock().balance == 0) {
            Some(_) => Ok(()),
            None => {
                let balance = self.balance_of(user_id)?;
                Err(LedgerError::Wallet(WalletError::NonZeroBalance {
                    wallet_id: user_id,
                    balance,
                }))
            }
        }
    }

    /// Place a compliance hold on a wallet
    pub fn freeze_wallet(&self, user_id: Uuid) -> Result<(), LedgerError> {
        self.wallet_arc(user_id)?.lock().freeze();
        warn!(wallet = %user_id, "wallet frozen");
        Ok(())
    }

    /// Lift a compliance hold
    pub fn unfreeze_wallet(&self, user_id: Uuid) -> Result<(), LedgerError> {
        self.wallet_arc(user_id)?.lock().unfreeze();
        Ok(())
    }

    /// Current balance in minor units
    pub fn balance_of(&self, user_id: Uuid) -> Result<TokenAmount, LedgerError> {
        Ok(self.wallet_arc(user_id)?.lock().balance)
    }

    /// Snapshot of balance, version, and freeze state
    pub fn wallet_snapshot(&self, user_id: Uuid) -> Result<Wallet, LedgerError> {
        Ok(self.wallet_arc(user_id)?.lock().clone())
    }

    fn wallet_arc(&self, user_id: Uuid) -> Result<Arc<Mutex<Wallet>>, LedgerError> {
        self.wallets
            .get(&user_id)
            .map(|e| e.value().clone())
            .ok_or(LedgerError::WalletNotFound { wallet_id: user_id })
    }

    // ------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------

    /// Mint minor units into a wallet (external payment capture)
    ///
    /// Card-capture callbacks retry, so deposits carry idempotency keys
    /// like every other transaction.
    #[instrument(skip(self))]
    pub fn deposit(
        &self,
        transaction_id: &str,
        to_wallet: Uuid,
        amount: TokenAmount,
        related_session: Option<Uuid>,
    ) -> Result<TransactionRecord, LedgerError> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount.into());
        }
        if let Some(record) =
            self.check_committed(transaction_id, None, Some(to_wallet), amount, TransferKind::Deposit, related_session)?
        {
            return Ok(record);
        }

        let arc = self.wallet_arc(to_wallet)?;
        let mut guard = self.lock_wallet(to_wallet, &arc)?;

        // Re-check under the lock so a racing retry replays instead of
        // double-applying
        if let Some(record) =
            self.check_committed(transaction_id, None, Some(to_wallet), amount, TransferKind::Deposit, related_session)?
        {
            return Ok(record);
        }

        guard.credit(amount)?;
        let record = self.commit_record(
            transaction_id,
            None,
            Some(to_wallet),
            amount,
            TransferKind::Deposit,
            related_session,
        );
        Ok(record)
    }

    /// Single-leg atomic transfer; `to_wallet = None` burns to the
    /// platform sink
    pub fn transfer(
        &self,
        transaction_id: &str,
        from_wallet: Uuid,
        to_wallet: Option<Uuid>,
        amount: TokenAmount,
        kind: TransferKind,
        related_session: Option<Uuid>,
    ) -> Result<TransactionRecord, LedgerError> {
        let legs = [TransferLeg::new(transaction_id, to_wallet, amount, kind)];
        self.transfer_batch(from_wallet, &legs, related_session)
            .map(|mut records| records.swap_remove(0))
    }

    /// Atomic multi-leg transfer: every leg debits `from_wallet`, and all
    /// legs commit or none do
    ///
    /// This is how split charges stay exact: the earner-share leg and the
    /// platform-fee leg are distinct transactions sharing a
    /// `related_session`, committed inside one locked section.
    #[instrument(skip(self, legs), fields(legs = legs.len()))]
    pub fn transfer_batch(
        &self,
        from_wallet: Uuid,
        legs: &[TransferLeg],
        related_session: Option<Uuid>,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        if legs.is_empty() {
            return Err(WalletError::InvalidAmount.into());
        }
        for leg in legs {
            if leg.amount <= 0 || leg.to_wallet == Some(from_wallet) {
                return Err(WalletError::InvalidAmount.into());
            }
        }

        // Fast-path replay before taking any locks
        if let Some(records) = self.try_replay(from_wallet, legs, related_session)? {
            return Ok(records);
        }

        // Lock payer and all credit targets in stable id order
        let mut targets: Vec<Uuid> = Vec::with_capacity(1 + legs.len());
        targets.push(from_wallet);
        targets.extend(legs.iter().filter_map(|l| l.to_wallet));
        targets.sort();
        targets.dedup();

        let arcs: Vec<(Uuid, Arc<Mutex<Wallet>>)> = targets
            .iter()
            .map(|id| Ok((*id, self.wallet_arc(*id)?)))
            .collect::<Result<_, LedgerError>>()?;

        let mut guards = Vec::with_capacity(arcs.len());
        for (id, arc) in &arcs {
            guards.push((*id, self.lock_wallet(*id, arc)?));
        }

        // A racing identical retry may have committed while we waited
        if let Some(records) = self.try_replay(from_wallet, legs, related_session)? {
            return Ok(records);
        }

        let total: TokenAmount = legs.iter().map(|l| l.amount).sum();
        let payer_idx = guards
            .iter()
            .position(|(id, _)| *id == from_wallet)
            .ok_or(LedgerError::WalletNotFound {
                wallet_id: from_wallet,
            })?;

        // Validate everything before mutating anything
        {
            let payer = &guards[payer_idx].1;
            if payer.frozen {
                return Err(WalletError::Frozen {
                    wallet_id: from_wallet,
                }
                .into());
            }
            if payer.balance < total {
                self.metrics.insufficient_funds.fetch_add(1, Ordering::Relaxed);
                return Err(WalletError::InsufficientFunds {
                    required: total,
                    available: payer.balance,
                }
                .into());
            }
            for (id, guard) in &guards {
                if *id != from_wallet && guard.frozen {
                    return Err(WalletError::Frozen { wallet_id: *id }.into());
                }
            }
        }

        // Apply: one debit for the batch total, one credit per funded leg
        guards[payer_idx].1.debit(total)?;
        for leg in legs {
            if let Some(to) = leg.to_wallet {
                if let Some(idx) = guards.iter().position(|(id, _)| *id == to) {
                    guards[idx].1.credit(leg.amount)?;
                }
            }
        }

        let records: Vec<TransactionRecord> = legs
            .iter()
            .map(|leg| {
                self.commit_record(
                    &leg.transaction_id,
                    Some(from_wallet),
                    leg.to_wallet,
                    leg.amount,
                    leg.kind,
                    related_session,
                )
            })
            .collect();

        debug!(
            from = %from_wallet,
            total,
            legs = legs.len(),
            "transfer committed"
        );
        Ok(records)
    }

    fn lock_wallet<'a>(
        &self,
        wallet_id: Uuid,
        arc: &'a Arc<Mutex<Wallet>>,
    ) -> Result<parking_lot::MutexGuard<'a, Wallet>, LedgerError> {
        match arc.try_lock_for(self.config.lock_timeout) {
            Some(guard) => Ok(guard),
            None => {
                self.metrics.lock_conflicts.fetch_add(1, Ordering::Relaxed);
                Err(LedgerError::ConcurrentModification { wallet_id })
            }
        }
    }

    /// If every leg is already committed with matching parameters, return
    /// the original records; a parameter mismatch is a caller bug
    fn try_replay(
        &self,
        from_wallet: Uuid,
        legs: &[TransferLeg],
        related_session: Option<Uuid>,
    ) -> Result<Option<Vec<TransactionRecord>>, LedgerError> {
        if !self.committed.contains_key(&legs[0].transaction_id) {
            return Ok(None);
        }
        let mut records = Vec::with_capacity(legs.len());
        for leg in legs {
            let record = self
                .committed
                .get(&leg.transaction_id)
                .map(|r| r.clone())
                .ok_or_else(|| LedgerError::IdempotencyConflict {
                    transaction_id: leg.transaction_id.clone(),
                })?;
            if !record.matches(
                Some(from_wallet),
                leg.to_wallet,
                leg.amount,
                leg.kind,
                related_session,
            ) {
                self.metrics
                    .idempotency_conflicts
                    .fetch_add(1, Ordering::Relaxed);
                return Err(LedgerError::IdempotencyConflict {
                    transaction_id: leg.transaction_id.clone(),
                });
            }
            records.push(record);
        }
        self.metrics.replays_served.fetch_add(1, Ordering::Relaxed);
        debug!(transaction_id = %legs[0].transaction_id, "replayed committed transfer");
        Ok(Some(records))
    }

    /// Replay check for single-record operations (deposits)
    fn check_committed(
        &self,
        transaction_id: &str,
        from_wallet: Option<Uuid>,
        to_wallet: Option<Uuid>,
        amount: TokenAmount,
        kind: TransferKind,
        related_session: Option<Uuid>,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        match self.committed.get(transaction_id) {
            None => Ok(None),
            Some(record) if record.matches(from_wallet, to_wallet, amount, kind, related_session) => {
                self.metrics.replays_served.fetch_add(1, Ordering::Relaxed);
                Ok(Some(record.clone()))
            }
            Some(_) => {
                self.metrics
                    .idempotency_conflicts
                    .fetch_add(1, Ordering::Relaxed);
                Err(LedgerError::IdempotencyConflict {
                    transaction_id: transaction_id.to_string(),
                })
            }
        }
    }

    fn commit_record(
        &self,
        transaction_id: &str,
        from_wallet: Option<Uuid>,
        to_wallet: Option<Uuid>,
        amount: TokenAmount,
        kind: TransferKind,
        related_session: Option<Uuid>,
    ) -> TransactionRecord {
        let record = TransactionRecord {
            transaction_id: transaction_id.to_string(),
            record_id: Uuid::now_v7(),
            from_wallet,
            to_wallet,
            amount,
            kind,
            related_session,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        self.committed
            .insert(record.transaction_id.clone(), record.clone());
        self.log.lock().push(record.clone());
        if let Some(session) = related_session {
            self.session_index
                .entry(session)
                .or_default()
                .push(record.transaction_id.clone());
        }
        self.metrics.transfers_committed.fetch_add(1, Ordering::Relaxed);
        record
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// All transactions touching a wallet, in commit order
    pub fn history_for_wallet(&self, wallet_id: Uuid) -> Vec<TransactionRecord> {
        self.log
            .lock()
            .iter()
            .filter(|r| r.from_wallet == Some(wallet_id) || r.to_wallet == Some(wallet_id))
            .cloned()
            .collect()
    }

    /// All transactions settling a session or escrow, in commit order
    pub fn transactions_for_session(&self, session_id: Uuid) -> Vec<TransactionRecord> {
        let Some(ids) = self.session_index.get(&session_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.committed.get(id).map(|r| r.clone()))
            .collect()
    }

    /// Total burned to the platform sink so far
    pub fn platform_revenue(&self) -> TokenAmount {
        self.log
            .lock()
            .iter()
            .filter(|r| r.to_wallet.is_none())
            .map(|r| r.amount)
            .sum()
    }

    /// Recompute the conservation invariant from scratch
    pub fn audit_conservation(&self) -> ConservationReport {
        let net_minted = {
            let log = self.log.lock();
            let minted: TokenAmount = log
                .iter()
                .filter(|r| r.from_wallet.is_none())
                .map(|r| r.amount)
                .sum();
            let burned: TokenAmount = log
                .iter()
                .filter(|r| r.to_wallet.is_none())
                .map(|r| r.amount)
                .sum();
            minted - burned
        };
        let wallet_total = self
            .wallets
            .iter()
            .map(|entry| entry.value().lock().balance)
            .sum();
        ConservationReport {
            wallet_total,
            net_minted,
        }
    }

    /// Operation counters
    pub fn metrics(&self) -> &LedgerMetrics {
        &self.metrics
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tessera_core::split_revenue;

    fn funded_ledger(balance: TokenAmount) -> (Ledger, Uuid, Uuid) {
        let ledger = Ledger::default();
        let payer = Uuid::new_v4();
        let earner = Uuid::new_v4();
        ledger.register_wallet(payer);
        ledger.register_wallet(earner);
        if balance > 0 {
            ledger.deposit("dep:1", payer, balance, None).unwrap();
        }
        (ledger, payer, earner)
    }

    #[test]
    fn test_deposit_and_transfer() {
        let (ledger, payer, earner) = funded_ledger(100);

        let record = ledger
            .transfer("tx:1", payer, Some(earner), 40, TransferKind::Call, None)
            .unwrap();

        assert_eq!(record.amount, 40);
        assert_eq!(ledger.balance_of(payer).unwrap(), 60);
        assert_eq!(ledger.balance_of(earner).unwrap(), 40);
    }

    #[test]
    fn test_idempotent_replay() {
        let (ledger, payer, earner) = funded_ledger(100);

        let first = ledger
            .transfer("tx:1", payer, Some(earner), 40, TransferKind::Call, None)
            .unwrap();
        let replay = ledger
            .transfer("tx:1", payer, Some(earner), 40, TransferKind::Call, None)
            .unwrap();

        // Same record, no second application
        assert_eq!(first.record_id, replay.record_id);
        assert_eq!(ledger.balance_of(payer).unwrap(), 60);
        assert_eq!(ledger.balance_of(earner).unwrap(), 40);
        assert_eq!(ledger.metrics().replays_served.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_idempotency_conflict_on_mismatch() {
        let (ledger, payer, earner) = funded_ledger(100);

        ledger
            .transfer("tx:1", payer, Some(earner), 40, TransferKind::Call, None)
            .unwrap();
        let result = ledger.transfer("tx:1", payer, Some(earner), 41, TransferKind::Call, None);

        assert!(matches!(
            result,
            Err(LedgerError::IdempotencyConflict { .. })
        ));
        // The original commit is untouched
        assert_eq!(ledger.balance_of(payer).unwrap(), 60);
    }

    #[test]
    fn test_insufficient_funds_leaves_no_trace() {
        let (ledger, payer, earner) = funded_ledger(30);

        let result = ledger.transfer("tx:1", payer, Some(earner), 40, TransferKind::Call, None);
        assert!(matches!(
            result,
            Err(LedgerError::Wallet(WalletError::InsufficientFunds {
                required: 40,
                available: 30
            }))
        ));

        assert_eq!(ledger.balance_of(payer).unwrap(), 30);
        assert_eq!(ledger.balance_of(earner).unwrap(), 0);
        assert!(ledger.history_for_wallet(earner).is_empty());

        // The failed id was not consumed; a retry with an affordable
        // amount succeeds
        ledger
            .transfer("tx:1", payer, Some(earner), 20, TransferKind::Call, None)
            .unwrap();
        assert_eq!(ledger.balance_of(earner).unwrap(), 20);
    }

    #[test]
    fn test_frozen_wallet_rejects_transfer() {
        let (ledger, payer, earner) = funded_ledger(100);
        ledger.freeze_wallet(payer).unwrap();

        let result = ledger.transfer("tx:1", payer, Some(earner), 10, TransferKind::Chat, None);
        assert!(matches!(
            result,
            Err(LedgerError::Wallet(WalletError::Frozen { .. }))
        ));

        ledger.unfreeze_wallet(payer).unwrap();
        ledger
            .transfer("tx:1", payer, Some(earner), 10, TransferKind::Chat, None)
            .unwrap();
    }

    #[test]
    fn test_split_batch_is_atomic_and_exact() {
        let (ledger, payer, earner) = funded_ledger(1000);
        let session = Uuid::new_v4();

        let split = split_revenue(101, dec!(0.70));
        let legs = [
            TransferLeg::new("s:tick:1:earner", Some(earner), split.earner_share, TransferKind::Chat),
            TransferLeg::new("s:tick:1:fee", None, split.platform_share, TransferKind::Fee),
        ];
        let records = ledger.transfer_batch(payer, &legs, Some(session)).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(ledger.balance_of(payer).unwrap(), 1000 - 101);
        assert_eq!(ledger.balance_of(earner).unwrap(), 70);
        assert_eq!(ledger.platform_revenue(), 31);
        assert_eq!(ledger.transactions_for_session(session).len(), 2);

        // Replaying the whole batch is a no-op
        ledger.transfer_batch(payer, &legs, Some(session)).unwrap();
        assert_eq!(ledger.balance_of(payer).unwrap(), 1000 - 101);
    }

    #[test]
    fn test_split_batch_fails_whole_when_underfunded() {
        let (ledger, payer, earner) = funded_ledger(100);

        let legs = [
            TransferLeg::new("s:tick:1:earner", Some(earner), 70, TransferKind::Chat),
            TransferLeg::new("s:tick:1:fee", None, 31, TransferKind::Fee),
        ];
        let result = ledger.transfer_batch(payer, &legs, None);

        assert!(matches!(
            result,
            Err(LedgerError::Wallet(WalletError::InsufficientFunds {
                required: 101,
                available: 100
            }))
        ));
        // Neither leg applied
        assert_eq!(ledger.balance_of(payer).unwrap(), 100);
        assert_eq!(ledger.balance_of(earner).unwrap(), 0);
        assert_eq!(ledger.platform_revenue(), 0);
    }

    #[test]
    fn test_conservation_across_mixed_activity() {
        let (ledger, payer, earner) = funded_ledger(500);

        ledger
            .transfer("t1", payer, Some(earner), 120, TransferKind::Call, None)
            .unwrap();
        ledger
            .transfer("t2", payer, None, 30, TransferKind::Fee, None)
            .unwrap();
        ledger.deposit("dep:2", earner, 50, None).unwrap();

        let report = ledger.audit_conservation();
        assert!(report.holds());
        assert_eq!(report.wallet_total, 500 - 30 + 50);
    }

    #[test]
    fn test_remove_wallet_requires_zero_balance() {
        let (ledger, payer, _) = funded_ledger(10);

        assert!(matches!(
            ledger.remove_wallet(payer),
            Err(LedgerError::Wallet(WalletError::NonZeroBalance { .. }))
        ));

        ledger
            .transfer("drain", payer, None, 10, TransferKind::Fee, None)
            .unwrap();
        ledger.remove_wallet(payer).unwrap();
        assert!(matches!(
            ledger.balance_of(payer),
            Err(LedgerError::WalletNotFound { .. })
        ));
    }

    #[test]
    fn test_concurrent_transfers_serialize() {
        let (ledger, payer, earner) = funded_ledger(1000);
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    ledger
                        .transfer(
                            &format!("tx:{i}"),
                            payer,
                            Some(earner),
                            10,
                            TransferKind::Call,
                            None,
                        )
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.balance_of(payer).unwrap(), 900);
        assert_eq!(ledger.balance_of(earner).unwrap(), 100);
        assert!(ledger.audit_conservation().holds());
    }

    #[test]
    fn test_wallet_version_advances_per_commit() {
        let (ledger, payer, earner) = funded_ledger(100);
        let before = ledger.wallet_snapshot(payer).unwrap().version;

        ledger
            .transfer("tx:1", payer, Some(earner), 10, TransferKind::Chat, None)
            .unwrap();

        let after = ledger.wallet_snapshot(payer).unwrap().version;
        assert_eq!(after, before + 1);
    }
}
