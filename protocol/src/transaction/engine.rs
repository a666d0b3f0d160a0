//! # Transaction Engine
//!
//! Generic lifecycle for every transaction type: create, process, verify,
//! apply/undo against the unconfirmed and confirmed ledger fields, pool
//! admission, and persistence. Everything type-specific is delegated to the
//! [`AssetPlugin`] registered for the transaction's `type`.
//!
//! ## Data Flow
//!
//! ```text
//! peer/API ─► process_unconfirmed_transaction
//!               ├─ process   (id integrity, sender, primary signature, replay)
//!               ├─ verify    (nethash, second sig, co-signers, fee, amount, slot)
//!               ├─ apply_unconfirmed (u_balance debit under the address lock)
//!               └─ pool register ─► spawn_broadcast (fire-and-forget)
//!
//! block commit ─► commit_transaction ─► apply + serialize_to_db
//! reorg        ─► undo / undo_unconfirmed_list
//! ```
//!
//! ## Design Decisions
//!
//! - Every mutating call takes a [`Scope`]. A failure anywhere in a unit of
//!   work rolls back ledger merges, pool membership, balance-cache moves and
//!   plugin guards together.
//! - Check-then-debit of an account balance runs under that account's
//!   [`AddressLocks`] entry, so concurrent admissions cannot overdraw it.
//! - Broadcast never fails an admission; it runs on the tokio runtime after
//!   the transaction is pooled.

use std::sync::Arc;

use num_bigint::BigInt;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::amount::Amount;
use super::codec::TransactionCodec;
use super::error::TransactionError;
use super::plugin::{AssetPlugin, AssetRegistry, PluginContext};
use super::pool::{AddressLocks, BalanceCache, UnconfirmedPool};
use super::types::{BlockRef, Transaction};
use crate::chain::{
    ChainTip, DelegateRounds, MemoryChainTip, RoundCalculator, SlotClock, SystemSlotClock,
};
use crate::config::{EngineConfig, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH, TRANSACTIONS_TABLE};
use crate::crypto::Keypair;
use crate::network::{spawn_broadcast, Broadcaster, EventNotifier, NoopBroadcaster, NoopNotifier};
use crate::storage::{
    atomically, filter, Account, AccountDelta, AccountFields, Ledger, MemoryLedger, MemoryStore,
    Row, Scope, TransactionStore,
};

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// The external collaborators an engine runs against.
#[derive(Clone)]
pub struct EngineServices {
    pub ledger: Arc<dyn Ledger>,
    pub store: Arc<dyn TransactionStore>,
    pub rounds: Arc<dyn RoundCalculator>,
    pub slots: Arc<dyn SlotClock>,
    pub tip: Arc<dyn ChainTip>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub notifier: Arc<dyn EventNotifier>,
}

impl EngineServices {
    /// In-memory ledger and store, wall-clock slots, no networking.
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self {
            ledger: Arc::new(MemoryLedger::new(config.address_prefix.clone())),
            store: Arc::new(MemoryStore::new()),
            rounds: Arc::new(DelegateRounds::new(config.delegates)),
            slots: Arc::new(SystemSlotClock::from_config(config)),
            tip: Arc::new(MemoryChainTip::new(0)),
            broadcaster: Arc::new(NoopBroadcaster),
            notifier: Arc::new(NoopNotifier),
        }
    }
}

/// Inputs to [`TransactionEngine::create`].
pub struct CreateRequest<'a> {
    pub tx_type: u8,
    pub sender: &'a Account,
    /// Signs the primary signature. With a requester this is the
    /// requester's keypair, otherwise the sender's.
    pub keypair: &'a Keypair,
    pub second_keypair: Option<&'a Keypair>,
    pub requester: Option<&'a Account>,
    /// Type-specific parameters handed to the plugin's `create`.
    pub params: Value,
    pub message: Option<String>,
    pub args: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// TransactionEngine
// ---------------------------------------------------------------------------

pub struct TransactionEngine {
    config: EngineConfig,
    registry: Arc<AssetRegistry>,
    codec: TransactionCodec,
    services: EngineServices,
    pool: Arc<UnconfirmedPool>,
    balances: Arc<BalanceCache>,
    locks: AddressLocks,
}

impl TransactionEngine {
    pub fn new(config: EngineConfig, registry: AssetRegistry, services: EngineServices) -> Self {
        let registry = Arc::new(registry);
        info!(
            nethash = %config.nethash,
            types = ?registry.types().collect::<Vec<_>>(),
            "transaction engine ready"
        );
        Self {
            codec: TransactionCodec::new(Arc::clone(&registry)),
            registry,
            config,
            services,
            pool: Arc::new(UnconfirmedPool::new()),
            balances: Arc::new(BalanceCache::new()),
            locks: AddressLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn codec(&self) -> &TransactionCodec {
        &self.codec
    }

    pub fn services(&self) -> &EngineServices {
        &self.services
    }

    pub fn pool(&self) -> &UnconfirmedPool {
        &self.pool
    }

    pub fn balances(&self) -> &BalanceCache {
        &self.balances
    }

    fn ctx(&self) -> PluginContext<'_> {
        PluginContext {
            config: &self.config,
            codec: &self.codec,
            ledger: self.services.ledger.as_ref(),
            rounds: self.services.rounds.as_ref(),
            store: self.services.store.as_ref(),
            notifier: self.services.notifier.as_ref(),
        }
    }

    fn plugin(&self, tx_type: u8) -> Result<&Arc<dyn AssetPlugin>, TransactionError> {
        self.registry.get(tx_type)
    }

    fn is_genesis(&self, trs: &Transaction) -> bool {
        self.config.is_genesis(trs.block_id.as_deref())
    }

    // -- Codec passthroughs --------------------------------------------------

    pub fn get_bytes(
        &self,
        trs: &Transaction,
        skip_signature: bool,
        skip_second_signature: bool,
    ) -> Result<Vec<u8>, TransactionError> {
        self.codec.get_bytes(trs, skip_signature, skip_second_signature)
    }

    pub fn get_hash(&self, trs: &Transaction) -> Result<[u8; 32], TransactionError> {
        self.codec.get_hash(trs)
    }

    pub fn get_id(&self, trs: &Transaction) -> Result<String, TransactionError> {
        self.codec.get_id(trs)
    }

    pub fn sign(&self, keypair: &Keypair, trs: &Transaction) -> Result<String, TransactionError> {
        self.codec.sign(keypair, trs)
    }

    pub fn multisign(&self, keypair: &Keypair, trs: &Transaction) -> Result<String, TransactionError> {
        self.codec.multisign(keypair, trs)
    }

    pub fn verify_signature(
        &self,
        trs: &Transaction,
        public_key: &str,
        signature: Option<&str>,
    ) -> Result<bool, TransactionError> {
        self.codec.verify_signature(trs, public_key, signature)
    }

    pub fn verify_second_signature(
        &self,
        trs: &Transaction,
        public_key: &str,
        signature: Option<&str>,
    ) -> Result<bool, TransactionError> {
        self.codec.verify_second_signature(trs, public_key, signature)
    }

    // -- Create ---------------------------------------------------------------

    /// Build, sign and id a new transaction.
    pub fn create(&self, req: CreateRequest<'_>) -> Result<Transaction, TransactionError> {
        let plugin = self.plugin(req.tx_type)?;

        let sender_public_key = match (&req.sender.public_key, req.requester) {
            (Some(pk), _) => pk.clone(),
            (None, None) => req.keypair.public_key_hex(),
            (None, Some(_)) => return Err(TransactionError::InvalidSender),
        };

        let mut trs = Transaction::new(req.tx_type, sender_public_key);
        trs.nethash = self.config.nethash.clone();
        trs.timestamp = self.services.slots.get_time();
        trs.sender_id = Some(req.sender.address.clone());
        trs.requester_public_key = match req.requester {
            Some(requester) => Some(
                requester
                    .public_key
                    .clone()
                    .ok_or(TransactionError::InvalidRequester)?,
            ),
            None => None,
        };
        trs.message = req.message;
        trs.args = req.args;

        let mut trs = plugin.create(&req.params, trs)?;

        trs.signature = Some(self.codec.sign(req.keypair, &trs)?);
        if req.sender.second_signature {
            if let Some(second) = req.second_keypair {
                trs.sign_signature = Some(self.codec.second_sign(second, &trs)?);
            }
        }

        trs.id = self.codec.get_id(&trs)?;
        trs.fee = plugin.calculate_fee(&trs, req.sender, &self.ctx())?.to_string();

        debug!(id = %trs.id, tx_type = trs.tx_type, "transaction created");
        Ok(trs)
    }

    // -- Process & verify -----------------------------------------------------

    /// Enforce id integrity, bind the sender and check the primary
    /// signature. Rejects transactions already persisted.
    pub fn process(
        &self,
        mut trs: Transaction,
        sender: Option<&Account>,
        requester: Option<&Account>,
    ) -> Result<Transaction, TransactionError> {
        let plugin = self.plugin(trs.tx_type)?;

        let computed = self.codec.get_id(&trs).map_err(|e| {
            error!(error = %e, "failed to compute transaction id");
            e
        })?;
        if !trs.id.is_empty() && trs.id != computed {
            return Err(TransactionError::IncorrectId);
        }
        trs.id = computed;

        let sender = sender.ok_or(TransactionError::InvalidSender)?;
        trs.sender_id = Some(sender.address.clone());

        if let Some(requester_key) = &trs.requester_public_key {
            if !sender.multisignatures.contains(requester_key) {
                return Err(TransactionError::InvalidSignature(
                    "requester is not a registered co-signer",
                ));
            }
            let requester = requester.ok_or(TransactionError::InvalidRequester)?;
            if requester.public_key.as_deref() != Some(requester_key.as_str()) {
                return Err(TransactionError::InvalidRequester);
            }
        }

        if !trs.is_signed() {
            return Err(TransactionError::InvalidSignature("missing primary signature"));
        }
        let signer = trs
            .requester_public_key
            .as_deref()
            .unwrap_or(&trs.sender_public_key);
        if !self
            .codec
            .verify_signature(&trs, signer, trs.signature.as_deref())?
        {
            return Err(TransactionError::InvalidSignature("primary signature"));
        }

        let trs = plugin.process(trs, sender, &self.ctx())?;

        let confirmed = self
            .services
            .store
            .count(TRANSACTIONS_TABLE, &filter("id", trs.id.clone()))?;
        if confirmed > 0 {
            return Err(TransactionError::AlreadyConfirmed);
        }

        Ok(trs)
    }

    /// Full stateless-plus-account validation. Returns the first failing
    /// check.
    pub fn verify(
        &self,
        trs: &Transaction,
        sender: Option<&Account>,
        requester: Option<&Account>,
    ) -> Result<(), TransactionError> {
        let plugin = self.plugin(trs.tx_type)?;
        let sender = sender.ok_or(TransactionError::InvalidSender)?;

        if self.config.enable_more_lock_types && plugin.supports_lock() && sender.lock_height > 0 {
            if let Some(height) = self.services.tip.last_block_height() {
                if height + 1 <= sender.lock_height {
                    return Err(TransactionError::AccountLocked);
                }
            }
        }

        if let Some(requester_key) = &trs.requester_public_key {
            if !sender.multisignatures.contains(requester_key) {
                return Err(TransactionError::InvalidSignature(
                    "requester is not a registered co-signer",
                ));
            }
            if sender.public_key.as_deref() != Some(trs.sender_public_key.as_str()) {
                return Err(TransactionError::InvalidSender);
            }
        }

        if trs.nethash.is_empty() {
            return Err(TransactionError::MissingNethash);
        }

        let signer = trs
            .requester_public_key
            .as_deref()
            .unwrap_or(&trs.sender_public_key);
        if !self
            .codec
            .verify_signature(trs, signer, trs.signature.as_deref())?
        {
            return Err(TransactionError::InvalidSignature("primary signature"));
        }

        if trs.nethash != self.config.nethash {
            return Err(TransactionError::NethashMismatch);
        }

        self.verify_second_factor(trs, sender, requester)?;
        self.verify_companions(trs, sender, &**plugin)?;

        if trs.sender_id.as_deref() != Some(sender.address.as_str()) {
            return Err(TransactionError::InvalidSenderId { id: trs.id.clone() });
        }

        let expected_fee = plugin.calculate_fee(trs, sender, &self.ctx())?;
        match trs.fee() {
            Ok(fee) if fee == expected_fee => {}
            _ => return Err(TransactionError::InvalidFee { id: trs.id.clone() }),
        }

        let max = Amount::from_units(self.config.max_amount, self.config.fixed_point);
        match trs.amount() {
            Ok(amount) if amount <= max => {}
            _ => return Err(TransactionError::InvalidAmount { id: trs.id.clone() }),
        }

        let slots = &self.services.slots;
        if slots.get_slot_number(Some(trs.timestamp)) > slots.get_slot_number(None) {
            debug!(
                id = %trs.id,
                tx_slot = slots.get_slot_number(Some(trs.timestamp)),
                now_slot = slots.get_slot_number(None),
                "transaction timestamp is ahead of the current slot"
            );
            return Err(TransactionError::InvalidTimestamp);
        }

        plugin.verify(trs, sender, &self.ctx())
    }

    fn verify_second_factor(
        &self,
        trs: &Transaction,
        sender: &Account,
        requester: Option<&Account>,
    ) -> Result<(), TransactionError> {
        let holder = match &trs.requester_public_key {
            None => sender,
            Some(_) => requester.ok_or(TransactionError::InvalidRequester)?,
        };
        if !holder.second_signature {
            return Ok(());
        }
        let key = holder.second_public_key.as_deref().unwrap_or_default();
        if !self
            .codec
            .verify_second_signature(trs, key, trs.sign_signature.as_deref())?
        {
            return Err(TransactionError::InvalidSecondSignature { id: trs.id.clone() });
        }
        Ok(())
    }

    /// Companion signatures must be distinct and each must verify under
    /// some co-signer key.
    fn verify_companions(
        &self,
        trs: &Transaction,
        sender: &Account,
        plugin: &dyn AssetPlugin,
    ) -> Result<(), TransactionError> {
        let Some(signatures) = &trs.signatures else {
            return Ok(());
        };
        debug!(id = %trs.id, count = trs.signature_count(), "checking companion signatures");

        let mut seen = std::collections::HashSet::with_capacity(signatures.len());
        if !signatures.iter().all(|s| seen.insert(s.as_str())) {
            return Err(TransactionError::DuplicateSignatures);
        }

        let mut keys = if sender.multisignatures.is_empty() {
            plugin.companion_keys(trs)?
        } else {
            sender.multisignatures.clone()
        };
        if trs.requester_public_key.is_some() {
            keys.push(trs.sender_public_key.clone());
        }
        let requester = trs.requester_public_key.as_deref();

        for signature in signatures {
            let mut verified = false;
            for key in keys.iter().filter(|k| Some(k.as_str()) != requester) {
                if self.codec.verify_signature(trs, key, Some(signature))? {
                    verified = true;
                    break;
                }
            }
            if !verified {
                return Err(TransactionError::InvalidMultisignature { id: trs.id.clone() });
            }
        }
        Ok(())
    }

    /// Whether `trs` has gathered enough companion signatures to be applied.
    pub fn ready(&self, trs: &Transaction, sender: Option<&Account>) -> Result<bool, TransactionError> {
        let plugin = self.plugin(trs.tx_type)?;
        Ok(sender.is_some_and(|s| plugin.ready(trs, s)))
    }

    // -- Unconfirmed state ------------------------------------------------------

    /// Debit `amount + fee` from the sender's unconfirmed balance and run the
    /// plugin's unconfirmed transition.
    pub fn apply_unconfirmed(
        &self,
        trs: &Transaction,
        sender: Option<&Account>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let genesis = self.is_genesis(trs);
        let sender = match sender {
            Some(sender) => sender.clone(),
            None if genesis => self.services.ledger.set_account(
                AccountFields::for_public_key(trs.sender_public_key.clone()),
                scope,
            )?,
            None => return Err(TransactionError::InvalidBlockId),
        };

        let requester = match &trs.requester_public_key {
            Some(key) => Some(
                self.services
                    .ledger
                    .get_account_by_public_key(key)?
                    .ok_or(TransactionError::InvalidRequester)?,
            ),
            None => None,
        };

        let plugin = self.plugin(trs.tx_type)?;
        let has_second = trs.sign_signature.as_deref().is_some_and(|s| !s.is_empty());

        match &requester {
            None => {
                if sender.second_signature && !has_second && !genesis {
                    return Err(TransactionError::InvalidSecondSignature { id: trs.id.clone() });
                }
                if !sender.second_signature && has_second {
                    return Err(TransactionError::UnexpectedSecondSignature("sender"));
                }
            }
            Some(requester) => {
                if requester.second_signature && !has_second {
                    return Err(TransactionError::InvalidSecondSignature { id: trs.id.clone() });
                }
                if !requester.second_signature && has_second {
                    return Err(TransactionError::UnexpectedSecondSignature("requester"));
                }
            }
        }

        let cost = trs.total_cost()?;
        let address = sender.address.clone();

        self.locks.with_lock(&address, || -> Result<(), TransactionError> {
            let current = self
                .services
                .ledger
                .get_account(&address)?
                .unwrap_or(sender);
            if current.u_balance < cost.credit() && !genesis {
                return Err(TransactionError::InsufficientBalance { address: address.clone() });
            }

            self.move_pending_balance(&address, cost.debit(), scope);
            let merged = self.services.ledger.merge(
                &address,
                &AccountDelta::u_balance(cost.debit()),
                scope,
            )?;

            if let Err(e) = plugin.apply_unconfirmed(trs, &merged, &self.ctx(), scope) {
                self.move_pending_balance(&address, cost.credit(), scope);
                self.services.ledger.merge(
                    &address,
                    &AccountDelta::u_balance(cost.credit()),
                    scope,
                )?;
                return Err(e);
            }
            Ok(())
        })
    }

    /// Drop `trs` from the pool and reverse its unconfirmed effects.
    pub fn undo_unconfirmed(&self, trs: &Transaction, scope: &mut Scope) -> Result<(), TransactionError> {
        let sender = self
            .services
            .ledger
            .get_account_by_public_key(&trs.sender_public_key)?
            .ok_or(TransactionError::InvalidSender)?;
        self.unregister(&trs.id, scope);

        let plugin = self.plugin(trs.tx_type)?;
        let cost = trs.total_cost()?;
        let address = sender.address.clone();

        self.locks.with_lock(&address, || -> Result<(), TransactionError> {
            self.move_pending_balance(&address, cost.credit(), scope);
            let merged = self.services.ledger.merge(
                &address,
                &AccountDelta::u_balance(cost.credit()),
                scope,
            )?;
            plugin.undo_unconfirmed(trs, &merged, &self.ctx(), scope)
        })
    }

    /// Undo every pooled transaction, oldest first. Each undo is its own
    /// unit of work. Returns the ids that were drained.
    pub fn undo_unconfirmed_list(&self) -> Result<Vec<String>, TransactionError> {
        let pending = self.pool.list(false, None);
        let mut ids = Vec::with_capacity(pending.len());
        for trs in pending {
            atomically(|scope| self.undo_unconfirmed(&trs, scope))?;
            ids.push(trs.id);
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "unconfirmed pool drained");
        }
        Ok(ids)
    }

    fn move_pending_balance(&self, address: &str, delta: BigInt, scope: &mut Scope) {
        self.balances.add_native_balance(address, &delta);
        let balances = Arc::clone(&self.balances);
        let address = address.to_string();
        scope.on_rollback(move || balances.add_native_balance(&address, &-delta));
    }

    fn register(&self, trs: Transaction, scope: &mut Scope) -> Result<(), TransactionError> {
        let id = trs.id.clone();
        if !self.pool.insert(trs) {
            return Err(TransactionError::AlreadyPooled(id));
        }
        let pool = Arc::clone(&self.pool);
        scope.on_rollback(move || {
            pool.remove(&id);
        });
        Ok(())
    }

    fn unregister(&self, id: &str, scope: &mut Scope) -> Option<Transaction> {
        let removed = self.pool.remove(id)?;
        let pool = Arc::clone(&self.pool);
        let restored = removed.clone();
        scope.on_rollback(move || {
            pool.insert(restored);
        });
        Some(removed)
    }

    // -- Confirmed state ------------------------------------------------------

    /// Debit the confirmed balance and run the plugin's confirmed transition
    /// as part of `block`.
    pub fn apply(
        &self,
        trs: &Transaction,
        block: &BlockRef,
        sender: &Account,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let plugin = self.plugin(trs.tx_type)?;
        if !plugin.ready(trs, sender) {
            return Err(TransactionError::NotReady { id: trs.id.clone() });
        }

        let genesis = self.is_genesis(trs) || self.config.is_genesis(Some(&block.id));
        let cost = trs.total_cost()?;
        let round = self.services.rounds.calc(block.height);
        let address = sender.address.clone();

        self.locks.with_lock(&address, || -> Result<(), TransactionError> {
            let current = self
                .services
                .ledger
                .get_account(&address)?
                .unwrap_or_else(|| sender.clone());
            if !genesis && current.balance < cost.credit() {
                return Err(TransactionError::InsufficientBalance { address: address.clone() });
            }

            let delta = AccountDelta::balance(cost.debit()).in_block(block.id.clone(), round);
            let merged = self.services.ledger.merge(&address, &delta, scope)?;
            plugin.apply(trs, block, &merged, &self.ctx(), scope)
        })
    }

    /// Exact inverse of [`apply`](Self::apply).
    pub fn undo(
        &self,
        trs: &Transaction,
        block: &BlockRef,
        sender: &Account,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let plugin = self.plugin(trs.tx_type)?;
        let cost = trs.total_cost()?;
        let round = self.services.rounds.calc(block.height);
        let address = sender.address.clone();

        self.locks.with_lock(&address, || -> Result<(), TransactionError> {
            let delta = AccountDelta::balance(cost.credit()).in_block(block.id.clone(), round);
            let merged = self.services.ledger.merge(&address, &delta, scope)?;
            plugin.undo(trs, block, &merged, &self.ctx(), scope)
        })
    }

    pub fn apply_atomic(
        &self,
        trs: &Transaction,
        block: &BlockRef,
        sender: &Account,
    ) -> Result<(), TransactionError> {
        atomically(|scope| self.apply(trs, block, sender, scope))
    }

    pub fn undo_atomic(
        &self,
        trs: &Transaction,
        block: &BlockRef,
        sender: &Account,
    ) -> Result<(), TransactionError> {
        atomically(|scope| self.undo(trs, block, sender, scope))
    }

    pub fn apply_unconfirmed_atomic(
        &self,
        trs: &Transaction,
        sender: Option<&Account>,
    ) -> Result<(), TransactionError> {
        atomically(|scope| self.apply_unconfirmed(trs, sender, scope))
    }

    pub fn undo_unconfirmed_atomic(&self, trs: &Transaction) -> Result<(), TransactionError> {
        atomically(|scope| self.undo_unconfirmed(trs, scope))
    }

    /// Confirm `trs` in `block`: leave the pool, apply to the confirmed
    /// fields and persist, all or nothing.
    pub fn commit_transaction(
        &self,
        trs: &Transaction,
        block: &BlockRef,
    ) -> Result<Transaction, TransactionError> {
        atomically(|scope| -> Result<Transaction, TransactionError> {
            let sender = self
                .services
                .ledger
                .get_account_by_public_key(&trs.sender_public_key)?
                .ok_or(TransactionError::InvalidSender)?;

            let mut confirmed = trs.clone();
            confirmed.block_id = Some(block.id.clone());
            confirmed.block_height = Some(block.height);

            self.unregister(&confirmed.id, scope);
            self.apply(&confirmed, block, &sender, scope)?;
            self.serialize_to_db(&confirmed, scope)?;

            info!(id = %confirmed.id, block = %block, "transaction confirmed");
            Ok(confirmed)
        })
    }

    // -- Pool -------------------------------------------------------------------

    /// Apply unconfirmed, then register in the pool. Either both happen or
    /// neither does.
    pub fn add_unconfirmed_transaction(
        &self,
        trs: Transaction,
        sender: &Account,
    ) -> Result<(), TransactionError> {
        atomically(|scope| self.admit(trs, sender, scope))
    }

    fn admit(&self, trs: Transaction, sender: &Account, scope: &mut Scope) -> Result<(), TransactionError> {
        self.apply_unconfirmed(&trs, Some(sender), scope)?;
        self.register(trs, scope)
    }

    /// Idempotent.
    pub fn remove_unconfirmed_transaction(&self, id: &str) {
        if self.pool.remove(id).is_some() {
            debug!(%id, "removed from unconfirmed pool");
        }
    }

    pub fn get_unconfirmed_transaction(&self, id: &str) -> Option<Transaction> {
        self.pool.get(id)
    }

    pub fn get_unconfirmed_transaction_list(
        &self,
        reverse: bool,
        limit: Option<usize>,
    ) -> Vec<Transaction> {
        self.pool.list(reverse, limit)
    }

    pub fn has_unconfirmed_transaction(&self, id: &str) -> bool {
        self.pool.contains(id)
    }

    pub fn unconfirmed_count(&self) -> usize {
        self.pool.len()
    }

    /// Entry point for a transaction arriving from a peer or the API.
    pub fn process_unconfirmed_transaction(
        &self,
        mut trs: Transaction,
        broadcast: bool,
    ) -> Result<Transaction, TransactionError> {
        if trs.id.is_empty() {
            trs.id = self.codec.get_id(&trs)?;
        }
        if self.pool.contains(&trs.id) {
            return Err(TransactionError::AlreadyPooled(trs.id));
        }

        let admitted = atomically(|scope| -> Result<Transaction, TransactionError> {
            let ledger = &self.services.ledger;
            ledger.set_account(
                AccountFields::for_public_key(trs.sender_public_key.clone()),
                scope,
            )?;
            let sender = ledger.get_account_by_public_key(&trs.sender_public_key)?;

            let requester = match (&trs.requester_public_key, &sender) {
                (Some(key), Some(s)) if s.has_multisignatures() => Some(
                    ledger
                        .get_account_by_public_key(key)?
                        .ok_or(TransactionError::InvalidRequester)?,
                ),
                _ => None,
            };

            let trs = self.process(trs, sender.as_ref(), requester.as_ref())?;
            self.verify(&trs, sender.as_ref(), requester.as_ref())?;
            let sender = sender.ok_or(TransactionError::InvalidSender)?;
            self.admit(trs.clone(), &sender, scope)?;
            Ok(trs)
        })
        .map_err(|e| {
            warn!(error = %e, kind = ?e.kind(), "transaction rejected");
            e
        })?;

        info!(id = %admitted.id, tx_type = admitted.tx_type, "transaction added to unconfirmed pool");

        if broadcast {
            spawn_broadcast(Arc::clone(&self.services.broadcaster), admitted.clone());
        }
        Ok(admitted)
    }

    /// Admit a batch from a peer, stopping at the first rejection.
    pub fn receive_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, TransactionError> {
        if self.pool.len() > self.config.max_txs_per_block {
            return Err(TransactionError::PoolFull);
        }
        let admitted = transactions
            .into_iter()
            .map(|trs| self.process_unconfirmed_transaction(trs, true))
            .collect();
        self.locks.prune();
        admitted
    }

    // -- Normalization & persistence ------------------------------------------

    /// Shape-check the common fields, then the asset.
    pub fn object_normalize(&self, trs: Transaction) -> Result<Transaction, TransactionError> {
        let plugin = self.plugin(trs.tx_type)?;

        check_hex("sender_public_key", &trs.sender_public_key, PUBLIC_KEY_LENGTH)?;
        if let Some(requester) = &trs.requester_public_key {
            check_hex("requester_public_key", requester, PUBLIC_KEY_LENGTH)?;
        }
        if let Some(signature) = &trs.signature {
            check_hex("signature", signature, SIGNATURE_LENGTH)?;
        }
        if let Some(signature) = &trs.sign_signature {
            check_hex("sign_signature", signature, SIGNATURE_LENGTH)?;
        }
        for signature in trs.signatures.iter().flatten() {
            check_hex("signatures", signature, SIGNATURE_LENGTH)?;
        }
        Amount::parse(&trs.amount)
            .map_err(|e| TransactionError::Normalize(format!("amount: {e}")))?;
        Amount::parse(&trs.fee).map_err(|e| TransactionError::Normalize(format!("fee: {e}")))?;

        plugin.object_normalize(trs).map_err(|e| {
            error!(error = %e, "failed to normalize transaction");
            e
        })
    }

    /// Persist the base row and the plugin's asset row.
    pub fn serialize_to_db(&self, trs: &Transaction, scope: &mut Scope) -> Result<(), TransactionError> {
        let plugin = self.plugin(trs.tx_type)?;

        let args = match &trs.args {
            Some(args) => Value::String(serde_json::to_string(args)?),
            None => Value::Null,
        };
        let row = json!({
            "id": trs.id,
            "block_id": trs.block_id,
            "block_height": trs.block_height,
            "type": trs.tx_type,
            "timestamp": trs.timestamp,
            "nethash": trs.nethash,
            "sender_public_key": trs.sender_public_key,
            "requester_public_key": trs.requester_public_key,
            "sender_id": trs.sender_id,
            "recipient_id": trs.recipient_id.as_deref().filter(|r| !r.is_empty()),
            "amount": trs.amount,
            "fee": trs.fee,
            "signature": trs.signature,
            "sign_signature": trs.sign_signature,
            "signatures": trs.signatures.as_ref().map(|s| s.join(",")),
            "args": args,
            "message": trs.message.as_deref().filter(|m| !m.is_empty()),
        });
        let row = row.as_object().cloned().unwrap_or_default();

        self.services.store.insert(TRANSACTIONS_TABLE, row, scope)?;
        plugin.db_save(trs, &self.ctx(), scope)
    }

    /// Rebuild a transaction from a joined row (`t_` base columns plus the
    /// plugin's prefixed asset columns). `None` if the row has no `t_id`.
    pub fn deserialize_db_row(&self, raw: &Row) -> Result<Option<Transaction>, TransactionError> {
        let Some(id) = str_col(raw, "t_id") else {
            return Ok(None);
        };

        let tx_type = raw
            .get("t_type")
            .and_then(Value::as_u64)
            .and_then(|t| u8::try_from(t).ok())
            .ok_or_else(|| TransactionError::Normalize("t_type".into()))?;
        let plugin = self.plugin(tx_type)?;

        let mut trs = Transaction::new(tx_type, str_col(raw, "t_sender_public_key").unwrap_or_default());
        trs.id = id;
        trs.timestamp = raw
            .get("t_timestamp")
            .and_then(Value::as_u64)
            .and_then(|t| u32::try_from(t).ok())
            .unwrap_or_default();
        trs.nethash = str_col(raw, "t_nethash").unwrap_or_default();
        trs.requester_public_key = str_col(raw, "t_requester_public_key");
        trs.sender_id = str_col(raw, "t_sender_id");
        trs.recipient_id = str_col(raw, "t_recipient_id");
        trs.amount = scalar_col(raw, "t_amount").unwrap_or_else(|| "0".into());
        trs.fee = scalar_col(raw, "t_fee").unwrap_or_else(|| "0".into());
        trs.signature = str_col(raw, "t_signature");
        trs.sign_signature = str_col(raw, "t_sign_signature");
        trs.signatures = str_col(raw, "t_signatures")
            .filter(|s| !s.is_empty())
            .map(|s| s.split(',').map(str::to_string).collect());
        trs.args = match str_col(raw, "t_args") {
            Some(args) => serde_json::from_str(&args)?,
            None => None,
        };
        trs.message = str_col(raw, "t_message");
        trs.block_id = str_col(raw, "b_id").or_else(|| str_col(raw, "t_block_id"));
        trs.block_height = raw
            .get("b_height")
            .or_else(|| raw.get("t_block_height"))
            .and_then(Value::as_u64);
        trs.confirmations = raw.get("confirmations").and_then(Value::as_u64);

        if let Some(asset) = plugin.db_read(raw)? {
            trs.asset.insert(plugin.name().to_string(), asset);
        }
        Ok(Some(trs))
    }

    /// Load a persisted transaction by id, joining its asset row.
    pub fn load_confirmed_transaction(&self, id: &str) -> Result<Option<Transaction>, TransactionError> {
        let store = &self.services.store;
        let Some(base) = store.find(TRANSACTIONS_TABLE, &filter("id", id))?.into_iter().next() else {
            return Ok(None);
        };

        let mut joined: Row = base.into_iter().map(|(k, v)| (format!("t_{k}"), v)).collect();

        let tx_type = joined
            .get("t_type")
            .and_then(Value::as_u64)
            .and_then(|t| u8::try_from(t).ok())
            .ok_or_else(|| TransactionError::Normalize("t_type".into()))?;
        if let Some(table) = self.plugin(tx_type)?.asset_table() {
            if let Some(asset) = store
                .find(table.name, &filter("transaction_id", id))?
                .into_iter()
                .next()
            {
                joined.extend(asset.into_iter().map(|(k, v)| (format!("{}{k}", table.prefix), v)));
            }
        }

        self.deserialize_db_row(&joined)
    }
}

fn check_hex(field: &str, value: &str, bytes: usize) -> Result<(), TransactionError> {
    match hex::decode(value) {
        Ok(decoded) if decoded.len() == bytes => Ok(()),
        _ => Err(TransactionError::Normalize(format!(
            "{field} must be {bytes} bytes of hex"
        ))),
    }
}

fn str_col(raw: &Row, column: &str) -> Option<String> {
    raw.get(column).and_then(Value::as_str).map(str::to_string)
}

/// String or number column as a decimal string.
fn scalar_col(raw: &Row, column: &str) -> Option<String> {
    match raw.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::default_registry;
    use crate::chain::FixedSlotClock;
    use crate::config::{TYPE_SECOND_SIGNATURE, TYPE_TRANSFER};
    use crate::crypto::address_from_public_key;

    const FUNDS: u64 = 1_000_000_000;

    struct Harness {
        engine: TransactionEngine,
        ledger: MemoryLedger,
        store: MemoryStore,
        tip: Arc<MemoryChainTip>,
    }

    fn harness_with(config: EngineConfig) -> Harness {
        let ledger = MemoryLedger::new(config.address_prefix.clone());
        let store = MemoryStore::new();
        let tip = Arc::new(MemoryChainTip::new(1));
        let services = EngineServices {
            ledger: Arc::new(ledger.clone()),
            store: Arc::new(store.clone()),
            rounds: Arc::new(DelegateRounds::new(config.delegates)),
            slots: Arc::new(FixedSlotClock::new(1_000, config.slot_interval_secs)),
            tip: tip.clone(),
            broadcaster: Arc::new(NoopBroadcaster),
            notifier: Arc::new(NoopNotifier),
        };
        Harness {
            engine: TransactionEngine::new(config, default_registry(), services),
            ledger,
            store,
            tip,
        }
    }

    fn harness() -> Harness {
        harness_with(EngineConfig::default())
    }

    impl Harness {
        fn fund(&self, kp: &Keypair, amount: u64) -> Account {
            let prefix = &self.engine.config().address_prefix;
            let mut acct = Account::with_balance(address_from_public_key(prefix, &kp.public_key()), amount);
            acct.public_key = Some(kp.public_key_hex());
            self.ledger.insert_account(acct.clone());
            acct
        }

        fn account(&self, kp: &Keypair) -> Account {
            self.ledger
                .get_account_by_public_key(&kp.public_key_hex())
                .unwrap()
                .unwrap()
        }

        fn address(&self, kp: &Keypair) -> String {
            address_from_public_key(&self.engine.config().address_prefix, &kp.public_key())
        }

        fn transfer(&self, from: &Keypair, to: &Keypair, amount: u64) -> Transaction {
            let sender = self.account(from);
            self.engine
                .create(CreateRequest {
                    tx_type: TYPE_TRANSFER,
                    sender: &sender,
                    keypair: from,
                    second_keypair: None,
                    requester: None,
                    params: json!({ "recipient_id": self.address(to), "amount": amount.to_string() }),
                    message: None,
                    args: None,
                })
                .unwrap()
        }

        /// Recompute signature and id after a field was edited.
        fn resign(&self, kp: &Keypair, mut trs: Transaction) -> Transaction {
            trs.signature = None;
            trs.signature = Some(self.engine.sign(kp, &trs).unwrap());
            trs.id = self.engine.get_id(&trs).unwrap();
            trs
        }
    }

    fn cost(amount: u64) -> BigInt {
        BigInt::from(amount + EngineConfig::default().transfer_fee)
    }

    #[test]
    fn admission_debits_unconfirmed_balance_only() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);

        let trs = h.transfer(&alice, &bob, 40);
        let admitted = h.engine.process_unconfirmed_transaction(trs, false).unwrap();

        assert!(h.engine.has_unconfirmed_transaction(&admitted.id));
        let acct = h.account(&alice);
        assert_eq!(acct.u_balance, BigInt::from(FUNDS) - cost(40));
        assert_eq!(acct.balance, BigInt::from(FUNDS));
        assert_eq!(
            h.engine.balances().get_native_balance(&acct.address),
            Some(-cost(40))
        );
    }

    #[test]
    fn duplicate_submission_is_rejected_without_side_effects() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);

        let trs = h.transfer(&alice, &bob, 40);
        h.engine.process_unconfirmed_transaction(trs.clone(), false).unwrap();
        let before = h.account(&alice);

        let err = h.engine.process_unconfirmed_transaction(trs, false).unwrap_err();
        assert!(matches!(err, TransactionError::AlreadyPooled(_)));
        assert_eq!(h.account(&alice), before);
        assert_eq!(h.engine.unconfirmed_count(), 1);
    }

    #[test]
    fn insufficient_balance_leaves_state_untouched() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, 5);

        let trs = h.transfer(&alice, &bob, 40);
        let err = h.engine.process_unconfirmed_transaction(trs, false).unwrap_err();
        assert!(matches!(err, TransactionError::InsufficientBalance { .. }));
        assert_eq!(h.account(&alice).u_balance, BigInt::from(5));
        assert_eq!(h.engine.unconfirmed_count(), 0);
        assert!(h.engine.balances().get_native_balance(&h.address(&alice)).is_none());
    }

    #[test]
    fn unknown_sender_account_is_not_left_behind() {
        let h = harness();
        let ghost = Keypair::from_seed(&[9u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&ghost, FUNDS);
        let trs = h.transfer(&ghost, &bob, 40);

        let h2 = harness();
        let err = h2.engine.process_unconfirmed_transaction(trs, false).unwrap_err();
        assert!(matches!(err, TransactionError::InsufficientBalance { .. }));
        assert!(h2.ledger.is_empty());
    }

    #[test]
    fn tampered_fields_are_caught() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);
        let trs = h.transfer(&alice, &bob, 40);

        let mut changed = trs.clone();
        changed.amount = "41".into();
        assert!(matches!(
            h.engine.process_unconfirmed_transaction(changed.clone(), false),
            Err(TransactionError::IncorrectId)
        ));

        changed.id.clear();
        assert!(matches!(
            h.engine.process_unconfirmed_transaction(changed, false),
            Err(TransactionError::InvalidSignature(_))
        ));

        let mut wrong_fee = trs;
        wrong_fee.fee = "1".into();
        assert!(matches!(
            h.engine.process_unconfirmed_transaction(wrong_fee, false),
            Err(TransactionError::InvalidFee { .. })
        ));
        assert_eq!(h.account(&alice).u_balance, BigInt::from(FUNDS));
    }

    #[test]
    fn nethash_and_timestamp_checks() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);

        let mut foreign = h.transfer(&alice, &bob, 40);
        foreign.nethash = "ffffffff".into();
        let foreign = h.resign(&alice, foreign);
        assert!(matches!(
            h.engine.process_unconfirmed_transaction(foreign, false),
            Err(TransactionError::NethashMismatch)
        ));

        let mut missing = h.transfer(&alice, &bob, 40);
        missing.nethash.clear();
        let missing = h.resign(&alice, missing);
        assert!(matches!(
            h.engine.process_unconfirmed_transaction(missing, false),
            Err(TransactionError::MissingNethash)
        ));

        let mut future = h.transfer(&alice, &bob, 40);
        future.timestamp = 1_000 + 3 * 10;
        let future = h.resign(&alice, future);
        assert!(matches!(
            h.engine.process_unconfirmed_transaction(future, false),
            Err(TransactionError::InvalidTimestamp)
        ));

        let mut same_slot = h.transfer(&alice, &bob, 40);
        same_slot.timestamp = 1_009;
        let same_slot = h.resign(&alice, same_slot);
        assert!(h.engine.process_unconfirmed_transaction(same_slot, false).is_ok());
    }

    #[test]
    fn amount_above_network_maximum_is_invalid() {
        let mut config = EngineConfig::default();
        config.max_amount = 1;
        config.fixed_point = 100;
        let h = harness_with(config);
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);

        let trs = h.transfer(&alice, &bob, 101);
        assert!(matches!(
            h.engine.process_unconfirmed_transaction(trs, false),
            Err(TransactionError::InvalidAmount { .. })
        ));
        let trs = h.transfer(&alice, &bob, 100);
        assert!(h.engine.process_unconfirmed_transaction(trs, false).is_ok());
    }

    #[test]
    fn locked_account_cannot_transfer() {
        let mut config = EngineConfig::default();
        config.enable_more_lock_types = true;
        let h = harness_with(config);
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let mut acct = h.fund(&alice, FUNDS);
        acct.lock_height = 10;
        h.ledger.insert_account(acct);

        h.tip.set_height(5);
        let trs = h.transfer(&alice, &bob, 40);
        assert!(matches!(
            h.engine.process_unconfirmed_transaction(trs.clone(), false),
            Err(TransactionError::AccountLocked)
        ));

        h.tip.set_height(10);
        assert!(h.engine.process_unconfirmed_transaction(trs, false).is_ok());
    }

    #[test]
    fn second_signature_is_enforced() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let second = Keypair::from_seed(&[3u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let mut acct = h.fund(&alice, FUNDS);
        acct.second_signature = true;
        acct.second_public_key = Some(second.public_key_hex());
        h.ledger.insert_account(acct.clone());

        let unsigned = h.transfer(&alice, &bob, 40);
        assert!(unsigned.sign_signature.is_none());
        assert!(matches!(
            h.engine.process_unconfirmed_transaction(unsigned, false),
            Err(TransactionError::InvalidSecondSignature { .. })
        ));

        let signed = h
            .engine
            .create(CreateRequest {
                tx_type: TYPE_TRANSFER,
                sender: &acct,
                keypair: &alice,
                second_keypair: Some(&second),
                requester: None,
                params: json!({ "recipient_id": h.address(&bob), "amount": "40" }),
                message: None,
                args: None,
            })
            .unwrap();
        assert!(signed.sign_signature.is_some());
        assert!(h.engine.process_unconfirmed_transaction(signed, false).is_ok());
    }

    #[test]
    fn unexpected_second_signature_is_rejected() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let acct = h.fund(&alice, FUNDS);

        let mut trs = h.transfer(&alice, &bob, 40);
        trs.sign_signature = Some(h.engine.codec().second_sign(&bob, &trs).unwrap());
        assert!(matches!(
            h.engine.apply_unconfirmed_atomic(&trs, Some(&acct)),
            Err(TransactionError::UnexpectedSecondSignature("sender"))
        ));
    }

    #[test]
    fn undo_unconfirmed_restores_balance_and_pool() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);

        let first = h.engine.process_unconfirmed_transaction(h.transfer(&alice, &bob, 40), false).unwrap();
        let second = h.engine.process_unconfirmed_transaction(h.transfer(&alice, &bob, 60), false).unwrap();
        assert_ne!(first.id, second.id);

        let drained = h.engine.undo_unconfirmed_list().unwrap();
        assert_eq!(drained, vec![first.id, second.id]);
        assert_eq!(h.engine.unconfirmed_count(), 0);
        assert_eq!(h.account(&alice).u_balance, BigInt::from(FUNDS));
        assert_eq!(
            h.engine.balances().get_native_balance(&h.address(&alice)),
            Some(BigInt::from(0))
        );
    }

    #[test]
    fn commit_then_load_round_trip() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);

        let mut pooled = h.transfer(&alice, &bob, 40);
        pooled.message = Some("rent".into());
        pooled.args = Some(vec!["a".into()]);
        let pooled = h.resign(&alice, pooled);
        let pooled = h.engine.process_unconfirmed_transaction(pooled, false).unwrap();

        let block = BlockRef::new("b2", 2);
        let confirmed = h.engine.commit_transaction(&pooled, &block).unwrap();
        assert!(!h.engine.has_unconfirmed_transaction(&pooled.id));

        let alice_acct = h.account(&alice);
        assert_eq!(alice_acct.balance, BigInt::from(FUNDS) - cost(40));
        assert_eq!(alice_acct.block_id.as_deref(), Some("b2"));
        let bob_acct = h.account_by_address(&h.address(&bob));
        assert_eq!(bob_acct.balance, BigInt::from(40));
        assert_eq!(h.store.row_count(TRANSACTIONS_TABLE), 1);

        let loaded = h.engine.load_confirmed_transaction(&pooled.id).unwrap().unwrap();
        assert_eq!(loaded.id, confirmed.id);
        assert_eq!(loaded.amount, "40");
        assert_eq!(loaded.fee, confirmed.fee);
        assert_eq!(loaded.message.as_deref(), Some("rent"));
        assert_eq!(loaded.args, Some(vec!["a".to_string()]));
        assert_eq!(loaded.block_id.as_deref(), Some("b2"));
        assert_eq!(loaded.block_height, Some(2));
        assert_eq!(h.engine.get_id(&loaded).unwrap(), pooled.id);

        assert!(matches!(
            h.engine.process_unconfirmed_transaction(pooled, false),
            Err(TransactionError::AlreadyConfirmed)
        ));
    }

    impl Harness {
        fn account_by_address(&self, address: &str) -> Account {
            self.ledger.get_account(address).unwrap().unwrap()
        }
    }

    #[test]
    fn undo_reverses_apply() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let sender = h.fund(&alice, FUNDS);
        let trs = h.transfer(&alice, &bob, 40);
        let block = BlockRef::new("b2", 2);

        h.engine.apply_atomic(&trs, &block, &sender).unwrap();
        let applied = h.account(&alice);
        h.engine.undo_atomic(&trs, &block, &applied).unwrap();

        assert_eq!(h.account(&alice).balance, BigInt::from(FUNDS));
        assert_eq!(h.account_by_address(&h.address(&bob)).balance, BigInt::from(0));
    }

    #[test]
    fn apply_checks_confirmed_balance() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let sender = h.fund(&alice, 10);
        let trs = h.transfer(&alice, &bob, 40);
        assert!(matches!(
            h.engine.apply_atomic(&trs, &BlockRef::new("b2", 2), &sender),
            Err(TransactionError::InsufficientBalance { .. })
        ));
        assert_eq!(h.account(&alice).balance, BigInt::from(10));
    }

    #[test]
    fn genesis_transactions_skip_balance_checks() {
        let mut config = EngineConfig::default();
        config.genesis_block_id = "genesis".into();
        let h = harness_with(config);
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let sender = h.fund(&alice, 0);

        let mut trs = h.transfer(&alice, &bob, 40);
        trs.block_id = Some("genesis".into());
        h.engine.apply_unconfirmed_atomic(&trs, Some(&sender)).unwrap();
        h.engine
            .apply_atomic(&trs, &BlockRef::new("genesis", 1), &sender)
            .unwrap();
        assert_eq!(h.account_by_address(&h.address(&bob)).balance, BigInt::from(40));
    }

    #[test]
    fn missing_sender_needs_genesis_block() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);
        let trs = h.transfer(&alice, &bob, 40);
        assert!(matches!(
            h.engine.apply_unconfirmed_atomic(&trs, None),
            Err(TransactionError::InvalidBlockId)
        ));
    }

    #[test]
    fn pool_full_refuses_batches() {
        let mut config = EngineConfig::default();
        config.max_txs_per_block = 0;
        let h = harness_with(config);
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);

        let first = h.transfer(&alice, &bob, 40);
        h.engine.process_unconfirmed_transaction(first, false).unwrap();
        let batch = vec![h.transfer(&alice, &bob, 41)];
        assert!(matches!(
            h.engine.receive_transactions(batch),
            Err(TransactionError::PoolFull)
        ));
    }

    #[test]
    fn address_locks_are_released_after_a_batch() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);

        let batch = vec![h.transfer(&alice, &bob, 40), h.transfer(&alice, &bob, 41)];
        let admitted = h.engine.receive_transactions(batch).unwrap();
        assert_eq!(admitted.len(), 2);
        assert!(h.engine.locks.is_empty());
    }

    #[test]
    fn unsigned_transaction_is_refused_before_verification() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let sender = h.fund(&alice, FUNDS);

        let mut unsigned = h.transfer(&alice, &bob, 40);
        unsigned.signature = None;
        unsigned.id.clear();
        assert!(matches!(
            h.engine.process(unsigned, Some(&sender), None),
            Err(TransactionError::InvalidSignature("missing primary signature"))
        ));
    }

    #[test]
    fn unknown_type_is_a_typed_error() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let mut trs = Transaction::new(42, alice.public_key_hex());
        trs.nethash = h.engine.config().nethash.clone();
        assert!(matches!(
            h.engine.process_unconfirmed_transaction(trs, false),
            Err(TransactionError::UnknownType(42))
        ));
    }

    #[test]
    fn ready_requires_a_sender() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let sender = h.fund(&alice, FUNDS);
        let trs = h.transfer(&alice, &bob, 40);
        assert!(!h.engine.ready(&trs, None).unwrap());
        assert!(h.engine.ready(&trs, Some(&sender)).unwrap());
    }

    #[test]
    fn normalize_rejects_malformed_fields() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        h.fund(&alice, FUNDS);
        let trs = h.transfer(&alice, &bob, 40);
        assert!(h.engine.object_normalize(trs.clone()).is_ok());

        let mut bad_key = trs.clone();
        bad_key.sender_public_key = "abcd".into();
        assert!(matches!(
            h.engine.object_normalize(bad_key),
            Err(TransactionError::Normalize(_))
        ));

        let mut bad_amount = trs;
        bad_amount.amount = "1e5".into();
        assert!(matches!(
            h.engine.object_normalize(bad_amount),
            Err(TransactionError::Normalize(_))
        ));
    }

    #[test]
    fn process_resolves_the_requester_account() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let carol = Keypair::from_seed(&[3u8; 32]);
        let mut sender = h.fund(&alice, FUNDS);
        sender.multisignatures = vec![bob.public_key_hex()];
        let requester = h.fund(&bob, FUNDS);

        let trs = h
            .engine
            .create(CreateRequest {
                tx_type: TYPE_TRANSFER,
                sender: &sender,
                keypair: &bob,
                second_keypair: None,
                requester: Some(&requester),
                params: json!({ "recipient_id": h.address(&carol), "amount": "10" }),
                message: None,
                args: None,
            })
            .unwrap();

        assert!(matches!(
            h.engine.process(trs.clone(), Some(&sender), None),
            Err(TransactionError::InvalidRequester)
        ));
        let stranger = h.fund(&carol, FUNDS);
        assert!(matches!(
            h.engine.process(trs.clone(), Some(&sender), Some(&stranger)),
            Err(TransactionError::InvalidRequester)
        ));
        let processed = h
            .engine
            .process(trs, Some(&sender), Some(&requester))
            .unwrap();
        assert_eq!(processed.sender_id.as_deref(), Some(sender.address.as_str()));
    }

    #[test]
    fn second_signature_registration_flows_through_engine() {
        let h = harness();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let second = Keypair::from_seed(&[3u8; 32]);
        let sender = h.fund(&alice, FUNDS);

        let trs = h
            .engine
            .create(CreateRequest {
                tx_type: TYPE_SECOND_SIGNATURE,
                sender: &sender,
                keypair: &alice,
                second_keypair: None,
                requester: None,
                params: json!({ "public_key": second.public_key_hex() }),
                message: None,
                args: None,
            })
            .unwrap();
        let pooled = h.engine.process_unconfirmed_transaction(trs, false).unwrap();
        assert!(h.account(&alice).u_second_signature);

        h.engine.commit_transaction(&pooled, &BlockRef::new("b2", 2)).unwrap();
        let acct = h.account(&alice);
        assert!(acct.second_signature);
        assert_eq!(acct.second_public_key, Some(second.public_key_hex()));

        let loaded = h.engine.load_confirmed_transaction(&pooled.id).unwrap().unwrap();
        assert_eq!(loaded.asset.get("signature"), pooled.asset.get("signature"));
    }
}
