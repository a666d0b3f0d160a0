// Codec & admission benchmarks for the Meridian transaction core.
//
// Covers canonical encoding, id derivation, signing and verification, and
// end-to-end pool admission of transfers at various batch sizes.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use meridian_protocol::assets::default_registry;
use meridian_protocol::config::{EngineConfig, TYPE_MULTISIGNATURE, TYPE_TRANSFER};
use meridian_protocol::crypto::{address_from_public_key, Keypair};
use meridian_protocol::storage::{Account, MemoryLedger};
use meridian_protocol::transaction::{
    CreateRequest, EngineServices, Transaction, TransactionCodec, TransactionEngine,
};

fn engine_with_ledger() -> (TransactionEngine, MemoryLedger) {
    let config = EngineConfig::default();
    let ledger = MemoryLedger::new(config.address_prefix.clone());
    let mut services = EngineServices::in_memory(&config);
    services.ledger = Arc::new(ledger.clone());
    (
        TransactionEngine::new(config, default_registry(), services),
        ledger,
    )
}

fn funded(engine: &TransactionEngine, ledger: &MemoryLedger, kp: &Keypair) -> Account {
    let address = address_from_public_key(&engine.config().address_prefix, &kp.public_key());
    let mut acct = Account::with_balance(address, u64::MAX);
    acct.public_key = Some(kp.public_key_hex());
    ledger.insert_account(acct.clone());
    acct
}

fn transfer(engine: &TransactionEngine, sender: &Account, kp: &Keypair, amount: u64) -> Transaction {
    let recipient = address_from_public_key(&engine.config().address_prefix, &Keypair::from_seed(&[9; 32]).public_key());
    engine
        .create(CreateRequest {
            tx_type: TYPE_TRANSFER,
            sender,
            keypair: kp,
            second_keypair: None,
            requester: None,
            params: json!({ "recipient_id": recipient, "amount": amount.to_string() }),
            message: None,
            args: None,
        })
        .unwrap()
}

fn bench_get_bytes(c: &mut Criterion) {
    let (engine, ledger) = engine_with_ledger();
    let kp = Keypair::from_seed(&[1; 32]);
    let sender = funded(&engine, &ledger, &kp);
    let trs = transfer(&engine, &sender, &kp, 40);
    let codec = TransactionCodec::new(Arc::new(default_registry()));

    c.bench_function("codec/get_bytes_transfer", |b| {
        b.iter(|| codec.get_bytes(&trs, false, false).unwrap());
    });
    c.bench_function("codec/get_id_transfer", |b| {
        b.iter(|| codec.get_id(&trs).unwrap());
    });

    let cosigners: Vec<String> = (2..18u8)
        .map(|s| format!("+{}", Keypair::from_seed(&[s; 32]).public_key_hex()))
        .collect();
    let group = engine
        .create(CreateRequest {
            tx_type: TYPE_MULTISIGNATURE,
            sender: &sender,
            keypair: &kp,
            second_keypair: None,
            requester: None,
            params: json!({ "min": 16, "keysgroup": cosigners, "lifetime": 24 }),
            message: None,
            args: None,
        })
        .unwrap();
    c.bench_function("codec/get_bytes_multisig_16", |b| {
        b.iter(|| codec.get_bytes(&group, false, false).unwrap());
    });
}

fn bench_sign_verify(c: &mut Criterion) {
    let (engine, ledger) = engine_with_ledger();
    let kp = Keypair::from_seed(&[1; 32]);
    let sender = funded(&engine, &ledger, &kp);
    let trs = transfer(&engine, &sender, &kp, 40);
    let pk = kp.public_key_hex();

    c.bench_function("codec/sign_transfer", |b| {
        b.iter(|| engine.sign(&kp, &trs).unwrap());
    });
    c.bench_function("codec/verify_transfer", |b| {
        b.iter(|| engine.verify_signature(&trs, &pk, trs.signature.as_deref()).unwrap());
    });
}

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/admit_transfers");

    for size in [10, 50, 100] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_with_setup(
                || {
                    let (engine, ledger) = engine_with_ledger();
                    let kp = Keypair::from_seed(&[1; 32]);
                    let sender = funded(&engine, &ledger, &kp);
                    let batch: Vec<Transaction> = (1..=size as u64)
                        .map(|amount| transfer(&engine, &sender, &kp, amount))
                        .collect();
                    (engine, batch)
                },
                |(engine, batch)| {
                    for trs in batch {
                        engine.process_unconfirmed_transaction(trs, false).unwrap();
                    }
                },
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_get_bytes, bench_sign_verify, bench_admission);
criterion_main!(benches);
