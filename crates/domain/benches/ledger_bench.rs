use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::{Money, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Actor, FeeSchedule, FulfillmentService, Ledger, RecordingSink, TransitionRequest,
};
use store::{InMemoryStore, Order, OrderStatus, TransactionType};

fn bench_credit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = Ledger::new(InMemoryStore::new());
    let user = UserId::new();
    let counter = AtomicU64::new(0);

    c.bench_function("ledger/credit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                ledger
                    .credit(user, Money::from_minor(100), TransactionType::Credit, &format!("bench:{n}"))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reconcile_1000(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = Ledger::new(InMemoryStore::new());
    let user = UserId::new();
    rt.block_on(async {
        for n in 0..1000 {
            ledger
                .credit(user, Money::from_minor(25), TransactionType::Credit, &format!("seed:{n}"))
                .await
                .unwrap();
        }
    });

    c.bench_function("ledger/reconcile_1000_rows", |b| {
        b.iter(|| {
            rt.block_on(async {
                let report = ledger.reconcile(user).await.unwrap();
                assert!(report.is_consistent());
            });
        });
    });
}

fn bench_order_to_settlement(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = FulfillmentService::new(
        InMemoryStore::new(),
        FeeSchedule::default(),
        Arc::new(RecordingSink::new()),
    );

    c.bench_function("domain/paid_to_completed_with_settlement", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = Order::new(
                    UserId::new(),
                    UserId::new(),
                    Money::from_minor(10_000),
                    Money::from_minor(1000),
                    Money::zero(),
                )
                .paid();
                let order = service.orders().place_order(order).await.unwrap();
                for target in [
                    OrderStatus::Processing,
                    OrderStatus::Dispatched,
                    OrderStatus::Completed,
                ] {
                    service
                        .orders()
                        .transition(TransitionRequest::new(order.id, target, Actor::System))
                        .await
                        .unwrap();
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_credit,
    bench_reconcile_1000,
    bench_order_to_settlement,
);
criterion_main!(benches);
