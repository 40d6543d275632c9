use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::Utc;

use agroerp_core::{ItemId, OrderId, WarehouseId};
use agroerp_events::{DomainEvent, InMemoryEventBus};
use agroerp_stock::{
    AvailabilityRequest, Reference, StockKey, StockLedger, StockRecord,
};

type BenchLedger = StockLedger<Arc<InMemoryEventBus<DomainEvent>>>;

fn seeded_ledger(on_hand: i64) -> (BenchLedger, StockKey) {
    let bus = Arc::new(InMemoryEventBus::new());
    let ledger = StockLedger::new(bus);
    let key = StockKey::new(ItemId::new(), WarehouseId::new());
    ledger.register(StockRecord::new(key).with_on_hand(on_hand));
    (ledger, key)
}

fn bench_reserve_release_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_release_cycle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_key", |b| {
        let (ledger, key) = seeded_ledger(i64::MAX / 2);
        let now = Utc::now();
        b.iter(|| {
            let reservation = ledger
                .reserve_stock(
                    black_box(key),
                    black_box(10),
                    Reference::order(OrderId::new()),
                    None,
                    now,
                )
                .unwrap();
            ledger.release_reservation(reservation.id, now).unwrap();
        });
    });

    group.finish();
}

fn bench_availability_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_availability");

    for lines in [1usize, 16, 64] {
        let (ledger, _key) = seeded_ledger(1_000);
        let requests: Vec<_> = (0..lines)
            .map(|_| {
                let key = StockKey::new(ItemId::new(), WarehouseId::new());
                ledger.register(StockRecord::new(key).with_on_hand(1_000));
                AvailabilityRequest {
                    item_id: key.item_id,
                    warehouse_id: key.warehouse_id,
                    quantity: 10,
                }
            })
            .collect();

        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &requests, |b, requests| {
            b.iter(|| black_box(ledger.check_availability(requests)));
        });
    }

    group.finish();
}

fn bench_movement_log_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("deduct_with_audit_append");
    group.throughput(Throughput::Elements(1));

    group.bench_function("deduct", |b| {
        let (ledger, key) = seeded_ledger(i64::MAX / 2);
        let now = Utc::now();
        b.iter(|| {
            ledger
                .deduct_stock(
                    black_box(key),
                    black_box(1),
                    Reference::order(OrderId::new()),
                    "bench",
                    now,
                )
                .unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_reserve_release_cycle,
    bench_availability_check,
    bench_movement_log_growth
);
criterion_main!(benches);
