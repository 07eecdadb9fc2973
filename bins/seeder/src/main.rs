//! Demonstration seeder for Kardex development.
//!
//! Builds an in-memory ledger with receipts, a backdated receipt, a transfer,
//! a return, an invoice and a landed cost, then prints bin balances and the
//! trial balance as JSON.
//!
//! Usage: cargo run --bin seeder
//!
//! Set `KARDEX_LOG_FORMAT=json` for JSON log lines.

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use kardex_core::InventoryService;
use kardex_core::ledger::TrialBalance;
use kardex_core::valuation::BinSnapshot;
use kardex_core::voucher::{AllocationBasis, LandedCharge, ReturnRequest, Voucher, VoucherLine};
use kardex_shared::AppConfig;
use kardex_shared::types::{ItemCode, WarehouseCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ITEM: &str = "WIDGET";
const STORES: &str = "Stores";
const SHOP: &str = "Shop";

#[derive(Serialize)]
struct BinReport {
    item: ItemCode,
    warehouse: WarehouseCode,
    balance: BinSnapshot,
}

#[derive(Serialize)]
struct SeedReport {
    bins: Vec<BinReport>,
    trial_balance: TrialBalance,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(
        valuation_method = ?config.stock.default_valuation_method,
        repost_mode = ?config.stock.repost_mode,
        "configuration loaded"
    );

    let service = InventoryService::new(&config);
    seed(&service)?;
    service
        .run_pending_reposts()
        .context("pending reposts failed")?;

    let mut bins = Vec::new();
    for warehouse in [STORES, SHOP] {
        let (item, warehouse) = (ItemCode::from(ITEM), WarehouseCode::from(warehouse));
        let balance = service.get_valuation(&item, &warehouse)?;
        bins.push(BinReport {
            item,
            warehouse,
            balance,
        });
    }
    let report = SeedReport {
        bins,
        trial_balance: service.trial_balance()?,
    };
    anyhow::ensure!(report.trial_balance.is_balanced(), "seeded ledger does not balance");

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kardex=debug,kardex_core=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("KARDEX_LOG_FORMAT").is_ok_and(|format| format == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn day(day: u32) -> anyhow::Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .and_then(|date| date.and_hms_opt(9, 0, 0))
        .with_context(|| format!("invalid seed day {day}"))
}

fn receipt(posted_at: NaiveDateTime, qty: Decimal, rate: Decimal) -> Voucher {
    Voucher::purchase_receipt(posted_at).with_line(VoucherLine::new(ITEM, qty, rate).with_warehouse(STORES))
}

fn seed(service: &InventoryService) -> anyhow::Result<()> {
    let first = service.submit_transaction(receipt(day(5)?, dec!(20), dec!(100)))?;

    let transfer = Voucher::stock_transfer(day(8)?).with_line(
        VoucherLine::new(ITEM, dec!(12), Decimal::ZERO)
            .with_warehouse(STORES)
            .with_target_warehouse(SHOP),
    );
    service.submit_transaction(transfer)?;

    // Backdated before the transfer; reposts Stores and, through it, Shop.
    let backdated = service.submit_transaction(receipt(day(2)?, dec!(10), dec!(120)))?;
    tracing::debug!(
        reposted = backdated.repost.entries_rewritten,
        bins = backdated.repost.touched_bins.len(),
        "backdated receipt posted"
    );

    let original = service.voucher(first.voucher_id)?;
    let line = original
        .lines
        .first()
        .context("seeded receipt has no lines")?
        .id;
    let ret = service.make_return(
        first.voucher_id,
        &[ReturnRequest::accepted(line, dec!(2))],
        day(10)?,
    )?;
    service.submit_transaction(ret)?;

    let invoice = service.make_invoice(first.voucher_id, day(12)?)?;
    service.submit_transaction(invoice)?;

    service.apply_landed_cost(
        backdated.voucher_id,
        &[LandedCharge::new("Freight Inward", dec!(150))],
        AllocationBasis::Amount,
    )?;
    Ok(())
}
