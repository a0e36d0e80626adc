// Shared builders for unit tests

use crate::records::{LedgerRecord, LocalRecord, RecordStatus};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn ledger(id: &str, name: &str, price: &str) -> LedgerRecord {
    ledger_on(id, name, price, day(2025, 3, 1))
}

pub fn ledger_on(id: &str, name: &str, price: &str, created: NaiveDate) -> LedgerRecord {
    LedgerRecord {
        id: id.to_string(),
        name: name.to_string(),
        code: format!("SKU-{}", id),
        price: dec(price),
        stock_quantity: 10,
        status: RecordStatus::Active,
        created_at: Utc.from_utc_datetime(&created.and_hms_opt(12, 0, 0).unwrap()),
    }
}

pub fn local(id: &str, name: &str, price: &str, ledger_id: Option<&str>) -> LocalRecord {
    LocalRecord {
        id: id.to_string(),
        name: name.to_string(),
        price: dec(price),
        status: RecordStatus::Active,
        ledger_id: ledger_id.map(|s| s.to_string()),
        category_id: None,
    }
}
