//! Integration tests for the query engine.
//!
//! Tests cover query compilation, named templates, grouping, every-day
//! balances and currency consolidation over a small household ledger.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use rustacct_core::{
    DateFilter, LedgerStore, NaiveDate, PriceEntry, PriceTable, StoreError, Voucher,
    VoucherDetail, VoucherStream,
};
use rustacct_query::{
    compile, consolidate, format_text, group, run, to_json, Aggregation, BucketKey, ErrorKind,
    GroupBy, QueryError, QueryExpr, ResolvedQuery, SubtotalSpec, TemplateRegistry, TemplateSpec,
    TemplateTable,
};
use std::sync::Mutex;

// ============================================================================
// Helper Functions
// ============================================================================

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn january() -> DateFilter {
    DateFilter::between(date(2024, 1, 1), date(2024, 1, 31))
}

fn make_ledger() -> Vec<Voucher> {
    vec![
        // T1: lunch
        Voucher::new(Some(date(2024, 1, 1)))
            .with_id("t1")
            .with_detail(VoucherDetail::new(1001, dec!(-100)))
            .with_detail(
                VoucherDetail::new(6602, dec!(100))
                    .with_sub_title(3)
                    .with_content("lunch"),
            ),
        // T2: taxi, paid by card
        Voucher::new(Some(date(2024, 1, 9)))
            .with_id("t2")
            .with_detail(VoucherDetail::new(2241, dec!(-45)).with_content("card"))
            .with_detail(
                VoucherDetail::new(6602, dec!(45))
                    .with_sub_title(1)
                    .with_content("taxi"),
            ),
        // T3: salary
        Voucher::new(Some(date(2024, 1, 15)))
            .with_id("t3")
            .with_detail(VoucherDetail::new(6001, dec!(-5000)))
            .with_detail(VoucherDetail::new(1002, dec!(5000)).with_content("bank")),
        // T4: dinner abroad
        Voucher::new(Some(date(2024, 2, 3)))
            .with_id("t4")
            .with_detail(VoucherDetail::new(1002, dec!(-12)).with_currency("USD").with_content("bank"))
            .with_detail(
                VoucherDetail::new(6602, dec!(12))
                    .with_currency("USD")
                    .with_sub_title(3)
                    .with_content("dinner"),
            ),
    ]
}

fn parse(json: &str) -> QueryExpr {
    serde_json::from_str(json).unwrap()
}

fn ok_stream(vouchers: Vec<Voucher>) -> impl Iterator<Item = Result<Voucher, StoreError>> {
    vouchers.into_iter().map(Ok)
}

/// Minimal store that records the hint it was scanned with.
struct VecStore {
    vouchers: Vec<Voucher>,
    last_hint: Mutex<Option<DateFilter>>,
}

impl VecStore {
    fn new(vouchers: Vec<Voucher>) -> Self {
        Self {
            vouchers,
            last_hint: Mutex::new(None),
        }
    }
}

impl LedgerStore for VecStore {
    fn scan(&self, hint: &DateFilter) -> Result<VoucherStream<'_>, StoreError> {
        *self.last_hint.lock().unwrap() = Some(*hint);
        Ok(Box::new(self.vouchers.iter().cloned().map(Ok)))
    }

    fn upsert(&self, _voucher: Voucher) -> Result<String, StoreError> {
        Err(StoreError::Unavailable("read only".into()))
    }

    fn delete(&self, _id: &str) -> Result<bool, StoreError> {
        Ok(false)
    }
}

struct DownStore;

impl LedgerStore for DownStore {
    fn scan(&self, _hint: &DateFilter) -> Result<VoucherStream<'_>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn upsert(&self, _voucher: Voucher) -> Result<String, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn delete(&self, _id: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

fn templates() -> TemplateTable {
    let specs: Vec<TemplateSpec> = serde_json::from_str(
        r#"[
            {"name": "meals", "items": [{"query": {"op": "atom", "title": 6602, "sub_title": 3}}],
             "inherits_range": true},
            {"name": "transport", "items": [{"query": {"op": "atom", "title": 6602, "sub_title": 1}}],
             "inherits_range": true},
            {"name": "spending", "items": [{"ref": {"name": "meals"}}, {"ref": {"name": "transport"}}],
             "range": {"start": "2024-01-01", "end": "2024-01-31"}},
            {"name": "net", "items": [{"ref": {"name": "spending", "coefficient": "-1"}}]}
        ]"#,
    )
    .unwrap();
    TemplateTable::from_specs(&specs).unwrap()
}

// ============================================================================
// Grouping
// ============================================================================

#[test]
fn test_lunch_by_content_in_january() {
    let query = ResolvedQuery::from_tree(compile(&QueryExpr::title(6602)).unwrap());
    let spec = SubtotalSpec::new(vec![GroupBy::Content]).with_range(january());
    let result = group(ok_stream(make_ledger()), &query, &spec).unwrap();

    let lunch = result
        .root
        .child(&BucketKey::Content(Some("lunch".into())))
        .unwrap();
    assert_eq!(lunch.aggregate, dec!(100));
    assert!(result
        .root
        .child(&BucketKey::Content(Some("dinner".into())))
        .is_none());
    assert_eq!(result.root.aggregate, dec!(145));
}

#[test]
fn test_nested_levels() {
    let query = ResolvedQuery::from_tree(compile(&parse(r#"{"op": "atom"}"#)).unwrap());
    let spec = SubtotalSpec::new(vec![GroupBy::Currency, GroupBy::Title, GroupBy::SubTitle]).sorted();
    let result = group(ok_stream(make_ledger()), &query, &spec).unwrap();

    let cny = result.root.child(&BucketKey::Currency("CNY".into())).unwrap();
    let expense = cny.child(&BucketKey::Title(6602)).unwrap();
    let sub: Vec<&BucketKey> = expense.children.iter().map(|c| &c.key).collect();
    assert_eq!(sub, vec![&BucketKey::SubTitle(Some(1)), &BucketKey::SubTitle(Some(3))]);

    // Every voucher balances, so every currency nets to zero.
    for currency in &result.root.children {
        assert_eq!(currency.aggregate, Decimal::ZERO, "{}", currency.key);
    }
}

#[test]
fn test_subtract_and_for_all() {
    // Expenses not paid from cash.
    let expr = parse(
        r#"{"op": "intersect", "operands": [
            {"op": "atom", "title": 6602},
            {"op": "complement", "operands": [
                {"op": "for_all", "operands": [
                    {"op": "atom", "direction": "negative"},
                    {"op": "atom", "title": 1001}
                ]}
            ]}
        ]}"#,
    );
    let query = ResolvedQuery::from_tree(compile(&expr).unwrap());
    let spec = SubtotalSpec::new(vec![GroupBy::Content]);
    let result = group(ok_stream(make_ledger()), &query, &spec).unwrap();
    let keys: Vec<String> = result.root.children.iter().map(|c| c.key.to_string()).collect();
    assert_eq!(keys, vec!["taxi", "dinner"]);
}

#[test]
fn test_text_output() {
    let query = ResolvedQuery::from_tree(compile(&QueryExpr::title(6602)).unwrap());
    let spec = SubtotalSpec::new(vec![GroupBy::Content]).with_range(january());
    let result = group(ok_stream(make_ledger()), &query, &spec).unwrap();
    assert_eq!(
        format_text(&result.root),
        "TOTAL  145\n  lunch  100\n  taxi  45\n"
    );
    let json = to_json(&result.root).unwrap();
    assert_eq!(json["children"][0]["aggregate"], "100");
}

// ============================================================================
// Named Templates
// ============================================================================

#[test]
fn test_template_ranges_and_coefficients() {
    let table = templates();

    // "spending" limits inheriting children to January, so dinner is excluded.
    let spending = table.resolve("spending", dec!(1), None).unwrap();
    let spec = SubtotalSpec::new(vec![GroupBy::Content]);
    let result = group(ok_stream(make_ledger()), &spending, &spec).unwrap();
    assert_eq!(result.root.aggregate, dec!(145));

    let net = table.resolve("net", dec!(1), None).unwrap();
    let negated = group(ok_stream(make_ledger()), &net, &spec).unwrap();
    assert_eq!(negated.root.aggregate, dec!(-145));
}

#[test]
fn test_coefficient_linearity_over_templates() {
    let table = templates();
    let spec = SubtotalSpec::new(vec![GroupBy::Content]);
    let once = group(
        ok_stream(make_ledger()),
        &table.resolve("meals", dec!(1), None).unwrap(),
        &spec,
    )
    .unwrap();
    let thrice = group(
        ok_stream(make_ledger()),
        &table.resolve("meals", dec!(3), None).unwrap(),
        &spec,
    )
    .unwrap();
    for (a, b) in once.root.children.iter().zip(&thrice.root.children) {
        assert_eq!(a.key, b.key);
        assert_eq!(a.aggregate * dec!(3), b.aggregate);
    }
}

#[test]
fn test_unknown_and_cyclic_templates() {
    let table = templates();
    let err = table.resolve("ghost", dec!(1), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedQuery);

    let cyclic: Vec<TemplateSpec> = serde_json::from_str(
        r#"[
            {"name": "a", "items": [{"ref": {"name": "b"}}]},
            {"name": "b", "items": [{"ref": {"name": "a"}}]}
        ]"#,
    )
    .unwrap();
    let err = TemplateTable::from_specs(&cyclic).unwrap_err();
    assert!(matches!(err, QueryError::CyclicReference(_)));
    assert!(err.to_string().contains("->"));
}

#[test]
fn test_registry_reload_is_atomic_for_readers() {
    let registry = TemplateRegistry::new(templates());
    let snapshot = registry.snapshot();
    registry.replace(TemplateTable::default());
    assert!(registry.resolve("meals", dec!(1), None).is_err());
    assert!(snapshot.resolve("meals", dec!(1), None).is_ok());
}

// ============================================================================
// Store Scans
// ============================================================================

#[test]
fn test_run_passes_hint() {
    let store = VecStore::new(make_ledger());
    let query = templates().resolve("spending", dec!(1), None).unwrap();
    let spec = SubtotalSpec::new(vec![]);
    let result = run(&store, &query, &spec).unwrap();
    assert_eq!(result.root.aggregate, dec!(145));

    let hint = (*store.last_hint.lock().unwrap()).unwrap();
    assert_eq!(hint.start, Some(date(2024, 1, 1)));
    assert_eq!(hint.end, Some(date(2024, 1, 31)));
}

#[test]
fn test_store_failure_is_retryable_kind() {
    let query = ResolvedQuery::from_tree(compile(&QueryExpr::title(6602)).unwrap());
    let err = run(&DownStore, &query, &SubtotalSpec::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
}

// ============================================================================
// Every Day
// ============================================================================

#[test]
fn test_every_day_over_empty_range() {
    let query = ResolvedQuery::from_tree(compile(&QueryExpr::title(6602)).unwrap());
    let spec = SubtotalSpec::new(vec![])
        .with_aggregation(Aggregation::EveryDay)
        .with_range(DateFilter::between(date(2024, 1, 20), date(2024, 1, 31)));
    let result = group(ok_stream(make_ledger()), &query, &spec).unwrap();
    let series = result.root.series.as_ref().unwrap();

    assert_eq!(series.points.len(), 12);
    assert_eq!(series.carry_in, dec!(145));
    assert!(series.points.iter().all(|p| p.cumulative == dec!(145)));
}

#[test]
fn test_every_day_balance_of_cash() {
    let query = ResolvedQuery::from_tree(compile(&QueryExpr::title(1002)).unwrap());
    let spec = SubtotalSpec::new(vec![GroupBy::Currency])
        .with_aggregation(Aggregation::EveryDay)
        .with_range(DateFilter::between(date(2024, 1, 14), date(2024, 2, 3)));
    let result = group(ok_stream(make_ledger()), &query, &spec).unwrap();

    let cny = result.root.child(&BucketKey::Currency("CNY".into())).unwrap();
    let series = cny.series.as_ref().unwrap();
    assert_eq!(series.points[0].cumulative, dec!(0));
    assert_eq!(series.points[1].cumulative, dec!(5000));
    assert_eq!(series.points.last().unwrap().cumulative, dec!(5000));

    let usd = result.root.child(&BucketKey::Currency("USD".into())).unwrap();
    let series = usd.series.as_ref().unwrap();
    assert_eq!(series.points.len(), 21);
    assert_eq!(series.points.last().unwrap().cumulative, dec!(-12));
}

// ============================================================================
// Consolidation
// ============================================================================

#[test]
fn test_consolidated_expenses() {
    let rates = PriceTable::from_entries(vec![PriceEntry {
        date: date(2024, 1, 1),
        currency: "USD".into(),
        price: dec!(7.2),
        quote: "CNY".into(),
    }]);
    let query = ResolvedQuery::from_tree(compile(&QueryExpr::title(6602)).unwrap());
    let spec = SubtotalSpec::new(vec![GroupBy::Currency, GroupBy::Content]);
    let result = group(ok_stream(make_ledger()), &query, &spec).unwrap();
    let out = consolidate(result, "CNY", &rates, date(2024, 12, 31)).unwrap();

    assert!(out.is_complete());
    // 145 CNY + 12 USD * 7.2
    assert_eq!(out.grand_total, Some(dec!(231.4)));
    let usd = out
        .result
        .root
        .child(&BucketKey::Currency("USD".into()))
        .unwrap();
    assert_eq!(usd.aggregate, dec!(12));
}
