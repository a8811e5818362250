//! Text and JSON rendering of subtotal trees.

use std::fmt::{self, Write};

use crate::consolidate::Consolidated;
use crate::subtotal::SubtotalNode;

const INDENT: &str = "  ";

fn write_node(out: &mut impl Write, node: &SubtotalNode, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    write!(out, "{pad}{}  {}", node.key, node.aggregate.normalize())?;
    if let Some(converted) = node.converted {
        write!(out, "  [{}]", converted.normalize())?;
    }
    writeln!(out)?;

    let inner = INDENT.repeat(depth + 1);
    if let Some(series) = &node.series {
        for point in &series.points {
            writeln!(out, "{inner}{}  {}", point.date, point.cumulative.normalize())?;
        }
    }
    for entry in &node.entries {
        let date = entry
            .date
            .map_or_else(|| "[null]".to_string(), |d| d.to_string());
        let id = entry.voucher_id.as_deref().unwrap_or("-");
        writeln!(
            out,
            "{inner}^{id}^ {date} #{} x{}",
            entry.detail_index,
            entry.coefficient.normalize()
        )?;
    }
    for child in &node.children {
        write_node(out, child, depth + 1)?;
    }
    Ok(())
}

fn write_consolidated(out: &mut impl Write, consolidated: &Consolidated) -> fmt::Result {
    write_node(out, &consolidated.result.root, 0)?;
    let currency = &consolidated.reporting_currency;
    match consolidated.grand_total {
        Some(total) => writeln!(out, "= {} {currency}", total.normalize())?,
        None => writeln!(out, "= ? {currency}")?,
    }
    for miss in &consolidated.unconverted {
        let path: Vec<String> = miss.path.iter().map(ToString::to_string).collect();
        writeln!(out, "! {}: {}", path.join("/"), miss.error)?;
    }
    Ok(())
}

/// Render a bucket tree as indented text, two spaces per level.
///
/// Each line is `key  aggregate`, followed by the converted value in
/// brackets when present. Every-day series print one `date  cumulative`
/// line per day below their bucket.
#[must_use]
pub fn format_text(node: &SubtotalNode) -> String {
    let mut out = String::new();
    write_node(&mut out, node, 0).expect("writing to a String cannot fail");
    out
}

/// Render a consolidated subtotal, with a trailer naming what failed to convert.
#[must_use]
pub fn format_consolidated(consolidated: &Consolidated) -> String {
    let mut out = String::new();
    write_consolidated(&mut out, consolidated).expect("writing to a String cannot fail");
    out
}

/// Render a bucket tree as a JSON value.
pub fn to_json(node: &SubtotalNode) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(node)
}

/// Render a bucket tree as pretty-printed JSON.
pub fn to_json_string(node: &SubtotalNode) -> serde_json::Result<String> {
    serde_json::to_string_pretty(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::Unconverted;
    use crate::series::{DayPoint, DaySeries};
    use crate::subtotal::{Aggregation, BucketKey, GroupBy, SubtotalResult};
    use rustacct_core::RateError;
    use rust_decimal_macros::dec;
    use rustacct_core::NaiveDate;

    fn node(key: BucketKey, aggregate: rust_decimal::Decimal) -> SubtotalNode {
        SubtotalNode {
            key,
            aggregate,
            converted: None,
            children: Vec::new(),
            entries: Vec::new(),
            series: None,
        }
    }

    fn sample() -> SubtotalNode {
        let mut lunch = node(BucketKey::Content(Some("lunch".into())), dec!(100.00));
        lunch.converted = Some(dec!(100));
        let mut root = node(BucketKey::Root, dec!(130));
        root.children = vec![lunch, node(BucketKey::Content(None), dec!(30))];
        root
    }

    #[test]
    fn test_format_text() {
        let text = format_text(&sample());
        assert_eq!(text, "TOTAL  130\n  lunch  100  [100]\n  [none]  30\n");
    }

    #[test]
    fn test_format_series() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut leaf = node(BucketKey::Title(6602), dec!(5));
        leaf.series = Some(DaySeries {
            carry_in: dec!(0),
            points: vec![DayPoint {
                date: d,
                cumulative: dec!(5),
            }],
        });
        let text = format_text(&leaf);
        assert_eq!(text, "T6602  5\n  2024-01-01  5\n");
    }

    #[test]
    fn test_format_consolidated_partial() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let mut usd = node(BucketKey::Currency("USD".into()), dec!(2));
        usd.converted = Some(dec!(14));
        let mut root = node(BucketKey::Root, dec!(5));
        root.children = vec![usd, node(BucketKey::Currency("EUR".into()), dec!(3))];
        let consolidated = Consolidated {
            result: SubtotalResult {
                levels: vec![GroupBy::Currency],
                aggregation: Aggregation::Sum,
                root,
            },
            reporting_currency: "CNY".into(),
            grand_total: None,
            unconverted: vec![Unconverted {
                path: vec![BucketKey::Currency("EUR".into())],
                currency: "EUR".into(),
                date: day,
                error: RateError::MissingRate {
                    from: "EUR".into(),
                    to: "CNY".into(),
                    date: day,
                },
            }],
        };
        assert_eq!(
            format_consolidated(&consolidated),
            "TOTAL  5\n  USD  2  [14]\n  EUR  3\n= ? CNY\n\
             ! EUR: no rate from EUR to CNY on or before 2024-01-31\n"
        );
    }

    #[test]
    fn test_to_json() {
        let value = to_json(&sample()).unwrap();
        assert_eq!(value["key"], serde_json::Value::Null);
        assert_eq!(value["children"][0]["key"], "lunch");
        assert_eq!(value["children"][0]["aggregate"], "100.00");
        assert!(value["children"][1].get("converted").is_none());
        assert!(value.get("series").is_none());
    }
}
