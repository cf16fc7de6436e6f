use crate::metrics::SymbolMetric;

/// Render one digest line per metric, in input order. Empty input renders
/// an empty string; callers must not send that.
pub fn format_digest(metrics: &[SymbolMetric]) -> String {
    metrics
        .iter()
        .map(digest_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn digest_line(m: &SymbolMetric) -> String {
    format!(
        "**{}**: {:.2}$ | D{}: {:.1}% | M{}: {:.1}% | Y{}: {:.1}% | A{}: {:.1}%",
        m.symbol,
        m.price,
        direction(m.change_24h),
        m.change_24h,
        direction(m.change_30d),
        m.change_30d,
        direction(m.change_1y),
        m.change_1y,
        direction(m.change_all_time),
        m.change_all_time,
    )
}

// Zero counts as up.
fn direction(value: f64) -> &'static str {
    if value >= 0.0 { "🟢" } else { "🔴" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(symbol: &str, price: f64, changes: [f64; 4]) -> SymbolMetric {
        SymbolMetric {
            symbol: symbol.to_string(),
            price,
            change_24h: changes[0],
            change_30d: changes[1],
            change_1y: changes[2],
            change_all_time: changes[3],
        }
    }

    #[test]
    fn empty_input_renders_empty_string() {
        assert_eq!(format_digest(&[]), "");
    }

    #[test]
    fn single_line_rounds_and_marks_direction() {
        let text = format_digest(&[metric("BTC", 50000.0, [2.5, 8.33, 62.5, 550.0])]);

        assert!(text.contains("**BTC**: 50000.00$"));
        assert!(text.contains("D🟢: 2.5%"));
        assert!(text.contains("M🟢: 8.3%"));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn negative_changes_are_marked_down() {
        let text = format_digest(&[metric("ETH", 3000.0, [-1.2, -10.0, 5.0, -0.5])]);

        assert!(text.contains("D🔴: -1.2%"));
        assert!(text.contains("M🔴: -10.0%"));
        assert!(text.contains("Y🟢: 5.0%"));
        assert!(text.contains("A🔴: -0.5%"));
    }

    #[test]
    fn zero_change_counts_as_up() {
        let text = format_digest(&[metric("ADA", 0.5, [0.0, 0.0, 0.0, 0.0])]);
        assert!(text.contains("D🟢: 0.0%"));
        assert!(!text.contains('🔴'));
    }

    #[test]
    fn lines_follow_input_order() {
        let text = format_digest(&[
            metric("SOL", 150.0, [1.0, 1.0, 1.0, 1.0]),
            metric("BTC", 65000.0, [1.0, 1.0, 1.0, 1.0]),
        ]);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("**SOL**"));
        assert!(lines[1].starts_with("**BTC**"));
    }
}
