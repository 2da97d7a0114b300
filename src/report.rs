//! Ranking and rendering of the final counts
//!
//! The engine never sorts or truncates; everything that needs an order lives here.

use std::collections::HashMap;

use crate::mr::coordinator::Frequencies;

/// The `n` most frequent words, highest count first
/// Ties are broken alphabetically so the ranking is stable across runs
pub fn top_n(counts: &HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = counts.iter().map(|(w, &c)| (w.clone(), c)).collect();
    ranked.sort_by(|(lw, lc), (rw, rc)| rc.cmp(lc).then_with(|| lw.cmp(rw)));
    ranked.truncate(n);
    ranked
}

/// Renders a horizontal bar chart of `ranked`, the longest bar being `width` wide
pub fn render_bars(ranked: &[(String, u64)], width: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("Top {} Most Common Words\n", ranked.len()));
    let Some(max) = ranked.iter().map(|(_, c)| *c).max() else {
        return out;
    };
    let label_width = ranked.iter().map(|(w, _)| w.chars().count()).max().unwrap_or(0);
    for (word, count) in ranked {
        // Every non-zero count gets at least one block
        let len = if max == 0 {
            0
        } else {
            ((*count as u128 * width as u128 + max as u128 - 1) / max as u128) as usize
        };
        out.push_str(&format!(
            "{:<label_width$} | {} {}\n",
            word,
            "#".repeat(len),
            count,
            label_width = label_width
        ));
    }
    out
}

/// Pretty JSON with the counts sorted by word
pub fn to_json(freq: &Frequencies) -> serde_json::Result<String> {
    let counts: std::collections::BTreeMap<_, _> = freq.counts.iter().collect();
    serde_json::to_string_pretty(&serde_json::json!({
        "counts": counts,
        "failures": freq.failures,
        "complete": freq.is_complete(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|&(w, n)| (w.to_string(), n)).collect()
    }

    #[test]
    fn test_top_n_orders_by_count_then_word() {
        let ranked = top_n(&counts(&[("b", 2), ("a", 2), ("c", 5), ("d", 1)]), 3);
        assert_eq!(
            ranked,
            vec![
                ("c".to_string(), 5),
                ("a".to_string(), 2),
                ("b".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_top_n_larger_than_input() {
        assert_eq!(top_n(&counts(&[("a", 1)]), 10).len(), 1);
        assert!(top_n(&HashMap::new(), 10).is_empty());
    }

    #[test]
    fn test_render_bars() {
        let chart = render_bars(&[("cat".to_string(), 4), ("on".to_string(), 1)], 8);
        assert_eq!(
            chart,
            "Top 2 Most Common Words\ncat | ######## 4\non  | ## 1\n"
        );
    }

    #[test]
    fn test_render_bars_empty() {
        assert_eq!(render_bars(&[], 10), "Top 0 Most Common Words\n");
    }

    #[test]
    fn test_to_json() {
        let freq = Frequencies {
            counts: counts(&[("b", 1), ("a", 2)]),
            failures: Vec::new(),
        };
        let value: serde_json::Value = serde_json::from_str(&to_json(&freq).unwrap()).unwrap();
        assert_eq!(value["counts"]["a"], 2);
        assert_eq!(value["complete"], true);
        assert!(value["failures"].as_array().unwrap().is_empty());
    }
}
