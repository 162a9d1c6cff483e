//! Column-mapping suggestion between two independently-named schemas.
//!
//! The mapper is a stateless, no-I/O heuristic: it reduces manual effort but
//! is never authoritative. The writer re-validates every target name against
//! the live schema regardless of what was proposed, and callers may override
//! any entry before submission.

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};

/// Minimum similarity score for a fuzzy proposal; below this a source column
/// is left unmapped.
pub const SIMILARITY_FLOOR: f64 = 0.6;

/// Ordered source -> optional-target correspondence. A `None` target means
/// "skip this source column". Mapped targets are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    entries: Vec<(String, Option<String>)>,
}

impl ColumnMapping {
    /// Starts an all-skip mapping over the given source columns.
    pub fn new(source_columns: &[String]) -> Self {
        Self {
            entries: source_columns
                .iter()
                .map(|s| (s.clone(), None))
                .collect(),
        }
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s == source)
            .and_then(|(_, t)| t.as_deref())
    }

    /// Overrides one entry. Returns false when `source` is not a known
    /// source column.
    pub fn set(&mut self, source: &str, target: Option<String>) -> bool {
        match self.entries.iter_mut().find(|(s, _)| s == source) {
            Some(entry) => {
                entry.1 = target;
                true
            }
            None => false,
        }
    }

    /// Mapped `(source, target)` pairs in source order; skipped entries are
    /// omitted.
    pub fn mapped_pairs(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(s, t)| t.as_deref().map(|t| (s.as_str(), t)))
            .collect()
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(s, _)| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, t)| t.is_none())
    }

    /// Writes the mapped pairs as a YAML document (skips are omitted).
    pub fn save(&self, path: &Path) -> Result<()> {
        let doc: BTreeMap<&str, &str> = self.mapped_pairs().into_iter().collect();
        let file = File::create(path).with_context(|| format!("Creating mapping file {path:?}"))?;
        serde_yaml::to_writer(file, &doc).context("Writing mapping YAML")
    }

    /// Loads caller overrides from a YAML document of `source: target` pairs.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening mapping file {path:?}"))?;
        let doc: BTreeMap<String, String> =
            serde_yaml::from_reader(BufReader::new(file)).context("Parsing mapping YAML")?;
        Ok(Self {
            entries: doc.into_iter().map(|(s, t)| (s, Some(t))).collect(),
        })
    }
}

/// Proposes a 1:1 source-to-target mapping by name similarity.
///
/// Exact comparison-key matches claim their targets first; remaining sources
/// take the highest-scoring unclaimed target at or above
/// [`SIMILARITY_FLOOR`], or stay unmapped. Equal scores resolve in favor of
/// the source whose raw name needed the fewest characters stripped to build
/// its key, then by earliest target declaration order.
pub fn suggest_mapping(source_columns: &[String], target_columns: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::new(source_columns);
    let source_keys: Vec<String> = source_columns.iter().map(|s| comparison_key(s)).collect();
    let target_keys: Vec<String> = target_columns.iter().map(|t| comparison_key(t)).collect();

    let mut source_taken = vec![false; source_columns.len()];
    let mut target_taken = vec![false; target_columns.len()];

    // Exact key matches first, in source order.
    for (si, skey) in source_keys.iter().enumerate() {
        if skey.is_empty() {
            continue;
        }
        let exact = target_keys
            .iter()
            .enumerate()
            .find(|(ti, tkey)| !target_taken[*ti] && *tkey == skey)
            .map(|(ti, _)| ti);
        if let Some(ti) = exact {
            source_taken[si] = true;
            target_taken[ti] = true;
            mapping.set(&source_columns[si], Some(target_columns[ti].clone()));
        }
    }

    // Fuzzy phase: score every remaining pair and assign greedily, best
    // first.
    let mut candidates: Vec<(f64, usize, usize, usize)> = Vec::new();
    for (si, skey) in source_keys.iter().enumerate() {
        if source_taken[si] || skey.is_empty() {
            continue;
        }
        let stripped = source_columns[si].chars().count() - skey.chars().count();
        for (ti, tkey) in target_keys.iter().enumerate() {
            if target_taken[ti] {
                continue;
            }
            let score = similarity(skey, tkey);
            if score >= SIMILARITY_FLOOR {
                candidates.push((score, stripped, si, ti));
            }
        }
    }
    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
            .then(a.3.cmp(&b.3))
    });
    for (_, _, si, ti) in candidates {
        if source_taken[si] || target_taken[ti] {
            continue;
        }
        source_taken[si] = true;
        target_taken[ti] = true;
        mapping.set(&source_columns[si], Some(target_columns[ti].clone()));
    }

    mapping
}

/// Normalized comparison key: lowercased with non-alphanumerics stripped.
pub fn comparison_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Substring/containment overlap between two comparison keys in `0.0..=1.0`.
///
/// Identical keys score 1.0; one key containing the other scores the length
/// ratio; otherwise the shared prefix plus shared suffix is measured against
/// the longer key.
fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if longer.contains(shorter) {
        return shorter.len() as f64 / longer.len() as f64;
    }
    let prefix = common_prefix_len(a, b);
    let suffix = common_suffix_len(a, b);
    let overlap = (prefix + suffix).min(shorter.len());
    overlap as f64 / longer.len() as f64
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

fn common_suffix_len(a: &str, b: &str) -> usize {
    a.bytes()
        .rev()
        .zip(b.bytes().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn comparison_key_strips_and_lowercases() {
        assert_eq!(comparison_key("Cust_Name"), "custname");
        assert_eq!(comparison_key("Amount Paid"), "amountpaid");
        assert_eq!(comparison_key("__"), "");
    }

    #[test]
    fn cleaner_source_wins_an_equal_score_contest() {
        let sources = cols(&["Cust_Name", "custname", "Amount Paid"]);
        let targets = cols(&["customer_name", "amount_paid"]);
        let mapping = suggest_mapping(&sources, &targets);

        assert_eq!(mapping.get("custname"), Some("customer_name"));
        assert_eq!(mapping.get("Cust_Name"), None);
        assert_eq!(mapping.get("Amount Paid"), Some("amount_paid"));
    }

    #[test]
    fn exact_key_match_beats_fuzzy_overlap() {
        let sources = cols(&["OrderID"]);
        let targets = cols(&["order_id_legacy", "order_id"]);
        let mapping = suggest_mapping(&sources, &targets);
        assert_eq!(mapping.get("OrderID"), Some("order_id"));
    }

    #[test]
    fn equal_fuzzy_scores_fall_back_to_target_declaration_order() {
        let sources = cols(&["qty"]);
        let targets = cols(&["qty_in", "qty_on"]);
        let mapping = suggest_mapping(&sources, &targets);
        assert_eq!(mapping.get("qty"), Some("qty_in"));
    }

    #[test]
    fn unrelated_names_stay_unmapped() {
        let sources = cols(&["comments"]);
        let targets = cols(&["unit_price"]);
        let mapping = suggest_mapping(&sources, &targets);
        assert!(mapping.is_empty());
    }

    #[test]
    fn targets_are_claimed_at_most_once() {
        let sources = cols(&["amount", "amount_total"]);
        let targets = cols(&["amount"]);
        let mapping = suggest_mapping(&sources, &targets);
        assert_eq!(mapping.get("amount"), Some("amount"));
        assert_eq!(mapping.get("amount_total"), None);
        assert_eq!(mapping.mapped_pairs().len(), 1);
    }

    #[test]
    fn overrides_replace_and_clear_entries() {
        let sources = cols(&["a", "b"]);
        let mut mapping = ColumnMapping::new(&sources);
        assert!(mapping.set("a", Some("alpha".into())));
        assert!(mapping.set("b", Some("beta".into())));
        assert!(mapping.set("b", None));
        assert!(!mapping.set("missing", Some("x".into())));
        assert_eq!(mapping.mapped_pairs(), vec![("a", "alpha")]);
    }
}
