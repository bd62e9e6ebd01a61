use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::candidate::{CandidateItem, RequestedItem};
use crate::similarity::{name_similarity, normalize_key};

/// Minimum fuzzy score for a name-only pairing.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.40;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Paired; quantity agrees (or was not stated) and a price is present.
    Matched,
    /// Paired, but quantity differs or price/quantity is absent or unusable.
    Partial,
    /// Requested line nobody quoted.
    Missing,
    /// Quoted line that corresponds to nothing requested.
    Extra,
}

impl Classification {
    pub fn is_paired(self) -> bool {
        matches!(self, Classification::Matched | Classification::Partial)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// The supplier chose the requested line themselves (manual entry).
    ExplicitLink,
    /// SKU/model number equality.
    Sku,
    /// Name similarity above the threshold.
    FuzzyName,
}

/// Outcome for one requested line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineMatch {
    pub line_no: u32,
    /// Index into the candidate list, when paired.
    pub candidate: Option<usize>,
    pub classification: Classification,
    pub method: Option<MatchMethod>,
    /// 1.0 for explicit and SKU pairs, the similarity score for fuzzy pairs,
    /// 0.0 for missing lines.
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// One entry per requested line, in requested order.
    pub lines: Vec<LineMatch>,
    /// Candidate indices that paired with nothing.
    pub extras: Vec<usize>,
    /// Set when there was nothing to reconcile; the studio must key the quote
    /// in by hand.
    pub manual_entry_required: bool,
}

impl MatchResult {
    pub fn line(&self, line_no: u32) -> Option<&LineMatch> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    /// The requested line a candidate was paired with, if any.
    pub fn line_for_candidate(&self, candidate: usize) -> Option<&LineMatch> {
        self.lines.iter().find(|l| l.candidate == Some(candidate))
    }

    /// Classification of a candidate from the supplier's side.
    pub fn candidate_classification(&self, candidate: usize) -> Classification {
        self.line_for_candidate(candidate)
            .map(|l| l.classification)
            .unwrap_or(Classification::Extra)
    }

    pub fn count(&self, classification: Classification) -> usize {
        match classification {
            Classification::Extra => self.extras.len(),
            other => self.lines.iter().filter(|l| l.classification == other).count(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.lines
            .iter()
            .all(|l| l.classification == Classification::Matched)
    }
}

/// Configured matcher. Cheap to copy; holds no state between runs.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Reconciler {
    threshold: f64,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// Reconcile with the default threshold.
pub fn reconcile(requested: &[RequestedItem], candidates: &[CandidateItem]) -> MatchResult {
    Reconciler::default().reconcile(requested, candidates)
}

struct Pairing {
    candidate: usize,
    method: MatchMethod,
    confidence: f64,
}

impl Reconciler {
    /// Threshold is clamped into `[0, 1]`.
    pub fn new(threshold: f64) -> Self {
        let threshold = if threshold.is_nan() {
            DEFAULT_MATCH_THRESHOLD
        } else {
            threshold.clamp(0.0, 1.0)
        };
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn reconcile(&self, requested: &[RequestedItem], candidates: &[CandidateItem]) -> MatchResult {
        let mut pairs: Vec<Option<Pairing>> = requested.iter().map(|_| None).collect();
        let mut taken = vec![false; candidates.len()];

        // Pass order is precedence. A supplier's explicit line reference is
        // their own statement of intent, so it claims the line before any SKU
        // equality; an SKU candidate for an already linked line becomes an extra.
        self.link_pass(requested, candidates, &mut pairs, &mut taken);
        self.sku_pass(requested, candidates, &mut pairs, &mut taken);
        self.fuzzy_pass(requested, candidates, &mut pairs, &mut taken);

        let lines = requested
            .iter()
            .zip(pairs)
            .map(|(req, pairing)| match pairing {
                Some(p) => LineMatch {
                    line_no: req.line_no,
                    candidate: Some(p.candidate),
                    classification: classify(req, &candidates[p.candidate]),
                    method: Some(p.method),
                    confidence: p.confidence,
                },
                None => LineMatch {
                    line_no: req.line_no,
                    candidate: None,
                    classification: Classification::Missing,
                    method: None,
                    confidence: 0.0,
                },
            })
            .collect();

        let extras = taken
            .iter()
            .enumerate()
            .filter_map(|(idx, t)| (!t).then_some(idx))
            .collect();

        MatchResult {
            lines,
            extras,
            manual_entry_required: candidates.is_empty(),
        }
    }

    fn link_pass(
        &self,
        requested: &[RequestedItem],
        candidates: &[CandidateItem],
        pairs: &mut [Option<Pairing>],
        taken: &mut [bool],
    ) {
        for (ci, cand) in candidates.iter().enumerate() {
            let Some(line_no) = cand.linked_line else {
                continue;
            };
            let slot = requested
                .iter()
                .position(|r| r.line_no == line_no)
                .filter(|&ri| pairs[ri].is_none());
            if let Some(ri) = slot {
                pairs[ri] = Some(Pairing {
                    candidate: ci,
                    method: MatchMethod::ExplicitLink,
                    confidence: 1.0,
                });
                taken[ci] = true;
            }
        }
    }

    fn sku_pass(
        &self,
        requested: &[RequestedItem],
        candidates: &[CandidateItem],
        pairs: &mut [Option<Pairing>],
        taken: &mut [bool],
    ) {
        let keys: Vec<Option<String>> = requested
            .iter()
            .map(|r| normalize_key(r.sku.as_deref()))
            .collect();

        for (ci, cand) in candidates.iter().enumerate() {
            if taken[ci] {
                continue;
            }
            let Some(key) = normalize_key(cand.sku.as_deref()) else {
                continue;
            };
            let slot = (0..requested.len())
                .find(|&ri| pairs[ri].is_none() && keys[ri].as_deref() == Some(key.as_str()));
            if let Some(ri) = slot {
                pairs[ri] = Some(Pairing {
                    candidate: ci,
                    method: MatchMethod::Sku,
                    confidence: 1.0,
                });
                taken[ci] = true;
            }
        }
    }

    /// Greedy bipartite assignment in descending score order. Ties break on
    /// requested position, then candidate position, so the outcome does not
    /// depend on iteration order.
    fn fuzzy_pass(
        &self,
        requested: &[RequestedItem],
        candidates: &[CandidateItem],
        pairs: &mut [Option<Pairing>],
        taken: &mut [bool],
    ) {
        let mut scored: Vec<(f64, usize, usize)> = Vec::new();
        for (ri, req) in requested.iter().enumerate() {
            if pairs[ri].is_some() {
                continue;
            }
            for (ci, cand) in candidates.iter().enumerate() {
                if taken[ci] {
                    continue;
                }
                let score = name_similarity(&req.name, &cand.name);
                if score > 0.0 && score >= self.threshold {
                    scored.push((score, ri, ci));
                }
            }
        }

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        for (score, ri, ci) in scored {
            if pairs[ri].is_some() || taken[ci] {
                continue;
            }
            pairs[ri] = Some(Pairing {
                candidate: ci,
                method: MatchMethod::FuzzyName,
                confidence: score,
            });
            taken[ci] = true;
        }
    }
}

fn classify(requested: &RequestedItem, candidate: &CandidateItem) -> Classification {
    let price_usable = candidate
        .unit_price
        .is_some_and(|p| p >= Decimal::ZERO);
    let quantity_agrees = match candidate.quantity {
        None => true,
        Some(q) => q.cmp(&requested.quantity) == Ordering::Equal,
    };

    if price_usable && quantity_agrees {
        Classification::Matched
    } else {
        Classification::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn sofa_rfq() -> Vec<RequestedItem> {
        vec![RequestedItem {
            line_no: 1,
            name: "Sofa".into(),
            sku: Some("ABC-1".into()),
            quantity: dec!(2),
        }]
    }

    fn requested(line_no: u32, name: &str, qty: Decimal) -> RequestedItem {
        RequestedItem {
            line_no,
            name: name.into(),
            sku: None,
            quantity: qty,
        }
    }

    #[test]
    fn exact_sku_match_is_matched_with_full_confidence() {
        let candidates = vec![
            CandidateItem::default()
                .with_sku("abc-1")
                .with_unit_price(dec!(500))
                .with_quantity(dec!(2)),
        ];

        let result = reconcile(&sofa_rfq(), &candidates);
        let line = result.line(1).unwrap();
        assert_eq!(line.candidate, Some(0));
        assert_eq!(line.method, Some(MatchMethod::Sku));
        assert_eq!(line.classification, Classification::Matched);
        assert_eq!(line.confidence, 1.0);
        assert!(result.extras.is_empty());
        assert!(!result.manual_entry_required);
    }

    #[test]
    fn fuzzy_name_match_with_short_quantity_is_partial() {
        let candidates = vec![
            CandidateItem::named("Modern Sofa")
                .with_unit_price(dec!(500))
                .with_quantity(dec!(1)),
        ];

        let result = reconcile(&sofa_rfq(), &candidates);
        let line = result.line(1).unwrap();
        assert_eq!(line.method, Some(MatchMethod::FuzzyName));
        assert_eq!(line.classification, Classification::Partial);
        assert!(line.confidence > DEFAULT_MATCH_THRESHOLD && line.confidence < 1.0);
    }

    #[test]
    fn explicit_link_claims_the_line_before_an_exact_sku() {
        let candidates = vec![
            CandidateItem::named("Three seater")
                .with_sku("ABC-1")
                .with_unit_price(dec!(500))
                .with_quantity(dec!(2)),
            CandidateItem::named("Sofa, as quoted")
                .with_unit_price(dec!(480))
                .with_quantity(dec!(2))
                .linked_to(1),
        ];

        let result = reconcile(&sofa_rfq(), &candidates);
        let line = result.line(1).unwrap();
        assert_eq!(line.candidate, Some(1));
        assert_eq!(line.method, Some(MatchMethod::ExplicitLink));
        assert_eq!(result.extras, vec![0]);
        assert_eq!(result.candidate_classification(0), Classification::Extra);
    }

    #[test]
    fn link_to_an_unknown_line_falls_through_to_the_sku_pass() {
        let candidates = vec![
            CandidateItem::named("Three seater")
                .with_sku("abc-1")
                .with_unit_price(dec!(500))
                .linked_to(9),
        ];

        let result = reconcile(&sofa_rfq(), &candidates);
        assert_eq!(result.line(1).unwrap().method, Some(MatchMethod::Sku));
    }

    #[test]
    fn sku_pass_wins_over_a_better_fuzzy_candidate() {
        let requested = vec![
            RequestedItem {
                line_no: 1,
                name: "Sofa".into(),
                sku: Some("ABC-1".into()),
                quantity: dec!(2),
            },
            requested(2, "Armchair", dec!(1)),
        ];
        let candidates = vec![
            CandidateItem::named("Sofa").with_unit_price(dec!(450)),
            CandidateItem::named("Three seater")
                .with_sku(" ABC-1 ")
                .with_unit_price(dec!(500)),
        ];

        let result = reconcile(&requested, &candidates);
        let sofa = result.line(1).unwrap();
        assert_eq!(sofa.candidate, Some(1));
        assert_eq!(sofa.method, Some(MatchMethod::Sku));
        assert_eq!(sofa.confidence, 1.0);

        assert_eq!(result.line(2).unwrap().classification, Classification::Missing);
        assert_eq!(result.extras, vec![0]);
        assert_eq!(result.candidate_classification(0), Classification::Extra);
    }

    #[test]
    fn greedy_pass_commits_best_pairs_first() {
        let requested = vec![
            requested(1, "Walnut Dining Table", dec!(1)),
            requested(2, "Walnut Side Table", dec!(2)),
        ];
        let candidates = vec![
            CandidateItem::named("walnut side table").with_unit_price(dec!(300)),
            CandidateItem::named("Walnut Dining Table").with_unit_price(dec!(2400)),
        ];

        let result = reconcile(&requested, &candidates);
        assert_eq!(result.line(1).unwrap().candidate, Some(1));
        assert_eq!(result.line(2).unwrap().candidate, Some(0));
        assert_eq!(result.count(Classification::Matched), 2);
        assert!(result.is_complete());
    }

    #[test]
    fn unrelated_names_stay_apart() {
        let requested = vec![requested(1, "Brass Floor Lamp", dec!(1))];
        let candidates = vec![CandidateItem::named("Oak Bookshelf").with_unit_price(dec!(90))];

        let result = reconcile(&requested, &candidates);
        assert_eq!(result.line(1).unwrap().classification, Classification::Missing);
        assert_eq!(result.extras, vec![0]);
    }

    #[test]
    fn missing_price_makes_a_pair_partial() {
        let candidates = vec![CandidateItem::default().with_sku("ABC-1").with_quantity(dec!(2))];
        let result = reconcile(&sofa_rfq(), &candidates);
        assert_eq!(result.line(1).unwrap().classification, Classification::Partial);
    }

    #[test]
    fn absent_quantity_with_price_is_matched() {
        let candidates = vec![CandidateItem::default().with_sku("ABC-1").with_unit_price(dec!(10))];
        let result = reconcile(&sofa_rfq(), &candidates);
        assert_eq!(result.line(1).unwrap().classification, Classification::Matched);
    }

    #[test]
    fn explicit_links_pair_before_keys() {
        let requested = vec![
            requested(1, "Sofa", dec!(2)),
            requested(2, "Ottoman", dec!(1)),
        ];
        let candidates = vec![
            CandidateItem::named("Ottoman")
                .linked_to(2)
                .with_unit_price(dec!(120))
                .with_quantity(dec!(1)),
            CandidateItem::named("Sofa").linked_to(99).with_unit_price(dec!(900)),
        ];

        let result = reconcile(&requested, &candidates);
        let ottoman = result.line(2).unwrap();
        assert_eq!(ottoman.method, Some(MatchMethod::ExplicitLink));
        assert_eq!(ottoman.classification, Classification::Matched);

        // Unknown link falls through to the name pass.
        let sofa = result.line(1).unwrap();
        assert_eq!(sofa.candidate, Some(1));
        assert_eq!(sofa.method, Some(MatchMethod::FuzzyName));
    }

    #[test]
    fn empty_candidates_mean_everything_missing_and_manual_entry() {
        let result = reconcile(&sofa_rfq(), &[]);
        assert!(result.manual_entry_required);
        assert_eq!(result.count(Classification::Missing), 1);
        assert!(result.extras.is_empty());
    }

    #[test]
    fn threshold_is_clamped() {
        assert_eq!(Reconciler::new(3.0).threshold(), 1.0);
        assert_eq!(Reconciler::new(-1.0).threshold(), 0.0);
        assert_eq!(Reconciler::new(f64::NAN).threshold(), DEFAULT_MATCH_THRESHOLD);
    }

    fn arb_name() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "Sofa", "Modern Sofa", "Oak Table", "Oak Side Table", "Lamp", "Brass Lamp",
            "Rug", "Wool Rug", "Armchair", "Velvet Armchair", "",
        ])
        .prop_map(str::to_string)
    }

    fn arb_candidate() -> impl Strategy<Value = CandidateItem> {
        (
            arb_name(),
            prop::option::of(prop::sample::select(vec!["ABC-1", "abc-2", " XYZ "])),
            prop::option::of(0i64..100_000i64),
            prop::option::of(1i64..5i64),
        )
            .prop_map(|(name, sku, price, qty)| CandidateItem {
                name,
                sku: sku.map(str::to_string),
                unit_price: price.map(|p| Decimal::new(p, 2)),
                quantity: qty.map(Decimal::from),
                ..CandidateItem::default()
            })
    }

    fn arb_requested() -> impl Strategy<Value = Vec<RequestedItem>> {
        prop::collection::vec(
            (arb_name(), prop::option::of(prop::sample::select(vec!["abc-1", "XYZ"])), 1i64..5i64),
            0..6,
        )
        .prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(idx, (name, sku, qty))| RequestedItem {
                    line_no: idx as u32 + 1,
                    name,
                    sku: sku.map(str::to_string),
                    quantity: Decimal::from(qty),
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn reconciliation_is_idempotent(
            requested in arb_requested(),
            candidates in prop::collection::vec(arb_candidate(), 0..8),
        ) {
            let first = reconcile(&requested, &candidates);
            let second = reconcile(&requested, &candidates);
            prop_assert_eq!(first, second);
        }

        /// Every candidate ends up either paired with exactly one line or extra.
        #[test]
        fn candidates_are_partitioned(
            requested in arb_requested(),
            candidates in prop::collection::vec(arb_candidate(), 0..8),
        ) {
            let result = reconcile(&requested, &candidates);
            prop_assert_eq!(result.lines.len(), requested.len());
            for ci in 0..candidates.len() {
                let paired = result.lines.iter().filter(|l| l.candidate == Some(ci)).count();
                let extra = result.extras.contains(&ci);
                prop_assert!(paired + usize::from(extra) == 1);
            }
        }
    }
}
