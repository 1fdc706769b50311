//! Expected-vs-actual reconciliation
//!
//! Rows are joined on `(pool, bribe_type, token symbol)` compared
//! case-insensitively. Every input row lands in exactly one output row.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::models::types::{ActualReceived, BribeType, ExpectedReward, InsufficientData, RewardSource};

/// USD prices keyed by token symbol (case-insensitive)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceBook {
    prices: HashMap<String, f64>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, usd: f64) {
        self.prices.insert(symbol.to_lowercase(), usd);
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices
            .get(&symbol.to_lowercase())
            .copied()
            .filter(|p| p.is_finite() && *p >= 0.0)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl From<HashMap<String, f64>> for PriceBook {
    fn from(raw: HashMap<String, f64>) -> Self {
        let mut book = Self::new();
        for (symbol, usd) in raw {
            book.insert(&symbol, usd);
        }
        book
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRow {
    pub pool: String,
    pub bribe_type: BribeType,
    pub token: String,
    pub expected: f64,
    pub actual: f64,
    /// `actual - expected`
    pub delta: f64,
    /// `actual / expected * 100`, absent when nothing was expected
    pub match_pct: Option<f64>,
    /// Least authoritative source among the expected rows merged here
    pub source: Option<RewardSource>,
    pub shortfall: Option<InsufficientData>,
    /// Received without any matching expectation
    pub unexplained_actual: bool,
    pub usd_price: Option<f64>,
    pub expected_usd: Option<f64>,
    pub actual_usd: Option<f64>,
    pub usd_delta: Option<f64>,
}

impl ReconciliationRow {
    fn new(pool: &str, bribe_type: BribeType, token: &str) -> Self {
        Self {
            pool: pool.to_string(),
            bribe_type,
            token: token.to_string(),
            expected: 0.0,
            actual: 0.0,
            delta: 0.0,
            match_pct: None,
            source: None,
            shortfall: None,
            unexplained_actual: false,
            usd_price: None,
            expected_usd: None,
            actual_usd: None,
            usd_delta: None,
        }
    }

    /// `"97.50%"` or `"N/A"`
    pub fn match_pct_display(&self) -> String {
        match self.match_pct {
            Some(pct) => format!("{:.2}%", pct),
            None => "N/A".to_string(),
        }
    }

    fn finalize(&mut self, prices: &PriceBook) {
        self.delta = self.actual - self.expected;
        self.match_pct = (self.expected > 0.0).then(|| self.actual / self.expected * 100.0);
        self.unexplained_actual = self.source.is_none();

        self.usd_price = prices.price(&self.token);
        if let Some(price) = self.usd_price {
            self.expected_usd = Some(self.expected * price);
            self.actual_usd = Some(self.actual * price);
            self.usd_delta = Some((self.actual - self.expected) * price);
        }
    }
}

/// Batch totals over reconciled rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub rows: usize,
    pub unexplained_rows: usize,
    /// Rows without a USD price, excluded from the USD totals
    pub unpriced_rows: usize,
    pub total_expected_usd: f64,
    pub total_actual_usd: f64,
    pub usd_delta: f64,
    pub usd_match_pct: Option<f64>,
}

type JoinKey = (String, BribeType, String);

fn join_key(pool: &str, bribe_type: BribeType, token: &str) -> JoinKey {
    (pool.trim().to_lowercase(), bribe_type, token.trim().to_lowercase())
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationReporter {
    prices: PriceBook,
}

impl ReconciliationReporter {
    pub fn new(prices: PriceBook) -> Self {
        Self { prices }
    }

    /// Join expectations with receipts. Output keeps first-seen order:
    /// expected keys first, then actual-only keys.
    pub fn reconcile(&self, expected: &[ExpectedReward], actual: &[ActualReceived]) -> Vec<ReconciliationRow> {
        let mut rows: Vec<ReconciliationRow> = Vec::new();
        let mut index: HashMap<JoinKey, usize> = HashMap::new();

        for reward in expected {
            let key = join_key(&reward.pool, reward.bribe_type, &reward.token.symbol);
            let slot = *index.entry(key).or_insert_with(|| {
                rows.push(ReconciliationRow::new(&reward.pool, reward.bribe_type, &reward.token.symbol));
                rows.len() - 1
            });
            let row = &mut rows[slot];
            row.expected += reward.human_amount;
            row.source = Some(match row.source {
                Some(existing) if existing.authority_rank() >= reward.source.authority_rank() => existing,
                _ => reward.source,
            });
            if row.shortfall.is_none() {
                row.shortfall = reward.shortfall.clone();
            }
        }

        for received in actual {
            let key = join_key(&received.pool, received.bribe_type, &received.token);
            let slot = *index.entry(key).or_insert_with(|| {
                debug!(
                    "❓ Unexplained receipt: {} {} {}",
                    received.pool, received.bribe_type, received.token
                );
                rows.push(ReconciliationRow::new(&received.pool, received.bribe_type, &received.token));
                rows.len() - 1
            });
            rows[slot].actual += received.human_amount;
        }

        for row in rows.iter_mut() {
            row.finalize(&self.prices);
        }
        rows
    }

    pub fn summarize(&self, rows: &[ReconciliationRow]) -> ReconciliationSummary {
        let mut summary = ReconciliationSummary {
            rows: rows.len(),
            unexplained_rows: 0,
            unpriced_rows: 0,
            total_expected_usd: 0.0,
            total_actual_usd: 0.0,
            usd_delta: 0.0,
            usd_match_pct: None,
        };

        for row in rows {
            if row.unexplained_actual {
                summary.unexplained_rows += 1;
            }
            match (row.expected_usd, row.actual_usd) {
                (Some(expected), Some(actual)) => {
                    summary.total_expected_usd += expected;
                    summary.total_actual_usd += actual;
                }
                _ => summary.unpriced_rows += 1,
            }
        }
        summary.usd_delta = summary.total_actual_usd - summary.total_expected_usd;
        summary.usd_match_pct = (summary.total_expected_usd > 0.0)
            .then(|| summary.total_actual_usd / summary.total_expected_usd * 100.0);

        info!(
            "📊 Reconciled {} rows: expected ${:.2}, actual ${:.2}, match {}",
            summary.rows,
            summary.total_expected_usd,
            summary.total_actual_usd,
            summary
                .usd_match_pct
                .map(|p| format!("{:.2}%", p))
                .unwrap_or_else(|| "N/A".to_string())
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::{BlockPin, Epoch, Horizon, TokenInfo, TokenMetadataSource};
    use alloy_primitives::{Address, U256};

    fn expected(pool: &str, symbol: &str, amount: f64, source: RewardSource) -> ExpectedReward {
        ExpectedReward {
            pool: pool.into(),
            bribe_type: BribeType::External,
            token: TokenInfo {
                address: Address::repeat_byte(0x70),
                symbol: symbol.into(),
                decimals: 18,
                source: TokenMetadataSource::OnChain,
            },
            calc_epoch: Epoch::align(1_770_854_400, 604_800),
            block: BlockPin::Latest,
            horizon: Horizon::Final,
            raw_amount: U256::ZERO,
            human_amount: amount,
            source,
            shortfall: None,
        }
    }

    fn actual(pool: &str, symbol: &str, amount: f64) -> ActualReceived {
        ActualReceived {
            pool: pool.into(),
            bribe_type: BribeType::External,
            token: symbol.into(),
            human_amount: amount,
        }
    }

    #[test]
    fn test_join_is_case_insensitive() {
        let reporter = ReconciliationReporter::default();
        let rows = reporter.reconcile(
            &[expected("HYDX/USDC", "USDC", 100.0, RewardSource::ContractFormula)],
            &[actual("hydx/usdc", "usdc", 95.0)],
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].expected, 100.0);
        assert_eq!(rows[0].actual, 95.0);
        assert_eq!(rows[0].delta, -5.0);
        assert_eq!(rows[0].match_pct, Some(95.0));
        assert!(!rows[0].unexplained_actual);
    }

    #[test]
    fn test_expected_only_and_actual_only() {
        let reporter = ReconciliationReporter::default();
        let rows = reporter.reconcile(
            &[expected("A", "WETH", 1.0, RewardSource::ContractFormula)],
            &[actual("B", "HYDX", 50.0)],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].actual, 0.0);
        assert_eq!(rows[1].expected, 0.0);
        assert!(rows[1].unexplained_actual);
        assert_eq!(rows[1].match_pct, None);
        assert_eq!(rows[1].match_pct_display(), "N/A");
        assert_eq!(rows[1].source, None);
    }

    #[test]
    fn test_duplicates_summed_least_authoritative_source() {
        let reporter = ReconciliationReporter::default();
        let rows = reporter.reconcile(
            &[
                expected("A", "WETH", 1.0, RewardSource::ContractFormula),
                expected("A", "WETH", 2.0, RewardSource::LegacyShareFallback),
                expected("A", "WETH", 3.0, RewardSource::DbFallback),
            ],
            &[],
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].expected, 6.0);
        assert_eq!(rows[0].source, Some(RewardSource::LegacyShareFallback));
    }

    #[test]
    fn test_usd_fields_need_price() {
        let mut prices = PriceBook::new();
        prices.insert("USDC", 1.0);
        let reporter = ReconciliationReporter::new(prices);
        let rows = reporter.reconcile(
            &[
                expected("A", "USDC", 10.0, RewardSource::ContractFormula),
                expected("A", "NOPRICE", 10.0, RewardSource::ContractFormula),
            ],
            &[actual("A", "usdc", 12.0)],
        );
        assert_eq!(rows[0].usd_delta, Some(2.0));
        assert_eq!(rows[1].expected_usd, None);

        let summary = reporter.summarize(&rows);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.unpriced_rows, 1);
        assert_eq!(summary.total_expected_usd, 10.0);
        assert_eq!(summary.usd_match_pct, Some(120.0));
    }

    #[test]
    fn test_zero_expected_has_no_match_pct() {
        let reporter = ReconciliationReporter::default();
        let rows = reporter.reconcile(&[expected("A", "WETH", 0.0, RewardSource::ContractFormula)], &[]);
        assert_eq!(rows[0].match_pct, None);
        assert!(!rows[0].unexplained_actual);
    }
}
