//! Batch runner tests: probes, row isolation and reconciliation

mod common;

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;

use common::*;
use ve_bribe_engine::{
    Accessor, ActualReceived, BatchJob, BatchRow, BatchRunner, BribeType, EngineConfig, FixtureStateReader, Horizon,
    InMemoryTokenStore, RowStatus, StateErrorKind, StateValue,
};

const BOUNDARY: u64 = EPOCH + WEEK;

fn other_bribe() -> Address {
    Address::repeat_byte(0xbc)
}

fn chain() -> FixtureStateReader {
    let mut reader = reference_chain();

    // 2-second blocks; block 500 sits exactly on the boundary
    for n in 0..=1_000u64 {
        reader.set_block(n, BOUNDARY - 1_000 + 2 * n);
    }
    // supply grows toward the boundary
    let supply = Accessor::TotalSupplyAt { epoch: EPOCH };
    reader
        .set_at(bribe(), supply.clone(), 350, StateValue::Uint(U256::from(40_000)))
        .set_at(bribe(), supply, 470, StateValue::Uint(U256::from(20_000)));

    // not registered as a reward
    reader.set(
        bribe(),
        Accessor::IsReward {
            token: Address::repeat_byte(0x71),
        },
        StateValue::Bool(false),
    );
    // no metadata anywhere for 0x72
    reader.set(
        bribe(),
        Accessor::IsReward {
            token: Address::repeat_byte(0x72),
        },
        StateValue::Bool(true),
    );
    // reward contract that reverts
    reader
        .set_token(Address::repeat_byte(0x73), "OTHER", 18)
        .fail(other_bribe(), "rewardData", StateErrorKind::Reverted);
    reader
}

fn row(pool: &str, bribe_type: BribeType, bribe_contract: Address, token: Address) -> BatchRow {
    BatchRow {
        pool: pool.to_string(),
        bribe_type,
        bribe_contract,
        token,
        fallback_amount: None,
        legacy_pool_share: None,
    }
}

fn job() -> BatchJob {
    let mut prices = HashMap::new();
    prices.insert("TKN".to_string(), 2.0);
    prices.insert("weth".to_string(), 3_000.0);

    BatchJob {
        position_id: position_id(),
        // mid-epoch timestamp, aligned by the runner
        closed_epoch: EPOCH + 3_600,
        rows: vec![
            row("HYDX/USDC", BribeType::External, bribe(), token()),
            row("HYDX/USDC", BribeType::External, bribe(), Address::repeat_byte(0x71)),
            row("HYDX/USDC", BribeType::External, bribe(), Address::repeat_byte(0x72)),
            row("OTHER/POOL", BribeType::Internal, other_bribe(), Address::repeat_byte(0x73)),
        ],
        actual: vec![
            ActualReceived {
                pool: "hydx/usdc".to_string(),
                bribe_type: BribeType::External,
                token: "tkn".to_string(),
                human_amount: 15.0,
            },
            ActualReceived {
                pool: "GHOST/WETH".to_string(),
                bribe_type: BribeType::Internal,
                token: "WETH".to_string(),
                human_amount: 3.0,
            },
        ],
        prices,
    }
}

async fn run() -> ve_bribe_engine::BatchReport {
    let runner = BatchRunner::new(
        Arc::new(chain()),
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(EngineConfig::default()),
    )
    .unwrap();
    runner.run(&job()).await.unwrap()
}

#[tokio::test]
async fn test_probe_blocks_located() {
    let report = run().await;
    assert_eq!(report.calc_epoch.timestamp(), EPOCH);
    assert_eq!(report.probes.len(), 2);
    assert_eq!(report.probes[0].label, "T-5");
    assert_eq!(report.probes[0].block, Some(350));
    assert_eq!(report.probes[1].label, "T-1");
    assert_eq!(report.probes[1].block, Some(470));
}

#[tokio::test]
async fn test_final_and_predictive_estimates() {
    let report = run().await;
    let first = &report.rows[0];
    assert_eq!(first.status, RowStatus::Estimated);

    let final_estimate = first.final_estimate.as_ref().unwrap();
    assert_eq!(final_estimate.raw_amount, U256::from(20_000_000u64));
    assert_eq!(final_estimate.horizon, Horizon::Final);

    let t5 = first.probes[0].estimate.as_ref().unwrap();
    let t1 = first.probes[1].estimate.as_ref().unwrap();
    assert_eq!(t5.raw_amount, U256::from(5_000_000u64));
    assert_eq!(t1.raw_amount, U256::from(10_000_000u64));
    assert_eq!(t5.horizon, Horizon::Predictive);
}

#[tokio::test]
async fn test_rows_fail_independently() {
    let report = run().await;
    assert_eq!(report.rows.len(), 4);
    assert_eq!(report.rows[1].status, RowStatus::NotRewardToken);
    assert!(report.rows[1].final_estimate.is_none());

    assert_eq!(report.rows[2].status, RowStatus::Failed);
    assert!(report.rows[2].error.as_deref().unwrap().contains("TOKEN_METADATA_AMBIGUOUS"));

    let degraded = &report.rows[3];
    assert_eq!(degraded.status, RowStatus::Estimated);
    assert!(degraded.final_estimate.as_ref().unwrap().hit_unavailable_state());
    // probes that hit unavailable state are reported as null
    assert!(degraded.probes.iter().all(|p| p.estimate.is_none()));

    assert_eq!(report.failures.failed_rows, 1);
    assert_eq!(report.failures.skipped_rows, 1);
    assert_eq!(report.failures.reverted, 1);
    assert_eq!(report.failures.transport, 0);
}

#[tokio::test]
async fn test_reconciliation_in_report() {
    let report = run().await;
    let rows = &report.reconciliation;
    assert_eq!(rows.len(), 3);

    assert_eq!(rows[0].token, "TKN");
    assert_eq!(rows[0].expected, 20.0);
    assert_eq!(rows[0].actual, 15.0);
    assert_eq!(rows[0].match_pct, Some(75.0));
    assert_eq!(rows[0].expected_usd, Some(40.0));

    assert_eq!(rows[1].pool, "OTHER/POOL");
    assert_eq!(rows[1].match_pct_display(), "N/A");
    assert_eq!(rows[1].usd_price, None);

    assert!(rows[2].unexplained_actual);
    assert_eq!(rows[2].actual_usd, Some(9_000.0));

    assert_eq!(report.summary.unexplained_rows, 1);
    assert_eq!(report.summary.unpriced_rows, 1);
    assert_eq!(report.summary.total_expected_usd, 40.0);
    assert_eq!(report.summary.total_actual_usd, 9_030.0);
}

#[tokio::test]
async fn test_report_serializes_source_tags() {
    let report = run().await;
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["rows"][0]["final_estimate"]["source"], "contract_formula");
    assert_eq!(json["rows"][1]["status"], "not_reward_token");
    assert_eq!(json["rows"][3]["final_estimate"]["shortfall"]["reason"], "state_unavailable");
    assert_eq!(json["rows"][3]["final_estimate"]["shortfall"]["accessor"], "rewardData");
    assert!(json["reconciliation"][1]["match_pct"].is_null());
}
