//! Transaction statistics over a resolved block range.

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use chainstream_core::{Block, BlockHandler, FilterExpression, Resumer, TerminationCause};
use chainstream_firehose::{BlockRef, ResolvedRange};
use serde::Serialize;

/// Default filters: every transaction, no individual actions.
pub const DEFAULT_INCLUDE: &str = "";
pub const DEFAULT_EXCLUDE: &str = "action == \"*\"";

pub fn default_filter() -> FilterExpression {
    FilterExpression::new(DEFAULT_INCLUDE, DEFAULT_EXCLUDE)
}

/// Accumulates usage and activity across delivered blocks.
#[derive(Debug, Default)]
pub struct TransactionStats {
    pub transactions: u64,
    pub actions: u64,
    pub cpu_usage: u64,
    pub net_usage: u64,
    pub accounts: HashSet<String>,
}

impl BlockHandler for TransactionStats {
    fn on_block(&mut self, block: Block) {
        self.actions += u64::from(block.filtered_executed_total_action_count);
        self.transactions += u64::from(block.filtered_transaction_count);

        for trace in &block.filtered_transaction_traces {
            self.net_usage += trace.net_usage;
            if let Some(receipt) = &trace.receipt {
                self.cpu_usage += u64::from(receipt.cpu_usage_micro_seconds);
            }
            let actors = trace
                .action_traces
                .iter()
                .filter_map(|t| t.action.as_ref())
                .flat_map(|a| a.authorization.iter())
                .map(|p| p.actor.clone());
            self.accounts.extend(actors);
        }
    }
}

/// The success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub start_block: BlockRef,
    pub stop_block: BlockRef,
    pub transactions: u64,
    pub actions: u64,
    pub cpu_usage: u64,
    pub net_usage: u64,
    pub active_accounts: usize,
}

impl StatsReport {
    pub fn new(resolved: ResolvedRange, stats: &TransactionStats) -> Self {
        Self {
            start_block: resolved.start_block,
            stop_block: resolved.stop_block,
            transactions: stats.transactions,
            actions: stats.actions,
            cpu_usage: stats.cpu_usage,
            net_usage: stats.net_usage,
            active_accounts: stats.accounts.len(),
        }
    }
}

/// The failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub error: String,
}

impl From<&anyhow::Error> for ErrorReport {
    fn from(e: &anyhow::Error) -> Self {
        Self { error: format!("{e:#}") }
    }
}

/// Stream the resolved range and summarise it. Any outcome other than a
/// clean end is an error.
pub async fn collect(resumer: &Resumer, resolved: ResolvedRange, filter: FilterExpression) -> Result<StatsReport> {
    let mut stats = TransactionStats::default();
    let report = resumer.run_report(resolved.range(), filter, &mut stats).await;

    tracing::info!(
        cause = %report.cause,
        sessions = report.sessions,
        restarts = report.restarts,
        delivered = report.delivered,
        "run finished"
    );

    match report.cause {
        TerminationCause::CleanEnd => Ok(StatsReport::new(resolved, &stats)),
        cause => Err(anyhow!("{cause}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chainstream_core::memory::{Script, ScriptedSource};
    use chainstream_core::pb::eosio::{
        Action, ActionTrace, PermissionLevel, TransactionReceiptHeader, TransactionTrace,
    };
    use chainstream_core::{Interrupt, RemoteCode, RestartPolicy, ResumerConfig, StreamError};

    fn block_ref(num: u64) -> BlockRef {
        BlockRef {
            id: format!("{num:08x}"),
            num,
            time: "2022-08-09T06:00:00Z".into(),
        }
    }

    fn resolved(start: u64, stop: u64) -> ResolvedRange {
        ResolvedRange::new(block_ref(start), block_ref(stop)).unwrap()
    }

    fn trace(cpu: u32, net: u64, actors: &[&str]) -> TransactionTrace {
        TransactionTrace {
            receipt: Some(TransactionReceiptHeader {
                cpu_usage_micro_seconds: cpu,
                ..Default::default()
            }),
            net_usage: net,
            action_traces: vec![ActionTrace {
                action: Some(Action {
                    authorization: actors
                        .iter()
                        .map(|a| PermissionLevel {
                            actor: a.to_string(),
                            permission: "active".into(),
                        })
                        .collect(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    /// Block `n` carries two transactions; actors overlap across blocks.
    fn busy_block(n: u32) -> Block {
        Block {
            id: format!("{n:08x}"),
            number: n,
            filtered_transaction_count: 2,
            filtered_executed_total_action_count: 3,
            filtered_transaction_traces: vec![
                trace(100, 8, &["alice", "bob"]),
                trace(50, 16, &[if n % 2 == 0 { "carol" } else { "alice" }]),
            ],
            ..Default::default()
        }
    }

    fn script(from: u32, to: u32) -> Script {
        (from..=to).fold(Script::new(), |s, n| s.block(busy_block(n)))
    }

    fn resumer(source: Arc<ScriptedSource>) -> Resumer {
        let config = ResumerConfig::default()
            .exit_grace(Duration::from_millis(10))
            .restart(RestartPolicy::fixed(Duration::from_secs(3)));
        Resumer::new(source, config, Interrupt::new())
    }

    #[test]
    fn handler_sums_usage_and_unions_actors() {
        let mut stats = TransactionStats::default();
        stats.on_block(busy_block(100));
        stats.on_block(busy_block(101));

        assert_eq!(stats.transactions, 4);
        assert_eq!(stats.actions, 6);
        assert_eq!(stats.cpu_usage, 300);
        assert_eq!(stats.net_usage, 48);
        assert_eq!(stats.accounts.len(), 3);
    }

    #[test]
    fn missing_receipt_contributes_no_cpu() {
        let mut stats = TransactionStats::default();
        let mut block = busy_block(1);
        block.filtered_transaction_traces[0].receipt = None;
        stats.on_block(block);
        assert_eq!(stats.cpu_usage, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_range_produces_the_report() {
        let source = Arc::new(ScriptedSource::new([script(100, 105)]));
        let report = collect(&resumer(source.clone()), resolved(100, 105), default_filter())
            .await
            .unwrap();

        assert_eq!(report.transactions, 12);
        assert_eq!(report.actions, 18);
        assert_eq!(report.cpu_usage, 900);
        assert_eq!(report.net_usage, 144);
        assert_eq!(report.active_accounts, 3);
        assert_eq!(report.start_block.num, 100);
        assert_eq!(report.stop_block.num, 105);

        let request = &source.requests()[0];
        assert_eq!(request.filter.exclude, DEFAULT_EXCLUDE);
    }

    #[tokio::test(start_paused = true)]
    async fn restarted_run_counts_each_block_once() {
        let source = Arc::new(ScriptedSource::new([
            script(100, 102).error(StreamError::remote(RemoteCode::Unavailable, "reset")),
            script(103, 105),
        ]));
        let report = collect(&resumer(source.clone()), resolved(100, 105), default_filter())
            .await
            .unwrap();

        assert_eq!(report.transactions, 12);
        assert_eq!(report.cpu_usage, 900);
        assert_eq!(source.requests()[1].range.start, 103);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_run_becomes_an_error_payload() {
        let source = Arc::new(ScriptedSource::new([Script::new().error(StreamError::remote(
            RemoteCode::InvalidArgument,
            "unable to construct filter: bad",
        ))]));
        let err = collect(&resumer(source), resolved(1, 2), default_filter())
            .await
            .unwrap_err();

        let payload = serde_json::to_value(ErrorReport::from(&err)).unwrap();
        assert_eq!(payload["error"], "fatal stream error: unable to construct filter: bad");
    }

    #[test]
    fn report_uses_the_public_field_names() {
        let stats = TransactionStats::default();
        let json = serde_json::to_value(StatsReport::new(resolved(1, 1), &stats)).unwrap();
        for key in ["start_block", "stop_block", "transactions", "actions", "cpu_usage", "net_usage", "active_accounts"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["start_block"]["num"], 1);
    }
}
