//! One run of the detection pipeline: signature → mint → checks → buy.

use std::io::Write;
use tracing::{info, warn};

use super::executor::BuyRequest;
use super::{CheckMode, PipelineContext};
use crate::admission::{Admission, RejectReason};
use crate::notify::{detection_message, notify_detached};

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// No mint could be extracted from the transaction.
    Unresolved,
    Rejected(RejectReason),
    /// Admitted, but simulation mode skipped the buy.
    Simulated(String),
    Bought(String),
    BuyFailed(String),
}

/// Run the pipeline for a matched pool-creation `signature`.
pub async fn process_signature(ctx: &PipelineContext, signature: &str) -> PipelineOutcome {
    info!(signature = %signature, tx = %format!("https://solscan.io/tx/{signature}"), "new liquidity pool signature");

    let Some(mint) = ctx.resolver.resolve(signature).await else {
        info!(signature = %signature, "no token mint extracted, skipping");
        return PipelineOutcome::Unresolved;
    };

    info!(
        mint = %mint,
        gmgn = %format!("https://gmgn.ai/sol/token/{mint}"),
        bullx = %format!("https://neo.bullx.io/terminal?chainId=1399811149&address={mint}"),
        "token mint extracted"
    );
    notify_detached(ctx.notifier.clone(), detection_message(signature, &mint));

    let admission = match ctx.settings.check_mode {
        CheckMode::None => Admission::Accepted,
        CheckMode::Snipe => ctx.engine.check_authorities(&mint).await,
        CheckMode::Full => {
            let pump_mint = mint.trim().to_lowercase().ends_with("pump");
            if pump_mint && ctx.engine.settings().ignore_ends_with_pump {
                Admission::Rejected(RejectReason::PumpMint)
            } else {
                ctx.engine.check(&mint).await
            }
        }
    };
    if let Admission::Rejected(reason) = admission {
        info!(mint = %mint, mode = %ctx.settings.check_mode, reason = %reason, "checks not passed, skipping");
        return PipelineOutcome::Rejected(reason);
    }

    if ctx.settings.simulation_mode {
        warn!(mint = %mint, "simulation mode on, token not bought");
        return PipelineOutcome::Simulated(mint);
    }

    let request = BuyRequest {
        mint: mint.clone(),
        amount: ctx.settings.amount_sol,
        auto_sell: ctx.settings.auto_sell,
        take_profit_pct: ctx.settings.take_profit_pct,
        stop_loss_pct: ctx.settings.stop_loss_pct,
    };
    if !ctx.executor.execute(&request).await {
        warn!(mint = %mint, "token not bought, execution failed");
        return PipelineOutcome::BuyFailed(mint);
    }

    if ctx.settings.play_sound {
        ring_bell();
    }
    info!(mint = %mint, amount = request.amount, "token bought");
    PipelineOutcome::Bought(mint)
}

fn ring_bell() {
    let mut out = std::io::stdout();
    let _ = out.write_all(b"\x07").and_then(|_| out.flush());
}
