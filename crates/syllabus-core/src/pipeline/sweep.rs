use crate::models::{RunKind, SyncError};
use crate::pipeline::{PipelineRunner, run_blocking};

/// Outcome counts for one unattended sweep.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SweepReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Run a full pipeline for every user with unattended access enabled. One
/// user's failure is logged and counted, never aborts the sweep.
pub async fn run_unattended_sweep(runner: &PipelineRunner) -> Result<SweepReport, SyncError> {
    let vaults = runner.vault_store();
    let candidates = run_blocking(move || vaults.list_cron_enabled()).await?;

    let mut report = SweepReport::default();
    for vault in candidates {
        if !vault.supports_unattended() {
            tracing::warn!(
                user = %vault.user,
                "cron enabled without a server-wrapped pipeline key, skipping"
            );
            continue;
        }

        report.attempted += 1;
        match runner.run_unattended(vault.user, RunKind::Full).await {
            Ok(run_id) => {
                tracing::info!(user = %vault.user, run_id, "unattended run completed");
                report.succeeded += 1;
            }
            Err(error) => {
                tracing::error!(user = %vault.user, error = %error, "unattended run failed");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
