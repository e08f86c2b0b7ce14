use std::path::Path;
use std::time::Duration;

use harmonia_core::db::{Database, ServiceRepository, SqliteServiceRepository};
use harmonia_core::remote::DirectoryConnector;
use harmonia_core::util::now_millis;
use harmonia_core::{
    CollectionOutcome, ConcurrentScheduler, HarmonizerConfig, RunReport, ServiceId,
};

use crate::error::CliError;

/// Accounts a harmonize run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarmonizeTarget {
    User(String),
    Service(ServiceId),
}

impl HarmonizeTarget {
    /// Pick the target from flags, falling back to `HARMONIA_USER`.
    pub fn resolve(
        user: Option<String>,
        service: Option<ServiceId>,
        env_user: Option<String>,
    ) -> Result<Self, CliError> {
        if let Some(id) = service {
            return Ok(Self::Service(id));
        }
        user.or(env_user)
            .map(|user| user.trim().to_string())
            .filter(|user| !user.is_empty())
            .map(Self::User)
            .ok_or(CliError::MissingTarget)
    }
}

pub struct HarmonizeOptions {
    pub target: HarmonizeTarget,
    pub watch: bool,
    pub interval: Duration,
    pub as_json: bool,
}

pub async fn run_harmonize(
    options: HarmonizeOptions,
    config: HarmonizerConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    if !options.watch {
        let report = harmonize_once(&options.target, &config, db_path).await?;
        print_report(&report, options.as_json)?;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(options.interval.max(Duration::from_secs(1)));
    tracing::info!(
        "Harmonizing every {} s; press Ctrl-C to stop",
        options.interval.as_secs()
    );
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match harmonize_once(&options.target, &config, db_path).await {
                    Ok(report) => print_report(&report, options.as_json)?,
                    Err(error) => tracing::error!("Harmonization run failed: {error}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping harmonization");
                return Ok(());
            }
        }
    }
}

/// One run on a blocking worker with its own connection
pub async fn harmonize_once(
    target: &HarmonizeTarget,
    config: &HarmonizerConfig,
    db_path: &Path,
) -> Result<RunReport, CliError> {
    let target = target.clone();
    let config = config.clone();
    let db_path = db_path.to_path_buf();
    tokio::task::spawn_blocking(move || harmonize_blocking(&target, config, &db_path))
        .await
        .map_err(|error| CliError::Task(error.to_string()))?
}

pub fn harmonize_blocking(
    target: &HarmonizeTarget,
    config: HarmonizerConfig,
    db_path: &Path,
) -> Result<RunReport, CliError> {
    let connector = DirectoryConnector;
    let scheduler = ConcurrentScheduler::new(db_path, &connector, config);

    match target {
        HarmonizeTarget::User(user_id) => Ok(scheduler.run_all(user_id)?),
        HarmonizeTarget::Service(id) => {
            let db = Database::open(db_path)?;
            let account = SqliteServiceRepository::new(db.connection())
                .fetch(*id)?
                .ok_or(CliError::ServiceNotFound(*id))?;
            let started_on = now_millis();
            let report = scheduler.run(&account)?;
            Ok(RunReport {
                user_id: account.user_id,
                started_on,
                finished_on: now_millis(),
                accounts: vec![report],
            })
        }
    }
}

fn print_report(report: &RunReport, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        for line in format_report_lines(report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_report_lines(report: &RunReport) -> Vec<String> {
    if report.accounts.is_empty() {
        return vec![format!("No enabled services for {}.", report.user_id)];
    }

    let mut lines = Vec::new();
    for account in &report.accounts {
        let totals = account.totals();
        lines.push(format!(
            "service {}: +{} ~{} -{} local, +{} ~{} -{} remote",
            account.service_id,
            totals.local_created,
            totals.local_updated,
            totals.local_deleted,
            totals.remote_created,
            totals.remote_updated,
            totals.remote_deleted,
        ));
        if let Some(error) = &account.error {
            lines.push(format!("  error: {error}"));
        }
        for collection in &account.collections {
            let status = match &collection.outcome {
                CollectionOutcome::Harmonized { passes, .. } => format!("{passes} pass(es)"),
                CollectionOutcome::Locked => "locked".to_string(),
                CollectionOutcome::Retired => "retired".to_string(),
                CollectionOutcome::Failed { error } => format!("failed: {error}"),
            };
            lines.push(format!(
                "  {:<6} {:<8} {:<24} {status}",
                collection.collection_id.to_string(),
                collection.kind.as_str(),
                collection.external_id.as_deref().unwrap_or("-"),
            ));
        }
    }
    lines
}
