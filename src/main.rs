use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use colored::*;
use gh_activity::cli::{Cli, Command, GlobalArgs, PrArgs, WindowArgs};
use gh_activity::config::Attribution;
use gh_activity::models::{Collection, OrgId, SkippedTarget};
use gh_activity::output::write_report;
use gh_activity::summary::summarize;
use gh_activity::{Collector, GitHubClient};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file if it exists
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    println!("{}", "GitHub Activity Collector".bold().green());
    println!("{}\n", "=".repeat(50).dimmed());

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Run failed");
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let global = &cli.global;
    match &cli.command {
        Command::Commits(window) => {
            let attribution = window.attribution(Attribution::Committer);
            collect_commits(global, window, attribution, &organizations(global)?, false).await
        }
        Command::People(window) => {
            let attribution = window.attribution(Attribution::Author);
            collect_commits(global, window, attribution, &organizations(global)?, true).await
        }
        Command::Repos => collect_repositories(global, &organizations(global)?).await,
        Command::Inclusivity => collect_inclusivity(global, &organizations(global)?).await,
        Command::Prs(args) => collect_pull_requests(global, args).await,
    }
}

fn organizations(global: &GlobalArgs) -> anyhow::Result<Vec<OrgId>> {
    let orgs = global.organizations().context("Cannot determine organizations")?;
    println!("📊 {} organization(s), {} transport", orgs.len(), global.transport);
    Ok(orgs)
}

fn build_collector(global: &GlobalArgs, attribution: Attribution) -> anyhow::Result<Collector> {
    let client_config = global.client_config().context("Invalid client configuration")?;
    let client = GitHubClient::new(client_config).context("Cannot create GitHub client")?;
    Ok(Collector::new(client, global.collector_config(attribution)))
}

async fn collect_commits(
    global: &GlobalArgs,
    window_args: &WindowArgs,
    attribution: Attribution,
    orgs: &[OrgId],
    people: bool,
) -> anyhow::Result<ExitCode> {
    let window = window_args.window(Utc::now())?;
    let mut collector = build_collector(global, attribution)?;
    println!(
        "🕒 Window {} .. {}",
        window.since().format("%Y-%m-%d %H:%M:%S"),
        window.until().format("%Y-%m-%d %H:%M:%S")
    );

    let mut collection = Collection::new();
    let outcome = tokio::select! {
        result = collector.collect_into(orgs, &window, &mut collection) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let (interrupted, failure) = match outcome {
        Some(Ok(())) => (false, None),
        Some(Err(e)) => (false, Some(e)),
        None => (true, None),
    };

    if interrupted {
        println!("\n🛑 Interrupted after {} records", collection.records.len());
    }
    if let Some(e) = &failure {
        eprintln!("{} {}", "❌ Collection failed:".red().bold(), e);
    }

    let incomplete = interrupted || failure.is_some();
    if !incomplete || global.write_partial {
        let path = if people {
            write_report(&global.output_dir, "people", &summarize(&collection.records))
        } else {
            write_report(&global.output_dir, "activity", collection.records.records())
        }
        .context("Could not write the CSV report")?;
        info!(path = %path.display(), records = collection.records.len(), "Report written");
        println!("✅ Wrote {} to {}", describe(&collection, people), path.display());
    } else {
        println!("No output written");
    }

    report_skipped(&collection.skipped);
    println!(
        "Requests sent: {}, repositories visited: {}",
        collector.client().requests_sent(),
        collection.repositories_visited
    );

    Ok(match (interrupted, failure) {
        (true, _) => ExitCode::from(EXIT_INTERRUPTED),
        (false, Some(_)) => ExitCode::FAILURE,
        (false, None) => ExitCode::SUCCESS,
    })
}

async fn collect_repositories(global: &GlobalArgs, orgs: &[OrgId]) -> anyhow::Result<ExitCode> {
    let mut collector = build_collector(global, Attribution::default())?;

    let outcome = tokio::select! {
        result = collector.fetch_repositories(orgs) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(result) = outcome else {
        println!("\n🛑 Interrupted, no output written");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    };
    let (repositories, skipped) = result?;

    let path = write_report(&global.output_dir, "a_repo_activity", &repositories)
        .context("Could not write the CSV report")?;
    println!("✅ Wrote {} repositories to {}", repositories.len(), path.display());

    report_skipped(&skipped);
    println!("Requests sent: {}", collector.client().requests_sent());
    Ok(ExitCode::SUCCESS)
}

async fn collect_inclusivity(global: &GlobalArgs, orgs: &[OrgId]) -> anyhow::Result<ExitCode> {
    let mut collector = build_collector(global, Attribution::default())?;

    let outcome = tokio::select! {
        result = collector.fetch_inclusivity(orgs) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(result) = outcome else {
        println!("\n🛑 Interrupted, no output written");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    };
    let (rows, skipped) = result?;

    let path = write_report(&global.output_dir, "inclusivity_check", &rows)
        .context("Could not write the CSV report")?;
    println!("✅ Wrote {} repositories to {}", rows.len(), path.display());

    let flagged: Vec<_> = rows.iter().filter(|r| r.needs_attention()).collect();
    if !flagged.is_empty() {
        println!("\n{}", format!("🔎 {} repositories need attention:", flagged.len()).yellow().bold());
        for row in flagged {
            let branch = row.default_branch.as_deref().unwrap_or("-");
            let conduct = if row.code_of_conduct.is_some() { "yes" } else { "missing" };
            println!("  {} branch={} code_of_conduct={}", row.name_with_owner.yellow(), branch, conduct);
        }
    }

    report_skipped(&skipped);
    println!("Requests sent: {}", collector.client().requests_sent());
    Ok(ExitCode::SUCCESS)
}

async fn collect_pull_requests(global: &GlobalArgs, args: &PrArgs) -> anyhow::Result<ExitCode> {
    let mut collector = build_collector(global, Attribution::default())?;
    println!("📊 Pull requests of {}, up to {} page(s)", args.repo, args.pages);

    let outcome = tokio::select! {
        result = collector.fetch_pull_requests(&args.repo, args.pages) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(result) = outcome else {
        println!("\n🛑 Interrupted, no output written");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    };
    let pull_requests = result.with_context(|| format!("Cannot collect pull requests of {}", args.repo))?;

    let path = write_report(&global.output_dir, "pr_activity", &pull_requests)
        .context("Could not write the CSV report")?;
    println!("✅ Wrote {} pull requests to {}", pull_requests.len(), path.display());
    println!("Requests sent: {}", collector.client().requests_sent());
    Ok(ExitCode::SUCCESS)
}

fn describe(collection: &Collection, people: bool) -> String {
    if people {
        format!("people summary of {} commits", collection.records.total_commits())
    } else {
        format!("{} activity records", collection.records.len())
    }
}

fn report_skipped(skipped: &[SkippedTarget]) {
    if skipped.is_empty() {
        return;
    }
    println!("\n{}", format!("⚠️ Skipped {} target(s):", skipped.len()).yellow().bold());
    for target in skipped {
        println!("  {} {}", target.target.yellow(), target.reason.dimmed());
    }
}
