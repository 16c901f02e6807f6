use log::{info, warn};

use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use clap::Parser;
use snafu::{whatever, ErrorCompat, ResultExt};

use serde_json::json;
use serde_json::Value as JSValue;

use result_board::{team_full_name, ProgramView, ResultRecord};

mod args;
mod board;

use crate::args::Args;
use crate::board::service::BoardService;
use crate::board::store::{MemoryStore, PublicationStore, SledStore};
use crate::board::BoardResult;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    if let Err(e) = run(&args).await {
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> BoardResult<()> {
    if args.store == ":memory:" {
        run_with_store(args, MemoryStore::default()).await
    } else {
        run_with_store(args, SledStore::open(&args.store)?).await
    }
}

async fn run_with_store<S: PublicationStore>(args: &Args, store: S) -> BoardResult<()> {
    let feed_url = args.feed_url.clone().unwrap_or_default();
    let mut service = BoardService::new(&feed_url, store);
    load(&mut service, args).await?;

    let repo = service.repository();
    if repo.is_empty() {
        warn!("the feed decoded to zero result rows");
    } else {
        info!(
            "feed loaded: {} entries across {} programs",
            repo.records().len(),
            repo.unique_program_codes().len()
        );
    }

    // Operator actions run against the freshly reconciled state and exit.
    if let Some(code) = &args.publish {
        service.set_published(code, true).await?;
        info!("{} has been published", code);
        return Ok(());
    }
    if let Some(code) = &args.unpublish {
        service.set_published(code, false).await?;
        info!("{} has been unpublished", code);
        return Ok(());
    }
    if args.publish_all {
        service.set_all_published(true).await?;
        info!("all programs have been published");
        return Ok(());
    }
    if args.unpublish_all {
        service.set_all_published(false).await?;
        info!("all programs have been unpublished");
        return Ok(());
    }

    emit_summary(&service, args)?;

    if let Some(secs) = args.watch {
        info!("watching the feed every {} seconds", secs);
        let mut ticker = tokio::time::interval(Duration::from_secs(secs));
        // The first tick completes immediately and the initial refresh
        // already ran, so consume it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = load(&mut service, args).await {
                let what = if e.is_store_error() {
                    "publish control"
                } else {
                    "results feed"
                };
                warn!("{} unavailable, keeping previous results: {}", what, e);
            }
            emit_summary(&service, args)?;
        }
    }
    Ok(())
}

// One fetch-decode-reconcile cycle, from the endpoint or from a local file.
async fn load<S: PublicationStore>(
    service: &mut BoardService<S>,
    args: &Args,
) -> BoardResult<()> {
    match (&args.input, &args.feed_url) {
        (Some(path), _) => {
            let raw = fs::read_to_string(path)
                .with_whatever_context(|_| format!("Cannot read the feed file {}", path))?;
            service.ingest(&raw).await
        }
        (None, Some(_)) => service.refresh().await,
        (None, None) => whatever!("either --feed-url or --input must be provided"),
    }
}

fn emit_summary<S: PublicationStore>(service: &BoardService<S>, args: &Args) -> BoardResult<()> {
    let repo = service.repository();
    let views = service.program_views();

    let published: HashSet<String> = views
        .iter()
        .filter(|v| v.is_published)
        .map(|v| v.code.clone())
        .collect();
    let mut subset = repo.filter(|r| args.all || published.contains(&r.program_code));
    if let Some(section) = &args.section {
        subset = result_board::filter_by_section(&subset, section);
    }
    if let Some(team) = &args.team {
        subset = result_board::filter_by_team(&subset, team);
    }
    if let Some(term) = &args.search {
        subset = result_board::search(&subset, term);
    }

    let groups = result_board::group_programs(&subset, repo.records());
    let summary = summary_js(&groups, &views, &service.ticker(), service.last_cycle_error());

    let pretty = serde_json::to_string_pretty(&summary)
        .whatever_context("Failed to serialize the summary")?;

    match &args.out {
        Some(path) if path != "stdout" => {
            fs::write(path, &pretty)
                .with_whatever_context(|_| format!("Cannot write the summary to {}", path))?;
            info!("summary written to {}", path);
        }
        _ => println!("{}", pretty),
    }
    Ok(())
}

// Assembles the output summary: one entry per program group in recency
// order, with the entries of each program in feed order.
fn summary_js(
    groups: &[(String, Vec<ResultRecord>)],
    views: &[ProgramView],
    ticker: &[String],
    last_error: Option<&str>,
) -> JSValue {
    let mut programs: Vec<JSValue> = Vec::new();
    for (code, members) in groups {
        let view = views.iter().find(|v| v.code == *code);
        let entries: Vec<JSValue> = members
            .iter()
            .map(|r| {
                json!({
                    "position": r.position,
                    "chestNo": r.chest_no,
                    "candidateName": r.candidate_name,
                    "team": team_full_name(&r.team_code),
                    "grade": r.grade,
                })
            })
            .collect();
        programs.push(json!({
            "programCode": code,
            "programName": members.first().map(|m| m.program_name.clone()).unwrap_or_default(),
            "section": members.first().map(|m| m.program_section.clone()).unwrap_or_default(),
            "published": view.map(|v| v.is_published).unwrap_or(false),
            "entries": entries,
        }));
    }
    json!({ "programs": programs, "ticker": ticker, "lastError": last_error })
}
