use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::AuditArgs;
use crate::fetch::PageFetcher;
use crate::findings::{FindingsGenerator, GenerationOutcome, ModelBackend, OpenAiBackend};
use crate::report::RemediationRow;
use crate::walk::{PageRecord, StopReason, WalkConfig, WalkError, Walker};

pub const SUMMARY_FILE: &str = "summary.md";
pub const REPORT_CSV_FILE: &str = "seo_audit_report.csv";
pub const PAGES_FILE: &str = "pages.jsonl";

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub walk: WalkConfig,
    pub digest_max_chars: usize,
    pub models: Vec<String>,
    pub rate_limit_backoff: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct Findings {
    pub summary: GenerationOutcome,
    pub table: GenerationOutcome,
    pub rows: Vec<RemediationRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub seed: String,
    pub audited_at: DateTime<Utc>,
    pub pages: Vec<PageRecord>,
    pub failed_pages: usize,
    pub stop: StopReason,
    pub digest: String,
    /// `None` when the walk collected nothing, so no model was asked.
    pub findings: Option<Findings>,
}

/// Walks `seed`, then asks the generator for a summary and a remediation
/// table built from the digest.
pub async fn audit<F, B>(
    seed: &str,
    walker: &Walker<F>,
    generator: &FindingsGenerator<B>,
    digest_max_chars: usize,
    cancel: &CancellationToken,
    on_page: impl FnMut(&PageRecord),
) -> Result<AuditReport, WalkError>
where
    F: PageFetcher,
    B: ModelBackend,
{
    let audited_at = Utc::now();
    let walked = walker.walk_with(seed, cancel, on_page).await?;
    let digest = crate::digest::render(&walked.pages, digest_max_chars);

    let findings = if walked.pages.is_empty() {
        tracing::warn!(seed, "no pages collected; skipping findings");
        None
    } else {
        tracing::info!(
            pages = walked.pages.len(),
            digest_chars = digest.chars().count(),
            models = ?generator.models(),
            "analyzing digest"
        );
        let summary = generator.summarize(&digest).await;
        let table = generator.remediation_table(&digest).await;
        let rows = table
            .text()
            .map(crate::report::parse_rows)
            .unwrap_or_default();
        Some(Findings {
            summary,
            table,
            rows,
        })
    };

    Ok(AuditReport {
        seed: seed.trim().to_owned(),
        audited_at,
        pages: walked.pages,
        failed_pages: walked.failures.len(),
        stop: walked.stop,
        digest,
        findings,
    })
}

pub fn config_from_args(args: &AuditArgs) -> AuditConfig {
    AuditConfig {
        walk: WalkConfig::from_args(&args.site),
        digest_max_chars: args.site.digest_max_chars,
        models: args.models.clone(),
        rate_limit_backoff: Duration::from_millis(args.rate_limit_backoff_ms),
    }
}

pub async fn run(args: AuditArgs) -> anyhow::Result<()> {
    let out_dir = PathBuf::from(&args.out);
    for name in [SUMMARY_FILE, REPORT_CSV_FILE, PAGES_FILE] {
        let path = out_dir.join(name);
        if path.exists() && !args.force {
            anyhow::bail!("output already exists: {} (use --force)", path.display());
        }
    }

    let config = config_from_args(&args);
    if config.models.is_empty() {
        anyhow::bail!("at least one --model is required");
    }

    let backend = OpenAiBackend::from_env(&args.openai_base_url, args.openai_temperature)
        .context("configure OpenAI backend")?;
    let walker = Walker::http(config.walk.clone()).context("build walker")?;
    let generator =
        FindingsGenerator::new(backend, config.models.clone(), config.rate_limit_backoff);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; finishing with pages collected so far");
            ctrl_c.cancel();
        }
    });

    let report = audit(
        &args.site.url,
        &walker,
        &generator,
        config.digest_max_chars,
        &cancel,
        |_| {},
    )
    .await
    .context("audit site")?;

    let Some(findings) = report.findings.as_ref() else {
        anyhow::bail!(
            "no pages could be fetched from {} ({} failed)",
            report.seed,
            report.failed_pages
        );
    };

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output dir: {}", out_dir.display()))?;

    write_pages(&out_dir.join(PAGES_FILE), &report.pages, args.force)?;
    write_output(
        &out_dir.join(SUMMARY_FILE),
        &render_summary_markdown(&report, findings),
        args.force,
    )?;
    write_output(
        &out_dir.join(REPORT_CSV_FILE),
        &crate::report::to_csv(&findings.rows),
        args.force,
    )?;

    match &findings.summary {
        GenerationOutcome::Generated { text, .. } => println!("{text}"),
        GenerationOutcome::NoEndpointAvailable { .. } => {
            tracing::warn!("summary unavailable: every model failed")
        }
    }
    if let GenerationOutcome::NoEndpointAvailable { .. } = &findings.table {
        tracing::warn!("remediation table unavailable: every model failed");
    }

    tracing::info!(
        out = %out_dir.display(),
        pages = report.pages.len(),
        rows = findings.rows.len(),
        "audit report written"
    );
    Ok(())
}

pub fn render_summary_markdown(report: &AuditReport, findings: &Findings) -> String {
    let mut out = String::new();
    out.push_str(&format!("# SEO audit: {}\n\n", report.seed));
    out.push_str(&format!(
        "Audited at {} ({} pages, {} failed fetches).\n\n",
        report.audited_at.to_rfc3339(),
        report.pages.len(),
        report.failed_pages
    ));

    out.push_str("## Pages\n\n");
    for page in &report.pages {
        out.push_str(&format!("- {}: {}\n", page.url, page.title));
    }
    out.push('\n');

    out.push_str("## Executive summary\n\n");
    match &findings.summary {
        GenerationOutcome::Generated { model, text } => {
            out.push_str(text.trim());
            out.push_str(&format!("\n\n_Generated by {model}._\n"));
        }
        GenerationOutcome::NoEndpointAvailable { failures } => {
            out.push_str("No model endpoint was available.\n\n");
            for failure in failures {
                out.push_str(&format!(
                    "- {} ({} attempts): {}\n",
                    failure.model, failure.attempts, failure.error
                ));
            }
        }
    }
    out
}

fn write_pages(path: &Path, pages: &[PageRecord], force: bool) -> anyhow::Result<()> {
    let file = open_output(path, force)?;
    let mut writer = BufWriter::new(file);
    for page in pages {
        serde_json::to_writer(&mut writer, page).context("write page record json")?;
        writer
            .write_all(b"\n")
            .context("write page record newline")?;
    }
    writer
        .flush()
        .with_context(|| format!("flush output: {}", path.display()))?;
    Ok(())
}

fn write_output(path: &Path, contents: &str, force: bool) -> anyhow::Result<()> {
    let mut file = open_output(path, force)?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write output: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("flush output: {}", path.display()))?;
    Ok(())
}

fn open_output(path: &Path, force: bool) -> anyhow::Result<std::fs::File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options
        .open(path)
        .with_context(|| format!("open output: {}", path.display()))
}
