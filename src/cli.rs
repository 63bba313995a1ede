use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Walk a site and print page records (JSONL) or the digest.
    Walk(WalkArgs),
    /// Walk a site and write an LLM-generated SEO audit report.
    Audit(AuditArgs),
}

#[derive(Debug, Clone, Args)]
pub struct WalkArgs {
    #[command(flatten)]
    pub site: SiteArgs,

    /// Print the digest handed to the model instead of JSONL records.
    #[arg(long)]
    pub digest: bool,
}

/// Walk settings shared by `walk` and `audit`.
#[derive(Debug, Clone, Args)]
pub struct SiteArgs {
    /// Seed URL (`https://` is assumed when no scheme is given).
    #[arg(long)]
    pub url: String,

    /// Maximum pages to collect (failed fetches do not count).
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_pages: u64,

    /// Per-request timeout.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: u64,

    /// Lower bound of the random pause before each request.
    #[arg(long, default_value_t = 500)]
    pub delay_min_ms: u64,

    /// Upper bound of the random pause before each request.
    #[arg(long, default_value_t = 1500)]
    pub delay_max_ms: u64,

    /// Wall-clock cap for the whole walk (0 disables the cap).
    #[arg(long, default_value_t = 120)]
    pub max_elapsed_secs: u64,

    /// Treat `page#a` and `page#b` as the same page.
    #[arg(long)]
    pub strip_fragments: bool,

    /// Character cap applied to the digest.
    #[arg(long, default_value_t = crate::digest::DEFAULT_MAX_CHARS)]
    pub digest_max_chars: usize,
}

#[derive(Debug, Clone, Args)]
pub struct AuditArgs {
    #[command(flatten)]
    pub site: SiteArgs,

    /// Output directory for `summary.md`, `seo_audit_report.csv` and `pages.jsonl`.
    #[arg(long, default_value = "audit-report")]
    pub out: String,

    /// Overwrite existing report files.
    #[arg(long)]
    pub force: bool,

    /// Model names to try, in priority order.
    #[arg(long = "model", default_values_t = crate::findings::DEFAULT_MODELS.iter().map(|m| m.to_string()))]
    pub models: Vec<String>,

    /// OpenAI API base URL.
    #[arg(long, default_value = crate::openai::DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, default_value_t = 0.2)]
    pub openai_temperature: f32,

    /// Pause before the single retry after a rate-limit response.
    #[arg(long, default_value_t = 5000)]
    pub rate_limit_backoff_ms: u64,
}
