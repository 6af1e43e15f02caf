use anyhow::Result;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "inboxiq", version, about = "Email triage assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output structured JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(flatten)]
    credentials: CredentialArgs,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rank unread inbox mail, most urgent first
    Priority,
    /// Rank read inbox mail, least important first
    Cleanup,
    /// Find opt-out links in promotional mail
    Unsubscribe,
    /// Sender, domain and time-of-day statistics
    Dashboard(DashboardArgs),
    /// Remove a message from the inbox
    Archive { id: String },
    /// Move a message to the trash
    Delete { id: String },
}

#[derive(Debug, Args)]
struct DashboardArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    since: Option<String>,
    /// Day to stop before (YYYY-MM-DD)
    #[arg(long)]
    until: Option<String>,
}

#[derive(Debug, Args)]
struct SettingsArgs {
    /// Messages classified per priority or cleanup pass
    #[arg(long, global = true, env = "INBOXIQ_SIFT_SCAN_SIZE", default_value_t = inboxiq::config::DEFAULT_SIFT_SCAN_SIZE)]
    sift_scan_size: usize,
    /// Results shown after ranking
    #[arg(long, global = true, env = "INBOXIQ_DISPLAY_LIMIT", default_value_t = inboxiq::config::DEFAULT_DISPLAY_LIMIT)]
    display_limit: usize,
    #[arg(long, global = true, env = "INBOXIQ_UNSUBSCRIBE_SCAN_SIZE", default_value_t = inboxiq::config::DEFAULT_UNSUBSCRIBE_SCAN_SIZE)]
    unsubscribe_scan_size: usize,
    #[arg(long, global = true, env = "INBOXIQ_DASHBOARD_MAX_EMAILS", default_value_t = inboxiq::config::DEFAULT_DASHBOARD_MAX_EMAILS)]
    dashboard_max_emails: usize,
    /// Minimum milliseconds between classifier calls
    #[arg(long, global = true, env = "INBOXIQ_CLASSIFIER_INTERVAL_MS", default_value_t = 1000)]
    classifier_interval_ms: u64,
    #[arg(long, global = true, env = "INBOXIQ_MODEL", default_value = inboxiq::classifier::gemini::DEFAULT_MODEL)]
    model: String,
}

#[derive(Debug, Args)]
struct CredentialArgs {
    /// Gmail OAuth access token
    #[arg(long, global = true, env = "INBOXIQ_GMAIL_TOKEN", hide_env_values = true)]
    gmail_token: Option<String>,
    /// Token JSON file (default ~/.inboxiq/token.json)
    #[arg(long, global = true, env = "INBOXIQ_TOKEN_FILE")]
    token_file: Option<std::path::PathBuf>,
    /// Model API key (falls back to API_KEY)
    #[arg(long, global = true, env = "INBOXIQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, global = true, env = "INBOXIQ_GMAIL_API_BASE")]
    gmail_api_base: Option<String>,
    #[arg(long, global = true, env = "INBOXIQ_GMAIL_BATCH_ENDPOINT")]
    gmail_batch_endpoint: Option<String>,
    #[arg(long, global = true, env = "INBOXIQ_GEMINI_API_BASE")]
    gemini_api_base: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::dispatch(cli).await
}

mod commands {
    use std::time::Duration;

    use anyhow::{Context, Result};
    use chrono::NaiveDate;

    use inboxiq::classifier::{ClassifierClient, GeminiClassifier, RateLimiter};
    use inboxiq::config::{self, Settings};
    use inboxiq::mailstore::gmail::{GMAIL_API_BASE, GMAIL_BATCH_ENDPOINT};
    use inboxiq::mailstore::GmailMailStore;
    use inboxiq::metadata::DateRange;
    use inboxiq::output::{self, OutputFormat};
    use inboxiq::workflow::TriageSession;

    use super::{Cli, Commands, CredentialArgs, DashboardArgs, SettingsArgs};

    const INVALID_DATE_MESSAGE: &str = "Invalid date format. Please use YYYY-MM-DD.";

    pub async fn dispatch(cli: Cli) -> Result<()> {
        let format = OutputFormat::from_json_flag(cli.json);

        // Validate input before touching credentials or the network.
        let range = match &cli.command {
            Commands::Dashboard(args) => match parse_range(args) {
                Some(range) => Some(range),
                None => {
                    println!("{INVALID_DATE_MESSAGE}");
                    return Ok(());
                }
            },
            _ => None,
        };

        let settings = build_settings(cli.settings);
        let store = build_store(&cli.credentials)?;
        let classifier = build_classifier(&cli.credentials, &settings)?;
        let session = TriageSession::new(&store, &classifier, settings);

        let rendered = match cli.command {
            Commands::Priority => {
                let emails = session.priority_unread(report_progress).await;
                output::format_analyzed_emails(format, &emails)?
            }
            Commands::Cleanup => {
                let emails = session.low_priority_read(report_progress).await;
                output::format_analyzed_emails(format, &emails)?
            }
            Commands::Unsubscribe => {
                let candidates = session.unsubscribe_sweep(report_progress).await;
                output::format_unsubscribe_candidates(format, &candidates)?
            }
            Commands::Dashboard(_) => {
                let range = range.unwrap_or_default();
                let dashboard = session.dashboard(&range, report_progress).await;
                output::format_dashboard(format, &dashboard)?
            }
            Commands::Archive { id } => {
                let status = session.archive(&id).await;
                output::format_action_status(format, &status)?
            }
            Commands::Delete { id } => {
                let status = session.delete(&id).await;
                output::format_action_status(format, &status)?
            }
        };
        println!("{rendered}");
        Ok(())
    }

    fn build_settings(args: SettingsArgs) -> Settings {
        Settings {
            sift_scan_size: args.sift_scan_size,
            display_limit: args.display_limit,
            unsubscribe_scan_size: args.unsubscribe_scan_size,
            dashboard_max_emails: args.dashboard_max_emails,
            classifier_interval: Duration::from_millis(args.classifier_interval_ms),
            model: args.model,
        }
    }

    fn build_store(args: &CredentialArgs) -> Result<GmailMailStore> {
        let token_path = match &args.token_file {
            Some(path) => path.clone(),
            None => config::default_token_path().context("resolve default token path")?,
        };
        let token = config::resolve_gmail_token(args.gmail_token.as_deref(), &token_path)
            .context("Authentication failed: could not load Gmail credentials")?;

        let store = GmailMailStore::new(token);
        if args.gmail_api_base.is_none() && args.gmail_batch_endpoint.is_none() {
            return Ok(store);
        }
        Ok(store.with_endpoints(
            args.gmail_api_base.as_deref().unwrap_or(GMAIL_API_BASE),
            args.gmail_batch_endpoint
                .as_deref()
                .unwrap_or(GMAIL_BATCH_ENDPOINT),
        ))
    }

    fn build_classifier(args: &CredentialArgs, settings: &Settings) -> Result<ClassifierClient> {
        let api_key = config::resolve_api_key([
            args.api_key.clone(),
            std::env::var("API_KEY").ok(),
        ])
        .context("Authentication failed: could not load the model API key")?;

        let mut backend = GeminiClassifier::new(api_key, settings.model.clone())
            .context("initialize Gemini client")?;
        if let Some(base) = &args.gemini_api_base {
            backend = backend.with_api_base(base.as_str());
        }
        Ok(ClassifierClient::new(
            Box::new(backend),
            RateLimiter::every(settings.classifier_interval),
        ))
    }

    /// `None` when either bound is not a valid `YYYY-MM-DD` date.
    fn parse_range(args: &DashboardArgs) -> Option<DateRange> {
        let since = parse_date_arg(args.since.as_deref())?;
        let until = parse_date_arg(args.until.as_deref())?;
        Some(DateRange::new(since, until))
    }

    fn parse_date_arg(raw: Option<&str>) -> Option<Option<NaiveDate>> {
        match raw.map(str::trim).filter(|v| !v.is_empty()) {
            None => Some(None),
            Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().map(Some),
        }
    }

    fn report_progress(fraction: f32, status: &str) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u32;
        eprintln!("[{percent:>3}%] {status}");
    }
}
