use crate::api::{normalize_phone, CatalogApi, TableCrmClient};
use crate::config::{self, AppConfig, OutputMode};
use crate::product::{add_tags, ProductDraft, ProductError, ProductForm};
use crate::receipt::{self, TextSummary};
use crate::session::{self, Session};
use crate::wizard::{fetch_references, MIN_PHONE_DIGITS};
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "tablecrm-order",
    version,
    about = "Order entry and product publishing for TableCRM, with an interactive TUI"
)]
pub struct Cli {
    /// Base URL of the TableCRM REST API
    #[arg(long, env = "TABLECRM_BASE_URL", default_value = config::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Access token to use instead of the stored one
    #[arg(long, env = "TABLECRM_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Where the access token is stored between runs
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// Log file used while the TUI is running
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Quiet period before a catalog search is sent while typing
    #[arg(long, default_value = "400ms")]
    pub debounce: humantime::Duration,

    /// Per-request timeout (no timeout by default)
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Print JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print text and exit (no TUI)
    #[arg(long, conflicts_with = "json")]
    pub text: bool,

    /// Forget the stored access token and exit
    #[arg(long)]
    pub logout: bool,

    /// Look up customers by phone number
    #[arg(long, value_name = "PHONE")]
    pub lookup: Option<String>,

    /// Print accounts, organizations, warehouses and price types
    #[arg(long)]
    pub references: bool,

    /// Search the catalog; with no query lists the default page
    #[arg(long, value_name = "QUERY", num_args = 0..=1, default_missing_value = "")]
    pub search: Option<String>,

    /// Publish a product described by a JSON or TOML file
    #[arg(long, value_name = "FILE")]
    pub create_product: Option<PathBuf>,

    /// Generate descriptions, SEO fields and an article code from the name
    #[arg(long, requires = "create_product")]
    pub autofill: bool,

    /// Extra SEO keywords for --create-product, comma separated; repeatable
    #[arg(long = "keyword", value_name = "TAGS", requires = "create_product")]
    pub keywords: Vec<String>,
}

/// What a single invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Interactive,
    Logout,
    Lookup(String),
    References,
    Search(Option<String>),
    CreateProduct {
        path: PathBuf,
        autofill: bool,
        keywords: Vec<String>,
    },
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.logout {
            Mode::Logout
        } else if let Some(path) = self.create_product.clone() {
            Mode::CreateProduct {
                path,
                autofill: self.autofill,
                keywords: self.keywords.clone(),
            }
        } else if let Some(phone) = self.lookup.clone() {
            Mode::Lookup(phone)
        } else if self.references {
            Mode::References
        } else if let Some(q) = self.search.as_deref() {
            Mode::Search(Some(q.trim().to_string()).filter(|q| !q.is_empty()))
        } else {
            Mode::Interactive
        }
    }
}

/// Build an `AppConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<AppConfig> {
    let token_path = match args.token_file.clone() {
        Some(p) => p,
        None => session::default_token_path()?,
    };
    Ok(AppConfig {
        base_url: args.base_url.clone(),
        user_agent: format!("tablecrm-order/{}", env!("CARGO_PKG_VERSION")),
        timeout: args.timeout.map(Duration::from),
        debounce: Duration::from(args.debounce),
        token_path,
        token_override: args
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        log_file: args.log_file.clone().unwrap_or_else(config::default_log_path),
        output: if args.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        },
    })
}

pub async fn run(args: Cli, cfg: AppConfig) -> Result<()> {
    match args.mode() {
        Mode::Interactive => {
            if args.json || args.text {
                bail!("--json and --text need one of --lookup, --references, --search or --create-product");
            }
            run_interactive(cfg).await
        }
        Mode::Logout => run_logout(&cfg),
        mode => {
            let client = TableCrmClient::new(&cfg.base_url, &cfg.user_agent, cfg.timeout)?;
            let token = resolve_token(&cfg, &client).await?;
            let (out_tx, out_handle) = spawn_output_writer();
            let res = run_command(&cfg, &client, &token, mode, &out_tx).await;
            drop(out_tx);
            let _ = out_handle.await;
            res
        }
    }
}

#[cfg(feature = "tui")]
async fn run_interactive(cfg: AppConfig) -> Result<()> {
    crate::tui::run(cfg).await
}

#[cfg(not(feature = "tui"))]
async fn run_interactive(_cfg: AppConfig) -> Result<()> {
    bail!("built without TUI support; use --lookup, --references, --search or --create-product")
}

fn run_logout(cfg: &AppConfig) -> Result<()> {
    let mut session = Session::new(cfg.token_path.clone());
    session.clear()?;
    eprintln!("Signed out ({} removed)", cfg.token_path.display());
    Ok(())
}

/// Token from `--token` (validated first), else the stored one.
async fn resolve_token<A: CatalogApi + ?Sized>(cfg: &AppConfig, api: &A) -> Result<String> {
    if let Some(token) = cfg.token_override.as_deref() {
        api.validate_credential(token)
            .await
            .context("access token rejected")?;
        return Ok(token.to_string());
    }
    let mut session = Session::new(cfg.token_path.clone());
    match session.init()? {
        Some(token) => Ok(token.to_string()),
        None => bail!(
            "no stored access token at {}; sign in through the TUI or pass --token",
            cfg.token_path.display()
        ),
    }
}

async fn run_command<A: CatalogApi + ?Sized>(
    cfg: &AppConfig,
    api: &A,
    token: &str,
    mode: Mode,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    match mode {
        Mode::Lookup(phone) => {
            let digits = normalize_phone(&phone);
            if digits.len() < MIN_PHONE_DIGITS {
                bail!("enter a phone number with at least {MIN_PHONE_DIGITS} digits");
            }
            let found = api
                .find_customers_by_phone(token, &digits)
                .await
                .context("customer lookup failed")?;
            emit(cfg, out_tx, &found, receipt::customers(&found))
        }
        Mode::References => {
            let refs = fetch_references(api, token)
                .await
                .context("loading reference lists failed")?;
            emit(cfg, out_tx, &refs, receipt::references(&refs))
        }
        Mode::Search(query) => {
            let items = api
                .search_catalog(token, query.as_deref())
                .await
                .context("catalog search failed")?;
            emit(cfg, out_tx, &items, receipt::catalog(&items))
        }
        Mode::CreateProduct {
            path,
            autofill,
            keywords,
        } => {
            let mut form = ProductForm::new(ProductDraft::load(&path)?);
            if autofill {
                form.autofill()?;
            }
            for raw in &keywords {
                add_tags(&mut form.draft.seo_keywords, raw);
            }
            let summary = receipt::product(&form.draft);
            let created = match form.submit(api, token).await {
                Err(ProductError::Invalid(errs)) => {
                    for line in receipt::product_errors(&errs).lines {
                        let _ = out_tx.send(OutputLine::Stderr(line));
                    }
                    bail!(
                        "{} is not a valid product; start with the {} fields",
                        path.display(),
                        form.tab().label()
                    );
                }
                other => other?,
            };
            let _ = out_tx.send(OutputLine::Stderr(format!(
                "Product published from {}",
                path.display()
            )));
            emit(cfg, out_tx, &created, summary)
        }
        Mode::Interactive | Mode::Logout => Ok(()),
    }
}

fn emit<T: Serialize + ?Sized>(
    cfg: &AppConfig,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    value: &T,
    summary: TextSummary,
) -> Result<()> {
    match cfg.output {
        OutputMode::Json => {
            let out = serde_json::to_string_pretty(value)?;
            let _ = out_tx.send(OutputLine::Stdout(out));
        }
        OutputMode::Text => {
            for line in summary.lines {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
        }
    }
    Ok(())
}
