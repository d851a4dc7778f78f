//! tessera-authz - permission debugging CLI
//!
//! Runs `check_right` / `effective_grants` against PostgreSQL or a JSON
//! fixture and prints the decision with its explain trace.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

use tessera_core::{
    config::Config,
    db::PgAuthzStore,
    error::{AuthzError, ErrorCode},
    rbac::{
        AuthorizationEngine, AuthzStore, Effect, EffectiveGrants, ExplainEntry, InMemoryStore,
        RightCheck, WildcardMatcher,
    },
    telemetry::init_logging,
};

// ═══════════════════════════════════════════════════════════════════════════════
// CLI Structure
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Parser)]
#[command(
    name = "tessera-authz",
    version,
    about = "Inspect authorization decisions for users in organizations",
    propagate_version = true
)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Read authorization data from a JSON snapshot instead of PostgreSQL
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a user holds a right in an organization
    Check {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Organization id
        #[arg(short, long)]
        org: String,

        /// Required right, e.g. `posts.write`
        #[arg(short, long)]
        right: String,
    },

    /// List every grant that applies to a user in an organization
    Grants {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Organization id
        #[arg(short, long)]
        org: String,
    },

    /// Apply database migrations
    Migrate,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Table Rows
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Tabled)]
struct ExplainRow {
    #[tabled(rename = "Origin")]
    origin: String,
    #[tabled(rename = "Effect")]
    effect: String,
    #[tabled(rename = "Right")]
    right: String,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Grant")]
    grant: String,
}

impl From<&ExplainEntry> for ExplainRow {
    fn from(entry: &ExplainEntry) -> Self {
        let effect = match entry.effect {
            Effect::Deny => entry.effect.as_str().red().to_string(),
            Effect::Allow => entry.effect.as_str().green().to_string(),
        };
        Self {
            origin: entry.origin.clone(),
            effect,
            right: entry.right.clone(),
            subject: entry.subject_id.to_string(),
            scope: entry
                .scope_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| entry.scope_type.as_str().to_string()),
            grant: entry.grant_id.to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Output Helpers
// ═══════════════════════════════════════════════════════════════════════════════

struct OutputHelper {
    format: OutputFormat,
}

impl OutputHelper {
    fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    fn print_success(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "status": "success", "message": message }));
            }
            OutputFormat::Text => {
                println!("{} {}", "[OK]".green().bold(), message);
            }
        }
    }

    fn print_error(&self, error: &AuthzError) {
        match self.format {
            OutputFormat::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "status": "error",
                        "code": error.code(),
                        "message": error.user_message(),
                    })
                );
            }
            OutputFormat::Text => {
                eprintln!("{} {}", "[ERROR]".red().bold(), error);
            }
        }
    }

    fn print_table<T: Tabled>(&self, items: &[T]) {
        if items.is_empty() {
            println!("{}", "No grants.".dimmed());
            return;
        }
        let table = Table::new(items)
            .with(Style::rounded())
            .with(Modify::new(Columns::first()).with(Alignment::left()))
            .to_string();
        println!("{}", table);
    }

    fn print_json<T: Serialize>(&self, data: &T) -> Result<(), AuthzError> {
        let json = serde_json::to_string_pretty(data)?;
        println!("{}", json);
        Ok(())
    }

    fn print_header(&self, title: &str) {
        println!();
        println!("{}", title.bold().underline());
        println!();
    }

    fn print_key_value(&self, key: &str, value: &str) {
        println!("  {}: {}", key.cyan(), value);
    }

    fn print_check(&self, check: &RightCheck) -> Result<(), AuthzError> {
        if let OutputFormat::Json = self.format {
            return self.print_json(check);
        }

        self.print_header("Right check");
        let verdict = if check.allowed {
            "allowed".green().bold()
        } else {
            "refused".red().bold()
        };
        self.print_key_value("Decision", &verdict.to_string());
        self.print_key_value("Reason", check.reason.as_str());
        self.print_key_value(
            "Layer",
            check.decision_layer.map(|l| l.as_str()).unwrap_or("-"),
        );
        if let Some(context) = &check.context {
            self.print_key_value("Roles", &join_ids(&context.roles));
            self.print_key_value("Groups", &join_ids(&context.groups));
        }
        println!();

        let rows: Vec<ExplainRow> = check.explain.iter().map(ExplainRow::from).collect();
        self.print_table(&rows);
        Ok(())
    }

    fn print_grants(&self, grants: &EffectiveGrants) -> Result<(), AuthzError> {
        if let OutputFormat::Json = self.format {
            return self.print_json(grants);
        }

        self.print_header("Effective grants");
        match &grants.org_member {
            Some(member) => self.print_key_value("Membership", member.status.as_str()),
            None => self.print_key_value("Membership", &"none".yellow().to_string()),
        }
        if let Some(context) = &grants.context {
            self.print_key_value("Roles", &join_ids(&context.roles));
            self.print_key_value("Groups", &join_ids(&context.groups));
        }
        self.print_key_value("Grants", &grants.grants.len().to_string());
        println!();

        let rows: Vec<ExplainRow> = grants.explain.iter().map(ExplainRow::from).collect();
        self.print_table(&rows);
        Ok(())
    }
}

fn join_ids<T: ToString>(ids: &[T]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

async fn open_store(cli: &Cli, config: &Config) -> Result<Arc<dyn AuthzStore>, AuthzError> {
    match &cli.fixture {
        Some(path) => {
            tracing::info!(fixture = %path.display(), "Using fixture store");
            Ok(Arc::new(InMemoryStore::from_json_file(path)?))
        }
        None => Ok(Arc::new(PgAuthzStore::connect(&config.database).await?)),
    }
}

async fn run(cli: &Cli, config: &Config, output: &OutputHelper) -> Result<(), AuthzError> {
    if let Commands::Migrate = cli.command {
        if cli.fixture.is_some() {
            return Err(AuthzError::new(
                ErrorCode::InvalidInput,
                "migrate needs a database, not a fixture",
            ));
        }
        let store = PgAuthzStore::connect(&config.database).await?;
        store.migrate().await?;
        output.print_success("Migrations applied");
        return Ok(());
    }

    let matcher: WildcardMatcher = config.engine.matcher()?;
    let engine = AuthorizationEngine::with_matcher(open_store(cli, config).await?, matcher);

    match &cli.command {
        Commands::Check { user, org, right } => {
            let check = engine
                .check_right(Some(user.as_str()), Some(org.as_str()), Some(right.as_str()))
                .await?;
            output.print_check(&check)
        }
        Commands::Grants { user, org } => {
            let grants = engine
                .effective_grants(Some(user.as_str()), Some(org.as_str()))
                .await?;
            output.print_grants(&grants)
        }
        Commands::Migrate => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    init_logging(&config.logging)?;

    let output = OutputHelper::new(cli.format, cli.no_color);

    if let Err(e) = run(&cli, &config, &output).await {
        output.print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
