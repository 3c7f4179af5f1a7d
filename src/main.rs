use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use kb_distill::config::DistillConfig;
use kb_distill::export::write_atomic;
use kb_distill::pipeline::processor::{Distiller, PipelineInput, RunSummary, detect_input};
use kb_distill::pipeline::rules::RuleSet;

/// kb-distill — turn a support mailbox archive into a knowledge text.
#[derive(Parser)]
#[command(name = "kb-distill", version, about, long_about = None)]
struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and write the knowledge text.
    Run {
        /// Folder with inbound/outbound mail folders, or a pairs text file.
        input: Option<PathBuf>,

        #[command(flatten)]
        mailboxes: MailboxArgs,

        #[command(flatten)]
        options: PipelineArgs,
    },

    /// Match mailboxes and write only the pair exports.
    Pair {
        #[command(flatten)]
        mailboxes: MailboxArgs,

        #[command(flatten)]
        options: PipelineArgs,
    },

    /// Write the built-in rule tables to a TOML file for editing.
    InitRules {
        /// Target file.
        #[arg(default_value = "rules.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Explicit mailbox folders (instead of a detected input folder).
#[derive(Args)]
struct MailboxArgs {
    /// Folder of inbound (customer) `.eml` files.
    #[arg(long, requires = "outbox")]
    inbox: Option<PathBuf>,

    /// Folder of outbound (support) `.eml` files.
    #[arg(long, requires = "inbox")]
    outbox: Option<PathBuf>,
}

#[derive(Args)]
struct PipelineArgs {
    /// Output folder (defaults to `output` next to the input).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only pair replies sent from this domain.
    #[arg(long, env = "KB_DISTILL_SUPPORT_DOMAIN")]
    support_domain: Option<String>,

    /// TOML rule file replacing the built-in tables.
    #[arg(long, env = "KB_DISTILL_RULES")]
    rules: Option<PathBuf>,

    /// Also emit a section for pairs that matched no topic.
    #[arg(long)]
    emit_catch_all: bool,
}

impl PipelineArgs {
    fn into_config(self, default_output: PathBuf) -> DistillConfig {
        DistillConfig::new(self.output.unwrap_or(default_output))
            .with_support_domain(self.support_domain)
            .with_rules_path(self.rules)
            .with_catch_all(self.emit_catch_all)
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => fmt().with_env_filter(env_filter).with_target(false).init(),
        LogFormat::Json => fmt().json().with_env_filter(env_filter).init(),
    }
}

/// `output` inside an input folder, or next to an input file.
fn default_output(input: &Path) -> PathBuf {
    if input.is_dir() {
        input.join("output")
    } else {
        input
            .parent()
            .map_or_else(|| PathBuf::from("output"), |p| p.join("output"))
    }
}

fn print_summary(summary: &RunSummary) {
    eprintln!("Pairs: {}", summary.pairs);
    eprintln!("Outbound without match: {}", summary.unmatched_outbound);
    eprintln!("Inbound without reply: {}", summary.unmatched_inbound);
    if summary.sections > 0 || summary.statements > 0 {
        eprintln!(
            "Knowledge: {} statements in {} sections",
            summary.statements, summary.sections
        );
    }
    for path in &summary.written {
        eprintln!("  wrote {}", path.display());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Command::Run {
            input,
            mailboxes,
            options,
        } => {
            let (input, default_out) = match (input, mailboxes.inbox, mailboxes.outbox) {
                (Some(path), None, None) => {
                    let detected = detect_input(&path).await?;
                    (detected, default_output(&path))
                }
                (None, Some(inbox), Some(outbox)) => {
                    let out = default_output(inbox.parent().unwrap_or(Path::new(".")));
                    (PipelineInput::Mailboxes { inbox, outbox }, out)
                }
                (Some(_), _, _) => bail!("give either an input path or --inbox/--outbox, not both"),
                _ => bail!("no input: give an input path or --inbox and --outbox"),
            };
            let distiller = Distiller::from_config(options.into_config(default_out)).await?;
            info!(input = ?input, output = %distiller.config().output_dir.display(), "Starting run");
            let summary = distiller.run(&input).await?;
            print_summary(&summary);
        }
        Command::Pair { mailboxes, options } => {
            let (Some(inbox), Some(outbox)) = (mailboxes.inbox, mailboxes.outbox) else {
                bail!("pair needs --inbox and --outbox");
            };
            let out = default_output(inbox.parent().unwrap_or(Path::new(".")));
            let distiller = Distiller::from_config(options.into_config(out)).await?;
            let summary = distiller.pair(&inbox, &outbox).await?;
            print_summary(&summary);
        }
        Command::InitRules { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let toml = RuleSet::default_rules().to_toml()?;
            write_atomic(&path, toml.as_bytes())
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Rule tables written to {}", path.display());
        }
    }
    Ok(())
}
