use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use jsref::{CircularPolicy, Options, Source, pointer};
use refio::VERSION;
use serde_json::Value;
use tracing::info;

use crate::config::{Config, load_config, load_config_from_string};
use crate::logging::init_logging;

#[derive(Parser, Debug)]
#[command(
    name = "jsref",
    about = "Resolve, dereference and bundle JSON Schema $refs.",
    disable_version_flag = true,
    help_expected = true,
    max_term_width = 100
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long = "version", short = 'V', help = "Show version and exit.")]
    version: bool,

    #[arg(long, help = "Log debug information. Default: no.")]
    debug: bool,

    #[arg(
        long = "log-dir",
        value_name = "PATH",
        help = "Write daily log files to this directory. Default: stderr."
    )]
    log_dir: Option<PathBuf>,

    #[arg(
        long = "config",
        value_name = "TOML_OR_JSON",
        help = "Config TOML/JSON string to load. Default: none."
    )]
    config_string: Option<String>,

    #[arg(
        long = "config-file",
        value_name = "PATH",
        help = "Config TOML/JSON file to load. Default: none."
    )]
    config_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse the root schema without following any $ref.
    Parse(SchemaArgs),
    /// Load every document the schema references and print them by path.
    Resolve(SchemaArgs),
    /// Replace every $ref with the value it points to.
    Dereference(SchemaArgs),
    /// Move external values into the root schema and rewrite $refs.
    Bundle(SchemaArgs),
}

impl Commands {
    fn split(self) -> (Operation, SchemaArgs) {
        match self {
            Commands::Parse(args) => (Operation::Parse, args),
            Commands::Resolve(args) => (Operation::Resolve, args),
            Commands::Dereference(args) => (Operation::Dereference, args),
            Commands::Bundle(args) => (Operation::Bundle, args),
        }
    }
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[arg(value_name = "SCHEMA", help = "Path or URL of the root schema.")]
    schema: String,

    #[arg(long, value_enum, default_value = "json", help = "Output format.")]
    format: OutputFormat,

    #[arg(
        long,
        short = 'o',
        value_name = "PATH",
        help = "Write the result to a file. Default: stdout."
    )]
    output: Option<PathBuf>,

    #[arg(
        long = "continue-on-error",
        help = "Collect recoverable errors and report them together. Default: no."
    )]
    continue_on_error: bool,

    #[arg(long = "no-external", help = "Do not follow $refs to other documents.")]
    no_external: bool,

    #[arg(
        long = "skip-internal",
        help = "Do not crawl into objects whose $ref is internal."
    )]
    skip_internal: bool,

    #[arg(
        long,
        value_name = "allow|ignore|error",
        value_parser = parse_circular,
        help = "How circular $refs are dereferenced. Default: from config, else allow."
    )]
    circular: Option<CircularPolicy>,

    #[arg(long = "preserve-id", help = "Keep $id on inlined values.")]
    preserve_id: bool,
}

impl SchemaArgs {
    /// Flags override config values.
    fn apply(&self, mut options: Options) -> Options {
        if self.continue_on_error {
            options.continue_on_error = true;
        }
        if self.no_external {
            options.resolve.external = false;
        }
        if self.skip_internal {
            options.resolve.skip_internal = true;
        }
        if let Some(circular) = self.circular {
            options.dereference.circular = circular;
        }
        if self.preserve_id {
            options.dereference.preserve_id = true;
        }
        options
    }
}

fn parse_circular(value: &str) -> Result<CircularPolicy, String> {
    value.parse()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Parse,
    Resolve,
    Dereference,
    Bundle,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Parse => "parse",
            Operation::Resolve => "resolve",
            Operation::Dereference => "dereference",
            Operation::Bundle => "bundle",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("jsref, version {VERSION}");
        return Ok(());
    }

    init_logging(cli.debug, cli.log_dir.as_deref()).await?;

    validate_cli_args(&cli)?;
    let config = load_cli_config(&cli).await?;

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };
    let (operation, args) = command.split();
    let options = args.apply(config.to_options());

    let value = execute(operation, &args.schema, &options).await?;
    let rendered = render(&value, args.format)?;
    match args.output.as_ref() {
        Some(path) => write_output(path, &rendered).await?,
        None => print!("{rendered}"),
    }
    info!("Finished {} of {}", operation.as_str(), args.schema);
    Ok(())
}

fn validate_cli_args(cli: &Cli) -> Result<()> {
    if cli.config_string.is_some() && cli.config_file.is_some() {
        anyhow::bail!("Cannot combine --config, --config-file.");
    }
    if let Some(config_string) = cli.config_string.as_ref() {
        if config_string.trim().is_empty() {
            anyhow::bail!("Config cannot be empty.");
        }
    }
    Ok(())
}

async fn load_cli_config(cli: &Cli) -> Result<Config> {
    if let Some(config_string) = cli.config_string.as_ref() {
        return load_config_from_string(config_string).map_err(|err| anyhow::anyhow!(err.to_string()));
    }
    if let Some(config_file) = cli.config_file.as_ref() {
        return load_config(config_file)
            .await
            .map_err(|err| anyhow::anyhow!(err.to_string()));
    }
    Ok(Config::default())
}

/// Run one operation and export its result. `resolve` yields every document
/// keyed by path; the others yield the root schema.
pub async fn execute(operation: Operation, schema: &str, options: &Options) -> Result<Value> {
    let source = Source::from(schema);
    let result = match operation {
        Operation::Parse => jsref::parse(source, options).await,
        Operation::Resolve => jsref::resolve(source, options).await,
        Operation::Dereference => jsref::dereference(source, options).await,
        Operation::Bundle => jsref::bundle(source, options).await,
    };
    let parser = result.map_err(|err| anyhow::anyhow!(describe_error(&err)))?;

    if operation == Operation::Resolve {
        let values = parser
            .refs()
            .values(&[])
            .map_err(|err| anyhow::anyhow!(describe_error(&err)))?;
        return Ok(Value::Object(values.into_iter().collect()));
    }

    parser.to_value().map_err(|err| match err {
        jsref::Error::Circular { .. } => anyhow::anyhow!(
            "{err}. A circular schema cannot be printed; use --circular ignore to keep circular $refs"
        ),
        other => anyhow::anyhow!(describe_error(&other)),
    })
}

/// One line per error; a group lists every recorded failure with its
/// location.
pub fn describe_error(err: &jsref::Error) -> String {
    let Some(group) = err.as_group() else {
        return format!("{}: {err}", err.name());
    };
    let mut lines = vec![err.to_string()];
    for entry in &group.errors {
        lines.push(format!(
            "  {}: {} (at {}{})",
            entry.name(),
            entry.message(),
            entry.source,
            pointer::format_pointer(&entry.path)
        ));
    }
    lines.join("\n")
}

pub fn render(value: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
            text.push('\n');
            Ok(text)
        }
        OutputFormat::Yaml => serde_yaml::to_string(value).context("Failed to serialize YAML"),
    }
}

async fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
