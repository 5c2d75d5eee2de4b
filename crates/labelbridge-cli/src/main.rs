//! CLI for labelbridge.
//!
//! Subcommands:
//!  - `publish`      : upload a flat turns file as a Label Studio project with a generated UI.
//!  - `import`       : export annotator edits and write a corrected copy of the training JSONL.
//!  - `label-config` : print the UI config a publish run would attach.
//!  - `edits`        : show the per-turn edits found in a saved export.
//!
//! Every option can also come from a TOML file passed with `--config`; flags
//! given on the command line win. Credentials may come from the environment
//! (`LABEL_STUDIO_URL`, `LABEL_STUDIO_API_KEY`).
//!
//! Usage examples:
//!  labelbridge publish --turns data/turns_train.json --title "Asymptote Project"
//!  labelbridge import --project-id 12 --train data_finetune/val_sk_01.jsonl --out data_finetune/val_sk_02.jsonl

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use labelbridge::{
    extract_edits, import::import_edits, parse_export, publish::publish_dataset,
    publish::render_label_config_for, read_json, AlignmentPolicy, BridgeConfig,
    LabelStudioClient, TurnField,
};

/// CLI entrypoint.
#[derive(Parser)]
#[command(
    name = "labelbridge",
    about = "Publish conversation turns to Label Studio and import annotator edits back",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Annotation service base URL.
    #[arg(long, global = true, env = "LABEL_STUDIO_URL")]
    base_url: Option<String>,

    /// API token (sent as `Authorization: Token <key>`).
    #[arg(long, global = true, env = "LABEL_STUDIO_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Request timeout in seconds (0 disables it).
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Verbose logging (debug level). `RUST_LOG` overrides.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a labeling project from a flat turns file.
    Publish(PublishArgs),

    /// Pull annotator edits and inject them into a copy of the training file.
    Import(ImportArgs),

    /// Print the generated label config for a flat turns file.
    LabelConfig(LabelConfigArgs),

    /// Show the edits contained in a saved export file.
    Edits(EditsArgs),
}

/// Options shared by `publish` and `label-config` that shape the UI.
#[derive(Args, Debug)]
struct UiArgs {
    /// Omit the image panel from each turn.
    #[arg(long)]
    no_image: bool,

    /// Link shown under each assistant response.
    #[arg(long, value_name = "URL", conflicts_with = "no_playground")]
    playground_url: Option<String>,

    /// Omit the playground link.
    #[arg(long)]
    no_playground: bool,

    /// Header above the user prompt.
    #[arg(long)]
    user_header: Option<String>,

    /// Header above the assistant response.
    #[arg(long)]
    assistant_header: Option<String>,
}

/// Arguments for the `publish` subcommand.
#[derive(Args, Debug)]
struct PublishArgs {
    /// Flat turns JSON file.
    #[arg(short, long, value_name = "PATH")]
    turns: Option<PathBuf>,

    /// Project title.
    #[arg(long)]
    title: Option<String>,

    /// Project description.
    #[arg(long)]
    description: Option<String>,

    /// Upload `chat_text` exactly as stored (skip unescaping).
    #[arg(long)]
    no_normalize: bool,

    /// Render the label config only; do not contact the service.
    #[arg(long)]
    dry_run: bool,

    /// Print the rendered label config to stdout.
    #[arg(long)]
    print_config: bool,

    #[command(flatten)]
    ui: UiArgs,
}

/// Arguments for the `import` subcommand.
#[derive(Args, Debug)]
struct ImportArgs {
    /// Project to export.
    #[arg(short, long)]
    project_id: Option<u64>,

    /// Flat turns JSON file (alignment source).
    #[arg(short, long, value_name = "PATH")]
    turns: Option<PathBuf>,

    /// Original training JSONL (read only).
    #[arg(long = "train", value_name = "PATH")]
    training_input: Option<PathBuf>,

    /// Corrected training JSONL to write.
    #[arg(long = "out", short = 'o', value_name = "PATH")]
    training_output: Option<PathBuf>,

    /// Save the raw export here.
    #[arg(long, value_name = "PATH")]
    export_snapshot: Option<PathBuf>,

    /// Use a saved export instead of contacting the service.
    #[arg(long = "from-export", value_name = "PATH")]
    export_input: Option<PathBuf>,

    /// Write the merged flat turns here.
    #[arg(long = "merged-out", value_name = "PATH")]
    merged_output: Option<PathBuf>,

    /// Continue without edits when no export can be retrieved.
    #[arg(long)]
    allow_missing_export: bool,

    /// Inject edited text exactly as typed (skip unescaping).
    #[arg(long)]
    no_normalize: bool,

    /// Wrap injected assistant text in a fenced code block.
    #[arg(long)]
    fence_code: bool,

    /// Language tag for fenced code.
    #[arg(long)]
    lang_hint: Option<String>,

    /// Alignment check between training lines and flat turns: strict|warn|off.
    #[arg(long)]
    alignment: Option<AlignmentPolicy>,

    /// Print the import report as JSON.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `label-config` subcommand.
#[derive(Args, Debug)]
struct LabelConfigArgs {
    /// Flat turns JSON file.
    #[arg(short, long, value_name = "PATH")]
    turns: Option<PathBuf>,

    /// Write the config here instead of stdout.
    #[arg(long, short = 'o', value_name = "PATH")]
    out: Option<PathBuf>,

    #[command(flatten)]
    ui: UiArgs,
}

/// Arguments for the `edits` subcommand.
#[derive(Args, Debug)]
struct EditsArgs {
    /// Saved export JSON file.
    #[arg(short, long, value_name = "PATH")]
    export: PathBuf,

    /// Output as JSON.
    #[arg(long)]
    json: bool,
}

/// Application entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Publish(args) => run_publish(config, args),
        Commands::Import(args) => run_import(config, args),
        Commands::LabelConfig(args) => run_label_config(config, args),
        Commands::Edits(args) => run_edits(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file (if any) and apply the global flags.
fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = match cli.config.as_ref() {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if let Some(url) = cli.base_url.as_ref() {
        config.service.base_url = url.clone();
    }
    if let Some(key) = cli.api_key.as_ref() {
        config.service.api_key = key.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.service.timeout_secs = secs;
    }
    tracing::debug!(service = ?config.service, "configuration loaded");
    Ok(config)
}

fn apply_ui_args(options: &mut labelbridge::label_config::LabelConfigOptions, ui: UiArgs) {
    if ui.no_image {
        options.include_image = false;
    }
    if ui.no_playground {
        options.playground_url = None;
    } else if ui.playground_url.is_some() {
        options.playground_url = ui.playground_url;
    }
    if let Some(h) = ui.user_header {
        options.user_header = h;
    }
    if let Some(h) = ui.assistant_header {
        options.assistant_header = h;
    }
}

fn client_for(config: &BridgeConfig) -> Result<LabelStudioClient> {
    if config.service.api_key.is_empty() {
        anyhow::bail!("an API key is required: pass --api-key or set LABEL_STUDIO_API_KEY");
    }
    LabelStudioClient::new(&config.service).context("building annotation service client")
}

/// Run the `publish` subcommand.
fn run_publish(config: BridgeConfig, args: PublishArgs) -> Result<()> {
    let mut publish = config.publish.clone();
    if let Some(turns) = args.turns {
        publish.turns = turns;
    }
    if let Some(title) = args.title {
        publish.title = title;
    }
    if let Some(description) = args.description {
        publish.description = description;
    }
    if args.no_normalize {
        publish.normalize_chat_text = false;
    }
    if args.dry_run {
        publish.dry_run = true;
    }
    apply_ui_args(&mut publish.label_config, args.ui);

    let report = if publish.dry_run {
        // Nothing is sent, so no credentials are needed.
        let offline = LabelStudioClient::new(&config.service).context("building client")?;
        publish_dataset(&offline, &publish)
    } else {
        publish_dataset(&client_for(&config)?, &publish)
    }
    .with_context(|| format!("publishing {}", publish.turns.display()))?;

    if args.print_config || publish.dry_run {
        println!("{}", report.label_config);
    }
    match report.project_id {
        Some(id) => println!(
            "Project '{}' created with ID {} ({} turns, config attached).",
            report.title, id, report.turn_count
        ),
        None => eprintln!("Dry run: {} turns rendered, nothing published.", report.turn_count),
    }
    Ok(())
}

/// Run the `import` subcommand.
fn run_import(config: BridgeConfig, args: ImportArgs) -> Result<()> {
    let mut import = config.import.clone();
    if let Some(id) = args.project_id {
        import.project_id = id;
    }
    if let Some(p) = args.turns {
        import.turns = p;
    }
    if let Some(p) = args.training_input {
        import.training_input = p;
    }
    if let Some(p) = args.training_output {
        import.training_output = p;
    }
    if args.export_snapshot.is_some() {
        import.export_snapshot = args.export_snapshot;
    }
    if args.export_input.is_some() {
        import.export_input = args.export_input;
    }
    if args.merged_output.is_some() {
        import.merged_output = args.merged_output;
    }
    if args.allow_missing_export {
        import.allow_missing_export = true;
    }
    if args.no_normalize {
        import.inject.normalize.enabled = false;
    }
    if args.fence_code {
        import.inject.normalize.fence_code = true;
    }
    if let Some(hint) = args.lang_hint {
        import.inject.normalize.lang_hint = hint;
    }
    if let Some(policy) = args.alignment {
        import.inject.alignment = policy;
    }

    let report = if import.export_input.is_some() {
        let offline = LabelStudioClient::new(&config.service).context("building client")?;
        import_edits(&offline, &import)
    } else {
        if import.project_id == 0 {
            anyhow::bail!("--project-id is required unless --from-export is given");
        }
        import_edits(&client_for(&config)?, &import)
    }
    .with_context(|| format!("importing edits into {}", import.training_output.display()))?;

    if args.json {
        let out = json!({
            "project_id": import.project_id,
            "export_available": report.export_available,
            "export_items": report.export_items,
            "edited_turns": report.edited_turns,
            "edited_fields": report.edited_fields,
            "merged_turns": report.merged_turns.len(),
            "alignment": import.inject.alignment.as_str(),
            "inject": report.inject,
            "output": import.training_output.to_string_lossy().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "Injected edits into {} fields across {} lines -> {}",
            report.inject.updated_fields,
            report.inject.total_lines,
            import.training_output.display()
        );
        println!(
            "Import summary: export_items={} edited_turns={} malformed={} passthrough={} beyond_turns={} misaligned={}",
            report.export_items,
            report.edited_turns,
            report.inject.malformed_lines,
            report.inject.passthrough_lines,
            report.inject.unaligned_lines,
            report.inject.misaligned_lines
        );
    }
    Ok(())
}

/// Run the `label-config` subcommand.
fn run_label_config(config: BridgeConfig, args: LabelConfigArgs) -> Result<()> {
    let mut options = config.publish.label_config.clone();
    apply_ui_args(&mut options, args.ui);
    let turns = args.turns.unwrap_or(config.publish.turns);

    let markup = render_label_config_for(&turns, &options)
        .with_context(|| format!("rendering label config for {}", turns.display()))?;

    match args.out {
        Some(out) => {
            std::fs::write(&out, markup)
                .with_context(|| format!("writing label config to {}", out.display()))?;
            println!("Wrote label config to {}", out.display());
        }
        None => print!("{}", markup),
    }
    Ok(())
}

/// Run the `edits` subcommand.
fn run_edits(args: EditsArgs) -> Result<()> {
    let raw: serde_json::Value = read_json(&args.export)
        .with_context(|| format!("reading export from {}", args.export.display()))?;
    let items = parse_export(&raw).context("parsing export items")?;
    let edits = extract_edits(&items);

    if args.json {
        let turns: serde_json::Map<String, serde_json::Value> = edits
            .iter()
            .map(|(turn_id, turn_edits)| {
                let fields: serde_json::Map<String, serde_json::Value> = TurnField::ALL
                    .iter()
                    .filter_map(|f| {
                        turn_edits
                            .get(*f)
                            .map(|v| (f.as_str().to_string(), json!(v)))
                    })
                    .collect();
                (turn_id.to_string(), serde_json::Value::Object(fields))
            })
            .collect();
        let out = json!({
            "export": args.export.to_string_lossy().to_string(),
            "items": items.len(),
            "edits": turns,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "{} edited fields across {} turns ({} export items):",
            edits.applied_fields(),
            edits.turn_count(),
            items.len()
        );
        for (turn_id, turn_edits) in edits.iter() {
            for field in TurnField::ALL {
                if let Some(value) = turn_edits.get(field) {
                    let snippet: String = value.chars().take(80).collect();
                    let ellipsis = if value.chars().count() > 80 { "..." } else { "" };
                    println!(
                        "  turn_id={} field={} text: {:?}{}",
                        turn_id,
                        field.as_str(),
                        snippet,
                        ellipsis
                    );
                }
            }
        }
    }
    Ok(())
}
