//! flowbox: compile, convert and run visual process graphs from the shell

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use flow_engine::{
    compile, install, CompilerConfig, FacadeSettings, HandlerCatalog, InMemoryEngine,
    InventoryLocator, OperationDescriptor, OperationDispatcher, OperationKind, OperationRegistry,
    ProcessFacade, UiGraph, Variables,
};

#[derive(Parser)]
#[command(name = "flowbox", version, about = "Turn visual process graphs into executable processes")]
struct Cli {
    /// JSON file overlaid on the default compiler config
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Process id forced onto the output
    #[arg(long, global = true)]
    process_id: Option<String>,

    /// Process name forced onto the output
    #[arg(long, global = true)]
    process_name: Option<String>,

    /// Target namespace of the output
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Write the editor model and markup of every conversion here
    #[arg(long, global = true)]
    debug_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a UI graph into the editor model
    Compile {
        graph: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Convert a UI graph into process markup
    Convert {
        graph: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Also write the intermediate editor model
        #[arg(long)]
        editor_out: Option<PathBuf>,
    },
    /// List the available operations
    Operations {
        #[arg(long)]
        category: Option<String>,
        /// service, script or user-task
        #[arg(long)]
        kind: Option<OperationKind>,
    },
    /// Convert, deploy and start a graph on the in-memory engine
    Run {
        graph: PathBuf,
        /// Start variable as key=value; values parse as JSON when they can
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, Value)>,
    },
}

/// Split `key=value`, reading the value as JSON and falling back to a string
fn parse_var(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn load_config(cli: &Cli) -> Result<CompilerConfig, Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => CompilerConfig::from_path(path)?,
        None => CompilerConfig::default(),
    };
    if let Some(id) = &cli.process_id {
        config.process.id = id.clone();
    }
    if let Some(name) = &cli.process_name {
        config.process.name = name.clone();
    }
    if let Some(namespace) = &cli.namespace {
        config.process.namespace = namespace.clone();
    }
    Ok(config)
}

fn load_graph(path: &Path) -> Result<UiGraph, Box<dyn Error>> {
    let json = fs::read_to_string(path)
        .map_err(|e| format!("failed to read graph '{}': {}", path.display(), e))?;
    Ok(UiGraph::from_json_str(&json)?)
}

/// Print to stdout, or write to `out` when given
fn emit(text: &str, out: Option<&Path>) -> Result<(), Box<dyn Error>> {
    match out {
        Some(path) => {
            fs::write(path, text)?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

/// Registry and catalog holding every linked operation
fn builtin_operations() -> Result<(Arc<OperationRegistry>, Arc<HandlerCatalog>), Box<dyn Error>> {
    // Referencing the crate keeps its inventory entries linked
    let expected = flow_operations::static_locator().len();

    let registry = Arc::new(OperationRegistry::new());
    let catalog = Arc::new(HandlerCatalog::new());
    let installed = install(&InventoryLocator::new(), &registry, &catalog)?;
    if installed < expected {
        log::warn!(
            "Inventory found {} operations, expected at least {}",
            installed,
            expected
        );
    }
    Ok((registry, catalog))
}

fn print_operations(operations: &[OperationDescriptor]) {
    for op in operations {
        println!("{:<24} {:<10} {:<14} {}", op.id, op.kind.label(), op.category, op.description);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let settings = FacadeSettings {
        debug_artifact_dir: cli.debug_dir.clone(),
        ..Default::default()
    };

    match cli.command {
        Commands::Compile { graph, out } => {
            let model = compile(&load_graph(&graph)?, &config);
            emit(&model.to_json_pretty()?, out.as_deref())?;
        }
        Commands::Convert {
            graph,
            out,
            editor_out,
        } => {
            let (registry, catalog) = builtin_operations()?;
            let engine = InMemoryEngine::new(OperationDispatcher::new(registry.clone(), catalog));
            let facade = ProcessFacade::new(config, Arc::new(engine))
                .with_registry(registry)
                .with_settings(settings);

            let conversion = facade.convert(&load_graph(&graph)?)?;
            if let Some(path) = editor_out {
                fs::write(&path, conversion.editor_model.to_json_pretty()?)?;
                log::info!("Wrote {}", path.display());
            }
            emit(&conversion.markup, out.as_deref())?;
        }
        Commands::Operations { category, kind } => {
            let (registry, _) = builtin_operations()?;
            let mut operations = match &category {
                Some(category) => registry.list_by_category(category),
                None => registry.list_all(),
            };
            if let Some(kind) = kind {
                operations.retain(|op| op.kind == kind);
            }
            operations.sort_by(|a, b| a.id.cmp(&b.id));
            print_operations(&operations);
        }
        Commands::Run { graph, vars } => {
            let (registry, catalog) = builtin_operations()?;
            let engine = InMemoryEngine::new(OperationDispatcher::new(registry.clone(), catalog));
            let facade = ProcessFacade::new(config, Arc::new(engine))
                .with_registry(registry)
                .with_settings(settings);

            let variables: Variables = vars.into_iter().collect();
            let summary = facade.execute(&load_graph(&graph)?, variables).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
