// SPDX-License-Identifier: MIT OR Apache-2.0
//! `OrdoPlay` shader graph compiler.
//!
//! Loads a shader graph document and the sub-graph assets it references,
//! brings its nodes up to date with the built-in node types, validates it
//! and writes the generated HLSL.

mod settings;

use clap::Parser as _;
use ordoplay_shadergraph::diagnostics::DiagnosticSink as _;
use ordoplay_shadergraph::library::create_builtin_registry;
use ordoplay_shadergraph::{
    generate_shader, CodegenError, DefinitionError, Diagnostics, GenerationMode, GraphError, NodeKind,
    NodeTypeRegistry, Precision, Severity, ShaderGraph, SubGraphLibrary,
};
use settings::{CompilerSettings, SettingsError};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log filter used when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "ordoplay_shadergraph=info";

/// Precision flag values
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum PrecisionArg {
    /// 32-bit floats
    Float,
    /// 16-bit floats
    Half,
}

impl From<PrecisionArg> for Precision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Float => Precision::Float,
            PrecisionArg::Half => Precision::Half,
        }
    }
}

/// Compile a shader graph to HLSL
#[derive(clap::Parser, Debug)]
#[clap(author, version, about)]
struct Cli {
    /// Graph document (RON) to compile
    graph: PathBuf,

    /// Settings file; defaults to `shadergraph.ron` next to the graph
    #[clap(long, short)]
    settings: Option<PathBuf>,

    /// Output file; stdout when omitted
    #[clap(long, short)]
    output: Option<PathBuf>,

    /// Floating point precision
    #[clap(long, value_enum)]
    precision: Option<PrecisionArg>,

    /// Name of the surface input struct
    #[clap(long)]
    struct_name: Option<String>,

    /// Generate preview code (unconnected inputs read properties)
    #[clap(long)]
    preview: bool,

    /// Additional directory to load sub-graph assets from
    #[clap(long = "sub-graph-dir")]
    sub_graph_dirs: Vec<PathBuf>,

    /// Write the effective settings (after flags) to this file
    #[clap(long)]
    save_settings: Option<PathBuf>,
}

impl Cli {
    /// Overlay command line flags on loaded settings
    fn apply_to(&self, settings: &mut CompilerSettings) {
        if let Some(precision) = self.precision {
            settings.precision = precision.into();
        }
        if let Some(name) = &self.struct_name {
            settings.graph_input_struct_name.clone_from(name);
        }
        if self.preview {
            settings.generation_mode = GenerationMode::Preview;
        }
        if self.output.is_some() {
            settings.output.clone_from(&self.output);
        }
        settings.sub_graph_dirs.extend(self.sub_graph_dirs.iter().cloned());
    }

    fn load_settings(&self) -> Result<CompilerSettings, SettingsError> {
        let mut settings = match &self.settings {
            Some(path) => CompilerSettings::load(path)?,
            None => {
                let dir = self.graph.parent().unwrap_or_else(|| Path::new("."));
                CompilerSettings::load_or_default(dir)?
            }
        };
        self.apply_to(&mut settings);
        Ok(settings)
    }
}

/// Error aborting a compilation
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("{0} node(s) failed validation")]
    Validation(usize),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Load every `.ron` sub-graph asset in `dirs`
fn load_sub_graphs(dirs: &[PathBuf]) -> Result<SubGraphLibrary, CliError> {
    let mut library = SubGraphLibrary::new();
    for dir in dirs {
        for entry in std::fs::read_dir(dir).map_err(io_error(dir))? {
            let path = entry.map_err(io_error(dir))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("ron") {
                continue;
            }
            let source = std::fs::read_to_string(&path).map_err(io_error(&path))?;
            let asset = library.insert_ron(&source)?;
            tracing::debug!("Loaded sub-graph '{}' from {}", asset.name, path.display());
        }
    }
    tracing::info!("Loaded {} sub-graph asset(s)", library.len());
    Ok(library)
}

/// Bring function nodes up to date with the registered node types
fn redefine_nodes(graph: &mut ShaderGraph, registry: &NodeTypeRegistry, diagnostics: &mut Diagnostics) -> Result<(), CliError> {
    let function_nodes: Vec<_> = graph
        .nodes()
        .filter(|node| matches!(node.kind, NodeKind::Function))
        .map(|node| (node.id, node.type_name.clone()))
        .collect();

    for (id, type_name) in function_nodes {
        let Some(descriptor) = registry.handle(&type_name).and_then(|handle| registry.get(handle)) else {
            tracing::debug!("No built-in type '{type_name}'; keeping stored definition");
            continue;
        };
        let reconciliation = graph.redefine_node(id, descriptor)?;
        for removed in &reconciliation.removed {
            diagnostics.warning(Some(id), removed.to_string());
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let settings = cli.load_settings()?;
    if let Some(path) = &cli.save_settings {
        settings.save(path)?;
        tracing::info!("Saved settings to {}", path.display());
    }
    let library = load_sub_graphs(&settings.sub_graph_dirs)?;
    let registry = create_builtin_registry()?;

    let source = std::fs::read_to_string(&cli.graph).map_err(io_error(&cli.graph))?;
    let mut graph = ShaderGraph::from_ron(&source)?;
    tracing::info!("Compiling graph '{}' ({} nodes)", graph.name, graph.node_count());

    let mut diagnostics = Diagnostics::new();
    redefine_nodes(&mut graph, &registry, &mut diagnostics)?;
    graph.refresh_all_sub_graphs(&library, &mut diagnostics);
    for dependency in graph.source_asset_dependencies(&library) {
        if let Some(asset) = library.get(dependency) {
            tracing::debug!("Depends on sub-graph '{}' ({dependency})", asset.name);
        }
    }
    let report = graph.validate(&library, &mut diagnostics);

    for diagnostic in diagnostics.iter() {
        match diagnostic.severity {
            Severity::Warning => tracing::warn!("{diagnostic}"),
            Severity::Error => tracing::error!("{diagnostic}"),
        }
    }
    if !report.is_valid() {
        return Err(CliError::Validation(report.nodes_with_errors.len()));
    }

    let shader = generate_shader(&graph, &settings.graph_context(), settings.generation_mode, &library)?;
    match &settings.output {
        Some(path) => {
            std::fs::write(path, shader.to_string()).map_err(io_error(path))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => print!("{shader}"),
    }
    Ok(())
}

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    // Generated code goes to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting OrdoPlay shader graph compiler v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        tracing::error!("Compilation failed: {e}");
        std::process::exit(1);
    }
}
