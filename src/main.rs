use camino::Utf8PathBuf;
use knit_driver::{module_graph, Driver, DriverOptions};
use log::info;
use miette::IntoDiagnostic;
use owo_colors::OwoColorize;
use std::collections::HashMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(clap::Args, Debug)]
pub struct SourceArgs {
    /// Root of the source tree, overrides the options file.
    source_dir: Option<Utf8PathBuf>,
    /// Modules to load, the root module when none are given.
    modules: Vec<String>,
    /// Also load the test modules.
    #[arg(long)]
    test: bool,
    /// Load every module of the source tree.
    #[arg(long)]
    all: bool,
    /// JSON options file.
    #[arg(long)]
    options: Option<Utf8PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
pub enum Cmd {
    /// Loads and links the modules, printing every diagnostic.
    Check {
        #[command(flatten)]
        source: SourceArgs,
        /// Skip the sweep for missing overrides.
        #[arg(long)]
        ide: bool,
        /// Do not report mount name conflicts between user definitions.
        #[arg(long)]
        no_mount_conflict_error: bool,
    },
    /// Lists the loaded modules, imported ones first.
    Modules {
        #[command(flatten)]
        source: SourceArgs,
    },
}

fn driver_options(args: SourceArgs) -> miette::Result<DriverOptions> {
    let mut options = match &args.options {
        Some(path) => DriverOptions::load(path).into_diagnostic()?,
        None => DriverOptions::default(),
    };

    if let Some(dir) = args.source_dir {
        options.source_dir = dir;
    }
    if !args.modules.is_empty() {
        options.modules = args.modules;
    }
    options.test |= args.test;
    options.all |= args.all;

    Ok(options)
}

fn main() -> miette::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "knit=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli: Cli = clap::Parser::parse();

    match cli.command {
        Cmd::Check {
            source,
            ide,
            no_mount_conflict_error,
        } => {
            let mut options = driver_options(source)?;
            options.compiler.ide |= ide;
            if no_mount_conflict_error {
                options.compiler.mount_conflict_error = false;
            }

            let checked = Driver::new(options).check_dir().into_diagnostic()?;
            let errors = checked.report.error_count();

            info!(
                "{} {} definitions, {} entities",
                "Linked".bold().bright_white(),
                checked.app.defs.len(),
                checked.app.entity_order.as_ref().map_or(0, Vec::len),
            );

            checked.report.eprint(&checked.sources).into_diagnostic()?;
            if errors > 0 {
                miette::bail!("{errors} errors");
            }
        }
        Cmd::Modules { source } => {
            let options = driver_options(source)?;
            let loaded = Driver::new(options).load_dir().into_diagnostic()?;

            let graph = module_graph(&loaded.modules);
            let cyclic = graph.cyclic_nodes();
            let order = graph
                .topological_sort()
                .unwrap_or_else(|_| loaded.modules.iter().map(|m| m.name.clone()).collect());

            let by_name = loaded
                .modules
                .iter()
                .map(|m| (&m.name, m))
                .collect::<HashMap<_, _>>();

            for name in &order {
                let Some(module) = by_name.get(name) else {
                    continue;
                };

                let mut flags = Vec::new();
                if module.is_test() {
                    flags.push("test");
                }
                if module.is_abstract() {
                    flags.push("abstract");
                }
                if module.is_external() {
                    flags.push("external");
                }
                if !module.selected {
                    flags.push("imported");
                }

                let display = if name.parts().is_empty() {
                    "<root>".to_owned()
                } else {
                    name.to_string()
                };

                if cyclic.contains(name) {
                    println!("{} {} {}", display.bright_red(), flags.join(" ").dimmed(), "cycle".red());
                } else {
                    println!("{} {}", display.bright_white(), flags.join(" ").dimmed());
                }
            }

            let errors = loaded.report.error_count();
            loaded.report.eprint(&loaded.sources).into_diagnostic()?;
            if errors > 0 {
                miette::bail!("{errors} errors");
            }
        }
    }

    Ok(())
}
