use std::{io::Write, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use graphnet::{CompiledModel, GraphDescription, GraphDict, Infer, ModelCompiler, ParameterMap};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Should the logs be printed in json format or not
    #[arg(long, env)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ModelArgs {
    /// JSON description of the graph model.
    #[arg(short, long, env = "GRAPHNET_DESCRIPTION")]
    description: PathBuf,

    /// JSON object mapping tensor names to their flat values.
    #[arg(short, long, env = "GRAPHNET_PARAMS")]
    params: PathBuf,

    /// Overrides the model name used for the block and the generated file.
    #[arg(long, env = "GRAPHNET_NAME")]
    name: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a model and write its generated inference code.
    Compile {
        #[command(flatten)]
        model: ModelArgs,

        /// Directory receiving `<name>.rs`.
        #[arg(short, long, env = "GRAPHNET_OUT_DIR", default_value = ".")]
        out_dir: PathBuf,
    },

    /// Compile a model, run one message passing round on a graph and print the result.
    Infer {
        #[command(flatten)]
        model: ModelArgs,

        /// JSON graph with `nodes`, `edges`, `globals`, `senders` and `receivers`.
        #[arg(short, long, env = "GRAPHNET_GRAPH")]
        graph: PathBuf,

        /// Number of rounds to run.
        #[arg(long, env = "GRAPHNET_STEPS", default_value = "1")]
        steps: usize,
    },

    /// Compile a model and print its stages.
    Inspect {
        #[command(flatten)]
        model: ModelArgs,
    },
}

fn setup_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_target(true)
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.compact().finish())
    };
    installed.context("setting up logging")
}

fn compile(args: &ModelArgs, emit_artifact: bool) -> anyhow::Result<CompiledModel> {
    let description = GraphDescription::from_json_file(&args.description)?;
    let params = ParameterMap::from_json_file(&args.params)?;
    let mut compiler = ModelCompiler::new(description, params).with_artifact(emit_artifact);
    if let Some(name) = &args.name {
        compiler = compiler.with_name(name);
    }
    compiler
        .compile()
        .with_context(|| format!("compiling {}", args.description.display()))
}

fn write_stdout(text: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}").context("writing to stdout")
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(args.json_logs)?;

    match args.command {
        Command::Compile { model, out_dir } => {
            let compiled = compile(&model, true)?;
            let artifact = compiled
                .artifact()
                .context("compiler did not produce generated code")?;
            let path = artifact.write_to(&out_dir)?;
            info!(model = compiled.name(), path = %path.display(), "compilation done");
        }
        Command::Infer {
            model,
            graph,
            steps,
        } => {
            let compiled = compile(&model, false)?;
            let file = std::fs::File::open(&graph)
                .with_context(|| format!("opening graph {}", graph.display()))?;
            let dict = GraphDict::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("decoding graph {}", graph.display()))?;
            let mut state = dict
                .into_state(compiled.input_widths())
                .context("building graph state")?;
            for step in 0..steps {
                compiled
                    .try_infer(&mut state)
                    .with_context(|| format!("running step {step}"))?;
            }
            let output = serde_json::to_string_pretty(&GraphDict::from(&state))
                .context("encoding output graph")?;
            write_stdout(&output)?;
        }
        Command::Inspect { model } => {
            let compiled = compile(&model, false)?;
            write_stdout(&format!(
                "{}\ninput widths: {}\noutput widths: {}",
                compiled.describe(),
                compiled.input_widths(),
                compiled.output_widths()
            ))?;
        }
    }
    Ok(())
}
