use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use miette::{bail, Diagnostic, IntoDiagnostic, NamedSource, Report, Result};

use clap::{Parser, ValueEnum};

use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = None, long_about = None)]
#[command(propagate_version = true)]
struct CliArgs {
    /// Path to the Sae source file
    input_file: PathBuf,

    /// Path to the output file
    #[arg(short, long)]
    output_file: Option<PathBuf>,

    /// Execution mode
    #[arg(value_enum)]
    #[arg(short, long)]
    #[arg(default_value_t = ExecutionMode::Compile)]
    mode: ExecutionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExecutionMode {
    /// Transpile to C++ and build a native executable
    Compile,

    /// Emit the generated C++ source
    Transpile,

    /// Compile and immediately execute, cleaning up the artifacts
    Run,

    /// Inspect the AST of the parsed source code
    Parse,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().without_time())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let args = CliArgs::parse();

    if !args.input_file.is_file() {
        bail!("No proper input file: {:?}", args.input_file);
    }

    let source = fs::read_to_string(&args.input_file).into_diagnostic()?;

    let ast = saec::parse(&source)
        .map_err(|err| with_source(err, &args.input_file, &source))?;
    info!("Parsing successful");

    if args.mode == ExecutionMode::Parse {
        ast.pretty_print().into_diagnostic()?;
        return Ok(());
    }

    let ast = saec::type_check(ast)
        .map_err(|err| with_source(err, &args.input_file, &source))?;
    info!("Type checking successful");

    let code = saec::lower(&ast)
        .map_err(|err| with_source(err, &args.input_file, &source))?;
    info!("Code generation successful");

    match args.mode {
        ExecutionMode::Transpile => {
            let out = args
                .output_file
                .clone()
                .unwrap_or_else(|| cpp_path(&args.input_file));
            if out.exists() {
                warn!("{:?} already exists and will be overridden", &out);
            }
            fs::write(&out, &code).into_diagnostic()?;
        }
        ExecutionMode::Compile => {
            let cpp = cpp_path(&args.input_file);
            let exe = args
                .output_file
                .clone()
                .unwrap_or_else(|| executable_path(&args.input_file));
            if exe.exists() {
                warn!("{:?} already exists and will be overridden", &exe);
            }
            fs::write(&cpp, &code).into_diagnostic()?;
            let result = compile_cpp(&cpp, &exe);
            fs::remove_file(&cpp).into_diagnostic()?;
            result?;
        }
        ExecutionMode::Run => {
            let dir = tempfile::tempdir().into_diagnostic()?;
            let cpp = dir.path().join("program.cpp");
            let exe = dir.path().join(if cfg!(windows) {
                "program.exe"
            } else {
                "program"
            });
            fs::write(&cpp, &code).into_diagnostic()?;
            compile_cpp(&cpp, &exe)?;

            let status = Command::new(&exe).status().into_diagnostic()?;
            let exit = status.code().unwrap_or(1);
            dir.close().into_diagnostic()?;
            std::process::exit(exit);
        }
        ExecutionMode::Parse => {}
    }

    Ok(())
}

/// Attach the source text so the rendered error shows a snippet
fn with_source<E>(err: E, path: &Path, source: &str) -> Report
where
    E: Diagnostic + Send + Sync + 'static,
{
    Report::new(err).with_source_code(NamedSource::new(
        path.to_string_lossy(),
        source.to_string(),
    ))
}

/// `foo.sae` becomes `foo.sae.cpp`
fn cpp_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".cpp");
    PathBuf::from(name)
}

/// `foo.sae` becomes `foo` (with `.exe` appended on Windows)
fn executable_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(|| input.as_os_str().to_os_string());
    let mut path = input.with_file_name(stem);
    if cfg!(windows) {
        path.set_extension("exe");
    }
    path
}

/// Hand the generated C++ to the native compiler selected through `CXX`
fn compile_cpp(cpp: &Path, exe: &Path) -> Result<()> {
    let compiler = env::var("CXX").unwrap_or_else(|_| String::from("g++"));
    info!("Invoking {} on {:?}", compiler, cpp);

    let status = Command::new(&compiler)
        .arg(cpp)
        .arg("-O3")
        .arg("-o")
        .arg(exe)
        .status()
        .into_diagnostic()?;

    if !status.success() {
        bail!("The native compiler exited with {status}");
    }

    Ok(())
}
