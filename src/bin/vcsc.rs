//! vcsc - compiles bytecode assemblies to an Atari 2600 program
//!
//! ```text
//! vcsc game.json -o build/game.bin --assembler 64tass --annotations bytecode
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vcsc::bytecode::{framework::FRAMEWORK, Assembly, AssemblySet};
use vcsc::{CompileOptions, Compiler, SourceAnnotation};

#[derive(Debug, Parser)]
#[command(name = "vcsc", version, about = "Compile bytecode to VIL macro assembly for the Atari 2600")]
struct Cli {
    /// User assembly, as JSON
    input: PathBuf,

    /// Additional referenced assemblies, as JSON
    #[arg(short, long = "reference")]
    references: Vec<PathBuf>,

    /// JSON file of compile options; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Binary output path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the program to stdout instead of building
    #[arg(long)]
    print: bool,

    #[arg(long)]
    disable_optimizations: bool,

    /// Skip one optional rewrite rule; may be repeated
    #[arg(long = "disable-rule", value_name = "RULE")]
    disabled_rules: Vec<String>,

    /// List the optional rewrite rules and exit
    #[arg(long)]
    list_rules: bool,

    /// Inline every call that allows it
    #[arg(long)]
    inline_all: bool,

    #[arg(long, value_enum)]
    annotations: Option<SourceAnnotation>,

    /// External assembler
    #[arg(long)]
    assembler: Option<PathBuf>,

    /// Open the program in this editor afterwards
    #[arg(long)]
    editor: Option<PathBuf>,

    /// Run the binary in this emulator afterwards
    #[arg(long)]
    emulator: Option<PathBuf>,

    /// Add a generation timestamp to the program
    #[arg(long)]
    timestamp: bool,
}

impl Cli {
    fn options(&self) -> Result<CompileOptions> {
        let mut options = match &self.config {
            Some(path) => serde_json::from_str(&read(path)?)
                .with_context(|| format!("invalid config {}", path.display()))?,
            None => CompileOptions::default(),
        };

        if self.output.is_some() {
            options.output_path = self.output.clone();
        }
        options.disable_optimizations |= self.disable_optimizations;
        options.disabled_rules.extend(self.disabled_rules.iter().cloned());
        options.inline_all_calls |= self.inline_all;
        if let Some(annotations) = self.annotations {
            options.source_annotations = annotations;
        }
        if self.assembler.is_some() {
            options.assembler_path = self.assembler.clone();
        }
        if self.editor.is_some() {
            options.text_editor_path = self.editor.clone();
        }
        if self.emulator.is_some() {
            options.emulator_path = self.emulator.clone();
        }
        options.emit_timestamp |= self.timestamp;
        Ok(options)
    }

    fn assemblies(&self) -> Result<AssemblySet> {
        let mut assemblies = vec![load(&self.input)?];
        for path in &self.references {
            assemblies.push(load(path)?);
        }
        assemblies.push(FRAMEWORK.clone());
        Ok(AssemblySet::with_assemblies(assemblies))
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load(path: &Path) -> Result<Assembly> {
    Assembly::from_json(&read(path)?).with_context(|| format!("invalid assembly {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.list_rules {
        for name in vcsc::compiler::optimizer::optional_rule_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let compiler = Compiler::new(cli.options()?);
    let assemblies = cli.assemblies()?;

    if cli.print {
        let result = compiler.compile(&assemblies)?;
        print!("{}", result.program);
        return Ok(());
    }

    let (_, rom) = compiler.build(&assemblies)?;
    if !rom.output.is_empty() {
        eprint!("{}", rom.output);
    }
    if compiler.options().assembler_path.is_none() {
        println!("Wrote {}", rom.assembly_path.display());
        return Ok(());
    }
    match (&rom.rom_path, rom.is_successful) {
        (Some(path), true) => {
            println!("Compilation succeeded: {}", path.display());
            Ok(())
        }
        _ => anyhow::bail!("assembly of {} failed", rom.assembly_path.display()),
    }
}
