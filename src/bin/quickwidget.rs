use clap::{Parser, Subcommand};
use quickwidget::{
    validate, Catalog, Converter, GeneratorConfig, PartialMetadata, WidgetError, WidgetRequest,
    WidgetResult,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Convert HTML/CSS/JS fragments into Elementor widget classes
#[derive(Parser, Debug)]
#[command(name = "quickwidget", version)]
#[command(
    about = "Convert HTML/CSS/JS fragments into validated Elementor widgets",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a widget class from a markup file
    Convert(ConvertArgs),

    /// Validate generated widget modules
    Validate {
        /// PHP files to check
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List catalog entries, or show the resolved template of one tag
    Catalog {
        /// Tag to resolve
        tag: Option<String>,

        /// Catalog file to use instead of the built-in one
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    /// Markup fragment or full HTML document
    #[arg(long, value_name = "FILE")]
    markup: PathBuf,

    /// Stylesheet embedded as the widget's custom CSS
    #[arg(long, value_name = "FILE")]
    style: Option<PathBuf>,

    /// Script embedded as the widget's custom JS
    #[arg(long, value_name = "FILE")]
    behavior: Option<PathBuf>,

    /// Write the widget here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    icon: Option<String>,

    /// Catalog file to use instead of the built-in one
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Generator settings (YAML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit the markup rendered with default control values instead of the module
    #[arg(long)]
    preview: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Convert(args) => run_convert(args),
        Command::Validate { files, json } => run_validate(&files, json),
        Command::Catalog { tag, catalog } => run_catalog(tag.as_deref(), catalog.as_deref()),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn read(path: &Path) -> WidgetResult<String> {
    fs::read_to_string(path)
        .map_err(|e| WidgetError::Io(format!("Failed to read {}: {}", path.display(), e)))
}

fn read_optional(path: Option<&Path>) -> WidgetResult<String> {
    path.map(read).transpose().map(Option::unwrap_or_default)
}

fn load_catalog(path: Option<&Path>) -> WidgetResult<Catalog> {
    match path {
        Some(path) => Catalog::from_file(path),
        None => Ok(Catalog::builtin().clone()),
    }
}

fn run_convert(args: ConvertArgs) -> WidgetResult<ExitCode> {
    let markup = read(&args.markup)?;
    let style = read_optional(args.style.as_deref())?;
    let behavior = read_optional(args.behavior.as_deref())?;
    let catalog = load_catalog(args.catalog.as_deref())?;
    let config = match &args.config {
        Some(path) => GeneratorConfig::from_file(path)?,
        None => GeneratorConfig::default(),
    };

    let metadata = PartialMetadata {
        name: args.name,
        title: args.title,
        description: args.description,
        category: args.category,
        icon: args.icon,
    };
    let request = WidgetRequest::new(&markup)
        .with_style(&style)
        .with_behavior(&behavior)
        .with_metadata(metadata);

    let converted = Converter::new(&catalog, &config).convert(&request)?;

    let text = if args.preview {
        converted.widget.preview()
    } else {
        converted.source().to_string()
    };
    match &args.output {
        Some(path) => {
            fs::write(path, &text).map_err(|e| {
                WidgetError::Io(format!("Failed to write {}: {}", path.display(), e))
            })?;
            eprintln!(
                "✓ {} written to {}",
                converted.widget.class_name,
                path.display()
            );
        }
        None => print!("{}", text),
    }
    if !converted.validation.warnings.is_empty() {
        eprint!("{}", converted.validation);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_validate(files: &[PathBuf], json: bool) -> WidgetResult<ExitCode> {
    let mut exit_code = ExitCode::SUCCESS;
    let mut reports = Vec::new();

    for path in files {
        let result = validate(&read(path)?);
        if !result.valid {
            exit_code = ExitCode::FAILURE;
        }
        if json {
            reports.push(serde_json::json!({
                "file": path.display().to_string(),
                "result": result,
            }));
        } else if result.valid {
            println!("{}: {}", path.display(), result);
        } else {
            eprintln!("{}: {}", path.display(), result);
        }
    }

    if json {
        let text = serde_json::to_string_pretty(&reports)
            .map_err(|e| WidgetError::Io(format!("Failed to encode report: {}", e)))?;
        println!("{}", text);
    }
    Ok(exit_code)
}

fn run_catalog(tag: Option<&str>, path: Option<&Path>) -> WidgetResult<ExitCode> {
    let catalog = load_catalog(path)?;
    match tag {
        Some(tag) => {
            let template = catalog.resolve(tag);
            print!("{}", serde_yaml::to_string(&template)?);
        }
        None => {
            for tag in catalog.tags() {
                let marker = if tag == catalog.fallback() { " (fallback)" } else { "" };
                println!("{}{}", tag, marker);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_error(error: &WidgetError) {
    match error {
        WidgetError::ValidationFailed { result, generated } => {
            eprintln!("✗ generated widget is not deliverable");
            eprint!("{}", result);
            eprintln!("  ({} bytes of rejected source)", generated.len());
        }
        WidgetError::CircularInheritance { chain } => {
            eprintln!("✗ Catalog error:");
            eprintln!("    circular inheritance: {}", chain);
        }
        other => eprintln!("✗ {}", other),
    }
}
