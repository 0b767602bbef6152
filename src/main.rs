//! CLI entry point for compilation database lookup.
//!
//! Editors and scripts call `stagedb resolve <FILE>` to learn which
//! compilation database applies to a source file. The other commands expose
//! the router and sysroot lookup on their own and check the tables.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde::Serialize;
use stagedb::io::{ExitCode, JsonResponse, OutputFormat, ResponseMeta};
use stagedb::project_resolver::candidate_path;
use stagedb::{
    ResolveError, ResolveResult, Settings, SettingsRequest, SimpleProviderRegistry, StageName,
    StageResolver, SysrootLocator, logging,
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Compilation database lookup for multi-stage build trees
#[derive(Parser)]
#[command(
    name = "stagedb",
    version = env!("CARGO_PKG_VERSION"),
    about = "Find the compilation database for a source file",
    long_about = "Route source files to the build stage that owns them and report that stage's compilation database and sysroot.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .stagedb directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// Resolve the compilation database for a file
    #[command(
        about = "Resolve compilation database settings for a file",
        after_help = "Examples:\n  stagedb resolve src/kernel/mm.c\n  stagedb resolve src/newlib/libc/stdio/printf.c --json\n  stagedb resolve $PWD/src/loader/main.c --ls"
    )]
    Resolve {
        /// Source file (absolute or relative to the project root)
        file: PathBuf,

        /// Language category of the file (defaults to the configured one)
        #[arg(short, long)]
        language: Option<String>,

        /// Output in JSON format
        #[arg(long, conflicts_with = "ls")]
        json: bool,

        /// Print only the language-server settings object
        #[arg(long)]
        ls: bool,
    },

    /// Show which stage owns a file
    #[command(after_help = "Examples:\n  stagedb route src/userspace/lib9p/lib/9p.c")]
    Route {
        /// Source file (absolute or relative to the project root)
        file: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Read the sysroot from the build cache
    Sysroot {
        /// Build directory holding the cache (defaults to the build root)
        #[arg(long)]
        build_dir: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Check routing and database tables against each other and the build tree
    Check {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct RouteReport {
    file: String,
    stage: StageName,
    prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SysrootReport {
    cache: PathBuf,
    sysroot: String,
}

#[derive(Debug, Default, Serialize)]
struct CheckReport {
    /// Routed stages without a database entry
    missing_entries: Vec<StageName>,
    /// Database directories that are not built yet
    unbuilt: Vec<PathBuf>,
    /// Whether the build cache exists
    cache_present: bool,
}

impl Commands {
    /// Output format requested by the command's own `--json` flag
    fn output_format(&self) -> OutputFormat {
        match self {
            Commands::Resolve { json, .. }
            | Commands::Route { json, .. }
            | Commands::Sysroot { json, .. }
            | Commands::Check { json } => OutputFormat::from_json_flag(*json),
            Commands::Init { .. } | Commands::Config => OutputFormat::Text,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            let code = report_error(cli.command.output_format(), &e);
            std::process::exit(code.into());
        }
    };

    logging::init_logging(cli.debug || settings.debug);

    let code = match run(&cli, &settings) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.into());
}

/// Load configuration; an explicit `--config` file must parse
fn load_settings(cli: &Cli) -> ResolveResult<Settings> {
    match &cli.config {
        Some(config_path) => Settings::load_from(config_path).map_err(|e| {
            ResolveError::config(format!("{}: {e}", config_path.display()))
        }),
        None => Ok(Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        })),
    }
}

fn run(cli: &Cli, settings: &Settings) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(*force).map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(ExitCode::Success)
        }

        Commands::Config => {
            if let Err(warning) = Settings::check_init() {
                eprintln!("Warning: {warning}");
                eprintln!("Showing default configuration.");
            }
            println!("{}", toml::to_string_pretty(settings)?);
            Ok(ExitCode::Success)
        }

        Commands::Resolve {
            file,
            language,
            json,
            ls,
        } => {
            let language = language.clone().unwrap_or_else(|| settings.language.clone());
            let request = SettingsRequest::new(language, file.clone());
            let outcome = SimpleProviderRegistry::from_settings(settings)
                .and_then(|registry| registry.resolve(&request));

            if *ls {
                return Ok(match outcome {
                    Ok(resolved) => {
                        let value = resolved
                            .as_ref()
                            .map(|s| s.to_ls_settings())
                            .unwrap_or(serde_json::Value::Null);
                        println!("{value}");
                        ExitCode::from_lookup(&resolved)
                    }
                    Err(e) => report_error(OutputFormat::Text, &e),
                });
            }

            Ok(emit(
                OutputFormat::from_json_flag(*json),
                outcome,
                "compilation database",
                &file.display().to_string(),
                |s| s.compilation_database_path.display().to_string(),
            ))
        }

        Commands::Route { file, json } => {
            let outcome = StageResolver::from_settings(settings).map(|resolver| {
                let candidate = candidate_path(file, resolver.project_root())?;
                let m = resolver.routing().route_match(&candidate)?;
                Some(RouteReport {
                    database: resolver
                        .databases()
                        .get(m.stage)
                        .map(|subpath| resolver.build_dir().join(subpath)),
                    file: candidate.clone(),
                    stage: m.stage.clone(),
                    prefix: m.prefix.to_string(),
                })
            });

            Ok(emit(
                OutputFormat::from_json_flag(*json),
                outcome,
                "stage",
                &file.display().to_string(),
                |r| format!("{} ({})", r.stage, r.prefix),
            ))
        }

        Commands::Sysroot { build_dir, json } => {
            let build_dir = build_dir.clone().unwrap_or_else(|| settings.build_root());
            let locator =
                SysrootLocator::new(settings.sysroot.cache_file.clone(), settings.sysroot.key.clone());
            let outcome = locator.locate(&build_dir).map(|sysroot| {
                sysroot.map(|sysroot| SysrootReport {
                    cache: locator.cache_path(&build_dir),
                    sysroot,
                })
            });

            Ok(emit(
                OutputFormat::from_json_flag(*json),
                outcome,
                "sysroot",
                &build_dir.display().to_string(),
                |r| r.sysroot.clone(),
            ))
        }

        Commands::Check { json } => {
            let format = OutputFormat::from_json_flag(*json);
            match check(settings) {
                Ok(report) => Ok(print_check(format, &report)),
                Err(e) => Ok(report_error(format, &e)),
            }
        }
    }
}

fn check(settings: &Settings) -> ResolveResult<CheckReport> {
    let resolver = StageResolver::from_settings(settings)?;
    let mut report = CheckReport {
        missing_entries: resolver
            .databases()
            .missing_for(resolver.routing())
            .into_iter()
            .cloned()
            .collect(),
        cache_present: resolver
            .sysroot_locator()
            .cache_path(resolver.build_dir())
            .is_file(),
        ..CheckReport::default()
    };

    for (_, subpath) in resolver.databases().iter() {
        let database = resolver.build_dir().join(subpath);
        if !database.exists() {
            report.unbuilt.push(database);
        }
    }
    for subtree in &settings.subtrees {
        let database = resolver.project_root().join(&subtree.database);
        if !database.exists() && !report.unbuilt.contains(&database) {
            report.unbuilt.push(database);
        }
    }

    Ok(report)
}

fn print_check(format: OutputFormat, report: &CheckReport) -> ExitCode {
    let code = if report.missing_entries.is_empty() {
        ExitCode::Success
    } else {
        ExitCode::BlockingError
    };

    if format.is_json() {
        let mut response = JsonResponse::success(report).with_meta(ResponseMeta::now());
        if !code.is_success() {
            response.status = "error".to_string();
            response.code = "MISSING_DATABASE_ENTRY".to_string();
            response.message = "Routed stages without a database entry".to_string();
        }
        response.exit_code = code as u8;
        print_json(&response);
        return code;
    }

    for stage in &report.missing_entries {
        println!("error: stage '{stage}' has no database entry");
    }
    for database in &report.unbuilt {
        println!("not built: {}", database.display());
    }
    if !report.cache_present {
        println!("not configured: build cache missing");
    }
    if code.is_success() && report.unbuilt.is_empty() && report.cache_present {
        println!("ok");
    }
    code
}

/// Print a lookup outcome and map it to an exit code
fn emit<T, F>(
    format: OutputFormat,
    outcome: ResolveResult<Option<T>>,
    entity: &str,
    name: &str,
    text: F,
) -> ExitCode
where
    T: Serialize,
    F: Fn(&T) -> String,
{
    match outcome {
        Ok(Some(value)) => {
            if format.is_json() {
                print_json(&JsonResponse::success(&value).with_meta(ResponseMeta::now()));
            } else {
                println!("{}", text(&value));
            }
            ExitCode::Success
        }
        Ok(None) => {
            if format.is_json() {
                print_json(&JsonResponse::not_found(entity, name));
            } else {
                eprintln!("No {entity} for '{name}'");
            }
            ExitCode::NotFound
        }
        Err(e) => report_error(format, &e),
    }
}

fn report_error(format: OutputFormat, error: &ResolveError) -> ExitCode {
    if format.is_json() {
        print_json(&JsonResponse::from_error(error));
    } else {
        let code = ExitCode::from_error(error);
        eprintln!("Error ({}): {error}", code.description());
        for suggestion in error.recovery_suggestions() {
            eprintln!("  - {suggestion}");
        }
    }
    ExitCode::from_error(error)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing output: {e}"),
    }
}
