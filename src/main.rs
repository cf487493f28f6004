use clap::{ArgAction, Parser as ClapParser, Subcommand};
use dolex_transform::{
    ColumnType, DatasetConfig, Layer,
    cli::{self, CheckOptions, CheckResult, CliError, DeriveOptions, DropOptions},
};
use std::{
    io::{self, Read},
    path::PathBuf,
};

#[derive(ClapParser)]
#[command(name = "dolex")]
#[command(about = "Dolex - derived columns for tabular JSON datasets")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Pretty-print the output
    #[arg(short, long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an expression and list the columns it references
    Check {
        /// The expression to check
        expr: String,
    },

    /// Evaluate an expression against a row object or an array of rows
    Eval {
        /// The expression to evaluate
        expr: String,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Column whose values split rows into partitions
        #[arg(long)]
        partition_by: Option<String>,
    },

    /// List source, working and derived columns of a dataset
    Columns {
        /// Dataset file or directory
        dataset: PathBuf,

        #[arg(short, long)]
        table: Option<String>,

        /// Include the first N rows
        #[arg(long)]
        preview: Option<usize>,
    },

    /// Compute a column and persist it as derived
    Derive {
        /// Dataset file or directory
        dataset: PathBuf,

        #[arg(short, long)]
        table: String,

        #[arg(short, long)]
        column: String,

        #[arg(short, long)]
        expr: String,

        /// numeric, categorical, date or boolean (inferred if omitted)
        #[arg(long = "type")]
        column_type: Option<ColumnType>,

        #[arg(long)]
        partition_by: Option<String>,
    },

    /// Drop a derived column (or `*` for all of them)
    Drop {
        /// Dataset file or directory
        dataset: PathBuf,

        #[arg(short, long)]
        table: String,

        #[arg(short, long)]
        column: String,

        #[arg(long, default_value = "derived")]
        layer: Layer,
    },

    /// Recompute derived columns from the manifest and report the outcome
    Replay {
        /// Dataset file or directory
        dataset: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Check { expr } => run_check(expr, None, None, true),
        Commands::Eval {
            expr,
            input,
            partition_by,
        } => run_check(expr, input, partition_by, false),
        Commands::Columns {
            dataset,
            table,
            preview,
        } => cli::list_columns(&DatasetConfig::new(dataset), table.as_deref(), preview),
        Commands::Derive {
            dataset,
            table,
            column,
            expr,
            column_type,
            partition_by,
        } => cli::derive_column(
            &DatasetConfig::new(dataset),
            DeriveOptions {
                table,
                column,
                expr,
                column_type,
                partition_by,
            },
        ),
        Commands::Drop {
            dataset,
            table,
            column,
            layer,
        } => cli::drop_column(
            &DatasetConfig::new(dataset),
            DropOptions {
                table,
                column,
                layer,
            },
        ),
        Commands::Replay { dataset } => cli::replay_dataset(&DatasetConfig::new(dataset)),
    };

    let printed = result.and_then(|output| print_json(&output, cli.pretty));
    if let Err(e) = printed {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn print_json(output: &serde_json::Value, pretty: bool) -> Result<(), CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(output)?
    } else {
        serde_json::to_string(output)?
    };
    println!("{}", json);
    Ok(())
}

fn run_check(
    expr: String,
    input: Option<String>,
    partition_by: Option<String>,
    syntax_only: bool,
) -> Result<serde_json::Value, CliError> {
    let input = match input {
        Some(s) => Some(s),
        None if !syntax_only && !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Some(buffer)
        }
        None => None,
    };

    let options = CheckOptions {
        expr,
        input,
        partition_by,
        syntax_only,
    };

    Ok(match cli::execute_check(&options)? {
        CheckResult::SyntaxValid(columns) => {
            serde_json::json!({ "valid": true, "columns": columns })
        }
        CheckResult::Success(output) => output,
    })
}
