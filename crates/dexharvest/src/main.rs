use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use dexharvest_core::cache::{ContentCache, FsCacheStore};
use dexharvest_core::client::{RetryPolicy, SourceClient};
use dexharvest_core::config::{HarvestConfig, load_config};
use dexharvest_core::harvest::{HarvestOptions, load_catalog, run_harvest};
use dexharvest_core::model::{BaseEntity, IdRange};
use dexharvest_core::output::{
    base_file_name, load_records, typed_base_file_name, write_harvest, write_tcg_types,
    write_types,
};
use dexharvest_core::tcg::{
    TcgTypedEntity, collect_tcg_types, fetch_tcg_type_catalog, tcg_type_distribution,
};
use dexharvest_core::transport::HttpTransport;
use dexharvest_core::types::{collect_entity_types, fetch_type_catalog, type_distribution};
use serde::de::DeserializeOwned;
use tracing::debug;

type HttpClient = SourceClient<HttpTransport, FsCacheStore>;

#[derive(Debug, Parser)]
#[command(
    name = "dexharvest",
    version,
    about = "Harvest catalog and name-origin data from two wiki sources"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", default_value = "dexharvest.toml")]
    config: PathBuf,
    #[arg(long, global = true, value_name = "PATH", help = "Override the cache directory")]
    cache_dir: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Parse the catalog and extract name origins for every entity")]
    Harvest(HarvestArgs),
    #[command(about = "Parse the master catalog only")]
    Catalog(RangeArgs),
    #[command(about = "Attach elemental types to base records")]
    Types(TypesArgs),
    #[command(about = "Attach trading card game types to base records")]
    TcgTypes(TypesArgs),
}

#[derive(Debug, Clone, Copy, Args)]
struct RangeArgs {
    #[arg(default_value_t = 1, help = "First id (inclusive)")]
    start: u32,
    #[arg(default_value_t = 12, help = "Last id (inclusive)")]
    end: u32,
}

impl RangeArgs {
    fn to_range(self) -> Result<IdRange> {
        if self.start > self.end {
            bail!("start ({}) must not exceed end ({})", self.start, self.end);
        }
        Ok(IdRange::new(self.start, self.end))
    }
}

#[derive(Debug, Args)]
struct HarvestArgs {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TypesArgs {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(
        long,
        value_name = "FILE",
        help = "Base records to extend (default: newest range file in <out-dir>)"
    )]
    base: Option<PathBuf>,
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
}

struct Runtime {
    config: HarvestConfig,
    cache_dir: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let Some(command) = cli.command else {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    };
    let runtime = load_runtime(&cli.config, cli.cache_dir)?;

    match command {
        Commands::Harvest(args) => run_harvest_command(&runtime, args),
        Commands::Catalog(range) => run_catalog_command(&runtime, range),
        Commands::Types(args) => run_types_command(&runtime, args),
        Commands::TcgTypes(args) => run_tcg_types_command(&runtime, args),
    }
}

fn init_tracing(verbose: u8, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match verbose {
        0 => "dexharvest=info,dexharvest_core=info",
        1 => "dexharvest=debug,dexharvest_core=debug",
        _ => "dexharvest=trace,dexharvest_core=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn load_runtime(config_path: &Path, cache_dir: Option<PathBuf>) -> Result<Runtime> {
    let config = load_config(config_path)?;
    let cache_dir = cache_dir.unwrap_or_else(|| config.cache_dir());
    debug!(
        config = %normalize_path(config_path),
        cache_dir = %normalize_path(&cache_dir),
        "resolved runtime"
    );
    Ok(Runtime { config, cache_dir })
}

fn build_client(runtime: &Runtime) -> Result<HttpClient> {
    let transport = HttpTransport::from_config(&runtime.config)?;
    let cache = ContentCache::new(FsCacheStore::new(&runtime.cache_dir));
    Ok(SourceClient::new(
        transport,
        cache,
        RetryPolicy::from_config(&runtime.config),
    ))
}

fn run_harvest_command(runtime: &Runtime, args: HarvestArgs) -> Result<()> {
    let range = args.range.to_range()?;
    let output_dir = args.out_dir.unwrap_or_else(|| runtime.config.output_dir());
    let options = HarvestOptions::from_config(&runtime.config, range);
    let mut client = build_client(runtime)?;

    let output = run_harvest(&mut client, &options)?;
    let written = write_harvest(&output_dir, range, &output.entities, &output.origins)?;

    let report = &output.report;
    println!("range: {}", range.tag());
    println!("cache_dir: {}", normalize_path(&runtime.cache_dir));
    println!("entities: {}", report.entities);
    println!("described: {}", report.described);
    println!("with_etymology: {}", report.with_etymology);
    println!("degraded_steps: {}", report.degraded.len());
    println!("requests: {}", report.request_count);
    println!("cache_hits: {}", report.cache_hits);
    println!("cache_misses: {}", report.cache_misses);
    println!("base_file: {}", normalize_path(&written.base));
    println!("origins_file: {}", normalize_path(&written.origins));
    Ok(())
}

fn run_catalog_command(runtime: &Runtime, range: RangeArgs) -> Result<()> {
    let range = range.to_range()?;
    let options = HarvestOptions::from_config(&runtime.config, range);
    let mut client = build_client(runtime)?;
    let entities = load_catalog(&mut client, &options)?;

    println!("range: {}", range.tag());
    println!("entities: {}", entities.len());
    for entity in &entities {
        println!(
            "  {:04} {} | {} | {} | {}",
            entity.id,
            entity.canonical_name,
            entity.native_name,
            entity.romanized_name,
            entity.secondary_page_url
        );
    }
    Ok(())
}

fn run_types_command(runtime: &Runtime, args: TypesArgs) -> Result<()> {
    let range = args.range.to_range()?;
    let output_dir = args.out_dir.unwrap_or_else(|| runtime.config.output_dir());
    let mut client = build_client(runtime)?;

    let candidates = input_candidates(args.base, vec![output_dir.join(base_file_name(range))])?;
    let entities: Vec<BaseEntity> = load_input(&mut client, runtime, range, &candidates)?;

    let sources = runtime.config.sources();
    let catalog =
        fetch_type_catalog(&mut client, &sources.type_page_url, &sources.primary_base_url)?;
    let typed = collect_entity_types(&mut client, &entities);
    let (info_path, typed_path) = write_types(&output_dir, range, &catalog, &typed)?;

    println!("range: {}", range.tag());
    println!("types: {}", catalog.len());
    println!("entities: {}", typed.len());
    println!(
        "typed_entities: {}",
        typed.iter().filter(|entity| !entity.types.is_empty()).count()
    );
    for (name, count) in type_distribution(&typed) {
        println!("  {name}: {count}");
    }
    println!("types_file: {}", normalize_path(&info_path));
    println!("typed_base_file: {}", normalize_path(&typed_path));
    Ok(())
}

fn run_tcg_types_command(runtime: &Runtime, args: TypesArgs) -> Result<()> {
    let range = args.range.to_range()?;
    let output_dir = args.out_dir.unwrap_or_else(|| runtime.config.output_dir());
    let mut client = build_client(runtime)?;

    let defaults = vec![
        output_dir.join(typed_base_file_name(range)),
        output_dir.join(base_file_name(range)),
    ];
    let candidates = input_candidates(args.base, defaults)?;
    let records: Vec<TcgTypedEntity> = load_input(&mut client, runtime, range, &candidates)?;

    let sources = runtime.config.sources();
    let catalog = fetch_tcg_type_catalog(
        &mut client,
        &sources.tcg_type_page_url,
        &sources.primary_base_url,
    )?;
    if catalog.is_empty() {
        bail!("no card types found on {}", sources.tcg_type_page_url);
    }
    let typed = collect_tcg_types(&mut client, records, &sources.primary_base_url);
    let (info_path, typed_path) = write_tcg_types(&output_dir, range, &catalog, &typed)?;

    println!("range: {}", range.tag());
    println!("tcg_types: {}", catalog.len());
    println!("entities: {}", typed.len());
    println!(
        "typed_entities: {}",
        typed.iter().filter(|record| record.tcg_type.is_some()).count()
    );
    for (name, count) in tcg_type_distribution(&typed) {
        println!("  {name}: {count}");
    }
    println!("tcg_types_file: {}", normalize_path(&info_path));
    println!("tcg_base_file: {}", normalize_path(&typed_path));
    Ok(())
}

/// An explicit `--base` must exist; otherwise the defaults are tried in order.
fn input_candidates(base: Option<PathBuf>, defaults: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    match base {
        Some(base) if !base.is_file() => {
            bail!("base file not found: {}", normalize_path(&base))
        }
        Some(base) => Ok(vec![base]),
        None => Ok(defaults),
    }
}

/// Records from the first existing candidate file, else freshly parsed.
fn load_input<R>(
    client: &mut HttpClient,
    runtime: &Runtime,
    range: IdRange,
    candidates: &[PathBuf],
) -> Result<Vec<R>>
where
    R: DeserializeOwned + From<BaseEntity> + AsRef<BaseEntity>,
{
    if let Some(path) = candidates.iter().find(|path| path.is_file()) {
        let mut records: Vec<R> = load_records(path)?;
        records.retain(|record| range.contains(record.as_ref().id));
        println!("base_file: {}", normalize_path(path));
        return Ok(records);
    }
    println!("base_file: <catalog>");
    let entities = load_catalog(client, &HarvestOptions::from_config(&runtime.config, range))?;
    Ok(entities.into_iter().map(R::from).collect())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
