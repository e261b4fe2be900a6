//! Asanas CLI - pictogram checks, bulk import and contact sheets
//!
//! Commands: check, import, tables, routine
//! Reports go to stdout, logs to stderr
//! Returns 2 when defects are found

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use asanas_core::{
    open_catalog, routine, save_catalog, CatalogPipeline, Config, DirectoryNameTags,
    ImportOptions, MemoryCatalog, SheetWriter, TablesOutcome,
};

#[derive(Parser)]
#[command(name = "asanas-cli", version)]
#[command(about = "Asanas CLI - pictogram validation, import and contact sheets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check size and colour of one pictogram or a directory of them
    Check {
        /// File or directory
        path: PathBuf,
    },

    /// Import a directory of pictograms; subdirectory names become tags
    Import {
        /// Directory with images
        dirname: PathBuf,

        /// Dry run (do not perform anything, only report)
        #[arg(short, long)]
        dry: bool,

        /// Media root the pictograms are copied under
        #[arg(long)]
        media_root: Option<PathBuf>,

        /// Owner of imported tags and scores
        #[arg(long)]
        owner: Option<String>,

        /// Catalog JSON read before the import and written back after it
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Write the import manifest as JSON
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Lay pictograms out on numbered contact-sheet pages
    Tables {
        /// Directory with images
        dirname: PathBuf,

        /// Where pages are written
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Cells per row
        #[arg(long)]
        cols: Option<u32>,

        /// Rows per page
        #[arg(long)]
        rows: Option<u32>,

        /// TrueType/OpenType font for captions and indices
        #[arg(long)]
        font: Option<PathBuf>,
    },

    /// Format a practice schedule CSV
    Routine {
        /// CSV file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Check { path } => {
            if !path.exists() {
                println!("ERROR: path {} does not exist!", path.display());
                return Ok(ExitCode::FAILURE);
            }

            let pipeline = CatalogPipeline::new(config);
            let reports = pipeline.check_path(&path)?;
            let mut found = 0;
            for defect in reports.iter().flat_map(|r| &r.defects) {
                println!("{}", defect);
                found += 1;
            }

            Ok(if found > 0 { ExitCode::from(2) } else { ExitCode::SUCCESS })
        }

        Commands::Import { dirname, dry, media_root, owner, catalog: catalog_path, manifest } => {
            if let Some(code) = require_dir(&dirname) {
                return Ok(code);
            }
            if let Some(root) = media_root {
                config.import.media_root = root;
            }
            if let Some(owner) = owner {
                config.import.owner = owner;
            }

            let mut catalog = match &catalog_path {
                Some(path) => open_catalog(path)?,
                None => MemoryCatalog::new(),
            };
            if catalog.user_by_name(&config.import.owner).is_none() {
                catalog.add_user(&config.import.owner, true, Utc::now());
            }

            let pipeline = CatalogPipeline::new(config);
            let result = pipeline.import_dir(
                &dirname,
                &mut catalog,
                &DirectoryNameTags,
                ImportOptions { dry_run: dry },
            );
            // Forms stored before a failure keep their files, so they are saved too.
            if let (Some(path), false) = (&catalog_path, dry) {
                save_catalog(&catalog, path)?;
            }
            let result = result?;

            for report in &result.rejected {
                println!("\n[!] Errors found in {}", report.source);
                for defect in &report.defects {
                    println!("\t{}", defect);
                }
            }
            println!(
                "\nimported {} pictograms, rejected {}{}",
                result.imported.len(),
                result.rejected.len(),
                if dry { " (dry run)" } else { "" }
            );

            if let Some(path) = manifest {
                let json = serde_json::to_string_pretty(&result)?;
                fs::write(&path, json)
                    .with_context(|| format!("writing manifest {}", path.display()))?;
            }

            Ok(if result.rejected.is_empty() { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }

        Commands::Tables { dirname, out_dir, cols, rows, font } => {
            if let Some(code) = require_dir(&dirname) {
                return Ok(code);
            }
            if let Some(cols) = cols {
                config.sheet.cols = cols;
            }
            if let Some(rows) = rows {
                config.sheet.rows = rows;
            }
            if font.is_some() {
                config.sheet.font = font;
            }
            config.sheet.check()?;

            let output = config.sheet.output.clone();
            let pipeline = CatalogPipeline::new(config);
            match pipeline.build_tables(&dirname)? {
                TablesOutcome::Rejected(reports) => {
                    println!("ERRORS FOUND:");
                    for defect in reports.iter().flat_map(|r| &r.defects) {
                        println!("{}", defect);
                    }
                    Ok(ExitCode::from(2))
                }
                TablesOutcome::Composed(sheet) => {
                    SheetWriter::new(out_dir, output).write_all(&sheet)?;
                    println!("exported {} images", sheet.image_count);
                    Ok(ExitCode::SUCCESS)
                }
            }
        }

        Commands::Routine { file } => {
            let csv = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            print!("{}", routine::format_schedule(&csv, &config.routine)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn require_dir(path: &Path) -> Option<ExitCode> {
    if !path.exists() {
        println!("ERROR: path {} does not exist!", path.display());
        return Some(ExitCode::FAILURE);
    }
    if !path.is_dir() {
        println!("ERROR: {} is not a directory!", path.display());
        return Some(ExitCode::FAILURE);
    }
    None
}
