use chrono::Local;
use clap::{Parser, Subcommand};
use fakescope::analyzer::ela;
use fakescope::media::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use fakescope::{AggregateReport, Database, Orchestrator, Settings, Verdict};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io::{self, Write};
use std::path::PathBuf;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "fakescope")]
#[command(author, version, about = "Layered forensic analysis for AI-generated and manipulated media")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// File or directory to analyze
    path: Option<PathBuf>,

    /// Output report file (.csv, .json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for auto-generated reports
    #[arg(long, default_value = "fakescope-reports")]
    report_dir: PathBuf,

    /// Don't auto-generate CSV report
    #[arg(long)]
    no_report: bool,

    /// Don't prompt to open report
    #[arg(long)]
    no_open: bool,

    /// Directory for ELA visualizations (default: next to each input)
    #[arg(long)]
    ela_dir: Option<PathBuf>,

    /// ONNX model for the learned-model layer (overrides FAKESCOPE_MODEL_PATH)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Log every report to the history database
    #[arg(long)]
    save: bool,

    /// History database (overrides FAKESCOPE_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Number of parallel workers (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Show per-layer scores and anomalies
    #[arg(short, long)]
    verbose: bool,

    /// Only show summary
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP upload API
    Serve {
        /// Port to listen on (overrides FAKESCOPE_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides FAKESCOPE_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Directory for uploads and ELA images (overrides FAKESCOPE_UPLOAD_DIR)
        #[arg(long)]
        upload_dir: Option<PathBuf>,

        /// Open the API root in a browser
        #[arg(long)]
        open: bool,
    },

    /// Show or manage the analysis history
    History {
        /// Rows to skip
        #[arg(long, default_value = "0")]
        skip: i64,

        /// Rows to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Print verdict counts instead of rows
        #[arg(long)]
        summary: bool,

        /// Delete every logged analysis
        #[arg(long)]
        clear: bool,
    },
}

fn main() {
    let args = Args::parse();

    let default_level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let mut settings = Settings::from_env();
    if let Some(ref db) = args.db {
        settings.db_path = db.clone();
    }
    if let Some(ref model) = args.model {
        settings.model_path = Some(model.clone());
    }

    // Handle subcommands first
    if let Some(cmd) = args.command {
        match cmd {
            Command::Serve { port, host, upload_dir, open } => {
                if let Some(port) = port {
                    settings.port = port;
                }
                if let Some(host) = host {
                    settings.host = host;
                }
                if let Some(dir) = upload_dir {
                    settings.upload_dir = dir;
                }
                if let Err(e) = fakescope::serve::start(&settings, open) {
                    eprintln!("Server error: {}", e);
                    std::process::exit(1);
                }
                return;
            }
            Command::History { skip, limit, summary, clear } => {
                if let Err(e) = handle_history(&settings, skip, limit, summary, clear) {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
                return;
            }
        }
    }

    let path = if let Some(p) = args.path.clone() {
        p
    } else {
        eprintln!("Usage: fakescope <PATH>");
        eprintln!("Run 'fakescope --help' for more options.");
        std::process::exit(1);
    };

    // Set up thread pool
    if let Some(jobs) = args.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .ok();
    }

    // Collect media files
    let files: Vec<PathBuf> = if path.is_dir() {
        WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| {
                        let ext = ext.to_ascii_lowercase();
                        IMAGE_EXTENSIONS.contains(&ext.as_str()) || VIDEO_EXTENSIONS.contains(&ext.as_str())
                    })
                    .unwrap_or(false)
            })
            // ELA output from an earlier run is not an input
            .filter(|e| !ela::is_artifact_name(&e.file_name().to_string_lossy()))
            .map(|e| e.path().to_path_buf())
            .collect()
    } else {
        vec![path.clone()]
    };

    if files.is_empty() {
        eprintln!(
            "No media files found (supported: {}, {})",
            IMAGE_EXTENSIONS.join(", "),
            VIDEO_EXTENSIONS.join(", ")
        );
        std::process::exit(1);
    }

    if !args.quiet {
        eprintln!("\x1b[1mFakescope - Layered Media Forensics\x1b[0m");
        eprintln!("{}", "─".repeat(70));
        eprintln!("Found {} media file(s)\n", files.len());
    }

    // Set up progress bar
    let pb = if !args.quiet && files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        Some(pb)
    } else {
        None
    };

    // Create orchestrator
    let mut orchestrator = Orchestrator::from_settings(&settings);
    if let Some(ref dir) = args.ela_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Cannot create ELA directory {}: {}", dir.display(), e);
            std::process::exit(1);
        }
        orchestrator = orchestrator.with_ela_dir(dir);
    }

    // Analyze files in parallel
    let reports: Vec<AggregateReport> = files
        .par_iter()
        .map(|path| {
            let report = orchestrator.analyze(path);
            if let Some(ref pb) = pb {
                pb.inc(1);
                pb.set_message(report.file_name.clone());
            }
            report
        })
        .collect();

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    // Print results
    if !args.quiet {
        for r in &reports {
            let color = match r.verdict {
                Verdict::Real => "\x1b[32m",        // Green
                Verdict::Suspicious => "\x1b[33m",  // Yellow
                Verdict::AIGenerated => "\x1b[31m", // Red
            };
            let color = if r.is_unreadable() { "\x1b[90m" } else { color };
            let reset = "\x1b[0m";

            let media = r.media_type.map(|k| k.to_string()).unwrap_or_else(|| "-".to_string());

            println!(
                "{}{:<14}{} {:>5.3}  {:<5}  {:<40}  {}",
                color,
                format!("[{}]", r.verdict),
                reset,
                r.confidence,
                media,
                truncate(&r.explanation, 40),
                &r.file_name
            );

            if args.verbose {
                let scores: Vec<String> = r
                    .layer_scores
                    .iter()
                    .map(|(k, v)| format!("{}={:.3}", k, v))
                    .collect();
                if !scores.is_empty() {
                    eprintln!("    Layers: {}", scores.join(" "));
                }
                if let Some(ref ela) = r.auxiliary_image_ref {
                    eprintln!("    ELA: {}", ela);
                }
                if let Some(err) = r.error() {
                    eprintln!("    Error: {}", err);
                }
            }
        }
    }

    // Summary
    let summary = fakescope::report::Summary::from_reports(&reports);

    if !args.quiet {
        eprintln!("\n{}", "─".repeat(70));
        eprintln!("\x1b[1mSummary:\x1b[0m");
        eprintln!("  \x1b[32m✓ Real:\x1b[0m         {}", summary.real);
        eprintln!("  \x1b[33m? Suspicious:\x1b[0m   {}", summary.suspicious);
        eprintln!("  \x1b[31m✗ AI-Generated:\x1b[0m {}", summary.ai_generated);
        if summary.unreadable > 0 {
            eprintln!("  \x1b[90mUnreadable:\x1b[0m     {}", summary.unreadable);
        }
    }

    // Log to history
    if args.save {
        match Database::open_at(&settings.db_path) {
            Ok(db) => {
                let saved = reports.iter().filter(|r| db.insert_report(r).is_ok()).count();
                if !args.quiet {
                    eprintln!("\nLogged {} report(s) to {}", saved, settings.db_path.display());
                }
            }
            Err(e) => eprintln!("Failed to open database: {}", e),
        }
    }

    // Determine report path
    let report_path = if let Some(ref output) = args.output {
        Some(output.clone())
    } else if !args.no_report {
        // Auto-generate report
        std::fs::create_dir_all(&args.report_dir).ok();
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("fakescope_report_{}.csv", timestamp);
        Some(args.report_dir.join(filename))
    } else {
        None
    };

    // Generate report
    if let Some(ref output_path) = report_path {
        if let Err(e) = fakescope::report::generate(output_path, &reports) {
            eprintln!("Failed to write report: {}", e);
            std::process::exit(1);
        }
        if !args.quiet {
            eprintln!("\n\x1b[32mReport saved: {}\x1b[0m", output_path.display());
        }

        // Open report, asking first
        if !args.no_open && !args.quiet {
            eprint!("\nOpen report? [Y/n] ");
            io::stderr().flush().ok();

            let mut input = String::new();
            if io::stdin().read_line(&mut input).is_ok() {
                let input = input.trim().to_lowercase();
                if input.is_empty() || input == "y" || input == "yes" {
                    if let Err(e) = open::that(output_path) {
                        eprintln!("Failed to open report: {}", e);
                    }
                }
            }
        }
    }

    if !args.quiet {
        eprintln!("\n\x1b[90mAnalysis complete.\x1b[0m");
    }

    // Exit with appropriate code
    if summary.ai_generated > 0 {
        std::process::exit(2);
    } else if summary.suspicious > 0 {
        std::process::exit(1);
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn handle_history(settings: &Settings, skip: i64, limit: i64, summary: bool, clear: bool) -> fakescope::Result<()> {
    let db = Database::open_at(&settings.db_path)?;

    if clear {
        let n = db.clear()?;
        println!("Deleted {} record(s).", n);
        return Ok(());
    }

    if summary {
        let s = db.get_summary()?;
        println!("Total:        {}", s.total);
        println!("Real:         {}", s.real_count);
        println!("Suspicious:   {}", s.suspicious_count);
        println!("AI-Generated: {}", s.ai_generated_count);
        if let Some(avg) = s.avg_confidence {
            println!("Avg conf.:    {:.3}", avg);
        }
        return Ok(());
    }

    let records = db.get_history(skip, limit)?;
    if records.is_empty() {
        println!("No analyses logged.");
        return Ok(());
    }
    println!("{:<5} {:<25} {:<6} {:<13} {:>6}  {}", "ID", "WHEN", "KIND", "VERDICT", "CONF", "FILE");
    println!("{}", "-".repeat(80));
    for r in records {
        println!(
            "{:<5} {:<25} {:<6} {:<13} {:>6.3}  {}",
            r.id,
            truncate(&r.analyzed_at, 25),
            r.media_type,
            r.verdict,
            r.confidence,
            r.filename
        );
    }
    Ok(())
}
