use clap::Parser;
use hadris_burn::address::resolve_address;
use hadris_burn::backend::FileBackend;
use hadris_burn::check::md5::Md5Chain;
use hadris_burn::check::{CheckJob, CheckMode, CheckStatus};
use hadris_burn::diagnostic::{DiagnosticRecord, LogSink, Severity};
use hadris_burn::drive::{DriveManager, DriveRole};
use hadris_burn::toc::{build_media_report, media_blocks, MediaHint, Toc};
use hadris_burn::{image_tree, Configuration, DiagnosticSink};
use std::fs::OpenOptions;

#[derive(Debug, Clone, Parser)]
pub struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    Info(InfoArgs),
    Check(CheckArgs),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Info(args) => args.verbose,
            Command::Check(args) => args.verbose,
        }
    }
}

/// Acquires a drive and prints its TOC & media report.
#[derive(Debug, Clone, Parser)]
pub struct InfoArgs {
    address: String,
    /// Also parse the acquired medium as an ISO 9660 image tree and list
    /// its root directory.
    #[arg(long)]
    show_tree: bool,
    #[arg(short, long)]
    verbose: bool,
}

/// Runs a media verification pass over an acquired drive.
#[derive(Debug, Clone, Parser)]
pub struct CheckArgs {
    address: String,
    #[arg(long, default_value_t = 64)]
    chunk_blocks: u32,
    #[arg(long)]
    md5: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(if args.cmd.verbose() {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Warn
        })
        .init()
        .unwrap();

    match args.cmd {
        Command::Info(args) => info(&args.address, args.show_tree),
        Command::Check(args) => check(&args.address, args.chunk_blocks, args.md5),
    }
}

fn acquire(address: &str, role: DriveRole) -> (DriveManager<FileBackend>, hadris_burn::DriveId) {
    let cfg = Configuration::default();
    let sink = LogSink;
    let resolved = match resolve_address(&cfg, address, |path| FileBackend::new().is_mmc_path(path)) {
        Ok(resolved) => resolved,
        Err(status) => {
            sink.emit(DiagnosticRecord::new(
                Severity::Fatal,
                "cli",
                format!("address rejected: {status:?}"),
            ));
            std::process::exit(1);
        }
    };

    let mut manager = DriveManager::new(FileBackend::new());
    match manager.acquire(&resolved.effective, role, false) {
        Ok(id) => (manager, id),
        Err(e) => {
            sink.emit(DiagnosticRecord::new(Severity::Fatal, "cli", e.to_string()));
            std::process::exit(1);
        }
    }
}

fn info(address: &str, show_tree: bool) {
    let (mut manager, id) = acquire(address, DriveRole::INDEV);
    let path = manager.get(id).unwrap().address.clone();
    let (backend, drive) = manager.split_mut(id).unwrap();

    let profile = drive.profile(backend);
    let status = drive.disc_status(backend);
    let nwa = drive.next_writable_address(backend);
    let toc = Toc::default();
    let blocks = media_blocks(drive.read_capacity(backend), nwa * 2048, Some(nwa), true, None);

    let hints: Vec<MediaHint> = Vec::new();
    let lines = build_media_report(
        &drive.address,
        profile.name(),
        &drive.address,
        &format!("{status:?}"),
        blocks,
        &toc,
        nwa,
        &hints,
    );
    for line in lines {
        println!("{}: {}", line.concept, line.text);
    }

    if show_tree {
        let bare_path = path.strip_prefix("stdio:").unwrap_or(&path);
        match OpenOptions::new().read(true).write(true).open(bare_path) {
            Ok(mut file) => match image_tree::load(&mut file) {
                Ok(mut image) => {
                    println!("Files: {:#?}", image.root_directory().entries());
                }
                Err(e) => println!("tree: could not parse as ISO 9660: {e}"),
            },
            Err(e) => println!("tree: could not open {bare_path}: {e}"),
        }
    }
}

fn check(address: &str, chunk_blocks: u32, md5: bool) {
    let (mut manager, id) = acquire(address, DriveRole::INDEV);
    let sink = LogSink;
    let (backend, drive) = manager.split_mut(id).unwrap();
    let capacity = drive.read_capacity(backend);

    let job = CheckJob {
        mode: CheckMode::WholeCapacity,
        min_lba: 0,
        max_lba: capacity,
        read_chunk_blocks: chunk_blocks,
        sector_map_path: None,
        retry: false,
        abort_file_path: None,
        job_start: std::time::SystemTime::now(),
        item_limit: None,
        time_limit: None,
        async_chunk_count: 1,
        slow_threshold: std::time::Duration::from_millis(500),
        tao_tail: false,
    };

    let toc = Toc::default();
    let mut chain = md5.then(|| Md5Chain::new(0));
    let outcome =
        hadris_burn::check::run_check(&job, backend, drive, &toc, None, chain.as_mut(), &sink).unwrap();

    println!("status: {:?}", outcome.status);
    for spot in &outcome.spots {
        println!(
            "  lba {:>10} count {:>8} quality {:?}",
            spot.start_lba, spot.block_count, spot.quality
        );
    }
    if outcome.status == CheckStatus::Aborted {
        std::process::exit(1);
    }
}
