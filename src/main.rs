mod cli;

use std::io::{self, Write};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use log::error;

use plate_corpus::api::corpus::{load_split, CorpusBuild};
use plate_corpus::core::pipeline::{BuildProgress, BuildReport, VideoOutcome};
use plate_corpus::core::Problem;

use crate::cli::{BuildArgs, Cli, Commands, ConfigArgs, LoadArgs};

const SPINNER: [char; 4] = ['-', '\\', '|', '/'];

fn main() {
    plate_corpus::init_logging();

    if let Err(err) = run() {
        error!("command failed: {}", err);
        for cause in err.chain().skip(1) {
            error!("caused by: {}", cause);
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => build(&cli.overrides, args),
        Commands::Load(args) => load(&cli.overrides, args),
    }
}

fn build(overrides: &ConfigArgs, args: BuildArgs) -> Result<()> {
    let config = overrides.resolve().context("invalid configuration")?;
    let build = CorpusBuild::create(config)?;
    let progress = Spinner::stdout();

    let report = match &args.path {
        Some(path) => {
            let target = build
                .resolve(path)
                .with_context(|| format!("cannot build from {}", path.display()))?;
            build.build_target(&target, &progress)?
        }
        None => build.build_tree(&progress)?,
    };
    progress.finish();
    print_summary(&report);
    Ok(())
}

fn load(overrides: &ConfigArgs, args: LoadArgs) -> Result<()> {
    let config = overrides.resolve().context("invalid configuration")?;
    let dataset = load_split(&config, args.problem, args.split)
        .with_context(|| format!("cannot load {}/{}", args.problem, args.split))?;
    let counts = dataset.class_counts()?;

    println!(
        "{}/{}: {} samples of {}x{}x{}",
        args.problem,
        args.split,
        dataset.len(),
        dataset.shape.height,
        dataset.shape.width,
        dataset.shape.channels
    );
    for (class, count) in dataset.classes.iter().zip(counts) {
        println!("  {:>2}  {}", class, count);
    }
    Ok(())
}

fn print_summary(report: &BuildReport) {
    for outcome in &report.outcomes {
        match outcome {
            VideoOutcome::Built(video) => {
                let per_problem: Vec<String> = Problem::ALL
                    .iter()
                    .map(|p| format!("{}={}", p, video.stats.count(*p)))
                    .collect();
                println!(
                    "{}: {} frames, {} train / {} test, {} new ({})",
                    video.source_id,
                    video.stats.frames,
                    video.train,
                    video.test,
                    video.written,
                    per_problem.join(" ")
                );
            }
            VideoOutcome::Skipped { source_id } => println!("{}: skipped (could not open)", source_id),
            VideoOutcome::Failed { source_id, reason } => println!("{}: failed ({})", source_id, reason),
        }
    }
    println!(
        "{} written, {} already present, {} failed, {} skipped",
        report.written(),
        report.already_present(),
        report.failed_count(),
        report.skipped_count()
    );
}

/// 单行 `\r` 进度指示，每个标注帧前进一格
///
/// 输出和计数共用一把锁，并行 worker 的行不会交错。
struct Spinner<W: Write> {
    state: Mutex<SpinnerState<W>>,
}

struct SpinnerState<W> {
    out: W,
    ticks: usize,
    /// 当前屏幕上进度行的宽度
    width: usize,
}

impl Spinner<io::Stdout> {
    fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Spinner<W> {
    fn new(out: W) -> Self {
        Self {
            state: Mutex::new(SpinnerState {
                out,
                ticks: 0,
                width: 0,
            }),
        }
    }

    fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.clear_line();
            let _ = state.out.flush();
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.state.into_inner() {
            Ok(state) => state.out,
            Err(poisoned) => poisoned.into_inner().out,
        }
    }
}

impl<W: Write> SpinnerState<W> {
    fn clear_line(&mut self) {
        if self.width > 0 {
            let _ = write!(self.out, "\r{:width$}\r", "", width = self.width);
            self.width = 0;
        }
    }
}

impl<W: Write + Send> BuildProgress for Spinner<W> {
    fn frame_done(&self, source_id: &str, frame_index: u64) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.ticks += 1;
        let line = format!(
            "{} frame {:04} {}",
            source_id,
            frame_index,
            SPINNER[state.ticks % SPINNER.len()]
        );
        state.clear_line();
        let _ = write!(state.out, "{}", line);
        let _ = state.out.flush();
        state.width = line.chars().count();
    }

    fn video_done(&self, outcome: &VideoOutcome) {
        let VideoOutcome::Built(report) = outcome else {
            return;
        };
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.clear_line();
        let _ = writeln!(
            state.out,
            "{} done: {} examples",
            report.source_id,
            report.stats.total_examples()
        );
        let _ = state.out.flush();
    }
}
