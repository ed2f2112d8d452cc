//! Mode S / ADS-B signal-processing core command-line driver.
//!
//! This binary wires the library crate's converter, FIFO, and demodulator
//! together around a raw IQ byte source. It does not decode ADS-B payload
//! fields; message acceptance is driven by `modes_core::Crc24Collaborator`,
//! a CRC-only stand-in for whatever downstream decoder a real receiver
//! would plug in.

mod source;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use modes_core::demod::strictness;
use modes_core::dsp::wisdom;
use modes_core::prelude::*;
use modes_core::Message;

#[derive(Parser)]
#[command(name = "modes")]
#[command(author, version, about = "Mode S / ADS-B signal-processing core", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read IQ samples and emit accepted Mode S frames
    Run {
        /// Input IQ sample file, or `-` for stdin
        input: String,

        /// Input sample format (uc8, sc16, sc16q11, s16, u16o12)
        #[arg(long, default_value = "uc8")]
        format: String,

        /// Input sample rate in Hz, must be an integer multiple of 2 MHz
        #[arg(long, default_value_t = 2_400_000.0)]
        sample_rate: f64,

        /// Disable the DC-block high-pass filter
        #[arg(long)]
        no_dc_filter: bool,

        /// Number of magnitude buffers in the FIFO
        #[arg(long, default_value_t = 16)]
        fifo_capacity: usize,

        /// Preamble detection threshold, dB above the buffer's mean level
        #[arg(long, default_value_t = 3.0)]
        preamble_threshold_db: f64,

        /// Preamble strictness: none, halfbit, strong, or max
        #[arg(long, default_value = "max")]
        preamble_strictness: String,

        /// Disable the mark/space amplitude-limit tiebreaker when slicing bits
        #[arg(long)]
        no_mark_limits: bool,

        /// Seconds between periodic stats log lines (0 disables)
        #[arg(long, default_value_t = 10)]
        stats_interval_secs: u64,

        /// Wisdom file re-ranking DSP kernel implementations at startup
        #[arg(long)]
        wisdom: Option<PathBuf>,
    },

    /// Measure DSP kernel throughput for the currently selected implementations
    Bench {
        /// Samples per synthetic buffer
        #[arg(long, default_value_t = 1 << 20)]
        buffer_len: usize,

        /// Repetitions averaged per kernel
        #[arg(long, default_value_t = 50)]
        iterations: usize,
    },

    /// Inspect or capture DSP kernel dispatch decisions
    Wisdom {
        #[command(subcommand)]
        action: WisdomAction,
    },
}

#[derive(Subcommand)]
enum WisdomAction {
    /// Print the currently selected implementation for every primitive
    Show,
    /// Write the currently selected implementations to a wisdom file
    Write {
        /// Destination path
        output: PathBuf,
    },
}

fn parse_strictness(s: &str) -> Result<u8> {
    match s.to_ascii_lowercase().as_str() {
        "none" => Ok(strictness::NONE),
        "halfbit" => Ok(strictness::HALFBIT),
        "strong" => Ok(strictness::STRONG),
        "max" => Ok(strictness::MAX),
        other => bail!("unrecognized preamble strictness '{other}'"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(log_level).with_target(false).init();

    let result = match cli.command {
        Commands::Run {
            input,
            format,
            sample_rate,
            no_dc_filter,
            fifo_capacity,
            preamble_threshold_db,
            preamble_strictness,
            no_mark_limits,
            stats_interval_secs,
            wisdom: wisdom_path,
        } => cmd_run(RunArgs {
            input,
            format,
            sample_rate,
            filter_dc: !no_dc_filter,
            fifo_capacity,
            preamble_threshold_db,
            preamble_strictness,
            mark_limits: !no_mark_limits,
            stats_interval_secs,
            wisdom_path,
        }),
        Commands::Bench { buffer_len, iterations } => cmd_bench(buffer_len, iterations),
        Commands::Wisdom { action } => cmd_wisdom(action),
    };

    if let Err(err) = &result {
        if let Some(core_err) = err.downcast_ref::<CoreError>() {
            std::process::exit(core_err.exit_code());
        }
    }
    result
}

struct RunArgs {
    input: String,
    format: String,
    sample_rate: f64,
    filter_dc: bool,
    fifo_capacity: usize,
    preamble_threshold_db: f64,
    preamble_strictness: String,
    mark_limits: bool,
    stats_interval_secs: u64,
    wisdom_path: Option<PathBuf>,
}

fn cmd_run(args: RunArgs) -> Result<()> {
    if let Some(path) = &args.wisdom_path {
        wisdom::try_read_wisdom_file(path);
    }

    let format = InputFormat::by_name(&args.format).with_context(|| format!("unknown input format '{}'", args.format))?;
    let cfg = DemodConfig {
        preamble_threshold_db: args.preamble_threshold_db,
        preamble_strictness: parse_strictness(&args.preamble_strictness)?,
        mark_limits: args.mark_limits,
        ..DemodConfig::default()
    };
    let ctx = DemodContext::new(args.sample_rate, cfg)?;
    let buffer_len = ctx.max_samples_per_frame * 8;
    let overlap = ctx.samples_per_preamble;
    let fifo = Arc::new(Fifo::new(args.fifo_capacity, buffer_len, overlap));
    let stats = Arc::new(Stats::new());
    let should_exit = Arc::new(AtomicBool::new(false));

    {
        let fifo = Arc::clone(&fifo);
        let should_exit = Arc::clone(&should_exit);
        ctrlc::set_handler(move || {
            warn!("shutdown requested, draining in-flight buffers");
            should_exit.store(true, Ordering::SeqCst);
            fifo.shutdown();
        })
        .context("failed to install ctrl-c handler")?;
    }

    let (convert, mut conv_state) = init_converter(format, args.sample_rate, args.filter_dc)?;
    let bytes_per_sample = format.bytes_per_sample();

    let producer = {
        let fifo = Arc::clone(&fifo);
        let should_exit = Arc::clone(&should_exit);
        let input = args.input;
        thread::spawn(move || -> Result<()> {
            let mut src = source::Source::open(&input).with_context(|| format!("opening input '{input}'"))?;
            let mut iq_buf = vec![0u8; (buffer_len - overlap) * bytes_per_sample];
            loop {
                if should_exit.load(Ordering::Relaxed) {
                    break;
                }
                let Some(mut buf) = fifo.acquire(-1) else { break };
                let want = (buf.total_length() - buf.overlap) * bytes_per_sample;
                let iq = &mut iq_buf[..want];
                match read_exact_or_eof(&mut src, iq) {
                    Ok(0) => {
                        fifo.release(buf);
                        fifo.shutdown();
                        break;
                    }
                    Ok(n) => {
                        let n_samples = n / bytes_per_sample;
                        let stats_out = convert(&iq[..n_samples * bytes_per_sample], &mut buf.data[buf.overlap..buf.overlap + n_samples], &mut conv_state);
                        buf.valid_length = buf.overlap + n_samples;
                        buf.mean_level = stats_out.mean_level;
                        buf.mean_power = stats_out.mean_power;
                        fifo.enqueue(buf);
                    }
                    Err(e) => {
                        fifo.release(buf);
                        return Err(e).context("reading IQ samples");
                    }
                }
            }
            Ok(())
        })
    };

    let consumer = {
        let fifo = Arc::clone(&fifo);
        let stats = Arc::clone(&stats);
        thread::spawn(move || {
            let mut collaborator = Crc24Collaborator::new();
            let mut scratch = DemodScratch::new(buffer_len);
            let mut last_report = Instant::now();
            while let Some(buf) = fifo.dequeue(-1) {
                let result = demodulate_buffer(&ctx, &buf, &mut collaborator, &stats, &mut scratch);
                for msg in &result.accepted {
                    log_message(msg);
                }
                fifo.release(buf);
                if args.stats_interval_secs > 0 && last_report.elapsed() >= Duration::from_secs(args.stats_interval_secs) {
                    log_stats(&stats);
                    last_report = Instant::now();
                }
            }
            log_stats(&stats);
        })
    };

    let producer_result = producer.join().expect("producer thread panicked");
    consumer.join().expect("consumer thread panicked");
    producer_result
}

fn read_exact_or_eof(src: &mut impl std::io::Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match src.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

fn log_message(msg: &Message) {
    info!(
        timestamp = msg.timestamp_msg,
        signal_level = format!("{:.4}", msg.signal_level),
        noise_level = format!("{:.4}", msg.noise_level),
        "accepted message"
    );
}

fn log_stats(stats: &Stats) {
    let s = stats.snapshot();
    info!(
        buffers = s.buffers_processed,
        samples = s.samples_processed,
        dropped = s.samples_dropped,
        accepted = s.messages_accepted,
        unknown_df = s.messages_unknown_df,
        unknown_icao = s.messages_unknown_icao,
        bad = s.messages_bad,
        duplicate = s.messages_duplicate,
        mean_noise_power = format!("{:.6}", s.mean_noise_power),
        "stats"
    );
}

fn cmd_bench(buffer_len: usize, iterations: usize) -> Result<()> {
    use modes_core::dsp::{boxcar, mean_power, preamble};

    let input: Vec<u16> = (0..buffer_len).map(|i| (i * 2654435761u64 as usize % 65536) as u16).collect();
    let window = 2;
    let bench_samples_per_symbol = 2;
    let mut boxcar_out = vec![0u16; buffer_len - window + 1];
    let mut preamble_out = vec![0u16; buffer_len.saturating_sub(11 * bench_samples_per_symbol)];

    let boxcar_elapsed = time_it(iterations, || boxcar(&input, window, &mut boxcar_out));
    let preamble_elapsed = time_it(iterations, || preamble(&input, bench_samples_per_symbol, &mut preamble_out));
    let mean_power_elapsed = time_it(iterations, || {
        let _ = mean_power(&input);
    });

    info!(selection = wisdom::dump_current_selection().replace('\n', ", "), "active kernel selection");
    info!(samples_per_sec = throughput(buffer_len, iterations, boxcar_elapsed), "boxcar_u16");
    info!(samples_per_sec = throughput(buffer_len, iterations, preamble_elapsed), "preamble_u16");
    info!(samples_per_sec = throughput(buffer_len, iterations, mean_power_elapsed), "mean_power_u16");
    Ok(())
}

fn time_it(iterations: usize, mut f: impl FnMut()) -> Duration {
    let start = Instant::now();
    for _ in 0..iterations {
        f();
    }
    start.elapsed()
}

fn throughput(buffer_len: usize, iterations: usize, elapsed: Duration) -> f64 {
    (buffer_len * iterations) as f64 / elapsed.as_secs_f64()
}

fn cmd_wisdom(action: WisdomAction) -> Result<()> {
    match action {
        WisdomAction::Show => {
            print!("{}", wisdom::dump_current_selection());
        }
        WisdomAction::Write { output } => {
            std::fs::write(&output, wisdom::dump_current_selection()).with_context(|| format!("writing wisdom file '{}'", output.display()))?;
        }
    }
    Ok(())
}
