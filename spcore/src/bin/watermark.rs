use std::io::{BufRead, BufReader};

use spcore::context::{Config, Strategy, TraceEncoding, TracerContext};
use spcore::*;

/// Replays a recorded spawn/sync trace and reports a provable
/// upper bound on the program's peak memory
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the trace file
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    input:      PathBuf,

    /// Worker count p
    #[arg(short = 'p', long, default_value_t = 1)]
    workers:    usize,

    /// Memory limit L in bytes; the admission threshold is L/(2p)
    #[arg(short = 'l', long, default_value_t = 0)]
    limit:      i64,

    /// Trace encoding
    #[arg(value_enum, short, long, default_value = "full")]
    encoding:   TraceEncoding,

    /// Aggregation strategy
    #[arg(value_enum, short, long, default_value = "naive")]
    strategy:   Strategy,

    /// Use the p-processor model instead of the 1-processor one
    #[arg(short, long, default_value_t = false)]
    multi:      bool,

    /// Reader poll sleep in microseconds
    #[arg(long, default_value_t = 1000)]
    poll_micros: u64,

    /// Print trace construction chatter
    #[arg(long, default_value_t = false)]
    chatty:     bool,

    /// Write the spawn graph as DOT to this path (full encoding)
    #[arg(long)]
    dot:        Option<PathBuf>,
}

/// One line of the trace format. Lines are whitespace-separated:
///
/// ```text
/// spawn <region> <net-bytes> <peak-bytes>
/// sync  <region> <net-bytes> <peak-bytes>
/// exit  <net-bytes> <peak-bytes>
/// call
/// return
/// ```
///
/// `#` starts a comment. The net delta may be negative; the peak
/// may not, and never sits below the net delta.
fn replay_line(ctx: &mut TracerContext, line: &str, lineno: usize) {
    let line = line.split('#').next().unwrap().trim();
    if line.is_empty() {
        return;
    }
    let fields: Vec<&str> = line.split_whitespace().collect();

    let parse = |s: &str| -> i64 {
        s.parse()
            .unwrap_or_else(|_| panic!("line {lineno}: bad number {s:?}"))
    };
    let feed = |ctx: &mut TracerContext, mem: i64, peak: i64| {
        assert!(
            peak >= 0 && peak >= mem,
            "line {lineno}: peak {peak} cannot be below max(0, {mem})"
        );
        // Any (net, peak) pair is reachable as one allocation to
        // the peak followed by frees down to the net delta.
        ctx.record_alloc(peak as u64, None);
        ctx.record_free((peak - mem) as u64);
    };

    match fields[0] {
        "call" => ctx.enter_call(),
        "return" => ctx.leave_call(),
        "spawn" => {
            assert!(fields.len() == 4, "line {lineno}: spawn takes region, net, peak");
            feed(ctx, parse(fields[2]), parse(fields[3]));
            ctx.on_spawn(parse(fields[1]) as usize);
        }
        "sync" => {
            assert!(fields.len() == 4, "line {lineno}: sync takes region, net, peak");
            feed(ctx, parse(fields[2]), parse(fields[3]));
            ctx.on_sync(parse(fields[1]) as usize);
        }
        "exit" => {
            assert!(fields.len() == 3, "line {lineno}: exit takes net, peak");
            feed(ctx, parse(fields[1]), parse(fields[2]));
            ctx.program_exit();
        }
        other => panic!("line {lineno}: unknown trace record {other:?}"),
    }
}

fn main() {
    let cli = Args::parse();
    assert!(
        cli.input.exists() && cli.input.is_file(),
        "Invalid input path"
    );

    let cfg = Config {
        workers:        cli.workers,
        mem_limit:      cli.limit,
        encoding:       cli.encoding,
        strategy:       cli.strategy,
        multiprocessor: cli.multi,
        poll_interval:  Duration::from_micros(cli.poll_micros),
        chatty:         cli.chatty,
        retain_graph:   cli.dot.is_some(),
        ..Default::default()
    };
    let threshold = cfg.threshold();

    let mut ctx = TracerContext::new(cfg).unwrap_or_else(|e| panic!("bad configuration: {e}"));
    let aggregator = ctx.spawn_aggregator();

    let replay_cost = Instant::now();
    ctx.start();

    let file = std::fs::File::open(&cli.input).expect("could not open the trace");
    let mut saw_exit = false;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.expect("could not read the trace");
        if line.trim().starts_with("exit") {
            saw_exit = true;
        }
        replay_line(&mut ctx, &line, idx + 1);
    }
    if !saw_exit {
        ctx.program_exit();
    }
    assert!(ctx.is_complete(), "the trace never reached its final sync");

    let report = aggregator.join();
    println!("Replay time: {} μs", replay_cost.elapsed().as_micros());

    if let Some(dot) = &cli.dot {
        match ctx.write_dot_file(dot) {
            Some(res) => res.expect("could not write the DOT file"),
            None => println!("WARNING: DOT output needs the full encoding!"),
        }
    }

    println!(
        "Watermark:\t{} bytes\nNet total:\t{} bytes\nThreshold:\t{} bytes ({} workers)",
        format_with_commas(report.watermark),
        format_with_commas(report.mem_total),
        format_with_commas(threshold),
        cli.workers,
    );
    if cli.limit > 0 {
        if report.watermark > cli.limit {
            println!("The program may exceed the {} byte limit.", format_with_commas(cli.limit));
        } else {
            println!("The program stays within the {} byte limit.", format_with_commas(cli.limit));
        }
    }
}
