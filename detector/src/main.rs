use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tagdfa::dot::emit_dot;
use tagdfa::events::{EventKind, History};
use tagdfa::graph::Graph;
use tagdfa::snapshot::GraphSnapshot;
use tagdfa::tag::{Tag, TagId, TagParams};
use tagdfa::verify::Cert;

const EXIT_OK: u8 = 0;
const EXIT_RUN_ERROR: u8 = 1;
const EXIT_USAGE_ERROR: u8 = 2;
const EXIT_SYSTEM_ERROR: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Final counters, one line.
    Counts,
    /// Graphviz DOT of the final automaton.
    Dot,
    /// JSON snapshot of the final automaton.
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "tagdfa",
    version,
    about = "Drives add/remove cycles against the tag-recognition automaton and validates it"
)]
struct Cli {
    /// JSON file with tag definitions: [{"id", "freq_mhz", "gaps"}, ...]
    tags: PathBuf,

    /// Use only the first N tags from the file
    #[arg(long)]
    max_tags: Option<usize>,

    /// Stop after N add/remove events (default: two per tag)
    #[arg(long)]
    max_events: Option<usize>,

    /// Pick tags at random instead of cycling through the schedule
    #[arg(short = 'R', long)]
    randomize: bool,

    /// RNG seed for --randomize
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// JSON event history driving adds/removes by schedule
    #[arg(long)]
    events: Option<PathBuf>,

    /// Fractional gap tolerance
    #[arg(long, default_value_t = 0.0015)]
    tol: f64,

    /// Absolute timing fuzz, seconds
    #[arg(long, default_value_t = 0.0)]
    time_fuzz: f64,

    /// Period-extension bound, seconds
    #[arg(long, default_value_t = 30.0)]
    max_time: f64,

    /// Lower clamp on gap ranges, seconds
    #[arg(long, default_value_t = 0.0)]
    min_time: f64,

    /// Check every graph invariant after each event
    #[arg(long)]
    validate_each: bool,

    /// Write a numbered DOT file after each event
    #[arg(short = 'G', long)]
    viz: bool,

    /// Filename prefix for --viz output
    #[arg(long, default_value = "tagdfa")]
    viz_prefix: String,

    /// Final output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Counts)]
    emit: EmitStage,

    /// Output file for --emit dot/json (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log compiler-style progress on stderr
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct TagSpec {
    id: i32,
    freq_mhz: f64,
    gaps: Vec<f64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tagdfa=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let params = TagParams::new(cli.tol, cli.time_fuzz, cli.max_time).with_min_time(cli.min_time);
    if let Err(e) = params.validate() {
        eprintln!("error: {e}");
        return ExitCode::from(EXIT_USAGE_ERROR);
    }

    let tags = match load_tags(&cli.tags, cli.max_tags) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_SYSTEM_ERROR);
        }
    };
    if tags.is_empty() {
        eprintln!("error: no usable tags in {}", cli.tags.display());
        return ExitCode::from(EXIT_USAGE_ERROR);
    }
    println!("Got {} tags", tags.len());

    let schedule = match cli.events.as_deref() {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(body) => match serde_json::from_str::<History>(&body) {
                Ok(h) => Some(h),
                Err(e) => {
                    eprintln!("error: bad event history {}: {e}", path.display());
                    return ExitCode::from(EXIT_USAGE_ERROR);
                }
            },
            Err(e) => {
                eprintln!("error: cannot read {}: {e}", path.display());
                return ExitCode::from(EXIT_SYSTEM_ERROR);
            }
        },
        None => None,
    };

    let mut graph = Graph::new("tagdfa");
    let by_id: HashMap<TagId, Arc<Tag>> = tags.iter().map(|t| (t.id(), t.clone())).collect();
    let mut in_tree: HashMap<TagId, bool> = tags.iter().map(|t| (t.id(), false)).collect();
    let mut rng = StdRng::seed_from_u64(cli.seed);

    let max_events = cli
        .max_events
        .or_else(|| schedule.as_ref().map(|h| h.len()))
        .unwrap_or(tags.len() * 2);

    println!(
        "Before any events, # tags in tree is {}, # Nodes = {}, # Sets = {}, # Edges = {}",
        graph.tag_count(),
        graph.node_count(),
        graph.set_count(),
        graph.edge_count()
    );

    let mut ticker = schedule.as_ref().map(|h| h.ticker());
    for num_events in 0..max_events {
        let (id, forced) = match ticker.as_mut() {
            Some(t) => match t.next() {
                Some(e) => (e.tag, Some(e.kind)),
                None => break,
            },
            None if cli.randomize => (tags[rng.gen_range(0..tags.len())].id(), None),
            None => (tags[num_events % tags.len()].id(), None),
        };
        let Some(tag) = by_id.get(&id) else {
            eprintln!("error: event names unknown tag {id}");
            return ExitCode::from(EXIT_USAGE_ERROR);
        };

        let adding = match forced {
            Some(EventKind::Add) => true,
            Some(EventKind::Remove) => false,
            None => !in_tree[&id],
        };
        let result = if adding {
            graph.add_tag(tag.clone(), &params).map(|out| {
                in_tree.insert(id, true);
                if let Some(proxy) = out.proxy {
                    println!("+{id} (ambiguous, proxy {})", proxy.id());
                } else {
                    println!("+{id}");
                }
            })
        } else {
            graph.remove_tag(id, &params).map(|out| {
                in_tree.insert(id, false);
                println!("-{id} ({out:?})");
            })
        };
        if let Err(e) = result {
            eprintln!("error: event {num_events}: {e}");
            return ExitCode::from(EXIT_RUN_ERROR);
        }

        if cli.validate_each {
            let cert = graph.verify();
            if !cert.all_pass() {
                eprintln!(
                    "error: invariants failed after event {num_events}: {:?}",
                    cert.obligations()
                        .into_iter()
                        .filter(|(_, ok)| !ok)
                        .map(|(n, _)| n)
                        .collect::<Vec<_>>()
                );
                return ExitCode::from(EXIT_RUN_ERROR);
            }
        }
        if cli.viz {
            if let Err(e) = graph.dump_viz(&cli.viz_prefix) {
                eprintln!("error: viz dump failed: {e}");
                return ExitCode::from(EXIT_SYSTEM_ERROR);
            }
        }

        println!(
            "After {} events, # tags in tree is {}, # Nodes = {}, # Sets = {}, # Edges = {}",
            num_events + 1,
            graph.tag_count(),
            graph.node_count(),
            graph.set_count(),
            graph.edge_count()
        );
    }

    let body = match cli.emit {
        EmitStage::Counts => None,
        EmitStage::Dot => Some(emit_dot(&mut graph)),
        EmitStage::Json => match serde_json::to_string_pretty(&GraphSnapshot::of(&graph)) {
            Ok(s) => Some(s),
            Err(e) => {
                eprintln!("error: snapshot serialization failed: {e}");
                return ExitCode::from(EXIT_RUN_ERROR);
            }
        },
    };
    if let Some(body) = body {
        match cli.output {
            Some(path) => {
                if let Err(e) = std::fs::write(&path, body) {
                    eprintln!("error: cannot write {}: {e}", path.display());
                    return ExitCode::from(EXIT_SYSTEM_ERROR);
                }
            }
            None => print!("{body}"),
        }
    }

    ExitCode::from(EXIT_OK)
}

fn load_tags(path: &PathBuf, max_tags: Option<usize>) -> Result<Vec<Arc<Tag>>, String> {
    let body = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let specs: Vec<TagSpec> =
        serde_json::from_str(&body).map_err(|e| format!("bad tag file {}: {e}", path.display()))?;
    let mut tags = Vec::new();
    for spec in specs {
        match Tag::new(TagId(spec.id), spec.freq_mhz, spec.gaps) {
            Ok(t) => tags.push(Arc::new(t)),
            Err(e) => eprintln!("warning: skipping tag {}: {e}", spec.id),
        }
        if let Some(max) = max_tags {
            if tags.len() >= max {
                break;
            }
        }
    }
    Ok(tags)
}
