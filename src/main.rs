//! CLI for the deduce evaluator.
//!
//! Usage:
//!   deduce <program.json> [options]      Evaluate a program and print its relations

use std::collections::BTreeMap;
use std::str::FromStr;
use std::{env, fs};

use anyhow::{Result, anyhow, bail};
use deduce_eval::{
    EvalConfig, EvaluationResult, EvaluationStats, FunctionRegistry, Optimization,
    RelationStats, SemiNaiveEvaluation,
};
use deduce_ir::Program;
use deduce_ir::source::parse_program;
use log::debug;
use serde::Serialize;

struct Options {
    path: String,
    config: EvalConfig,
    query_only: bool,
    stats: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None | Some("-h" | "--help") => print_usage(),
        Some(_) => {
            if let Err(e) = parse_options(&args).and_then(|opts| run(&opts)) {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn print_usage() {
    println!("deduce: parallel semi-naive Datalog evaluator\n");
    println!("Usage: deduce <program.json> [options]\n");
    println!("  --parallelism N   Number of worker threads (default 4)");
    println!("  --sequential      Run every task on the main thread");
    println!("  --eager           Eager semi-naive evaluation instead of rounds");
    println!("  --optimize N      Join-ordering heuristic, 0-4 (default 0)");
    println!("  --task-size N     Tuples per task (default 128)");
    println!("  --track a,b       Log the tuples of these relations after each stratum");
    println!("  --query-only      Print only the answer to the program's query");
    println!("  --stats           Print evaluation statistics as JSON");
}

fn value<T: FromStr>(flag: &str, value: Option<&String>) -> Result<T> {
    value
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| anyhow!("{flag} expects a number"))
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut iter = args.iter();
    let path = iter
        .next()
        .cloned()
        .ok_or_else(|| anyhow!("missing program path"))?;
    let mut opts = Options {
        path,
        config: EvalConfig::default(),
        query_only: false,
        stats: false,
    };

    while let Some(arg) = iter.next() {
        let config = std::mem::take(&mut opts.config);
        opts.config = match arg.as_str() {
            "--parallelism" => config.with_parallelism(value(arg, iter.next())?),
            "--sequential" => config.with_sequential(true),
            "--eager" => config.with_eager(true),
            "--optimize" => {
                let level: u8 = value(arg, iter.next())?;
                let optimization = Optimization::from_level(level)
                    .ok_or_else(|| anyhow!("unknown optimization level {level}"))?;
                config.with_optimization(optimization)
            }
            "--task-size" => config.with_task_size(value(arg, iter.next())?),
            "--track" => {
                let names = iter.next().ok_or_else(|| anyhow!("--track expects relation names"))?;
                config.with_tracked_relations(names.split(',').filter(|n| !n.is_empty()))
            }
            "--query-only" => {
                opts.query_only = true;
                config
            }
            "--stats" => {
                opts.stats = true;
                config
            }
            other => bail!("unknown option `{other}`"),
        };
    }
    Ok(opts)
}

fn run(opts: &Options) -> Result<()> {
    let path = &opts.path;
    let source = fs::read_to_string(path).map_err(|e| anyhow!("cannot read {path}: {e}"))?;
    let program = parse_program(&source).map_err(|e| anyhow!("invalid program {path}: {e}"))?;
    debug!("running {path} with {:?}", opts.config);

    let mut eval = SemiNaiveEvaluation::from_program(
        &program,
        FunctionRegistry::with_builtins(),
        opts.config.clone(),
    )?;
    let stats = eval.run()?.clone();
    let result = eval.result();

    if opts.query_only {
        let Some(answer) = result.query_answer()? else {
            bail!("program has no query");
        };
        let name = result.query_symbol().map_or("query", |s| s.name());
        print_tuples(name, &result.sorted(answer));
    } else {
        dump_all(&result, &program);
    }

    if opts.stats {
        print_stats(&result, &program, &stats);
    }
    Ok(())
}

fn dump_all(result: &EvaluationResult<'_>, program: &Program) {
    let mut symbols: Vec<_> = program.relations().iter().collect();
    symbols.sort();

    let mut first = true;
    for symbol in symbols {
        let tuples = result.rendered(symbol);
        if tuples.is_empty() {
            continue;
        }
        if !first {
            println!();
        }
        print_tuples(symbol.name(), &tuples);
        first = false;
    }
}

fn print_tuples(name: &str, tuples: &[String]) {
    println!(
        "{name} ({} tuple{}):",
        tuples.len(),
        if tuples.len() == 1 { "" } else { "s" }
    );
    for tuple in tuples {
        println!("  {tuple}");
    }
}

/// JSON shape of `--stats`.
#[derive(Serialize)]
struct StatsReport<'a> {
    #[serde(flatten)]
    evaluation: &'a EvaluationStats,
    relations: BTreeMap<&'a str, RelationStats>,
}

fn stats_report<'a>(
    result: &EvaluationResult<'_>,
    program: &'a Program,
    stats: &'a EvaluationStats,
) -> StatsReport<'a> {
    let relations = program
        .relations()
        .iter()
        .map(|symbol| (symbol.name(), result.relation_stats(symbol)))
        .collect();
    StatsReport {
        evaluation: stats,
        relations,
    }
}

fn print_stats(result: &EvaluationResult<'_>, program: &Program, stats: &EvaluationStats) {
    match serde_json::to_string_pretty(&stats_report(result, program, stats)) {
        Ok(text) => println!("\n{text}"),
        Err(e) => eprintln!("cannot serialize stats: {e}"),
    }
}
