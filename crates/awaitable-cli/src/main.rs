use anyhow::{Context, Result};
use awaitable_script::scenarios::{self, Scenario};
use awaitable_script::{Compiler, Config, Harness, Report, tracer};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "awaitable")]
#[command(about = "Deferred value scenarios: run, inspect, trace")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Reuse one wait per await binding when compiling
    #[arg(long, global = true)]
    coalesce: bool,

    /// Start producers on worker threads
    #[arg(long, global = true)]
    spawn: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List scenarios
    List,

    /// Run scenarios and report whether eager, compiled and traced runs agree
    Run {
        /// Scenario names (all when omitted)
        names: Vec<String>,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a scenario's program
    Show {
        name: String,

        /// Print the compiled program instead of the source
        #[arg(long)]
        lowered: bool,
    },

    /// Trace a scenario on its inputs and print the recorded program
    Trace { name: String },
}

fn find(name: &str) -> Result<Scenario> {
    scenarios::find(name).with_context(|| format!("no scenario named '{name}'"))
}

fn print_report(report: &Report) {
    let status = if report.matched { "ok" } else { "MISMATCH" };
    println!("{:<20} {:<16} {status}", report.name, report.check);
    if let Some(eager) = &report.eager {
        println!("    eager:    {eager}");
    }
    if let Some(compiled) = &report.compiled {
        println!("    compiled: {compiled}");
    }
    if let Some(waits) = report.waits {
        match report.expected_waits {
            Some(expected) => println!("    waits:    {waits} (expected {expected})"),
            None => println!("    waits:    {waits}"),
        }
    }
    if let Some(error) = &report.error {
        println!("    error:    {error}");
    }
}

fn run(names: &[String], json: bool, config: Config) -> Result<bool> {
    let selected = if names.is_empty() {
        scenarios::all()
    } else {
        names.iter().map(|name| find(name)).collect::<Result<Vec<_>>>()?
    };

    let harness = Harness::new(config);
    let reports: Vec<Report> = selected.iter().map(|scenario| harness.check(scenario)).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
        let passed = reports.iter().filter(|report| report.matched).count();
        println!("{passed}/{} scenarios matched", reports.len());
    }
    Ok(reports.iter().all(|report| report.matched))
}

fn show(name: &str, lowered: bool, config: Config) -> Result<()> {
    let scenario = find(name)?;
    if lowered {
        let compiled = Compiler::compile_with(Arc::clone(&scenario.module), scenario.entry, config)
            .with_context(|| format!("compiling '{name}'"))?;
        for function in compiled.functions() {
            println!("def {}:\n{}\n", function.name, function.body);
        }
        return Ok(());
    }
    for class in scenario.module.classes() {
        let fields: Vec<_> = class.fields().map(|(name, ty)| format!("{name}: {ty}")).collect();
        println!("class {}({})", class.name(), fields.join(", "));
    }
    for function in scenario.module.functions() {
        match function {
            awaitable_script::Function::Script(function) => {
                let params: Vec<_> = function
                    .params
                    .iter()
                    .map(|param| format!("{}: {}", param.name, param.ty))
                    .collect();
                let returns = function
                    .returns
                    .as_ref()
                    .map(|ty| format!(" -> {ty}"))
                    .unwrap_or_default();
                println!("def {}({}){returns}:\n{}\n", function.name, params.join(", "), function.body);
            }
            awaitable_script::Function::Native(function) => {
                println!("native {} -> {}\n", function.name, function.returns);
            }
        }
    }
    Ok(())
}

fn trace(name: &str) -> Result<()> {
    let scenario = find(name)?;
    let trace = tracer::trace(Arc::clone(&scenario.module), scenario.entry, &scenario.inputs)
        .with_context(|| format!("tracing '{name}'"))?;
    println!("def {}:\n{}\n", trace.name, trace.body);
    println!("result: {}", trace.result);
    for call in &trace.awaits {
        match &call.producer {
            Some(producer) => println!("recorded {}: awaitable({producer})", call.id),
            None => println!("recorded {}: nowait", call.id),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env().init();

    let cli = Cli::parse();
    let env = Config::from_env();
    let config = env
        .with_coalesce_waits(env.coalesce_waits || cli.coalesce)
        .with_spawn_awaits(env.spawn_awaits || cli.spawn);
    log::debug!("running with {config:?}");

    match cli.command {
        Commands::List => {
            for scenario in scenarios::all() {
                println!("{:<20} {:<16} {}", scenario.name, scenario.check.name(), scenario.summary);
            }
        }
        Commands::Run { names, json } => {
            if !run(&names, json, config)? {
                std::process::exit(1);
            }
        }
        Commands::Show { name, lowered } => show(&name, lowered, config)?,
        Commands::Trace { name } => trace(&name)?,
    }

    Ok(())
}
