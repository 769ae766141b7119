mod broadcast;
mod config;
mod ingest;
mod simulate;
mod store;
mod supervisor;
mod telemetry;
mod web;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "gnss-relay")]
#[command(about = "Relays live GNSS receiver telemetry to web clients")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a configuration file and print the effective settings
    Validate {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Run the relay
    Serve {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Send synthetic telemetry to a running relay
    Simulate {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
        /// Host the relay listens on
        #[arg(long, default_value = "127.0.0.1")]
        target: String,
        /// Time between epochs, e.g. "1s" or "200ms"
        #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
        interval: Duration,
        /// Stop after this many epochs
        #[arg(long)]
        count: Option<u64>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Serve { config } => serve(&config),
        Commands::Simulate {
            config,
            target,
            interval,
            count,
        } => simulate(&config, &target, interval, count),
    }
}

fn validate(path: &str) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Configuration is valid");
    println!("  web:          {}", config.web.bind);
    println!(
        "  pvt:          udp {} ({})",
        config.telemetry.pvt_addr(),
        config.telemetry.layout.name()
    );
    println!("  observables:  udp {}", config.telemetry.observables_addr());
    println!(
        "  history:      {} snapshots, default limit {}",
        config.telemetry.history_capacity, config.telemetry.default_limit
    );
    println!("  program:      {}", config.supervisor.program);
    for (name, profile) in &config.supervisor.profiles {
        let conf = profile
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("    {}: {}", name, conf);
    }
    ExitCode::SUCCESS
}

fn serve(path: &str) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(runtime) = runtime() else {
        return ExitCode::FAILURE;
    };

    match runtime.block_on(web::run_server(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn simulate(path: &str, target: &str, interval: Duration, count: Option<u64>) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some(runtime) = runtime() else {
        return ExitCode::FAILURE;
    };

    let run = simulate::run(&config.telemetry, target, interval, count);
    let result = runtime.block_on(async {
        tokio::select! {
            result = run => result,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Simulation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => Some(rt),
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            None
        }
    }
}
