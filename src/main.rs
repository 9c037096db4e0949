use std::env;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use log::info;

use dslab_kubeplay::config::SimulationConfig;
use dslab_kubeplay::metrics::printer::{print_metrics, write_timeline_csv};
use dslab_kubeplay::simulation_callbacks::RunUntilScenarioIdleCallbacks;
use dslab_kubeplay::simulator::KubeplaySimulation;

#[derive(Parser)]
struct Args {
    #[clap(short, long)]
    config_file: PathBuf,
    /// Scenario to run until it returns to idle. Without it only the fixture cluster is loaded.
    #[clap(short, long)]
    scenario: Option<String>,
    /// Writes scenario phase transitions as CSV.
    #[clap(long)]
    timeline_csv: Option<PathBuf>,
    #[clap(long)]
    list_scenarios: bool,
}

fn init_logger(logs_filepath: Option<&String>) {
    // log level INFO by default
    let mut env_logger_builder = env_logger::builder();
    if env::var("RUST_LOG").is_err() {
        env_logger_builder.filter_level(log::LevelFilter::Info);
    }
    if let Some(path) = logs_filepath {
        let log_file = FileRotate::new(
            path,
            AppendCount::new(3),
            ContentLimit::Bytes(10 * 1024 * 1024),
            Compression::None,
            None,
        );
        env_logger_builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    env_logger_builder.init();
}

fn main() {
    let args = Args::parse();

    let config_yaml =
        std::fs::read_to_string(&args.config_file).expect("could not read config file");
    let config = Rc::new(
        serde_yaml::from_str::<SimulationConfig>(&config_yaml).expect("could not parse config file"),
    );

    init_logger(config.logs_filepath.as_ref());
    info!(
        "Path to config file: {:?}",
        args.config_file.canonicalize().unwrap_or(args.config_file.clone())
    );

    let mut kubeplay_simulation = KubeplaySimulation::new(config.clone());

    if args.list_scenarios {
        let engine = kubeplay_simulation.scenario_engine.borrow();
        for name in engine.scenario_names() {
            let description = engine
                .get_scenario(&name)
                .map(|scenario| scenario.description.clone())
                .unwrap_or_default();
            println!("{:<24} {}", name, description);
        }
        return;
    }

    match args.scenario.as_deref() {
        Some(scenario) => {
            kubeplay_simulation.run_with_callbacks(Box::new(RunUntilScenarioIdleCallbacks::new(scenario)));
        }
        None => {
            if let Some(printer_config) = config.metrics_printer.as_ref() {
                print_metrics(kubeplay_simulation.metrics_collector.clone(), printer_config)
                    .expect("could not write metrics");
            }
        }
    }

    if let Some(path) = args.timeline_csv.as_ref() {
        write_timeline_csv(kubeplay_simulation.scenario_engine.borrow().history(), path)
            .expect("could not write timeline");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(kubeplay_simulation.cluster().as_ref())
            .expect("could not serialize cluster snapshot")
    );
}
