#![forbid(unsafe_code)]
use anyhow::Result;
use clap::{Parser, Subcommand};
use garde::{
    audit, io, load_config_from_file,
    storage::{JsonStorage, RosterSnapshot, Storage},
    PipelineOutcome, RosterReport, RunningTotals, StagePipeline,
};
use std::time::Duration;
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// CLI de génération de rotas de gardes (sans base de données)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Générer le rota complet
    Solve {
        /// Fichier JSON de configuration
        #[arg(long)]
        config: String,
        /// Personnes (JSON ou CSV)
        #[arg(long)]
        people: String,
        /// Budget de temps par appel au moteur, en secondes
        #[arg(long)]
        time_budget: Option<u64>,
        #[arg(long)]
        out_grid: Option<String>,
        #[arg(long)]
        out_json: Option<String>,
        #[arg(long)]
        report: Option<String>,
        /// Instantané JSON du dernier état validé
        #[arg(long)]
        snapshot: Option<String>,
    },

    /// Rejouer une étape sur un instantané
    Replay {
        #[arg(long)]
        config: String,
        #[arg(long)]
        people: String,
        #[arg(long)]
        snapshot: String,
        #[arg(long)]
        stage: String,
        #[arg(long)]
        time_budget: Option<u64>,
    },

    /// Vérifier les règles de repos d'un instantané
    Check {
        #[arg(long)]
        snapshot: String,
        /// Export CSV des violations (optionnel)
        #[arg(long)]
        report: Option<String>,
    },

    /// Convertir un CSV de personnes en JSON validé
    ImportPeople {
        #[arg(long)]
        csv: String,
        #[arg(long)]
        out: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        let _ = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    let code = match cli.cmd {
        Commands::Solve {
            config,
            people,
            time_budget,
            out_grid,
            out_json,
            report,
            snapshot,
        } => {
            let config = load_config_from_file(&config)?;
            let people = io::import_people(&people)?;
            let mut pipeline = StagePipeline::from_config(&config, people)?;
            if let Some(secs) = time_budget {
                let mut options = *pipeline.options();
                options.time_budget = Duration::from_secs(secs);
                pipeline = pipeline.with_options(options);
            }
            let outcome = pipeline.run()?;
            let summary =
                RosterReport::build(pipeline.calendar(), pipeline.people(), &outcome.state);

            if let Some(path) = out_grid {
                io::export_grid_csv(path, pipeline.people(), &outcome.state)?;
            }
            if let Some(path) = out_json {
                io::export_roster_json(path, pipeline.people(), &outcome.state, &summary)?;
            }
            if let Some(path) = report {
                io::export_report_csv(path, &summary)?;
            }
            if let Some(path) = snapshot {
                JsonStorage::open(path)?.save(&RosterSnapshot::new(
                    outcome.state.clone(),
                    outcome.totals.clone(),
                ))?;
            }
            print_outcome(&outcome, &summary)
        }
        Commands::Replay {
            config,
            people,
            snapshot,
            stage,
            time_budget,
        } => {
            let config = load_config_from_file(&config)?;
            let people = io::import_people(&people)?;
            let mut pipeline = StagePipeline::from_config(&config, people)?;
            if let Some(secs) = time_budget {
                let mut options = *pipeline.options();
                options.time_budget = Duration::from_secs(secs);
                pipeline = pipeline.with_options(options);
            }
            let storage = JsonStorage::open(&snapshot)?;
            let snap = storage.load()?;
            let spec = pipeline.stage(&stage)?.clone();
            match pipeline.run_stage(&spec, &snap.state, &snap.totals) {
                Ok(result) => {
                    storage.save(&RosterSnapshot::new(result.state, result.totals))?;
                    println!(
                        "{}: {} assignment(s), {} gap(s)",
                        result.report.stage, result.report.assignments, result.report.gaps
                    );
                    if result.report.gaps > 0 {
                        2
                    } else {
                        0
                    }
                }
                Err(garde::SchedError::HardInfeasibility(report)) => {
                    eprintln!("{report}");
                    3
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Check { snapshot, report } => {
            let snap = JsonStorage::open(&snapshot)?.load()?;
            let violations = audit(&snap.state);
            let totals = RunningTotals::from_state(&snap.state);
            if totals != snap.totals {
                eprintln!("Warning: stored totals differ from the grid");
            }
            if violations.is_empty() && snap.state.gaps().is_empty() {
                println!("OK: no violations");
                0
            } else {
                eprintln!(
                    "Found {} violation(s), {} capacity gap(s)",
                    violations.len(),
                    snap.state.gaps().len()
                );
                if let Some(path) = report {
                    // CSV simple
                    let mut w = csv::Writer::from_path(path)?;
                    w.write_record(["person_id", "rule", "start", "end"])?;
                    for v in &violations {
                        let start = v.start.to_string();
                        let end = v.end.to_string();
                        w.write_record([
                            v.person.as_str(),
                            v.kind.code(),
                            start.as_str(),
                            end.as_str(),
                        ])?;
                    }
                    w.flush()?;
                }
                // Code 2 = WARNING/INCOMPLETE
                2
            }
        }
        Commands::ImportPeople { csv, out } => {
            let people = io::import_people_csv(csv)?;
            io::export_people_json(&out, &people)?;
            println!("{} person(s) written to {out}", people.len());
            0
        }
    };

    std::process::exit(code);
}

fn print_outcome(outcome: &PipelineOutcome, summary: &RosterReport) -> i32 {
    for stage in &outcome.stages {
        println!(
            "{} | {} assignment(s) | {} gap(s)",
            stage.stage, stage.assignments, stage.gaps
        );
    }
    for gap in outcome.state.gaps() {
        println!("LOCUM {} {} x{}", gap.date, gap.kind, gap.shortfall);
    }
    if let Some(report) = &outcome.halted {
        eprintln!("{report}");
        return 3;
    }
    if outcome.has_warnings() || !summary.violations.is_empty() {
        2
    } else {
        0
    }
}
