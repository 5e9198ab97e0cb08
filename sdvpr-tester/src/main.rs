mod common;
mod logic;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use common::{parse_seeds, split_csv};
use logic::{LogicTester, RunSettings, ScenarioResult, get_scenario, list_scenarios, scenario_keys};
use sdvpr_engine::constants::CUSTOM_TEMPLATE_NAME;
use sdvpr_engine::validate::validate_template_report;
use sdvpr_engine::{BuiltinTemplates, PREDEFINED_TEMPLATES, Template, TemplateCache, TemplateProvider};

#[derive(Debug, Parser)]
#[command(name = "sdvpr-tester", version)]
#[command(about = "Seeded simulation tester for the perfection randomizer engine")]
struct Args {
    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "full-run")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Bundled templates to play (comma-separated, or "all")
    #[arg(long, default_value = "all")]
    templates: String,

    /// Extra template JSON file, played under the name "custom"
    #[arg(long)]
    template_file: Option<PathBuf>,

    /// Seeds to run (comma-separated, decimal or 0x-prefixed hex)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario, template and seed
    #[arg(long, default_value_t = 5)]
    iterations: usize,

    /// Chance that the simulated player cancels a rolled goal
    #[arg(long, default_value_t = 0.1)]
    cancel_rate: f64,

    /// Give up on a playthrough after this many rolls
    #[arg(long, default_value_t = 10_000)]
    max_steps: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let settings = run_settings(&args)?;
    let scenarios = expand_scenarios(&args.scenarios);
    let seeds = parse_seeds(&split_csv(&args.seeds))?;
    let templates = load_templates(&args)?;

    let results = run_logic_scenarios(&args, settings, &scenarios, &templates, &seeds);

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:25} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🌾 SDVPR Simulation Tester".bright_cyan().bold());
    println!("{}", "================================".cyan());
}

fn run_settings(args: &Args) -> Result<RunSettings> {
    if !(0.0..1.0).contains(&args.cancel_rate) {
        bail!(
            "--cancel-rate must be at least 0 and below 1, got {}",
            args.cancel_rate
        );
    }
    Ok(RunSettings {
        cancel_rate: args.cancel_rate,
        max_steps: args.max_steps,
    })
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for key in scenario_keys() {
            if !scenarios.iter().any(|s| s == key) {
                scenarios.push(key.to_string());
            }
        }
    }
    scenarios
}

fn expand_templates(templates_arg: &str) -> Vec<String> {
    let mut templates = split_csv(templates_arg);
    if templates.iter().any(|t| t == "all") {
        templates.retain(|t| t != "all");
        for name in PREDEFINED_TEMPLATES {
            if !templates.iter().any(|t| t == name) {
                templates.push(name.to_string());
            }
        }
    }
    templates
}

fn load_templates(args: &Args) -> Result<Vec<(String, Rc<Template>)>> {
    let cache = TemplateCache::new(BuiltinTemplates);
    let mut templates = Vec::new();
    for name in expand_templates(&args.templates) {
        let template = cache
            .get_template(&name)
            .with_context(|| format!("failed to load template '{name}'"))?;
        templates.push((name, template));
    }

    if let Some(path) = &args.template_file {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let template = Template::from_json(&json)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        validate_template_report(&template)
            .with_context(|| format!("{} is not a valid template", path.display()))?;
        templates.push((CUSTOM_TEMPLATE_NAME.to_string(), Rc::new(template)));
    }

    if templates.is_empty() {
        bail!("no templates selected");
    }
    log::info!(
        "loaded {} templates ({} parsed from the bundle)",
        templates.len(),
        cache.cached_len()
    );
    Ok(templates)
}

fn run_logic_scenarios(
    args: &Args,
    settings: RunSettings,
    scenarios: &[String],
    templates: &[(String, Rc<Template>)],
    seeds: &[u64],
) -> Vec<ScenarioResult> {
    println!("{}", "🧠 Running Logic Tests".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let tester = LogicTester::new(args.verbose, settings);
    let mut results = Vec::new();

    for scenario_name in scenarios {
        if let Some(scenario) = get_scenario(scenario_name) {
            results.extend(tester.run_scenario(&scenario, templates, seeds, args.iterations));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
        }
    }

    results
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(&mut output_target, results)?,
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# SDVPR Logic Test Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            let duration = start_time.elapsed();
            if results.is_empty() {
                writeln!(&mut output_target, "No logic scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(&mut output_target, results, duration)?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
