use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::{Duration, Instant};

use sdvpr_engine::Template;

use super::scenarios::{Scenario, ScenarioInput};
use super::simulation::SimulationConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub template: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

/// Knobs shared by every playthrough the tester drives.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub cancel_rate: f64,
    pub max_steps: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            cancel_rate: 0.1,
            max_steps: 10_000,
        }
    }
}

pub struct LogicTester {
    verbose: bool,
    settings: RunSettings,
}

impl LogicTester {
    pub const fn new(verbose: bool, settings: RunSettings) -> Self {
        Self { verbose, settings }
    }

    pub fn run_scenario(
        &self,
        scenario: &Scenario,
        templates: &[(String, Rc<Template>)],
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for (template_name, template) in templates {
            for &seed in seeds {
                if self.verbose {
                    println!(
                        "🧪 Testing scenario: {} (template: {template_name} seed: {seed})",
                        scenario.key.bright_white()
                    );
                }
                results.push(self.run_single_scenario(
                    scenario,
                    template_name,
                    template,
                    seed,
                    iterations,
                ));
            }
        }

        results
    }

    fn run_single_scenario(
        &self,
        scenario: &Scenario,
        template_name: &str,
        template: &Rc<Template>,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();

        for i in 0..iterations {
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));
            let input = ScenarioInput {
                template_name: template_name.to_string(),
                template: Rc::clone(template),
                config: SimulationConfig::new(iteration_seed)
                    .with_cancel_rate(self.settings.cancel_rate)
                    .with_max_steps(self.settings.max_steps),
            };

            let start_time = Instant::now();
            match scenario.run(&input) {
                Ok(()) => {
                    successes += 1;
                    let duration = start_time.elapsed();
                    performance_data.push(duration);
                    if self.verbose {
                        println!(
                            "  ✅ Iteration {}/{} passed ({duration:?})",
                            i + 1,
                            iterations
                        );
                    }
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    log::debug!(
                        "{} failed on {template_name} seed {iteration_seed}: {message}",
                        scenario.key
                    );
                    if self.verbose {
                        println!(
                            "  ❌ Iteration {}/{} failed: {}",
                            i + 1,
                            iterations,
                            message.clone().red()
                        );
                    }
                    failures.push(format!(
                        "Iteration {} (template {template_name}, seed {iteration_seed}): {message}",
                        i + 1
                    ));
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.key.to_string(),
            template: template_name.to_string(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
            performance_data,
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis_vec = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis_vec
            .into_iter()
            .map(|m| Duration::from_millis(u64::try_from(m).unwrap_or(0)))
            .collect())
    }
}
