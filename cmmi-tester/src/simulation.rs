use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::scenarios::{Scenario, ScenarioCtx};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub passed: bool,
    pub checks: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

pub struct SimulationRunner {
    players: usize,
    verbose: bool,
}

impl SimulationRunner {
    pub const fn new(players: usize, verbose: bool) -> Self {
        Self { players, verbose }
    }

    pub fn run_scenario(&self, scenario: &Scenario, seeds: &[u64]) -> Vec<ScenarioResult> {
        seeds
            .iter()
            .map(|&seed| {
                if self.verbose {
                    println!(
                        "🧪 Running scenario: {} (seed: {seed}, players: {})",
                        scenario.key.bright_white(),
                        self.players
                    );
                }
                self.run_single(scenario, seed)
            })
            .collect()
    }

    fn run_single(&self, scenario: &Scenario, seed: u64) -> ScenarioResult {
        let ctx = ScenarioCtx {
            seed,
            players: self.players,
            verbose: self.verbose,
        };
        let started = Instant::now();
        let outcome = (scenario.run)(&ctx);
        let duration = started.elapsed();

        let (checks, failures) = match outcome {
            Ok(checks) => {
                if self.verbose {
                    println!("  ✅ {checks} checks passed ({duration:?})");
                }
                (checks, Vec::new())
            }
            Err(err) => {
                let message = format!("seed {seed}: {err:#}");
                if self.verbose {
                    println!("  ❌ {}", message.clone().red());
                }
                (0, vec![message])
            }
        };

        ScenarioResult {
            scenario_name: scenario.key.to_string(),
            seed,
            passed: failures.is_empty(),
            checks,
            failures,
            duration,
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
