//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tracing::{info, warn};

use accord_common::{FinalizedTransaction, PartyName, Result as AccordResult};
use accord_party::PartyConfig;

use crate::metrics::SimulationMetrics;
use crate::network::SimulatedNetwork;
use crate::scenario::{Expect, Fault, PartySpec, Scenario, ScenarioStep};

/// Controls the simulation.
pub struct SimulationController {
    network: SimulatedNetwork,
    /// Random number generator.
    rng: RwLock<StdRng>,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
}

impl SimulationController {
    /// Start a network with the given parties.
    pub async fn new(
        parties: &[PartySpec],
        template: &PartyConfig,
        seed: Option<u64>,
    ) -> anyhow::Result<Self> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        info!("Initializing simulation with {} parties", parties.len());
        let network = SimulatedNetwork::start(parties, template).await?;

        Ok(Self {
            network,
            rng: RwLock::new(rng),
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
        })
    }

    /// Issue one obligation, recording the outcome.
    pub async fn issue(
        &self,
        from: &str,
        to: &str,
        value: i64,
    ) -> anyhow::Result<AccordResult<FinalizedTransaction>> {
        let node = self.network.node(from)?;

        let start = Instant::now();
        let result = node.issue(value, PartyName::new(to)).await;

        let mut metrics = self.metrics.write().await;
        match &result {
            Ok(finalized) => {
                metrics.record_success(start.elapsed().as_millis() as u64);
                info!(
                    tx_id = %finalized.id(),
                    sequence = finalized.sequence,
                    from,
                    to,
                    value,
                    "Issued"
                );
            }
            Err(e) => {
                metrics.record_failure(e.error_code());
                info!(error = %e, code = e.error_code(), from, to, value, "Issuance failed");
            }
        }

        Ok(result)
    }

    /// Run a scenario, failing on the first unmet expectation.
    pub async fn run_scenario(&self, scenario: &Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        for step in &scenario.steps {
            self.execute_step(step).await?;
        }

        Ok(())
    }

    /// Issue `count` random obligations between random pairs.
    pub async fn run_random(&self, count: usize, max_value: i64) -> anyhow::Result<()> {
        let names = self.network.names();
        if names.len() < 2 {
            anyhow::bail!("Random issuance needs at least two parties");
        }

        for _ in 0..count {
            let (from, to, value) = {
                let mut rng = self.rng.write().await;
                let from = rng.gen_range(0..names.len());
                let mut to = rng.gen_range(0..names.len());
                while to == from {
                    to = rng.gen_range(0..names.len());
                }
                (from, to, rng.gen_range(1..=max_value))
            };

            self.issue(names[from].as_str(), names[to].as_str(), value)
                .await?;
        }

        Ok(())
    }

    /// Execute a single scenario step.
    async fn execute_step(&self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Wait { millis } => {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
            }
            ScenarioStep::Issue {
                from,
                to,
                value,
                expect,
            } => {
                let result = self.issue(from, to, *value).await?;
                let actual = match &result {
                    Ok(_) => Expect::Finalized,
                    Err(e) => Expect::error(e.error_code()),
                };
                if &actual != expect {
                    anyhow::bail!(
                        "{} -> {} ({}): expected {:?}, got {:?}",
                        from,
                        to,
                        value,
                        expect,
                        actual
                    );
                }
            }
            ScenarioStep::InjectFault { fault } => {
                warn!("Injecting fault {:?}", fault);
                match fault {
                    Fault::PartyOffline { party } => self.network.node(party)?.stop(),
                    Fault::NotaryPaused => self.network.notary.pause().await,
                }
            }
            ScenarioStep::ClearFault { fault } => {
                info!("Clearing fault {:?}", fault);
                match fault {
                    Fault::PartyOffline { party } => self.network.node(party)?.start()?,
                    Fault::NotaryPaused => self.network.notary.start().await,
                }
            }
            ScenarioStep::AssertNet { party, net } => {
                let summary = self.network.node(party)?.vault().summary().await?;
                if summary.net() != *net {
                    anyhow::bail!(
                        "{}: expected net position {}, got {}",
                        party,
                        net,
                        summary.net()
                    );
                }
                info!(party = %party, net, records = summary.records, "Net position confirmed");
            }
        }

        Ok(())
    }

    /// Log every party's obligation summary.
    pub async fn report_positions(&self) -> anyhow::Result<()> {
        for node in self.network.nodes() {
            let summary = node.vault().summary().await?;
            info!(
                party = %summary.party,
                payable = summary.payable as i64,
                receivable = summary.receivable as i64,
                net = summary.net() as i64,
                records = summary.records,
                "Position"
            );
        }

        let notary = self.network.notary.metrics().snapshot();
        info!(
            notarized = notary.notarized,
            refused = notary.refused,
            sessions = self.network.transport.sessions_opened(),
            "Network totals"
        );

        Ok(())
    }

    /// Get simulation metrics.
    pub async fn metrics(&self) -> SimulationMetrics {
        self.metrics.read().await.clone()
    }

    /// Stop every party.
    pub fn stop(&self) {
        self.network.shutdown();
    }
}
