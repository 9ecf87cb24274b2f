//! Named simulation scenarios.

use serde::{Deserialize, Serialize};

/// A party taking part in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartySpec {
    pub name: String,
    /// Largest value this party accepts as recipient.
    pub max_accepted_value: Option<i64>,
}

impl PartySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_accepted_value: None,
        }
    }

    pub fn with_limit(name: impl Into<String>, max: i64) -> Self {
        Self {
            name: name.into(),
            max_accepted_value: Some(max),
        }
    }
}

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Parties started before the first step.
    pub parties: Vec<PartySpec>,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Wait for a duration.
    Wait { millis: u64 },
    /// Issue an obligation and check the outcome.
    Issue {
        from: String,
        to: String,
        value: i64,
        expect: Expect,
    },
    /// Inject a fault.
    InjectFault { fault: Fault },
    /// Clear a fault.
    ClearFault { fault: Fault },
    /// Assert a party's net position (receivable minus payable).
    AssertNet { party: String, net: i128 },
}

/// Expected outcome of an issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expect {
    Finalized,
    /// Failure with the given error code.
    Error { code: String },
}

impl Expect {
    pub fn error(code: &str) -> Self {
        Expect::Error {
            code: code.to_string(),
        }
    }
}

/// Faults that can be injected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Fault {
    /// Party stops accepting sessions.
    PartyOffline { party: String },
    /// Notary refuses requests.
    NotaryPaused,
}

impl Scenario {
    /// Names accepted by [`Scenario::load`].
    pub const NAMES: [&'static str; 6] = [
        "simple-issuance",
        "invalid-value",
        "policy-rejection",
        "self-issuance",
        "failure-recovery",
        "round-robin",
    ];

    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "simple-issuance" => Ok(Self::simple_issuance()),
            "invalid-value" => Ok(Self::invalid_value()),
            "policy-rejection" => Ok(Self::policy_rejection()),
            "self-issuance" => Ok(Self::self_issuance()),
            "failure-recovery" => Ok(Self::failure_recovery()),
            "round-robin" => Ok(Self::round_robin()),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    fn two_parties() -> Vec<PartySpec> {
        vec![PartySpec::new("PARTY_A"), PartySpec::new("PARTY_B")]
    }

    fn issue(from: &str, to: &str, value: i64, expect: Expect) -> ScenarioStep {
        ScenarioStep::Issue {
            from: from.to_string(),
            to: to.to_string(),
            value,
            expect,
        }
    }

    fn simple_issuance() -> Self {
        Self {
            name: "simple-issuance".to_string(),
            description: "PARTY_A issues 10 to PARTY_B".to_string(),
            parties: Self::two_parties(),
            steps: vec![
                Self::issue("PARTY_A", "PARTY_B", 10, Expect::Finalized),
                ScenarioStep::AssertNet {
                    party: "PARTY_A".to_string(),
                    net: -10,
                },
                ScenarioStep::AssertNet {
                    party: "PARTY_B".to_string(),
                    net: 10,
                },
            ],
        }
    }

    fn invalid_value() -> Self {
        Self {
            name: "invalid-value".to_string(),
            description: "Zero and negative values fail before any message is sent".to_string(),
            parties: Self::two_parties(),
            steps: vec![
                Self::issue("PARTY_A", "PARTY_B", 0, Expect::error("CONTRACT_VIOLATION")),
                Self::issue("PARTY_A", "PARTY_B", -5, Expect::error("CONTRACT_VIOLATION")),
                ScenarioStep::AssertNet {
                    party: "PARTY_B".to_string(),
                    net: 0,
                },
            ],
        }
    }

    fn policy_rejection() -> Self {
        Self {
            name: "policy-rejection".to_string(),
            description: "PARTY_B refuses obligations above 100".to_string(),
            parties: vec![
                PartySpec::new("PARTY_A"),
                PartySpec::with_limit("PARTY_B", 100),
            ],
            steps: vec![
                Self::issue("PARTY_A", "PARTY_B", 500, Expect::error("REJECTED")),
                Self::issue("PARTY_A", "PARTY_B", 100, Expect::Finalized),
                ScenarioStep::AssertNet {
                    party: "PARTY_B".to_string(),
                    net: 100,
                },
            ],
        }
    }

    fn self_issuance() -> Self {
        Self {
            name: "self-issuance".to_string(),
            description: "A party cannot owe itself".to_string(),
            parties: Self::two_parties(),
            steps: vec![Self::issue(
                "PARTY_A",
                "PARTY_A",
                10,
                Expect::error("CONTRACT_VIOLATION"),
            )],
        }
    }

    fn failure_recovery() -> Self {
        Self {
            name: "failure-recovery".to_string(),
            description: "Issuance fails while the recipient or notary is down, then succeeds"
                .to_string(),
            parties: Self::two_parties(),
            steps: vec![
                ScenarioStep::InjectFault {
                    fault: Fault::PartyOffline {
                        party: "PARTY_B".to_string(),
                    },
                },
                Self::issue("PARTY_A", "PARTY_B", 10, Expect::error("SESSION_ERROR")),
                ScenarioStep::ClearFault {
                    fault: Fault::PartyOffline {
                        party: "PARTY_B".to_string(),
                    },
                },
                ScenarioStep::InjectFault {
                    fault: Fault::NotaryPaused,
                },
                Self::issue("PARTY_A", "PARTY_B", 10, Expect::error("NOTARY_ERROR")),
                ScenarioStep::ClearFault {
                    fault: Fault::NotaryPaused,
                },
                ScenarioStep::Wait { millis: 50 },
                Self::issue("PARTY_A", "PARTY_B", 10, Expect::Finalized),
                ScenarioStep::AssertNet {
                    party: "PARTY_B".to_string(),
                    net: 10,
                },
            ],
        }
    }

    fn round_robin() -> Self {
        Self {
            name: "round-robin".to_string(),
            description: "Three parties issue to each other in a cycle".to_string(),
            parties: vec![
                PartySpec::new("PARTY_A"),
                PartySpec::new("PARTY_B"),
                PartySpec::new("PARTY_C"),
            ],
            steps: vec![
                Self::issue("PARTY_A", "PARTY_B", 30, Expect::Finalized),
                Self::issue("PARTY_B", "PARTY_C", 20, Expect::Finalized),
                Self::issue("PARTY_C", "PARTY_A", 10, Expect::Finalized),
                ScenarioStep::AssertNet {
                    party: "PARTY_A".to_string(),
                    net: -20,
                },
                ScenarioStep::AssertNet {
                    party: "PARTY_B".to_string(),
                    net: 10,
                },
                ScenarioStep::AssertNet {
                    party: "PARTY_C".to_string(),
                    net: 10,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_loads() {
        for name in Scenario::NAMES {
            let scenario = Scenario::load(name).unwrap();
            assert_eq!(scenario.name, name);
            assert!(!scenario.steps.is_empty());
        }
        assert!(Scenario::load("missing").is_err());
    }

    #[test]
    fn test_scenarios_serialize() {
        let scenario = Scenario::load("policy-rejection").unwrap();
        let json = serde_json::to_value(&scenario).unwrap();

        assert_eq!(json["parties"][1]["max_accepted_value"], 100);
    }
}
