//! End-to-end issuance between party nodes over the in-memory transport.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use accord_common::{AccordError, FlowId, NotaryError, Party, PartyName, SignedTransaction};
use accord_crypto::SigningKey;
use accord_notary::{Notary, NotaryConfig};
use accord_party::{
    assembler, AcceptancePolicy, InitiatorState, MaxValuePolicy, PartyConfig, PartyNode,
};
use accord_protocol::{
    FlowType, InMemoryNetwork, Message, NetworkMap, NotaryService, SessionTransport,
};
use accord_vault::Checkpoint;

struct Network {
    transport: Arc<InMemoryNetwork>,
    map: Arc<NetworkMap>,
    notary: Arc<Notary>,
}

struct Node {
    node: Arc<PartyNode>,
    key: Arc<SigningKey>,
}

async fn network() -> Network {
    let notary = Arc::new(Notary::new(
        NotaryConfig::default(),
        Arc::new(SigningKey::generate()),
    ));
    notary.start().await;

    Network {
        transport: Arc::new(InMemoryNetwork::new()),
        map: Arc::new(NetworkMap::new(notary.identity().clone())),
        notary,
    }
}

fn node_with(
    net: &Network,
    config: PartyConfig,
    policy: Option<Arc<dyn AcceptancePolicy>>,
) -> Node {
    let key = Arc::new(SigningKey::generate());
    let mut builder = PartyNode::builder()
        .config(config)
        .signing_key(key.clone())
        .identity(net.map.clone())
        .transport(net.transport.clone())
        .notary(net.notary.clone());
    if let Some(policy) = policy {
        builder = builder.policy(policy);
    }

    let node = builder.build().unwrap();
    net.map
        .register(node.party().clone(), format!("memory://{}", node.name()));
    node.start().unwrap();

    Node {
        node: Arc::new(node),
        key,
    }
}

fn node(net: &Network, name: &str) -> Node {
    node_with(net, PartyConfig::named(name), None)
}

fn b_name() -> PartyName {
    PartyName::new("PARTY_B")
}

#[tokio::test]
async fn test_issue_records_in_both_vaults() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");

    let finalized = a.node.issue(10, "PARTY_B").await.unwrap();

    assert_eq!(finalized.sequence, 1);
    let record = finalized.record().unwrap();
    assert_eq!(record.value(), 10);
    assert_eq!(record.sender(), a.node.party());
    assert_eq!(record.recipient(), b.node.party());
    assert!(finalized.verify_notarization().is_ok());

    let id = finalized.id();
    assert_eq!(a.node.vault().lookup(&id).await.unwrap(), Some(finalized.clone()));
    assert_eq!(b.node.vault().lookup(&id).await.unwrap(), Some(finalized.clone()));
    assert_eq!(net.notary.lookup(&id), Some(finalized));

    let payable = a.node.vault().summary().await.unwrap();
    let receivable = b.node.vault().summary().await.unwrap();
    assert_eq!(payable.payable, 10);
    assert_eq!(receivable.receivable, 10);
    assert_eq!(receivable.net(), 10);

    assert!(a.node.checkpoints().pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_positive_value_never_leaves_the_node() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");

    for value in [0, -5] {
        let err = a.node.issue(value, "PARTY_B").await.unwrap_err();
        assert!(matches!(err, AccordError::Violation(_)));
        assert!(err
            .violations()
            .unwrap()
            .contains_message("value must be strictly positive"));
    }

    assert_eq!(net.transport.sessions_opened(), 0);
    assert_eq!(net.notary.finalized_count(), 0);
    assert_eq!(a.node.vault().summary().await.unwrap().records, 0);
    assert_eq!(b.node.vault().summary().await.unwrap().records, 0);
}

#[tokio::test]
async fn test_self_issuance_rejected_locally() {
    let net = network().await;
    let a = node(&net, "PARTY_A");

    let err = a.node.issue(10, "PARTY_A").await.unwrap_err();

    assert!(err
        .violations()
        .unwrap()
        .contains_message("sender and recipient cannot be the same entity"));
    assert_eq!(net.transport.sessions_opened(), 0);
}

#[tokio::test]
async fn test_unknown_recipient() {
    let net = network().await;
    let a = node(&net, "PARTY_A");

    let err = a.node.issue(10, "NOBODY").await.unwrap_err();

    assert_eq!(err.error_code(), "UNKNOWN_PARTY");
    assert_eq!(net.transport.sessions_opened(), 0);
}

#[tokio::test]
async fn test_recipient_policy_rejects() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node_with(
        &net,
        PartyConfig::named("PARTY_B"),
        Some(Arc::new(MaxValuePolicy::new(100))),
    );

    let err = a.node.issue(500, "PARTY_B").await.unwrap_err();

    match &err {
        AccordError::Rejected { party, violations } => {
            assert_eq!(party, &b_name());
            assert!(violations.contains_code("POLICY"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(net.notary.finalized_count(), 0);
    assert_eq!(a.node.vault().summary().await.unwrap().records, 0);
    assert_eq!(b.node.vault().summary().await.unwrap().records, 0);

    // Within the limit the same pair settles normally.
    assert!(a.node.issue(100, "PARTY_B").await.is_ok());
}

#[tokio::test]
async fn test_configured_limit_becomes_policy() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let mut config = PartyConfig::named("PARTY_B");
    config.max_accepted_value = Some(50);
    let _b = node_with(&net, config, None);

    let err = a.node.issue(51, "PARTY_B").await.unwrap_err();

    assert_eq!(err.error_code(), "REJECTED");
}

#[tokio::test]
async fn test_silent_counterparty_counts_as_rejection() {
    let net = network().await;
    let mut config = PartyConfig::named("PARTY_A");
    config.response_timeout = Duration::from_millis(200);
    let a = node_with(&net, config, None);

    let silent = Party::new("SILENT", SigningKey::generate().public_key());
    net.map.register(silent.clone(), "memory://silent");
    let _held = net
        .transport
        .register(&silent.name, FlowType::IssueObligation);

    let err = a.node.issue(10, "SILENT").await.unwrap_err();

    match err {
        AccordError::Rejected { party, violations } => {
            assert_eq!(party, silent.name);
            assert!(violations.contains_code("NO_RESPONSE"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(net.notary.finalized_count(), 0);
}

#[tokio::test]
async fn test_notary_unavailable() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");
    net.notary.pause().await;

    let err = a.node.issue(10, "PARTY_B").await.unwrap_err();

    assert!(matches!(
        err,
        AccordError::Notary(NotaryError::Unavailable(_))
    ));
    assert!(err.is_retryable());
    assert_eq!(a.node.vault().summary().await.unwrap().records, 0);
    assert_eq!(b.node.vault().summary().await.unwrap().records, 0);

    net.notary.start().await;
    assert!(a.node.issue(10, "PARTY_B").await.is_ok());
}

#[tokio::test]
async fn test_recipient_offline() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");
    b.node.stop();

    let err = a.node.issue(10, "PARTY_B").await.unwrap_err();

    assert_eq!(err.error_code(), "SESSION_ERROR");
    assert_eq!(net.notary.finalized_count(), 0);
}

#[tokio::test]
async fn test_concurrent_issuances_get_distinct_sequences() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");

    let mut handles = Vec::new();
    for value in 1..=10 {
        let initiator = a.node.clone();
        handles.push(tokio::spawn(async move {
            initiator.issue(value, "PARTY_B").await
        }));
    }

    let mut sequences = Vec::new();
    let mut ids = HashSet::new();
    for handle in handles {
        let finalized = handle.await.unwrap().unwrap();
        assert!(finalized.verify_notarization().is_ok());
        ids.insert(finalized.id());
        sequences.push(finalized.sequence);
    }
    sequences.sort_unstable();

    assert_eq!(ids.len(), 10);
    assert_eq!(sequences, (1..=10).collect::<Vec<u64>>());
    assert_eq!(net.notary.finalized_count(), 10);

    let records = b.node.vault().records_for(a.node.name()).await.unwrap();
    assert_eq!(records.len(), 10);
    assert_eq!(b.node.vault().summary().await.unwrap().receivable, 55);
}

#[tokio::test]
async fn test_progress_history() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let _b = node(&net, "PARTY_B");

    let initiator = a.node.initiator();
    let mut progress = initiator.progress();
    initiator.run(10, &b_name()).await.unwrap();

    assert_eq!(*progress.borrow_and_update(), InitiatorState::Done);
    assert_eq!(
        initiator.history(),
        vec![
            InitiatorState::Building,
            InitiatorState::LocalVerifying,
            InitiatorState::LocalSigning,
            InitiatorState::CollectingSignature,
            InitiatorState::Notarizing,
            InitiatorState::Done,
        ]
    );

    let failing = a.node.initiator();
    assert!(failing.run(-1, &b_name()).await.is_err());
    assert_eq!(
        failing.history(),
        vec![
            InitiatorState::Building,
            InitiatorState::LocalVerifying,
            InitiatorState::Failed,
        ]
    );
}

fn proposal(a: &Node, b: &Node, net: &Network, value: i64) -> SignedTransaction {
    let tx = assembler::build(value, a.node.party(), b.node.party(), net.notary.identity());
    let id = tx.id();
    SignedTransaction::new(tx).with_signature(a.key.sign(id.as_bytes()))
}

#[tokio::test]
async fn test_resume_after_collecting_signature() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");

    let signed = proposal(&a, &b, &net, 7);
    let id = signed.id();
    let checkpoint = Checkpoint::new(FlowId::new(), "COLLECTING_SIGNATURE", b_name(), signed);
    a.node.checkpoints().save(&checkpoint).await.unwrap();

    let outcomes = a.node.resume_pending().await.unwrap();

    assert_eq!(outcomes.len(), 1);
    let finalized = outcomes.into_iter().next().unwrap().unwrap();
    assert_eq!(finalized.id(), id);
    assert!(b.node.vault().lookup(&id).await.unwrap().is_some());
    assert!(a.node.checkpoints().pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_after_signatures_collected() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");

    let mut signed = proposal(&a, &b, &net, 7);
    let id = signed.id();
    signed = signed.with_signature(b.key.sign(id.as_bytes()));
    let checkpoint = Checkpoint::new(FlowId::new(), "NOTARIZING", b_name(), signed);
    a.node.checkpoints().save(&checkpoint).await.unwrap();

    let outcomes = a.node.resume_pending().await.unwrap();
    let finalized = outcomes.into_iter().next().unwrap().unwrap();

    assert_eq!(finalized.sequence, 1);
    assert_eq!(a.node.vault().lookup(&id).await.unwrap(), Some(finalized.clone()));
    assert_eq!(b.node.vault().lookup(&id).await.unwrap(), Some(finalized));
    assert_eq!(net.transport.sessions_opened(), 1);
}

#[tokio::test]
async fn test_checkpoint_from_local_state_is_discarded() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");

    let checkpoint = Checkpoint::new(
        FlowId::new(),
        "LOCAL_SIGNING",
        b_name(),
        proposal(&a, &b, &net, 7),
    );
    a.node.checkpoints().save(&checkpoint).await.unwrap();

    let outcomes = a.node.resume_pending().await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].as_ref().unwrap_err().error_code(), "STORAGE_ERROR");
    assert!(a.node.checkpoints().pending().await.unwrap().is_empty());
    assert_eq!(net.transport.sessions_opened(), 0);
}

#[tokio::test]
async fn test_acceptor_rejects_unsigned_proposal() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");

    let tx = assembler::build(10, a.node.party(), b.node.party(), net.notary.identity());
    let id = tx.id();
    let forged =
        SignedTransaction::new(tx).with_signature(SigningKey::generate().sign(id.as_bytes()));

    let mut session = net
        .transport
        .open(a.node.name(), b.node.name(), FlowType::IssueObligation)
        .await
        .unwrap();
    session.send(Message::Proposal(forged)).await.unwrap();

    match session.receive().await.unwrap() {
        Message::Rejection { violations } => {
            assert!(violations.contains_code("UNVERIFIED_SIGNATURE"));
            assert!(!violations.contains_code("PROPOSER_MISMATCH"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(b.node.vault().summary().await.unwrap().records, 0);
}

#[tokio::test]
async fn test_acceptor_rejects_proposal_from_someone_else() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");
    let mallory = node(&net, "MALLORY");

    let mut session = net
        .transport
        .open(mallory.node.name(), b.node.name(), FlowType::IssueObligation)
        .await
        .unwrap();
    session
        .send(Message::Proposal(proposal(&a, &b, &net, 10)))
        .await
        .unwrap();

    match session.receive().await.unwrap() {
        Message::Rejection { violations } => {
            assert_eq!(violations.len(), 1);
            assert!(violations.contains_code("PROPOSER_MISMATCH"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_acceptor_rejects_proposal_it_is_not_party_to() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");
    let c = node(&net, "PARTY_C");

    let mut session = net
        .transport
        .open(a.node.name(), c.node.name(), FlowType::IssueObligation)
        .await
        .unwrap();
    session
        .send(Message::Proposal(proposal(&a, &b, &net, 10)))
        .await
        .unwrap();

    match session.receive().await.unwrap() {
        Message::Rejection { violations } => {
            assert!(violations.contains_code("NOT_A_SIGNER"));
            // PARTY_B's signature is absent but it is not the reviewer's own.
            assert!(violations.contains_code("UNVERIFIED_SIGNATURE"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(c.node.vault().summary().await.unwrap().records, 0);
}

#[tokio::test]
async fn test_acceptor_rejects_record_naming_another_recipient() {
    let net = network().await;
    let a = node(&net, "PARTY_A");
    let b = node(&net, "PARTY_B");

    // B's key, but a name B never agreed to.
    let impostor = Party::new("SOMEONE_ELSE", b.node.party().key);
    let tx = assembler::build(10, a.node.party(), &impostor, net.notary.identity());
    let id = tx.id();
    let signed = SignedTransaction::new(tx).with_signature(a.key.sign(id.as_bytes()));

    let mut session = net
        .transport
        .open(a.node.name(), b.node.name(), FlowType::IssueObligation)
        .await
        .unwrap();
    session.send(Message::Proposal(signed)).await.unwrap();

    match session.receive().await.unwrap() {
        Message::Rejection { violations } => {
            assert_eq!(violations.len(), 1);
            assert!(violations.contains_code("RECIPIENT_MISMATCH"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(b.node.vault().summary().await.unwrap().records, 0);
    assert_eq!(net.notary.finalized_count(), 0);
}
