use broker_bridge::broker::{BrokerCall, InMemoryBroker};
use broker_bridge::config::{BridgeConfig, BrokerEndpoint, DEFAULT_PRODUCER_CLIENT_ID};
use broker_bridge::{PublishError, Publisher, PublisherOptions};

fn list_topics_calls(broker: &InMemoryBroker) -> Vec<(String, String)> {
    broker
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            BrokerCall::ListTopics { hosts, client_id } => Some((hosts, client_id)),
            _ => None,
        })
        .collect()
}

#[test]
fn argument_hosts_take_precedence_over_config() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let publisher = Publisher::new(
        broker.clone(),
        PublisherOptions::new().with_hosts("configured:9092"),
    );

    publisher.publish("orders", "x", Some("override:9092")).unwrap();
    publisher.publish("orders", "x", None).unwrap();

    let hosts: Vec<String> = list_topics_calls(&broker).into_iter().map(|(h, _)| h).collect();
    assert_eq!(hosts, vec!["override:9092", "configured:9092"]);
}

#[test]
fn no_hosts_anywhere_is_a_configuration_error() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let publisher = Publisher::new(broker.clone(), PublisherOptions::new());

    let err = publisher.publish("orders", "x", None).unwrap_err();
    assert!(matches!(err, PublishError::Configuration(_)));
    assert_eq!(err.status_code(), 400);

    // Blank argument counts as absent
    let err = publisher.publish("orders", "x", Some(" , ")).unwrap_err();
    assert!(matches!(err, PublishError::Configuration(_)));

    assert!(broker.calls().is_empty());
}

#[test]
fn identical_hosts_resolve_identically() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);
    let publisher = Publisher::new(broker.clone(), PublisherOptions::new());
    let hosts = Some("b:9092, a:9092");

    let first = publisher.resolve_endpoint(hosts).unwrap();
    publisher.publish("orders", "x", hosts).unwrap();
    let second = publisher.resolve_endpoint(hosts).unwrap();
    publisher.publish("orders", "y", hosts).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, BrokerEndpoint::parse("b:9092,a:9092").unwrap());

    let calls = list_topics_calls(&broker);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], calls[1]);
}

#[test]
fn client_id_comes_from_config_or_default() {
    let broker = InMemoryBroker::new().with_topic("orders", 1);

    Publisher::new(broker.clone(), PublisherOptions::new().with_hosts("a:9092"))
        .publish("orders", "x", None)
        .unwrap();

    let config = BridgeConfig::from_yaml_str("hosts: [\"a:9092\"]\nclient_id: billing").unwrap();
    Publisher::new(broker.clone(), PublisherOptions::from_config(&config))
        .publish("orders", "x", None)
        .unwrap();

    let ids: Vec<String> = list_topics_calls(&broker).into_iter().map(|(_, id)| id).collect();
    assert_eq!(ids, vec![DEFAULT_PRODUCER_CLIENT_ID.to_string(), "billing".to_string()]);
}
