//! End-to-end tests for the dispatch pipeline
//!
//! These tests drive the whole stage against the in-process bus: product
//! settings arrive through the config K/V bucket, raw events through the
//! domain input stream, and assertions read the product output stream and
//! the consumer's cumulative ack floor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use gravity_bus::memory::MemoryBus;
use gravity_bus::{Bus, Headers, OutboundMessage};
use gravity_config::Config;
use gravity_dispatcher::Dispatcher;
use gravity_rules::{HandlerError, JsonMap, ScriptProgram, ScriptRuntime};
use gravity_schema::{ProductEvent, Value};

const DOMAIN_STREAM: &str = "GVT_default";
const PRODUCT: &str = "TestDataProduct";
const PRODUCT_STREAM: &str = "GVT_default_DP_TestDataProduct";
const CONSUMER: &str = "GVT_default_DP_TestDataProduct";

/// Script runtime appending an "X" to the name field
struct AppendX;

impl ScriptRuntime for AppendX {
    fn compile(&self, _script: &str) -> Result<Box<dyn ScriptProgram>, HandlerError> {
        struct Program;
        impl ScriptProgram for Program {
            fn run(
                &self,
                _env: Option<&JsonMap>,
                source: &JsonMap,
            ) -> Result<Vec<JsonMap>, HandlerError> {
                let mut out = JsonMap::new();
                out.insert("id".into(), source["id"].clone());
                let name = source["name"].as_str().unwrap_or_default();
                out.insert("name".into(), serde_json::json!(format!("{name}X")));
                Ok(vec![out])
            }
        }
        Ok(Box::new(Program))
    }
}

fn setting_json(enabled: bool, handler: Option<serde_json::Value>) -> Vec<u8> {
    let mut rule = serde_json::json!({
        "event": "dataCreated",
        "product": PRODUCT,
        "primaryKey": ["id"],
        "schema": {
            "id": { "type": "int" },
            "name": { "type": "string" },
        },
    });
    if let Some(handler) = handler {
        rule["handler"] = handler;
    }

    serde_json::to_vec(&serde_json::json!({
        "name": PRODUCT,
        "desc": "end-to-end test product",
        "enabled": enabled,
        "rules": { "testRule": rule },
    }))
    .unwrap()
}

fn event_envelope(event: &str, payload: serde_json::Value) -> OutboundMessage {
    let body = serde_json::json!({
        "event": event,
        "payload": payload.to_string(),
    });
    OutboundMessage::new(
        format!("$GVT.default.EVENT.{event}"),
        Bytes::from(serde_json::to_vec(&body).unwrap()),
        Headers::new(),
    )
}

async fn start_dispatcher(
    bus: &MemoryBus,
    script_runtime: Option<Arc<dyn ScriptRuntime>>,
) -> Dispatcher {
    let config = Config::default();
    let dispatcher = Dispatcher::new(
        &config,
        Arc::new(bus.clone()),
        Arc::new(bus.clone()),
        script_runtime,
    );
    dispatcher.init().await.unwrap();
    dispatcher
}

/// Install the product setting and wait until the product consumes
async fn install_product(bus: &MemoryBus, setting: Vec<u8>) {
    let kv = bus
        .key_value("GRAVITY_default_PRODUCT", "config store")
        .await
        .unwrap();
    kv.put(PRODUCT, setting).await.unwrap();

    wait_until(
        || bus.stream_exists(DOMAIN_STREAM) && bus.stream_exists(PRODUCT_STREAM),
        Duration::from_secs(5),
    )
    .await;
}

async fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn content_field<'a>(pe: &'a ProductEvent, name: &str) -> &'a Value {
    let Value::Map(fields) = &pe.content else {
        panic!("expected map content");
    };
    &fields.iter().find(|f| f.name == name).unwrap().value
}

// =============================================================================
// Scenario: pass-through rule
// =============================================================================

#[tokio::test]
async fn test_single_event_pass_through() {
    let bus = MemoryBus::new();
    let dispatcher = start_dispatcher(&bus, None).await;
    install_product(&bus, setting_json(true, None)).await;

    bus.publish(
        event_envelope("dataCreated", serde_json::json!({"id": 101, "name": "fred"})),
        "",
    )
    .await
    .unwrap();

    wait_until(
        || !bus.stream_messages(PRODUCT_STREAM).is_empty(),
        Duration::from_secs(5),
    )
    .await;

    let outputs = bus.stream_messages(PRODUCT_STREAM);
    assert_eq!(outputs.len(), 1);

    let pe = ProductEvent::from_bytes(&outputs[0].payload).unwrap();
    assert_eq!(pe.event_name, "dataCreated");
    assert_eq!(pe.table, PRODUCT);
    assert_eq!(content_field(&pe, "id"), &Value::Int64(101));
    assert_eq!(content_field(&pe, "name"), &Value::String("fred".into()));

    // Subject: $GVT.default.DP.<table>.<partition>.EVENT.<event>
    let subject = &outputs[0].subject;
    assert!(subject.starts_with("$GVT.default.DP.TestDataProduct."));
    assert!(subject.ends_with(".EVENT.dataCreated"));
    let partition: i32 = subject.split('.').nth(4).unwrap().parse().unwrap();
    assert!((0..256).contains(&partition));

    // Input was cumulatively acked
    wait_until(
        || bus.consumer_ack_floor(DOMAIN_STREAM, CONSUMER) == Some(1),
        Duration::from_secs(5),
    )
    .await;

    dispatcher.shutdown().await;
}

// =============================================================================
// Scenario: script transform
// =============================================================================

#[tokio::test]
async fn test_script_transform() {
    let bus = MemoryBus::new();
    let dispatcher = start_dispatcher(&bus, Some(Arc::new(AppendX))).await;
    install_product(
        &bus,
        setting_json(
            true,
            Some(serde_json::json!({
                "type": "script",
                "script": "return { id: source.id, name: source.name + 'X' }",
            })),
        ),
    )
    .await;

    bus.publish(
        event_envelope("dataCreated", serde_json::json!({"id": 101, "name": "fred"})),
        "",
    )
    .await
    .unwrap();

    wait_until(
        || !bus.stream_messages(PRODUCT_STREAM).is_empty(),
        Duration::from_secs(5),
    )
    .await;

    let outputs = bus.stream_messages(PRODUCT_STREAM);
    let pe = ProductEvent::from_bytes(&outputs[0].payload).unwrap();
    assert_eq!(content_field(&pe, "id"), &Value::Int64(101));
    assert_eq!(content_field(&pe, "name"), &Value::String("fredX".into()));

    dispatcher.shutdown().await;
}

// =============================================================================
// Scenario: unknown event
// =============================================================================

#[tokio::test]
async fn test_unknown_event_acked_without_output() {
    let bus = MemoryBus::new();
    let dispatcher = start_dispatcher(&bus, None).await;
    install_product(&bus, setting_json(true, None)).await;

    bus.publish(
        event_envelope("unknown", serde_json::json!({"id": 1})),
        "",
    )
    .await
    .unwrap();

    // The message is acked (it reached the consumer and was ignored)...
    wait_until(
        || bus.consumer_ack_floor(DOMAIN_STREAM, CONSUMER) == Some(1),
        Duration::from_secs(5),
    )
    .await;

    // ...but nothing was published
    assert!(bus.stream_messages(PRODUCT_STREAM).is_empty());

    dispatcher.shutdown().await;
}

// =============================================================================
// Scenario: sequential stress, order preserved end to end
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequential_inputs_stay_ordered() {
    let bus = MemoryBus::new();
    let dispatcher = start_dispatcher(&bus, None).await;
    install_product(&bus, setting_json(true, None)).await;

    let count = 100_000i64;
    for i in 1..=count {
        bus.publish(
            event_envelope("dataCreated", serde_json::json!({"id": i, "name": "test"})),
            "",
        )
        .await
        .unwrap();
    }

    wait_until(
        || bus.stream_len(PRODUCT_STREAM) == count as usize,
        Duration::from_secs(300),
    )
    .await;

    let outputs = bus.stream_messages(PRODUCT_STREAM);
    assert_eq!(outputs.len(), count as usize);
    for (index, output) in outputs.iter().enumerate() {
        let pe = ProductEvent::from_bytes(&output.payload).unwrap();
        assert_eq!(
            content_field(&pe, "id"),
            &Value::Int64(index as i64 + 1),
            "output {index} out of order"
        );
    }

    // The whole input range is covered by cumulative ack
    wait_until(
        || bus.consumer_ack_floor(DOMAIN_STREAM, CONSUMER) == Some(count as u64),
        Duration::from_secs(60),
    )
    .await;

    dispatcher.shutdown().await;
}

// =============================================================================
// Scenario: deactivation during publish retry
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deactivation_aborts_retry_without_ack() {
    let bus = MemoryBus::new();
    let dispatcher = start_dispatcher(&bus, None).await;
    install_product(&bus, setting_json(true, None)).await;

    // Every publish fails from here on; the batch enters its retry loop
    bus.set_publish_failures(true);

    bus.publish(
        event_envelope("dataCreated", serde_json::json!({"id": 7, "name": "stuck"})),
        "",
    )
    .await
    .unwrap();

    // Give the pipeline time to pick the message up and start retrying
    tokio::time::sleep(Duration::from_millis(500)).await;

    let product = dispatcher
        .product_manager()
        .get_product(PRODUCT)
        .expect("product exists");
    product.deactivate().await.unwrap();

    // Wait out at least one retry interval: no ack, no output
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(bus.consumer_ack_floor(DOMAIN_STREAM, CONSUMER), Some(0));
    assert!(bus.stream_messages(PRODUCT_STREAM).is_empty());

    // Publisher recovers; reactivation resubscribes and the bus redelivers
    bus.set_publish_failures(false);
    product.activate().await.unwrap();

    wait_until(
        || !bus.stream_messages(PRODUCT_STREAM).is_empty(),
        Duration::from_secs(10),
    )
    .await;

    let outputs = bus.stream_messages(PRODUCT_STREAM);
    let pe = ProductEvent::from_bytes(&outputs[0].payload).unwrap();
    assert_eq!(content_field(&pe, "id"), &Value::Int64(7));

    wait_until(
        || bus.consumer_ack_floor(DOMAIN_STREAM, CONSUMER) == Some(1),
        Duration::from_secs(5),
    )
    .await;

    dispatcher.shutdown().await;
}

// =============================================================================
// Scenario: product deletion
// =============================================================================

#[tokio::test]
async fn test_delete_product_removes_output_stream() {
    let bus = MemoryBus::new();
    let dispatcher = start_dispatcher(&bus, None).await;
    install_product(&bus, setting_json(true, None)).await;

    let kv = bus
        .key_value("GRAVITY_default_PRODUCT", "config store")
        .await
        .unwrap();
    kv.delete(PRODUCT).await.unwrap();

    wait_until(
        || dispatcher.product_manager().get_product(PRODUCT).is_none(),
        Duration::from_secs(5),
    )
    .await;
    wait_until(
        || !bus.stream_exists(PRODUCT_STREAM),
        Duration::from_secs(5),
    )
    .await;

    dispatcher.shutdown().await;
}

// =============================================================================
// Scenario: dedup window drops republished IDs
// =============================================================================

#[tokio::test]
async fn test_duplicate_input_publishes_once() {
    let bus = MemoryBus::new();
    let dispatcher = start_dispatcher(&bus, None).await;
    install_product(&bus, setting_json(true, None)).await;

    // Same message ID twice within the input stream's dedup window: the
    // second publish is dropped by the bus, so the pipeline sees one event
    let envelope = event_envelope("dataCreated", serde_json::json!({"id": 1, "name": "a"}));
    bus.publish(envelope.clone(), "same-id").await.unwrap();
    bus.publish(envelope, "same-id").await.unwrap();

    wait_until(
        || !bus.stream_messages(PRODUCT_STREAM).is_empty(),
        Duration::from_secs(5),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(bus.stream_messages(PRODUCT_STREAM).len(), 1);

    dispatcher.shutdown().await;
}
