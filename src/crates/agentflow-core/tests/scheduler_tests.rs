//! Integration tests for the superstep scheduler.
//!
//! These exercise complete workflows end to end: routing, superstep
//! ordering, transactional state, faults, cancellation, external requests,
//! and checkpoint resume.

use agentflow_checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use agentflow_core::{
    ActionExecutor, Edge, Envelope, ExecutorId, ExternalResponse, JoinBatch, JoinPolicy,
    MessageTypeRegistry, RunStatus, SwitchCase, WorkflowBuilder, WorkflowEvent, WorkflowRunner,
};
use std::sync::Arc;

fn output_values(events: &[WorkflowEvent]) -> Vec<serde_json::Value> {
    events
        .iter()
        .filter_map(|event| match event {
            WorkflowEvent::WorkflowOutput { value } => Some(value.clone()),
            _ => None,
        })
        .collect()
}

fn completions(events: &[WorkflowEvent]) -> Vec<(String, Option<serde_json::Value>)> {
    events
        .iter()
        .filter_map(|event| match event {
            WorkflowEvent::ExecutorCompleted { executor_id, data } => {
                Some((executor_id.to_string(), data.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Spam classifier pipeline: `detect` scores the text, a switch routes spam
/// to `remove` and everything else to `respond`.
fn spam_workflow() -> agentflow_core::Workflow {
    let keywords = ["spam", "advertisement", "offer"];
    let detect = ActionExecutor::handling::<String, _>("detect", move |text, ctx| {
        let is_spam = keywords
            .iter()
            .any(|keyword| text.to_lowercase().contains(keyword));
        Box::pin(async move { ctx.send_message(&is_spam) })
    });
    let remove = ActionExecutor::handling::<bool, _>("remove", |_flag, ctx| {
        Box::pin(async move { ctx.yield_output(&"Spam message removed.".to_string()) })
    });
    let respond = ActionExecutor::handling::<bool, _>("respond", |_flag, ctx| {
        Box::pin(async move { ctx.yield_output(&"Message delivered.".to_string()) })
    });

    WorkflowBuilder::new("spam-classifier")
        .start_with("detect")
        .add_action(detect)
        .add_action(remove)
        .add_action(respond)
        .add_edge(
            "detect",
            Edge::switch(
                vec![SwitchCase::on_payload::<bool, _>(|is_spam| *is_spam, "remove")],
                Some(ExecutorId::from("respond")),
            ),
        )
        .mark_output_producer("remove")
        .mark_output_producer("respond")
        .build()
        .unwrap()
}

#[tokio::test]
async fn spam_pipeline_routes_spam_to_removal() {
    let run = WorkflowRunner::new()
        .run_streaming(spam_workflow(), &"This is a spam message.".to_string())
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Completed);
    assert_eq!(
        completions(&events),
        vec![
            ("detect".to_string(), Some(serde_json::json!(true))),
            (
                "remove".to_string(),
                Some(serde_json::json!("Spam message removed."))
            ),
        ]
    );
    assert_eq!(
        output_values(&events),
        vec![serde_json::json!("Spam message removed.")]
    );
}

#[tokio::test]
async fn spam_pipeline_routes_ham_to_default() {
    let run = WorkflowRunner::new()
        .run_streaming(spam_workflow(), &"Lunch at noon?".to_string())
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Completed);
    assert_eq!(
        output_values(&events),
        vec![serde_json::json!("Message delivered.")]
    );
}

fn transform_workflow() -> agentflow_core::Workflow {
    let upper = ActionExecutor::handling::<String, _>("upper", |text, ctx| {
        Box::pin(async move { ctx.send_message(&text.to_uppercase()) })
    });
    let reverse = ActionExecutor::handling::<String, _>("reverse", |text, ctx| {
        Box::pin(async move {
            let reversed: String = text.chars().rev().collect();
            ctx.yield_output(&reversed)?;
            ctx.send_message(&reversed)
        })
    });

    WorkflowBuilder::new("transform")
        .start_with("upper")
        .add_action(upper)
        .add_action(reverse)
        .direct("upper", "reverse")
        .mark_output_producer("reverse")
        .build()
        .unwrap()
}

#[tokio::test]
async fn sequential_transform_orders_events() {
    let run = WorkflowRunner::new()
        .run_streaming(transform_workflow(), &"Hello, World!".to_string())
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Completed);
    let completed = completions(&events);
    assert_eq!(completed[0].0, "upper");
    assert_eq!(completed[0].1, Some(serde_json::json!("HELLO, WORLD!")));
    assert_eq!(completed[1].0, "reverse");
    assert_eq!(output_values(&events), vec![serde_json::json!("!DLROW ,OLLEH")]);
}

#[tokio::test]
async fn identical_runs_produce_identical_output_sequences() {
    let mut sequences = Vec::new();
    for _ in 0..2 {
        let run = WorkflowRunner::new()
            .run_streaming(transform_workflow(), &"Determinism".to_string())
            .unwrap();
        let (events, _) = run.drain().await;
        sequences.push(output_values(&events));
    }
    assert_eq!(sequences[0], sequences[1]);
}

#[tokio::test]
async fn state_written_in_a_superstep_is_not_visible_within_it() {
    // `fork` delivers two messages to `count` in the same superstep. Both
    // invocations must read the committed value (0) and write 1; intra-step
    // visibility would make the second write 2.
    let fork = ActionExecutor::handling::<String, _>("fork", |text, ctx| {
        Box::pin(async move {
            ctx.send_message(&text)?;
            ctx.send_message(&text)
        })
    });
    let count = ActionExecutor::handling::<String, _>("count", |_text, ctx| {
        Box::pin(async move {
            let seen: i64 = ctx.read_state("seen", None)?.unwrap_or(0);
            ctx.queue_state_update("seen", &(seen + 1), None)?;
            ctx.send_message(&(seen + 1))
        })
    });
    let sink = ActionExecutor::handling::<i64, _>("sink", |value, ctx| {
        Box::pin(async move { ctx.yield_output(&value) })
    });

    let workflow = WorkflowBuilder::new("isolation")
        .start_with("fork")
        .add_action(fork)
        .add_action(count)
        .add_action(sink)
        .direct("fork", "count")
        .direct("count", "sink")
        .mark_output_producer("sink")
        .build()
        .unwrap();

    let run = WorkflowRunner::new()
        .run_streaming(workflow, &"go".to_string())
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Completed);
    assert_eq!(
        output_values(&events),
        vec![serde_json::json!(1), serde_json::json!(1)]
    );
}

#[tokio::test]
async fn fan_out_fan_in_releases_one_batch_in_source_order() {
    let start = ActionExecutor::handling::<String, _>("start", |text, ctx| {
        Box::pin(async move { ctx.send_message(&text) })
    });
    let worker = |name: &'static str| {
        ActionExecutor::handling::<String, _>(name, move |text, ctx| {
            Box::pin(async move { ctx.send_message(&format!("{name}:{text}")) })
        })
    };
    let aggregate = ActionExecutor::handling::<JoinBatch, _>("aggregate", |batch, ctx| {
        Box::pin(async move {
            let parts = batch.payloads::<String>()?;
            ctx.yield_output(&parts)
        })
    });

    let participants: Vec<ExecutorId> = ["a", "b", "c"].iter().map(|&n| n.into()).collect();
    let workflow = WorkflowBuilder::new("scatter-gather")
        .start_with("start")
        .add_action(start)
        .add_action(worker("a"))
        .add_action(worker("b"))
        .add_action(worker("c"))
        .add_action(aggregate)
        .add_edge("start", Edge::fan_out(participants.clone()))
        .fan_in(participants, "aggregate", JoinPolicy::AllSources)
        .mark_output_producer("aggregate")
        .build()
        .unwrap();

    let run = WorkflowRunner::new()
        .run_streaming(workflow, &"x".to_string())
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Completed);
    assert_eq!(
        output_values(&events),
        vec![serde_json::json!(["a:x", "b:x", "c:x"])]
    );
}

#[tokio::test]
async fn handler_fault_fails_the_run_but_peers_still_execute() {
    let start = ActionExecutor::handling::<String, _>("start", |text, ctx| {
        Box::pin(async move { ctx.send_message(&text) })
    });
    let faulty = ActionExecutor::handling::<String, _>("faulty", |_text, ctx| {
        let id = ctx.executor_id().to_string();
        Box::pin(async move { Err(agentflow_core::WorkflowError::handler(id, "boom")) })
    });
    let steady = ActionExecutor::handling::<String, _>("steady", |text, ctx| {
        Box::pin(async move { ctx.send_message(&text) })
    });
    let sink = ActionExecutor::handling::<String, _>("sink", |text, ctx| {
        Box::pin(async move { ctx.yield_output(&text) })
    });

    let workflow = WorkflowBuilder::new("faulting")
        .start_with("start")
        .add_action(start)
        .add_action(faulty)
        .add_action(steady)
        .add_action(sink)
        .add_edge("start", Edge::fan_out(vec!["faulty".into(), "steady".into()]))
        .direct("steady", "sink")
        .mark_output_producer("sink")
        .build()
        .unwrap();

    let run = WorkflowRunner::new()
        .run_streaming(workflow, &"x".to_string())
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Failed);

    let failed_at = events
        .iter()
        .position(|e| matches!(e, WorkflowEvent::ExecutorFailed { executor_id, .. } if executor_id.as_str() == "faulty"))
        .expect("executor failure event");
    let steady_at = events
        .iter()
        .position(|e| matches!(e, WorkflowEvent::ExecutorCompleted { executor_id, .. } if executor_id.as_str() == "steady"))
        .expect("steady peer still ran");
    let workflow_failed_at = events
        .iter()
        .position(|e| matches!(e, WorkflowEvent::WorkflowFailed { .. }))
        .expect("workflow failure event");

    assert!(failed_at < workflow_failed_at);
    assert!(steady_at < workflow_failed_at);
}

#[tokio::test]
async fn halt_request_ends_the_run_after_the_current_superstep() {
    let first = ActionExecutor::handling::<String, _>("first", |text, ctx| {
        Box::pin(async move {
            ctx.send_message(&text)?;
            ctx.request_halt();
            Ok(())
        })
    });
    let never = ActionExecutor::handling::<String, _>("never", |_text, ctx| {
        Box::pin(async move { ctx.yield_output(&"unreachable".to_string()) })
    });

    let workflow = WorkflowBuilder::new("halting")
        .start_with("first")
        .add_action(first)
        .add_action(never)
        .direct("first", "never")
        .mark_output_producer("never")
        .build()
        .unwrap();

    let run = WorkflowRunner::new()
        .run_streaming(workflow, &"x".to_string())
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Halted);
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::RequestHalt { .. })));
    assert!(output_values(&events).is_empty());
    assert!(!events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::ExecutorInvoked { executor_id } if executor_id.as_str() == "never")));
}

#[tokio::test]
async fn directed_send_with_undeclared_type_is_a_routing_failure() {
    let start = ActionExecutor::handling::<String, _>("start", |text, ctx| {
        Box::pin(async move { ctx.send_message_to(&text, ExecutorId::from("ints")) })
    });
    let ints = ActionExecutor::handling::<i64, _>("ints", |value, ctx| {
        Box::pin(async move { ctx.yield_output(&value) })
    });

    let workflow = WorkflowBuilder::new("mismatch")
        .start_with("start")
        .add_action(start)
        .add_action(ints)
        .mark_output_producer("ints")
        .build()
        .unwrap();

    let run = WorkflowRunner::new()
        .run_streaming(workflow, &"x".to_string())
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Failed);
    assert!(events.iter().any(|e| matches!(
        e,
        WorkflowEvent::WorkflowFailed { error } if error.contains("directed payload")
    )));
}

#[tokio::test]
async fn unrouted_messages_are_dropped_with_an_event() {
    let lonely = ActionExecutor::handling::<String, _>("lonely", |text, ctx| {
        Box::pin(async move { ctx.send_message(&text) })
    });

    let workflow = WorkflowBuilder::new("unrouted")
        .start_with("lonely")
        .add_action(lonely)
        .build()
        .unwrap();

    let run = WorkflowRunner::new()
        .run_streaming(workflow, &"x".to_string())
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Idle);
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::UnroutedMessage { source } if source.as_str() == "lonely")));
}

#[tokio::test]
async fn cancellation_between_supersteps_stops_a_ping_pong() {
    let ping = ActionExecutor::handling::<String, _>("ping", |text, ctx| {
        Box::pin(async move { ctx.send_message(&text) })
    });
    let pong = ActionExecutor::handling::<String, _>("pong", |text, ctx| {
        Box::pin(async move { ctx.send_message(&text) })
    });

    let workflow = WorkflowBuilder::new("ping-pong")
        .start_with("ping")
        .add_action(ping)
        .add_action(pong)
        .direct("ping", "pong")
        .direct("pong", "ping")
        .build()
        .unwrap();

    let mut run = WorkflowRunner::new()
        .run_streaming(workflow, &"ball".to_string())
        .unwrap();
    let handle = run.handle();

    // Let a few supersteps happen before cancelling.
    let mut seen = 0;
    while seen < 6 {
        if matches!(
            run.next_event().await,
            Some(WorkflowEvent::SuperstepCompleted { .. })
        ) {
            seen += 1;
        }
    }
    handle.cancel();

    assert_eq!(handle.join().await, RunStatus::Cancelled);
}

#[tokio::test]
async fn external_requests_park_the_run_until_answered() {
    let ask = ActionExecutor::new(
        "ask",
        Arc::new(|envelope: Envelope, ctx: agentflow_core::WorkflowContext| {
            Box::pin(async move {
                if envelope.is::<String>() {
                    let question = envelope.payload_as::<String>()?;
                    ctx.post_external_request(serde_json::json!({ "question": question }));
                    Ok(())
                } else {
                    let response = envelope.payload_as::<ExternalResponse>()?;
                    ctx.yield_output(&response.payload)
                }
            }) as agentflow_core::BoxHandlerFuture
        }),
    )
    .accepts::<String>()
    .accepts::<ExternalResponse>();

    let workflow = WorkflowBuilder::new("human-in-the-loop")
        .start_with("ask")
        .add_action(ask)
        .mark_output_producer("ask")
        .build()
        .unwrap();

    let mut run = WorkflowRunner::new()
        .run_streaming(workflow, &"favorite color?".to_string())
        .unwrap();
    let handle = run.handle();

    let request_id = loop {
        match run.next_event().await.expect("stream open while awaiting") {
            WorkflowEvent::RequestInfo { request_id, .. } => break request_id,
            _ => continue,
        }
    };

    handle
        .provide_external_response(request_id, serde_json::json!("green"))
        .unwrap();

    let (events, status) = run.drain().await;
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(output_values(&events), vec![serde_json::json!("green")]);
}

#[tokio::test]
async fn resume_continues_from_a_saved_boundary() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let mut registry = MessageTypeRegistry::new();
    registry.register::<String>("text").unwrap();
    let registry = Arc::new(registry);

    let runner = WorkflowRunner::new().with_checkpointing(store.clone(), registry);
    let run = runner
        .run_streaming(transform_workflow(), &"Hello, World!".to_string())
        .unwrap();
    let run_id = run.handle().run_id().to_string();
    let (_, status) = run.drain().await;
    assert_eq!(status, RunStatus::Completed);

    // The boundary after superstep 0 has the reversed stage still queued.
    let history = store.list(&run_id).await.unwrap();
    let boundary = history
        .iter()
        .find(|cp| cp.superstep == 0)
        .expect("checkpoint at first boundary")
        .clone();
    assert_eq!(boundary.queue.len(), 1);
    assert_eq!(boundary.queue[0].target, "reverse");

    let resumed = runner.resume(transform_workflow(), boundary).unwrap();
    let (events, status) = resumed.drain().await;

    assert_eq!(status, RunStatus::Completed);
    assert_eq!(output_values(&events), vec![serde_json::json!("!DLROW ,OLLEH")]);
    // The upper stage already ran before the checkpoint; it must not replay.
    assert!(!events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::ExecutorInvoked { executor_id } if executor_id.as_str() == "upper")));
}
