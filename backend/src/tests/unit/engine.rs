use serde_json::json;

use std::time::Duration;

use mint_shared::{Condition, ConditionGroup, ExecutionStatus, FailureKind, StepKind, StepOutcome, WorkflowExecution};

use crate::tests::fixtures::*;
use crate::tests::helpers::*;
use crate::workflows::engine::Dispatched;
use crate::workflows::triggers::events;
use crate::workflows::{steps::presets, ExecutionStore, StepUpdate, WorkflowStore, WorkflowUpdate};

async fn finish(app: &TestApp, dispatched: Vec<Dispatched>) -> Vec<WorkflowExecution> {
    let mut finished = Vec::new();
    for d in dispatched {
        d.handle.await.unwrap();
        finished.push(app.executions.get(d.execution_id).await.unwrap());
    }
    finished
}

#[tokio::test]
async fn test_event_without_matching_workflow_dispatches_nothing() {
    let app = TestApp::new();
    app.workflow_with_steps(new_workflow("Intake", events::CASE_CREATED), vec![task_step(1, "Review")])
        .await;

    let dispatched = app.engine.on_event("invoice_paid", json!({})).await;

    assert!(dispatched.is_empty());
    assert!(app.crm.calls().is_empty());
}

#[tokio::test]
async fn test_inactive_workflows_are_not_triggered() {
    let app = TestApp::new();
    let active = app
        .workflow_with_steps(new_workflow("Active", events::CASE_CREATED), vec![task_step(1, "From active")])
        .await;
    let mut inactive = new_workflow("Paused", events::CASE_CREATED);
    inactive.is_active = false;
    let inactive = app.workflow_with_steps(inactive, vec![task_step(1, "From paused")]).await;

    let dispatched = app.engine.on_event(events::CASE_CREATED, CaseFixture::default().payload()).await;

    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].workflow_id, active.id);
    finish(&app, dispatched).await;

    assert_eq!(app.crm.task_titles(), vec!["From active".to_string()]);
    assert!(app.executions.all_for_workflow(inactive.id).await.is_empty());
}

#[tokio::test]
async fn test_every_matching_workflow_gets_its_own_execution() {
    let app = TestApp::new();
    let first = app
        .workflow_with_steps(new_workflow("First", events::CASE_CREATED), vec![task_step(1, "One")])
        .await;
    let second = app
        .workflow_with_steps(new_workflow("Second", events::CASE_CREATED), vec![task_step(1, "Two")])
        .await;

    let dispatched = app.engine.on_event(events::CASE_CREATED, json!({})).await;
    let executions = finish(&app, dispatched).await;

    assert_eq!(executions.len(), 2);
    let mut workflow_ids: Vec<_> = executions.iter().map(|e| e.workflow_id).collect();
    workflow_ids.sort();
    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(workflow_ids, expected);
    assert!(executions.iter().all(|e| e.status == ExecutionStatus::Completed));
}

#[tokio::test]
async fn test_steps_run_in_ascending_order() {
    let app = TestApp::new();
    let workflow = app
        .workflow_with_steps(
            new_workflow("Ordered", events::CASE_CREATED),
            vec![task_step(30, "third"), task_step(10, "first"), task_step(20, "second")],
        )
        .await;

    let dispatched = app.engine.on_event(events::CASE_CREATED, json!({})).await;
    let execution = finish(&app, dispatched).await.remove(0);

    assert_eq!(execution.workflow_id, workflow.id);
    assert_eq!(app.crm.task_titles(), vec!["first", "second", "third"]);
    let orders: Vec<i32> = execution.result_data.steps.iter().map(|s| s.step_order).collect();
    assert_eq!(orders, vec![10, 20, 30]);
}

#[tokio::test]
async fn test_inactive_steps_are_skipped() {
    let app = TestApp::new();
    let mut skipped = task_step(2, "skipped");
    skipped.is_active = false;
    app.workflow_with_steps(
        new_workflow("Partial", events::CASE_CREATED),
        vec![task_step(1, "kept"), skipped],
    )
    .await;

    let dispatched = app.engine.on_event(events::CASE_CREATED, json!({})).await;
    let execution = finish(&app, dispatched).await.remove(0);

    assert_eq!(app.crm.task_titles(), vec!["kept"]);
    assert_eq!(execution.result_data.steps.len(), 1);
}

#[tokio::test]
async fn test_failed_email_does_not_stop_later_steps() {
    let app = TestApp::with_crm(FakeCrm::with_email_down());
    app.workflow_with_steps(new_workflow("Intake", events::CASE_CREATED), presets::new_case_intake())
        .await;

    let dispatched = app
        .engine
        .on_event(events::CASE_CREATED, CaseFixture::default().payload())
        .await;
    let execution = finish(&app, dispatched).await.remove(0);

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.result_data.error.is_none());

    let steps = &execution.result_data.steps;
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].outcome, StepOutcome::Success);
    assert_eq!(steps[1].outcome, StepOutcome::Failure);
    assert!(steps[1].output.is_none());
    let error = steps[1].error.as_ref().unwrap();
    assert_eq!(error.kind, FailureKind::Collaborator);
    assert!(error.message.contains("connection refused"));
    assert_eq!(steps[2].outcome, StepOutcome::Success);

    assert_eq!(app.crm.calls(), vec!["create_task", "send_email", "create_document"]);
    assert_eq!(app.crm.documents.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreadable_steps_fail_the_execution() {
    let app = TestApp::with(UnreadableStepsStore::default(), FakeCrm::default());
    let workflow = app
        .workflow_with_steps(new_workflow("Broken", events::CASE_CREATED), vec![task_step(1, "Never")])
        .await;

    let dispatched = app.engine.on_event(events::CASE_CREATED, json!({})).await;
    let status = dispatched.into_iter().next().unwrap().handle.await.unwrap();
    assert_eq!(status, ExecutionStatus::Failed);

    let execution = app.executions.all_for_workflow(workflow.id).await.remove(0);
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.result_data.steps.is_empty());
    assert!(execution.result_data.error.unwrap().contains("workflow_steps is unreachable"));
    assert!(execution.completed_at.is_some());
    assert!(app.crm.calls().is_empty());
}

#[tokio::test]
async fn test_case_created_intake_scenario() {
    let app = TestApp::new();
    let workflow = app
        .workflow_with_steps(new_workflow("New Case Intake", events::CASE_CREATED), presets::new_case_intake())
        .await;
    let case = CaseFixture::titled("Smith v. Jones");

    let dispatched = app.engine.on_event(events::CASE_CREATED, case.payload()).await;
    let execution = finish(&app, dispatched).await.remove(0);

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.trigger_event, events::CASE_CREATED);
    assert_eq!(execution.trigger_data, case.payload());
    assert!(execution.result_data.steps.iter().all(|s| s.is_success()));

    let tasks = app.crm.tasks.lock().unwrap().clone();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Review Smith v. Jones");
    assert_eq!(tasks[0].description, format!("Initial review for case {}", case.case_number));
    assert_eq!(tasks[0].priority, "high");
    assert_eq!(tasks[0].case_id, Some(case.case_id));
    assert!(tasks[0].due_date.is_some());

    let emails = app.crm.emails.lock().unwrap().clone();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].recipients, vec![case.client_email.clone()]);
    assert_eq!(emails[0].subject, "We have opened your case: Smith v. Jones");

    let documents = app.crm.documents.lock().unwrap().clone();
    assert_eq!(documents[0].title, "Engagement letter - Smith v. Jones");
    assert_eq!(documents[0].document_type, "correspondence");

    // Every call carries the execution it belongs to and the workflow owner
    let contexts = app.crm.contexts.lock().unwrap().clone();
    assert!(contexts.iter().all(|c| c.execution_id == execution.id && c.workflow_id == workflow.id));
    assert!(contexts.iter().all(|c| c.acting_user == workflow.created_by));
}

#[tokio::test]
async fn test_missing_title_is_a_configuration_failure() {
    let app = TestApp::new();
    app.workflow_with_steps(
        new_workflow("Misconfigured", events::CASE_CREATED),
        vec![
            step(1, StepKind::CreateTask, json!({ "description": "no title here" })),
            task_step(2, "Still runs"),
        ],
    )
    .await;

    let dispatched = app.engine.on_event(events::CASE_CREATED, json!({})).await;
    let execution = finish(&app, dispatched).await.remove(0);

    assert_eq!(execution.status, ExecutionStatus::Completed);
    let first = &execution.result_data.steps[0];
    assert_eq!(first.outcome, StepOutcome::Failure);
    let error = first.error.as_ref().unwrap();
    assert_eq!(error.kind, FailureKind::Configuration);
    assert!(error.message.contains("title"));
    assert_eq!(app.crm.task_titles(), vec!["Still runs"]);
}

#[tokio::test]
async fn test_unresolved_recipient_is_a_configuration_failure() {
    let app = TestApp::new();
    app.workflow_with_steps(
        new_workflow("Notify", events::CASE_CREATED),
        vec![step(
            1,
            StepKind::SendEmail,
            json!({ "subject": "Hi", "body": "Hello", "recipients": "{{contact.email}}" }),
        )],
    )
    .await;

    let dispatched = app.engine.on_event(events::CASE_CREATED, json!({ "case": {} })).await;
    let execution = finish(&app, dispatched).await.remove(0);

    let error = execution.result_data.steps[0].error.clone().unwrap();
    assert_eq!(error.kind, FailureKind::Configuration);
    assert!(error.message.contains("contact.email"));
    assert!(app.crm.calls().is_empty());
}

#[tokio::test]
async fn test_later_steps_read_earlier_outputs() {
    let app = TestApp::new();
    app.workflow_with_steps(
        new_workflow("Chained", events::CASE_CREATED),
        vec![
            task_step(1, "Review {{case.title}}"),
            step(
                2,
                StepKind::SendEmail,
                json!({
                    "subject": "Task {{steps.1.title}}",
                    "body": "Task id {{steps.1.task_id}}",
                    "recipients": ["{{contact.email}}", "partner@firm.test"]
                }),
            ),
        ],
    )
    .await;
    let case = CaseFixture::titled("Doe v. Roe");

    let dispatched = app.engine.on_event(events::CASE_CREATED, case.payload()).await;
    let execution = finish(&app, dispatched).await.remove(0);

    let task_id = execution.result_data.steps[0].output.as_ref().unwrap()["task_id"]
        .as_str()
        .unwrap()
        .to_string();
    let emails = app.crm.emails.lock().unwrap().clone();
    assert_eq!(emails[0].subject, "Task Review Doe v. Roe");
    assert_eq!(emails[0].body, format!("Task id {}", task_id));
    assert_eq!(emails[0].recipients, vec![case.client_email.clone(), "partner@firm.test".to_string()]);
}

#[tokio::test]
async fn test_failed_step_adds_nothing_to_later_steps() {
    let app = TestApp::with_crm(FakeCrm::with_email_down());
    app.workflow_with_steps(
        new_workflow("Chained", events::CASE_CREATED),
        vec![
            step(1, StepKind::SendEmail, json!({ "subject": "s", "body": "b", "recipients": "a@firm.test" })),
            task_step(2, "Sent {{steps.1.status}}"),
        ],
    )
    .await;

    let dispatched = app.engine.on_event(events::CASE_CREATED, json!({})).await;
    finish(&app, dispatched).await;

    // Free-text tokens that do not resolve stay as written
    assert_eq!(app.crm.task_titles(), vec!["Sent {{steps.1.status}}"]);
}

#[tokio::test]
async fn test_update_status_targets_the_triggering_case() {
    let app = TestApp::new();
    app.workflow_with_steps(new_workflow("Close out", events::CASE_STATUS_CHANGED), presets::case_closing())
        .await;
    let case = CaseFixture::default();

    let dispatched = app.engine.on_event(events::CASE_STATUS_CHANGED, case.payload()).await;
    let execution = finish(&app, dispatched).await.remove(0);

    assert_eq!(execution.status, ExecutionStatus::Completed);
    let updates = app.crm.updates.lock().unwrap().clone();
    assert_eq!(
        updates,
        vec![RecordUpdate {
            entity: crate::workflows::EntityType::Case,
            entity_id: case.case_id,
            field: "status".to_string(),
            value: json!("archived"),
        }]
    );
}

#[tokio::test]
async fn test_non_object_payload_fails_the_execution() {
    let app = TestApp::new();
    app.workflow_with_steps(new_workflow("Intake", events::CASE_CREATED), vec![task_step(1, "Never")])
        .await;

    let dispatched = app.engine.on_event(events::CASE_CREATED, json!(["not", "an", "object"])).await;
    let execution = finish(&app, dispatched).await.remove(0);

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.result_data.steps.is_empty());
    assert!(execution.result_data.error.unwrap().contains("Malformed trigger payload"));
    assert!(app.crm.calls().is_empty());
}

#[tokio::test]
async fn test_steps_are_snapshotted_when_the_run_starts() {
    let app = TestApp::new();
    let workflow = app
        .workflow_with_steps(new_workflow("Snapshot", events::CASE_CREATED), vec![task_step(1, "Original")])
        .await;

    let dispatched = app.engine.on_event(events::CASE_CREATED, json!({})).await;
    let execution = finish(&app, dispatched).await.remove(0);

    // Editing the definition afterwards leaves recorded history alone
    let step = app.workflows.list_steps(workflow.id).await.unwrap().remove(0);
    app.workflows
        .update_step(
            workflow.id,
            step.id,
            crate::workflows::StepUpdate {
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let stored = app.executions.get(execution.id).await.unwrap();
    assert_eq!(stored.result_data.steps[0].step_name, execution.result_data.steps[0].step_name);
    assert_ne!(stored.result_data.steps[0].step_name, "Renamed");
}

#[tokio::test]
async fn test_workflow_conditions_filter_events_before_any_run() {
    let app = TestApp::new();
    let mut input = new_workflow("Completed tasks", events::TASK_STATUS_CHANGED);
    input.conditions = Some(ConditionGroup::and(vec![Condition::equals("task.status", json!("completed"))]));
    let workflow = app.workflow_with_steps(input, vec![task_step(1, "Bill {{task.title}}")]).await;

    let dispatched = app
        .engine
        .on_event(events::TASK_STATUS_CHANGED, json!({ "task": { "title": "Draft", "status": "in_progress" } }))
        .await;
    assert!(dispatched.is_empty());
    let (_, total) = app.executions.list_for_workflow(workflow.id, 10, 0).await.unwrap();
    assert_eq!(total, 0);

    let dispatched = app
        .engine
        .on_event(events::TASK_STATUS_CHANGED, json!({ "task": { "title": "Draft", "status": "Completed" } }))
        .await;
    let execution = finish(&app, dispatched).await.remove(0);

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(app.crm.task_titles(), vec!["Bill Draft".to_string()]);
}

#[tokio::test]
async fn test_definition_changes_do_not_reach_a_running_execution() {
    let (crm, gate) = FakeCrm::with_gate("Hold");
    let app = TestApp::with_crm(crm);
    let first = app
        .workflow_with_steps(
            new_workflow("Parked", events::CASE_CREATED),
            vec![task_step(1, "Hold"), task_step(2, "Original follow-up")],
        )
        .await;
    let other = app
        .workflow_with_steps(new_workflow("Other", events::CONTACT_CREATED), vec![task_step(1, "Close out")])
        .await;

    let parked = app.engine.on_event(events::CASE_CREATED, json!({})).await;
    gate.arrived().await;

    let follow_up = app.workflows.list_steps(first.id).await.unwrap().remove(1);
    app.workflows
        .update_step(
            first.id,
            follow_up.id,
            StepUpdate {
                parameters: Some(json!({ "title": "Edited follow-up" })),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    app.workflows
        .update_workflow(
            first.id,
            WorkflowUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Unrelated runs are not held up by the parked one
    let dispatched = app.engine.on_event(events::CONTACT_CREATED, json!({})).await;
    let closed = finish(&app, dispatched).await.remove(0);
    assert_eq!(closed.workflow_id, other.id);
    assert_eq!(closed.status, ExecutionStatus::Completed);

    gate.release();
    let execution = finish(&app, parked).await.remove(0);

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.result_data.steps.len(), 2);
    assert_eq!(
        app.crm.task_titles(),
        vec!["Close out".to_string(), "Hold".to_string(), "Original follow-up".to_string()]
    );
}

#[tokio::test]
async fn test_drain_waits_for_in_flight_executions() {
    let (crm, gate) = FakeCrm::with_gate("Hold");
    let app = TestApp::with_crm(crm);
    let workflow = app
        .workflow_with_steps(new_workflow("Parked", events::CASE_CREATED), vec![task_step(1, "Hold")])
        .await;

    app.engine.on_event(events::CASE_CREATED, json!({})).await;
    gate.arrived().await;

    assert_eq!(app.engine.running(), 1);
    assert!(tokio::time::timeout(Duration::from_millis(50), app.engine.drain()).await.is_err());

    gate.release();
    tokio::time::timeout(Duration::from_secs(5), app.engine.drain())
        .await
        .expect("drain should finish once the run is released");

    assert_eq!(app.engine.running(), 0);
    let execution = app.executions.all_for_workflow(workflow.id).await.remove(0);
    assert_eq!(execution.status, ExecutionStatus::Completed);
}
