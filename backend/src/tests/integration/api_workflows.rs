use axum::http::StatusCode;
use serde_json::json;

use crate::tests::fixtures::*;
use crate::tests::helpers::*;
use crate::workflows::triggers::events;

async fn create_workflow(app: &TestApp, body: serde_json::Value) -> serde_json::Value {
    let response = app.request(json_request("POST", "/api/v1/workflows", body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn test_health_without_database() {
    let app = TestApp::new();

    let response = app.request(get_request("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "not_configured");
}

#[tokio::test]
async fn test_create_and_get_workflow() {
    let app = TestApp::new();

    let created = create_workflow(
        &app,
        json!({ "name": "  New Case Intake ", "trigger_event": "case_created" }),
    )
    .await;
    assert_eq!(created["name"], "New Case Intake");
    assert_eq!(created["is_active"], true);
    assert_eq!(created["description"], "");

    let id = created["id"].as_str().unwrap();
    let response = app
        .request(json_request(
            "POST",
            &format!("/api/v1/workflows/{}/steps", id),
            json!({ "name": "Review", "step_type": "create_task", "order": 1, "parameters": { "title": "Review {{case.title}}" } }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.request(get_request(&format!("/api/v1/workflows/{}", id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["trigger_event"], "case_created");
    assert_eq!(body["steps"].as_array().unwrap().len(), 1);
    assert_eq!(body["steps"][0]["step_type"], "create_task");
}

#[tokio::test]
async fn test_create_workflow_validation() {
    let app = TestApp::new();

    let response = app
        .request(json_request(
            "POST",
            "/api/v1/workflows",
            json!({ "name": "", "trigger_event": "   " }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["details"]["name"].is_array());
    assert!(body["details"]["trigger_event"].is_array());

    let response = app
        .request(json_request(
            "POST",
            "/api/v1/workflows",
            json!({ "name": "x".repeat(201), "trigger_event": "case_created" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_list_workflows_filters_and_paginates() {
    let app = TestApp::new();
    create_workflow(&app, json!({ "name": "Alpha intake", "trigger_event": "case_created" })).await;
    create_workflow(&app, json!({ "name": "Beta closing", "trigger_event": "case_status_changed" })).await;
    create_workflow(
        &app,
        json!({ "name": "Gamma intake", "trigger_event": "case_created", "is_active": false }),
    )
    .await;

    let response = app
        .request(get_request("/api/v1/workflows?sort_by=name&sort_order=asc&per_page=2"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["meta"]["total_pages"], 2);
    assert_eq!(body["meta"]["has_next"], true);
    assert_eq!(body["data"][0]["name"], "Alpha intake");
    assert_eq!(body["data"][1]["name"], "Beta closing");

    let body = body_json(
        app.request(get_request("/api/v1/workflows?trigger_event=case_created&is_active=true"))
            .await,
    )
    .await;
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["name"], "Alpha intake");

    let body = body_json(app.request(get_request("/api/v1/workflows?q=INTAKE")).await).await;
    assert_eq!(body["meta"]["total"], 2);
}

#[tokio::test]
async fn test_update_and_delete_workflow() {
    let app = TestApp::new();
    let created = create_workflow(&app, json!({ "name": "Intake", "trigger_event": "case_created" })).await;
    let uri = format!("/api/v1/workflows/{}", created["id"].as_str().unwrap());

    let response = app
        .request(json_request("PUT", &uri, json!({ "is_active": false, "description": "Paused" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_active"], false);
    assert_eq!(body["description"], "Paused");
    assert_eq!(body["name"], "Intake");

    let response = app.request(json_request("PUT", &uri, json!({ "trigger_event": "" }))).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app.request(delete_request(&uri)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.request(get_request(&uri)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
    let app = TestApp::new();
    let uri = format!("/api/v1/workflows/{}", uuid::Uuid::new_v4());

    assert_eq!(app.request(get_request(&uri)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.request(delete_request(&uri)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.request(get_request(&format!("{}/steps", uri))).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.request(json_request(
            "POST",
            &format!("{}/steps", uri),
            json!({ "name": "Review", "step_type": "create_task", "order": 1, "parameters": { "title": "x" } })
        ))
        .await
        .status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_step_parameters_are_validated() {
    let app = TestApp::new();
    let created = create_workflow(&app, json!({ "name": "Intake", "trigger_event": "case_created" })).await;
    let uri = format!("/api/v1/workflows/{}/steps", created["id"].as_str().unwrap());

    let response = app
        .request(json_request(
            "POST",
            &uri,
            json!({ "name": "Review", "step_type": "create_task", "order": 1, "parameters": { "due_in_days": 3 } }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert!(body["details"]["parameters.title"][0].as_str().unwrap().contains("title"));

    let response = app
        .request(json_request(
            "POST",
            &uri,
            json!({ "name": "Assign", "step_type": "assign_user", "order": 1, "parameters": { "entity": "case", "user": "bob" } }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_json(response).await["details"]["parameters.user"].is_array());
}

#[tokio::test]
async fn test_duplicate_step_order_conflicts() {
    let app = TestApp::new();
    let created = create_workflow(&app, json!({ "name": "Intake", "trigger_event": "case_created" })).await;
    let uri = format!("/api/v1/workflows/{}/steps", created["id"].as_str().unwrap());
    let step = json!({ "name": "Review", "step_type": "create_task", "order": 1, "parameters": { "title": "Review" } });

    assert_eq!(app.request(json_request("POST", &uri, step.clone())).await.status(), StatusCode::CREATED);

    let response = app.request(json_request("POST", &uri, step)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONFLICT");
}

#[tokio::test]
async fn test_update_and_delete_step() {
    let app = TestApp::new();
    let created = create_workflow(&app, json!({ "name": "Intake", "trigger_event": "case_created" })).await;
    let steps_uri = format!("/api/v1/workflows/{}/steps", created["id"].as_str().unwrap());

    let response = app
        .request(json_request(
            "POST",
            &steps_uri,
            json!({ "name": "Notify", "step_type": "send_email", "order": 1,
                    "parameters": { "subject": "Hi", "body": "Hello", "recipients": "{{contact.email}}" } }),
        ))
        .await;
    let step = body_json(response).await;
    let step_uri = format!("{}/{}", steps_uri, step["id"].as_str().unwrap());

    let response = app
        .request(json_request("PUT", &step_uri, json!({ "order": 5, "is_active": false })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["order"], 5);
    assert_eq!(body["is_active"], false);

    // New parameters are checked against the existing step kind
    let response = app
        .request(json_request("PUT", &step_uri, json!({ "parameters": { "subject": "Hi" } })))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(app.request(get_request(&steps_uri)).await).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    assert_eq!(app.request(delete_request(&step_uri)).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.request(delete_request(&step_uri)).await.status(), StatusCode::NOT_FOUND);

    let body = body_json(app.request(get_request(&steps_uri)).await).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_execution_history_endpoints() {
    let app = TestApp::new();
    let workflow = app
        .workflow_with_steps(new_workflow("Intake", events::CASE_CREATED), vec![task_step(1, "Review {{case.title}}")])
        .await;
    let case = CaseFixture::titled("Smith v. Jones");

    app.bus.publish(events::CASE_CREATED, case.payload());
    app.bus.publish(events::CASE_CREATED, CaseFixture::default().payload());
    let executions = wait_for_executions(&app.executions, workflow.id, 2).await;

    let uri = format!("/api/v1/workflows/{}/executions", workflow.id);
    let body = body_json(app.request(get_request(&format!("{}?per_page=1", uri))).await).await;
    assert_eq!(body["meta"]["total"], 2);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    // Newest first
    assert_eq!(body["data"][0]["id"], json!(executions[1].id));

    let smith = executions
        .iter()
        .find(|e| e.trigger_data["case"]["title"] == "Smith v. Jones")
        .unwrap();
    let response = app.request(get_request(&format!("{}/{}", uri, smith.id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["trigger_event"], "case_created");
    assert_eq!(body["trigger_data"]["case"]["title"], "Smith v. Jones");
    assert_eq!(body["result_data"]["steps"][0]["outcome"], "success");
    assert_eq!(body["result_data"]["steps"][0]["output"]["title"], "Review Smith v. Jones");

    // An execution is only reachable under its own workflow
    let other = format!("/api/v1/workflows/{}/executions/{}", uuid::Uuid::new_v4(), smith.id);
    assert_eq!(app.request(get_request(&other)).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_survives_workflow_deletion() {
    let app = TestApp::new();
    let workflow = app
        .workflow_with_steps(new_workflow("Intake", events::CASE_CREATED), vec![task_step(1, "Review")])
        .await;
    app.bus.publish(events::CASE_CREATED, CaseFixture::default().payload());
    wait_for_executions(&app.executions, workflow.id, 1).await;

    let uri = format!("/api/v1/workflows/{}", workflow.id);
    assert_eq!(app.request(delete_request(&uri)).await.status(), StatusCode::NO_CONTENT);

    let body = body_json(app.request(get_request(&format!("{}/executions", uri))).await).await;
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["status"], "completed");
}

#[tokio::test]
async fn test_apply_preset_steps() {
    let app = TestApp::new();
    let created = create_workflow(&app, json!({ "name": "Intake", "trigger_event": "case_created" })).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .request(json_request(
            "POST",
            &format!("/api/v1/workflows/{}/presets/new_case_intake", id),
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let steps = body_json(response).await;
    let kinds: Vec<_> = steps.as_array().unwrap().iter().map(|s| s["step_type"].clone()).collect();
    assert_eq!(kinds, vec![json!("create_task"), json!("send_email"), json!("create_document")]);

    // Applying the same preset again collides on step order
    let response = app
        .request(json_request(
            "POST",
            &format!("/api/v1/workflows/{}/presets/new_case_intake", id),
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request(json_request(
            "POST",
            &format!("/api/v1/workflows/{}/presets/retainer_renewal", id),
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejected_preset_leaves_existing_steps_alone() {
    let app = TestApp::new();
    let created = create_workflow(&app, json!({ "name": "Intake", "trigger_event": "case_created" })).await;
    let id = created["id"].as_str().unwrap();
    let steps_uri = format!("/api/v1/workflows/{}/steps", id);

    // Only the preset's third step collides
    let step = json!({ "name": "Existing", "step_type": "create_task", "order": 3, "parameters": { "title": "Existing" } });
    assert_eq!(app.request(json_request("POST", &steps_uri, step)).await.status(), StatusCode::CREATED);

    let response = app
        .request(json_request(
            "POST",
            &format!("/api/v1/workflows/{}/presets/new_case_intake", id),
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let steps = body_json(app.request(get_request(&steps_uri)).await).await;
    let steps = steps.as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["name"], "Existing");
}

#[tokio::test]
async fn test_trigger_event_with_surrounding_whitespace_is_rejected() {
    let app = TestApp::new();

    let response = app
        .request(json_request(
            "POST",
            "/api/v1/workflows",
            json!({ "name": "Intake", "trigger_event": " case_created" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_json(response).await["details"]["trigger_event"].is_array());

    let created = create_workflow(&app, json!({ "name": "Intake", "trigger_event": "case_created" })).await;
    let response = app
        .request(json_request(
            "PUT",
            &format!("/api/v1/workflows/{}", created["id"].as_str().unwrap()),
            json!({ "trigger_event": "case_created\t" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_workflow_conditions_are_stored_and_validated() {
    let app = TestApp::new();
    let conditions = json!({
        "logic": "AND",
        "conditions": [{ "field": "task.status", "operator": "equals", "value": "completed" }],
        "groups": []
    });

    let created = create_workflow(
        &app,
        json!({ "name": "Task done", "trigger_event": "task_status_changed", "conditions": conditions }),
    )
    .await;
    assert_eq!(created["conditions"], conditions);

    let uri = format!("/api/v1/workflows/{}", created["id"].as_str().unwrap());

    // An empty group clears them
    let response = app
        .request(json_request("PUT", &uri, json!({ "conditions": { "conditions": [] } })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["conditions"].is_null());

    let response = app
        .request(json_request(
            "PUT",
            &uri,
            json!({ "conditions": { "conditions": [
                { "field": "task.priority", "operator": "in", "value": "high" },
                { "field": "", "operator": "is_null" }
            ] } }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["details"]["conditions"].as_array().unwrap().len(), 2);
}
