use fieldlog::fake::FakeTransport;
use fieldlog::{
    AnswerValue, ApiClient, Body, ClientConfig, ClientError, DetailsForm, FileCredentialStore,
    SessionManager, SpeciesChoice, SubmissionFlow,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::tempdir;

fn manager(fake: &Arc<FakeTransport>, store_path: &std::path::Path) -> SessionManager {
    let client = ApiClient::with_transport(
        ClientConfig::new("http://10.0.2.2:8000"),
        fake.clone(),
        Arc::new(FileCredentialStore::new(store_path)),
    );
    SessionManager::new(client)
}

#[tokio::test]
async fn test_login_select_species_answer_and_submit() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("credentials.json");
    let fake = Arc::new(FakeTransport::new());
    fake.push_json(
        200,
        json!({"access_token": "tok123", "user": {"id": 1, "username": "alice"}}),
    );
    fake.push_json(200, json!([{"id": 1, "name": "Sparrow"}]));
    fake.push_json(
        200,
        json!({"questions": [{"id": 7, "question_text": "Juvenile?", "question_type": "yes_no"}]}),
    );
    fake.push_json(201, json!({"id": 31, "species_id": 1, "location_name": "Park"}));

    let mut sessions = manager(&fake, &store_path);
    let session = sessions.login("alice", "secret").await.unwrap();
    assert_eq!(session.token, "tok123");

    let client = sessions.client();
    let species = client.get_species().await.unwrap();
    assert_eq!(species.len(), 1);
    assert_eq!(species[0].name, "Sparrow");

    let mut flow = SubmissionFlow::load(client).await.unwrap();
    *flow.details_form_mut().unwrap() = DetailsForm {
        species: SpeciesChoice::Existing(Some(species[0].id)),
        location_name: "Park".to_string(),
        latitude: String::new(),
        longitude: String::new(),
        ..DetailsForm::default()
    };
    let details = flow.submit_details(client).await.unwrap();
    assert_eq!(details.location.latitude, 0.0);
    assert_eq!(details.location.longitude, 0.0);

    flow.answer(7, AnswerValue::YesNo(true)).unwrap();
    let log = flow.submit(client).await.unwrap().unwrap();
    assert_eq!(log.id, 31);

    let submissions = fake.requests_to("/species-logs");
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].bearer_token(), Some("tok123"));
    let Some(Body::Multipart(form)) = &submissions[0].body else {
        panic!("expected multipart submission");
    };
    let record: Value = serde_json::from_str(form.text_value("species_log").unwrap()).unwrap();
    assert_eq!(record["answers"], json!([{"question_id": 7, "answer": true}]));
    assert_eq!(record["location_latitude"], json!(0.0));
    assert!(!form.has_file("photo"));

    // every call after login carried the token
    for request in fake.requests().iter().skip(1) {
        assert_eq!(request.bearer_token(), Some("tok123"));
    }
}

#[tokio::test]
async fn test_session_restores_after_restart_and_clears_on_logout() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("credentials.json");
    let fake = Arc::new(FakeTransport::new());
    fake.push_json(
        200,
        json!({"access_token": "tok123", "user": {"id": 1, "username": "alice", "is_admin": true}}),
    );

    let mut first = manager(&fake, &store_path);
    first.login("alice", "secret").await.unwrap();

    let mut second = manager(&fake, &store_path);
    let restored = second.restore_session().unwrap().cloned().unwrap();
    assert_eq!(restored.user.username, "alice");
    assert!(second.is_admin());

    second.logout().unwrap();
    let mut third = manager(&fake, &store_path);
    assert!(third.restore_session().unwrap().is_none());
    assert_eq!(fake.request_count(), 1);
}

#[tokio::test]
async fn test_invalid_credentials_surface_server_detail() {
    let dir = tempdir().unwrap();
    let fake = Arc::new(FakeTransport::new());
    fake.push_json(401, json!({"detail": "Invalid credentials"}));

    let mut sessions = manager(&fake, &dir.path().join("credentials.json"));
    let err = sessions.login("alice", "nope").await.unwrap_err();
    match err {
        ClientError::AuthenticationFailed(message) => assert_eq!(message, "Invalid credentials"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!sessions.is_authenticated());
}
