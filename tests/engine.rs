use crud_gateway::{
    builtin, ConfigError, ConstraintValidator, CrudEngine, EntitiesConfig, MemoryStore, Outcome, SearchParams,
};
use rstest::{fixture, rstest};
use serde_json::{json, Value};
use std::sync::Arc;

#[fixture]
fn engine() -> CrudEngine {
    CrudEngine::from_config(
        &builtin().unwrap(),
        Arc::new(MemoryStore::new()),
        Arc::new(ConstraintValidator),
    )
    .unwrap()
}

fn data(outcome: Outcome) -> Value {
    match outcome {
        Outcome::Success(Some(v)) => v,
        other => panic!("expected success with payload, got {other:?}"),
    }
}

fn ids(list: &Value) -> Vec<i64> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_i64().unwrap())
        .collect()
}

fn params(pairs: &[(&str, &str)]) -> SearchParams {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

async fn create_user(engine: &CrudEngine, name: &str) -> i64 {
    let email = format!("{name}@example.com");
    let created = engine
        .create("user", "user.create", "user", &json!({"name": name, "email": email}))
        .await
        .unwrap();
    data(created)["id"].as_i64().unwrap()
}

async fn create_group(engine: &CrudEngine, name: &str) -> i64 {
    let created = engine
        .create("group", "group.create", "group", &json!({"name": name}))
        .await
        .unwrap();
    data(created)["id"].as_i64().unwrap()
}

#[rstest]
#[case("user")]
#[case("group")]
#[tokio::test]
async fn absent_id_is_not_found_for_every_operation(engine: CrudEngine, #[case] resource: &str) {
    let expected = Outcome::NotFound(format!("{resource} 99 not found"));
    assert_eq!(engine.get(resource, resource, 99).await.unwrap(), expected);
    assert_eq!(
        engine
            .update(resource, None, resource, 99, &json!({"name": "x"}))
            .await
            .unwrap(),
        expected
    );
    assert_eq!(engine.delete(resource, 99).await.unwrap(), expected);
}

#[rstest]
#[tokio::test]
async fn unknown_resource_is_not_found(engine: CrudEngine) {
    let outcome = engine.list("widget", "default", &SearchParams::new()).await.unwrap();
    assert_eq!(outcome, Outcome::NotFound("unknown resource 'widget'".into()));
}

#[rstest]
#[tokio::test]
async fn create_then_get_round_trips(engine: CrudEngine) {
    let created = data(
        engine
            .create(
                "user",
                "user.create",
                "user",
                &json!({"id": 77, "name": "ann", "email": "ann@example.com", "groups": [1], "extra": true}),
            )
            .await
            .unwrap(),
    );
    assert_eq!(
        created,
        json!({"id": 1, "name": "ann", "email": "ann@example.com", "groups": []})
    );
    let fetched = data(engine.get("user", "user", 1).await.unwrap());
    assert_eq!(fetched, created);
}

#[rstest]
#[tokio::test]
async fn update_changes_only_given_fields(engine: CrudEngine) {
    let id = create_user(&engine, "ann").await;
    let updated = data(
        engine
            .update("user", None, "user", id, &json!({"email": "new@example.com"}))
            .await
            .unwrap(),
    );
    assert_eq!(updated["name"], "ann");
    assert_eq!(updated["email"], "new@example.com");
    assert_eq!(data(engine.get("user", "user", id).await.unwrap()), updated);
}

#[rstest]
#[tokio::test]
async fn invalid_create_reports_every_violation_and_stores_nothing(engine: CrudEngine) {
    let outcome = engine
        .create("user", "user.create", "user", &json!({"name": "", "email": "nope"}))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::ValidationFailed(ref v) if v.len() == 2));
    assert_eq!(
        outcome.message().unwrap(),
        "name: must not be blank;\nemail: must be a valid email address"
    );
    let all = data(engine.list("user", "user", &SearchParams::new()).await.unwrap());
    assert_eq!(all, json!([]));
}

#[rstest]
#[tokio::test]
async fn invalid_update_leaves_record_unchanged(engine: CrudEngine) {
    let id = create_group(&engine, "admins").await;
    let outcome = engine
        .update("group", None, "group", id, &json!({"name": "x".repeat(51)}))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::ValidationFailed(_)));
    assert_eq!(data(engine.get("group", "group", id).await.unwrap())["name"], "admins");
}

#[rstest]
#[tokio::test]
async fn group_filter_lists_exactly_the_members(engine: CrudEngine) {
    let g1 = create_group(&engine, "admins").await;
    let g2 = create_group(&engine, "empty").await;
    let u1 = create_user(&engine, "ann").await;
    let u2 = create_user(&engine, "bob").await;
    let _u3 = create_user(&engine, "cat").await;
    for u in [u1, u2] {
        engine.attach("user", "groups", u, g1, "user").await.unwrap();
    }

    let (g1_param, g2_param) = (g1.to_string(), g2.to_string());
    let members = data(
        engine
            .list("user", "user", &params(&[("group-id", g1_param.as_str())]))
            .await
            .unwrap(),
    );
    assert_eq!(ids(&members), vec![u1, u2]);

    let none = data(
        engine
            .list("user", "user", &params(&[("group-id", g2_param.as_str())]))
            .await
            .unwrap(),
    );
    assert_eq!(ids(&none), Vec::<i64>::new());

    let all = data(engine.list("user", "user", &SearchParams::new()).await.unwrap());
    assert_eq!(all.as_array().unwrap().len(), 3);
}

#[rstest]
#[tokio::test]
async fn non_numeric_group_id_matches_nothing(engine: CrudEngine) {
    create_user(&engine, "ann").await;
    let found = data(
        engine
            .list("user", "user", &params(&[("group-id", "abc")]))
            .await
            .unwrap(),
    );
    assert_eq!(found, json!([]));
}

#[rstest]
#[tokio::test]
async fn attach_is_symmetric_and_idempotent(engine: CrudEngine) {
    let g = create_group(&engine, "admins").await;
    let u = create_user(&engine, "ann").await;

    let first = data(engine.attach("user", "groups", u, g, "user").await.unwrap());
    assert_eq!(first["groups"], json!([{"id": g, "name": "admins"}]));
    let again = data(engine.attach("user", "groups", u, g, "user").await.unwrap());
    assert_eq!(again, first);

    let group = data(engine.get("group", "group", g).await.unwrap());
    assert_eq!(
        group["users"],
        json!([{"id": u, "name": "ann", "email": "ann@example.com"}])
    );
}

#[rstest]
#[tokio::test]
async fn attach_works_from_the_inverse_side(engine: CrudEngine) {
    let g = create_group(&engine, "admins").await;
    let u = create_user(&engine, "ann").await;
    let group = data(engine.attach("group", "users", g, u, "group").await.unwrap());
    assert_eq!(ids(&group["users"]), vec![u]);
    let user = data(engine.get("user", "user", u).await.unwrap());
    assert_eq!(ids(&user["groups"]), vec![g]);
}

#[rstest]
#[tokio::test]
async fn detach_reverses_both_sides(engine: CrudEngine) {
    let g = create_group(&engine, "admins").await;
    let u = create_user(&engine, "ann").await;
    engine.attach("user", "groups", u, g, "user").await.unwrap();

    let user = data(engine.detach("user", "groups", u, g, "user").await.unwrap());
    assert_eq!(user["groups"], json!([]));
    let group = data(engine.get("group", "group", g).await.unwrap());
    assert_eq!(group["users"], json!([]));

    // detaching again is a no-op
    let again = data(engine.detach("user", "groups", u, g, "user").await.unwrap());
    assert_eq!(again, user);
}

#[rstest]
#[tokio::test]
async fn attach_names_the_missing_side(engine: CrudEngine) {
    let g = create_group(&engine, "admins").await;
    let u = create_user(&engine, "ann").await;
    assert_eq!(
        engine.attach("user", "groups", 3, g, "user").await.unwrap(),
        Outcome::NotFound("user 3 not found".into())
    );
    assert_eq!(
        engine.attach("user", "groups", u, 9, "user").await.unwrap(),
        Outcome::NotFound("group 9 not found".into())
    );
    assert!(matches!(
        engine.attach("user", "friends", u, g, "user").await.unwrap(),
        Outcome::NotFound(_)
    ));
}

#[rstest]
#[tokio::test]
async fn delete_removes_record_and_its_links(engine: CrudEngine) {
    let g = create_group(&engine, "admins").await;
    let u = create_user(&engine, "ann").await;
    engine.attach("user", "groups", u, g, "user").await.unwrap();

    assert_eq!(engine.delete("user", u).await.unwrap(), Outcome::Success(None));
    assert_eq!(
        engine.get("user", "user", u).await.unwrap(),
        Outcome::NotFound(format!("user {u} not found"))
    );
    let group = data(engine.get("group", "group", g).await.unwrap());
    assert_eq!(group["users"], json!([]));
}

#[rstest]
#[tokio::test]
async fn last_committed_update_wins(engine: CrudEngine) {
    let id = create_user(&engine, "ann").await;
    let (first, second) = (json!({"name": "first"}), json!({"name": "second"}));
    let (a, b) = tokio::join!(
        engine.update("user", None, "user", id, &first),
        engine.update("user", None, "user", id, &second),
    );
    assert!(a.unwrap().is_success());
    assert!(b.unwrap().is_success());
    let name = data(engine.get("user", "user", id).await.unwrap())["name"].clone();
    assert!(name == "first" || name == "second", "unexpected {name}");

    engine
        .update("user", None, "user", id, &json!({"name": "third"}))
        .await
        .unwrap();
    assert_eq!(data(engine.get("user", "user", id).await.unwrap())["name"], "third");
}

fn with_path_segments(pairs: &[(&str, &str)]) -> EntitiesConfig {
    let mut config = builtin().unwrap();
    for (name, path) in pairs {
        let entity = config.entities.iter_mut().find(|e| e.name == *name).unwrap();
        entity.path_segment = Some(path.to_string());
    }
    config
}

#[tokio::test]
async fn name_and_path_segment_reach_the_same_entity() {
    let config = with_path_segments(&[("user", "members")]);
    let engine = CrudEngine::from_config(&config, Arc::new(MemoryStore::new()), Arc::new(ConstraintValidator)).unwrap();
    let payload = json!({"name": "ann", "email": "ann@example.com"});

    let by_path = data(engine.create("members", "user.create", "user", &payload).await.unwrap());
    let by_name = data(engine.create("user", "user.create", "user", &payload).await.unwrap());
    assert_eq!((by_path["id"].as_i64(), by_name["id"].as_i64()), (Some(1), Some(2)));
    assert_eq!(by_name["email"], "ann@example.com");

    let groups = data(engine.list("group", "default", &SearchParams::new()).await.unwrap());
    assert_eq!(groups, json!([]));
}

#[test]
fn path_segment_shadowing_another_entity_is_rejected() {
    let config = with_path_segments(&[("group", "user"), ("user", "members")]);
    let built = CrudEngine::from_config(&config, Arc::new(MemoryStore::new()), Arc::new(ConstraintValidator));
    assert!(matches!(built, Err(ConfigError::DuplicatePathSegment(ref p)) if p == "user"));
}
