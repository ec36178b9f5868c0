pub mod confessions;
pub mod error;
pub mod reactions;
pub mod state;

use axum::{
    Router,
    routing::{get, put},
};

pub use state::{AppState, AppStateInner};

/// REST routes for the confession collection. The `/feed` WebSocket is
/// mounted by the server next to these.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/confessions",
            get(confessions::list_confessions).post(confessions::create_confession),
        )
        .route(
            "/confessions/{id}",
            get(confessions::get_confession).delete(confessions::delete_confession),
        )
        .route("/confessions/{id}/reactions", put(reactions::update_reactions))
        .route("/stats", get(confessions::get_stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    use snitchr_db::Database;
    use snitchr_gateway::Dispatcher;
    use snitchr_types::api::{ErrorBody, PageResponse, Stats};
    use snitchr_types::events::ChangeEvent;
    use snitchr_types::models::{Confession, Mood, ReactionKind};

    use super::*;

    fn app() -> (Router, AppState) {
        let state = AppStateInner::new(Database::open_in_memory().unwrap(), Dispatcher::new());
        (router(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn create_list_react_delete() {
        let (app, state) = app();
        let mut feed = state.dispatcher.subscribe();

        let (status, body) = send(
            &app,
            "POST",
            "/confessions",
            Some(serde_json::json!({ "message": "  I like pineapple pizza ", "nickname": "Bob", "mood": "love" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created: Confession = decode(&body);
        assert_eq!(created.message, "I like pineapple pizza");
        assert_eq!(created.mood, Some(Mood::Love));
        assert!(matches!(feed.recv().await.unwrap(), ChangeEvent::Insert(c) if c.id == created.id));

        let (status, body) = send(&app, "GET", "/confessions?page=0&page_size=10", None).await;
        assert_eq!(status, StatusCode::OK);
        let page: PageResponse = decode(&body);
        assert_eq!(page.total, 1);
        assert_eq!(page.confessions[0], created);

        let reactions = created.reactions.toggled(ReactionKind::Heart).unwrap();
        let uri = format!("/confessions/{}/reactions", created.id);
        let (status, body) = send(&app, "PUT", &uri, Some(serde_json::to_value(reactions).unwrap())).await;
        assert_eq!(status, StatusCode::OK);
        let updated: Confession = decode(&body);
        assert_eq!(updated.reactions.heart.count, 1);
        assert!(matches!(feed.recv().await.unwrap(), ChangeEvent::Update(_)));

        let uri = format!("/confessions/{}", created.id);
        let (status, _) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        match feed.recv().await.unwrap() {
            ChangeEvent::Delete(last) => assert_eq!(last.reactions.heart.count, 1),
            other => panic!("expected delete, got {:?}", other),
        }

        let (status, _) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert_eq!(state.db.count_events("confession_created").unwrap(), 1);
        assert_eq!(state.db.count_events("reaction_updated").unwrap(), 1);
        assert_eq!(state.db.count_events("confession_deleted").unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_drafts_are_unprocessable() {
        let (app, state) = app();

        let long = "x".repeat(281);
        let (status, body) = send(&app, "POST", "/confessions", Some(serde_json::json!({ "message": long }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let err: ErrorBody = decode(&body);
        assert!(err.error.contains("281"));

        let (status, _) = send(&app, "POST", "/confessions", Some(serde_json::json!({ "message": "  " }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(state.db.count_events("confession_created").unwrap(), 0);
    }

    #[tokio::test]
    async fn reactions_on_missing_confession_is_not_found() {
        let (app, _) = app();
        let (status, _) = send(
            &app,
            "PUT",
            "/confessions/missing/reactions",
            Some(serde_json::json!({ "heart": { "count": 1, "reacted": true } })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let (app, _) = app();
        let (status, _) = send(&app, "GET", "/confessions?page_size=0", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn search_and_stats() {
        let (app, _) = app();
        for message in ["I broke the vase", "I love the vase", "nothing to see"] {
            let (status, _) = send(&app, "POST", "/confessions", Some(serde_json::json!({ "message": message }))).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, body) = send(&app, "GET", "/confessions?search=VASE&page_size=1", None).await;
        let page: PageResponse = decode(&body);
        assert_eq!(page.total, 2);
        assert_eq!(page.confessions.len(), 1);
        assert_eq!(page.confessions[0].message, "I love the vase");

        let (_, body) = send(&app, "GET", "/stats", None).await;
        let stats: Stats = decode(&body);
        assert_eq!(stats.total_confessions, 3);
        assert_eq!(stats.today_confessions, 3);
        assert_eq!(stats.total_reactions, 0);
    }
}
