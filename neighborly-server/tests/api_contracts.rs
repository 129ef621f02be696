//! Route contracts exercised through the full router

mod support;

use axum::http::{header, Method, StatusCode};
use neighborly_server::config::{RateLimitConfig, ServerConfig};
use neighborly_server::events::{ChangeAction, ChangeEvent};
use neighborly_server::store::{CommunityStore, PollStore, UserStore};
use serde_json::json;
use support::{next_frame, TestApp};
use uuid::Uuid;

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = TestApp::new();
    let id = Uuid::new_v4();

    let routes = [
        (Method::GET, "/api/user/me".to_owned(), None),
        (Method::GET, "/api/user/status".to_owned(), None),
        (Method::DELETE, "/api/user/account".to_owned(), None),
        (Method::GET, "/api/auth/session".to_owned(), None),
        (Method::GET, "/api/communities".to_owned(), None),
        (Method::POST, "/api/communities".to_owned(), Some(json!({ "name": "X" }))),
        (Method::GET, "/api/notifications".to_owned(), None),
        (Method::GET, format!("/api/admin/communities/{id}/stats"), None),
        (Method::GET, format!("/api/communities/{id}/polls"), None),
        (
            Method::POST,
            format!("/api/polls/{id}/vote"),
            Some(json!({ "option_ids": [id] })),
        ),
        (Method::GET, "/api/conversations".to_owned(), None),
        (Method::POST, "/api/ai/classify".to_owned(), Some(json!({ "text": "leak" }))),
        (Method::GET, "/api/gifs/search?q=cat".to_owned(), None),
        (Method::GET, "/api/verification".to_owned(), None),
    ];

    for (method, uri, body) in routes {
        let response = app.request(method.clone(), &uri, body, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert!(response.body["error"].is_string());
    }

    // A forged cookie is no better than none
    let response = app
        .get("/api/user/me", "neighborly_session=deadbeef")
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_reject_residents_and_strangers() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let resident = app.sign_up("res@example.com", "Rae Resident").await;
    let stranger = app.sign_up("stranger@example.com", "Sam Stranger").await;

    let (community, code) = app.create_community(&admin, "Elm Street").await;
    app.join(&resident, &code).await;

    let admin_routes = [
        format!("/api/admin/communities/{community}/stats"),
        format!("/api/admin/communities/{community}/verifications"),
        format!("/api/admin/communities/{community}/members"),
        format!("/api/communities/{community}/feedback"),
    ];
    for uri in &admin_routes {
        assert_eq!(app.get(uri, &resident).await.status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(app.get(uri, &stranger).await.status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(app.get(uri, &admin).await.status, StatusCode::OK, "{uri}");
    }

    let response = app
        .post(
            &format!("/api/communities/{community}/announcements"),
            json!({ "title": "Water off", "body": "Tuesday 9-11" }),
            &resident,
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // Members-only reads are closed to strangers but open to residents
    let members = format!("/api/communities/{community}/members");
    assert_eq!(app.get(&members, &stranger).await.status, StatusCode::FORBIDDEN);
    assert_eq!(app.get(&members, &resident).await.status, StatusCode::OK);
}

#[tokio::test]
async fn poll_votes_follow_the_selection_rules() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let resident = app.sign_up("res@example.com", "Rae Resident").await;
    let (community, code) = app.create_community(&admin, "Elm Street").await;
    app.join(&resident, &code).await;

    let single = app
        .post(
            &format!("/api/communities/{community}/polls"),
            json!({ "question": "Party date?", "options": ["Friday", "Saturday"] }),
            &admin,
        )
        .await;
    assert_eq!(single.status, StatusCode::CREATED, "{}", single.body);
    let single_id = single.body["id"].as_str().unwrap().to_owned();
    let both: Vec<&str> = single.body["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap())
        .collect();

    let response = app
        .post(
            &format!("/api/polls/{single_id}/vote"),
            json!({ "option_ids": both }),
            &resident,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .post(
            &format!("/api/polls/{single_id}/vote"),
            json!({ "option_ids": [] }),
            &resident,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .post(
            &format!("/api/polls/{single_id}/vote"),
            json!({ "option_ids": [Uuid::new_v4()] }),
            &resident,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // Multi-select: a re-vote replaces the whole earlier ballot
    let multi = app
        .post(
            &format!("/api/communities/{community}/polls"),
            json!({
                "question": "Which amenities?",
                "options": ["Pool", "Gym", "Garden"],
                "allow_multiple": true
            }),
            &admin,
        )
        .await;
    assert_eq!(multi.status, StatusCode::CREATED);
    let multi_id = multi.body["id"].as_str().unwrap().to_owned();
    let options: Vec<String> = multi.body["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap().to_owned())
        .collect();

    let first = app
        .post(
            &format!("/api/polls/{multi_id}/vote"),
            json!({ "option_ids": [options[0], options[1]] }),
            &resident,
        )
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["my_votes"].as_array().unwrap().len(), 2);

    let second = app
        .post(
            &format!("/api/polls/{multi_id}/vote"),
            json!({ "option_ids": [options[2]] }),
            &resident,
        )
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["my_votes"], json!([options[2]]));
    assert_eq!(second.body["voters"], 1);

    let resident_id = Uuid::parse_str(&app.user_id(&resident).await).unwrap();
    let poll_id = Uuid::parse_str(&multi_id).unwrap();
    assert_eq!(app.store.count_user_votes(poll_id, resident_id).await.unwrap(), 1);
}

#[tokio::test]
async fn guests_cannot_vote() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let guest = app.sign_up("guest@example.com", "Gil Guest").await;
    let (community, code) = app.create_community(&admin, "Elm Street").await;
    app.join(&guest, &code).await;
    let guest_id = app.user_id(&guest).await;

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/communities/{community}/members/{guest_id}"),
            Some(json!({ "role": "Guest" })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);

    let poll = app
        .post(
            &format!("/api/communities/{community}/polls"),
            json!({ "question": "Paint color?", "options": ["Blue", "Green"] }),
            &admin,
        )
        .await;
    let poll_id = poll.body["id"].as_str().unwrap();
    let option = poll.body["options"][0]["id"].as_str().unwrap();

    let response = app
        .post(
            &format!("/api/polls/{poll_id}/vote"),
            json!({ "option_ids": [option] }),
            &guest,
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // Read access remains
    let response = app
        .get(&format!("/api/communities/{community}/polls"), &guest)
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn repeated_classification_is_cached() {
    let app = TestApp::new();
    let user = app.sign_up("someone@example.com", "Some One").await;
    let text = json!({ "text": "The elevator is broken and there is a leak" });

    let first = app.post("/api/ai/classify", text.clone(), &user).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["cached"], false);
    assert_eq!(first.body["category"], "maintenance");

    let second = app.post("/api/ai/classify", text, &user).await;
    assert_eq!(second.body["cached"], true);
    assert_eq!(second.body["category"], first.body["category"]);
    assert_eq!(second.body["confidence"], first.body["confidence"]);

    // Whitespace and case differences share the cache row
    let third = app
        .post(
            "/api/ai/classify",
            json!({ "text": "the ELEVATOR is broken   and there is a leak" }),
            &user,
        )
        .await;
    assert_eq!(third.body["cached"], true);

    let sentiment = app
        .post("/api/ai/sentiment", json!({ "text": "great and friendly" }), &user)
        .await;
    assert_eq!(sentiment.body["cached"], false);
    assert_eq!(sentiment.body["sentiment"], "positive");
}

#[tokio::test]
async fn deleted_accounts_report_deleted_status() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let leaving = app.sign_up("leaving@example.com", "Lee Leaving").await;
    let (community, code) = app.create_community(&admin, "Elm Street").await;
    app.join(&leaving, &code).await;

    let user_id = Uuid::parse_str(&app.user_id(&leaving).await).unwrap();
    let community_id = Uuid::parse_str(&community).unwrap();

    let response = app.get("/api/user/status", &leaving).await;
    assert_eq!(response.body["status"], "unverified");

    let response = app
        .request(Method::DELETE, "/api/user/account", None, Some(&leaving))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["deleted"], true);

    assert!(app.store.find_user(user_id).await.unwrap().is_none());
    assert!(app
        .store
        .find_membership(community_id, user_id)
        .await
        .unwrap()
        .is_none());

    let response = app.get("/api/user/status", &leaving).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "deleted");

    // Routes that need the user row now refuse the session
    assert_eq!(
        app.get("/api/user/me", &leaving).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn join_codes_match_case_insensitively() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let (community, code) = app.create_community(&admin, "Elm Street").await;

    for candidate in [code.clone(), code.to_lowercase(), format!("  {}  ", code.to_lowercase())] {
        let response = app
            .request(
                Method::POST,
                "/api/communities/validate-code",
                Some(json!({ "code": candidate })),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["valid"], true, "{candidate:?}");
        assert_eq!(response.body["community"]["id"], community.as_str());
    }

    for candidate in ["NOPE1234", "x", ""] {
        let response = app
            .request(
                Method::POST,
                "/api/communities/validate-code",
                Some(json!({ "code": candidate })),
                None,
            )
            .await;
        assert_eq!(response.body["valid"], false, "{candidate:?}");
        assert!(response.body["community"].is_null());
    }

    // Joining with a lowercase code works too
    let resident = app.sign_up("res@example.com", "Rae Resident").await;
    app.join(&resident, &code.to_lowercase()).await;

    // A second join conflicts
    let response = app
        .post("/api/communities/join", json!({ "code": code }), &resident)
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn login_rejects_wrong_codes() {
    let app = TestApp::new();
    app.sign_up("someone@example.com", "Some One").await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "someone@example.com" })),
            None,
        )
        .await;
    assert_eq!(response.body["sent"], true);

    let code = app.login_code("someone@example.com").await;
    let wrong = if code == "000000" { "111111" } else { "000000" };
    let response = app
        .request(
            Method::POST,
            "/api/auth/verify",
            Some(json!({ "email": "someone@example.com", "code": wrong })),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    // Unknown emails get the same answer and no email
    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "nobody@example.com" })),
            None,
        )
        .await;
    assert_eq!(response.body["sent"], true);
    assert!(app.mailer.last_to("nobody@example.com").await.is_none());

    // Duplicate signup conflicts
    let response = app
        .request(
            Method::POST,
            "/api/auth/signup",
            Some(json!({ "email": "SOMEONE@example.com", "full_name": "Again" })),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn logout_clears_the_session() {
    let app = TestApp::new();
    let cookie = app.sign_up("someone@example.com", "Some One").await;

    let response = app
        .request(Method::POST, "/api/auth/logout", None, Some(&cookie))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let set_cookie = response.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.contains("Max-Age=0"));

    assert_eq!(
        app.get("/api/auth/session", &cookie).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn verification_review_flow() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let applicant = app.sign_up("new@example.com", "Nia New").await;
    let (community, code) = app.create_community(&admin, "Elm Street").await;
    app.join(&applicant, &code).await;

    let upload = json!({
        "document_type": "passport",
        "content_type": "image/png",
        "content_base64": "iVBORw0KGgo="
    });
    let submitted = app.post("/api/verification", upload.clone(), &applicant).await;
    assert_eq!(submitted.status, StatusCode::CREATED, "{}", submitted.body);
    assert_eq!(submitted.body["status"], "pending");
    assert!(submitted.body.get("document_key").is_none());
    assert_eq!(app.storage.len().await, 1);

    let again = app.post("/api/verification", upload, &applicant).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let status = app.get("/api/user/status", &applicant).await;
    assert_eq!(status.body["status"], "pending");

    // The admin was notified and sees the request
    let notifications = app.get("/api/notifications?unread=true", &admin).await;
    assert_eq!(
        notifications.body[0]["kind"],
        "verification_submitted",
        "{}",
        notifications.body
    );
    let pending = app
        .get(
            &format!("/api/admin/communities/{community}/verifications?status=pending"),
            &admin,
        )
        .await;
    assert_eq!(pending.body.as_array().unwrap().len(), 1);
    assert_eq!(pending.body[0]["email"], "new@example.com");

    let verification_id = submitted.body["id"].as_str().unwrap();

    // Residents cannot review
    let response = app
        .post(
            &format!("/api/admin/verifications/{verification_id}/review"),
            json!({ "decision": "approve" }),
            &applicant,
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let reviewed = app
        .post(
            &format!("/api/admin/verifications/{verification_id}/review"),
            json!({ "decision": "approve" }),
            &admin,
        )
        .await;
    assert_eq!(reviewed.status, StatusCode::OK, "{}", reviewed.body);
    assert_eq!(reviewed.body["status"], "approved");
    assert!(reviewed.body["approved_at"].is_string());

    let status = app.get("/api/user/status", &applicant).await;
    assert_eq!(status.body["status"], "approved");

    let email = app.mailer.last_to("new@example.com").await.unwrap();
    assert!(email.subject.contains("verified"));

    let twice = app
        .post(
            &format!("/api/admin/verifications/{verification_id}/review"),
            json!({ "decision": "reject" }),
            &admin,
        )
        .await;
    assert_eq!(twice.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn conversations_are_private_to_participants() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let alice = app.sign_up("alice@example.com", "Alice").await;
    let bob = app.sign_up("bob@example.com", "Bob").await;
    let (community, code) = app.create_community(&admin, "Elm Street").await;
    app.join(&alice, &code).await;
    app.join(&bob, &code).await;
    let alice_id = app.user_id(&alice).await;

    let created = app
        .post(
            "/api/conversations",
            json!({ "community_id": community, "participant_ids": [alice_id] }),
            &admin,
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    let conversation = created.body["id"].as_str().unwrap().to_owned();
    let messages = format!("/api/conversations/{conversation}/messages");

    let empty = app.post(&messages, json!({}), &admin).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let sent = app.post(&messages, json!({ "body": "Hello Alice" }), &admin).await;
    assert_eq!(sent.status, StatusCode::CREATED);

    assert_eq!(app.get(&messages, &bob).await.status, StatusCode::FORBIDDEN);
    assert_eq!(
        app.post(&messages, json!({ "body": "hi" }), &bob).await.status,
        StatusCode::FORBIDDEN
    );

    let listed = app.get("/api/conversations", &alice).await;
    assert_eq!(listed.body[0]["unread_count"], 1);

    let read = app
        .post(&format!("/api/conversations/{conversation}/read"), json!({}), &alice)
        .await;
    assert_eq!(read.status, StatusCode::OK);
    let listed = app.get("/api/conversations", &alice).await;
    assert_eq!(listed.body[0]["unread_count"], 0);
}

#[tokio::test]
async fn last_admin_cannot_leave() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let (community, _) = app.create_community(&admin, "Elm Street").await;
    let admin_id = app.user_id(&admin).await;

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/communities/{community}/members/{admin_id}"),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/communities/{community}/members/{admin_id}"),
            Some(json!({ "role": "Resident" })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn feedback_stores_sentiment() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let (community, _) = app.create_community(&admin, "Elm Street").await;

    let response = app
        .post(
            "/api/feedback",
            json!({
                "community_id": community,
                "category": "Amenities",
                "message": "The gym is terrible and dirty",
                "rating": 2
            }),
            &admin,
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    assert_eq!(response.body["sentiment"], "negative");

    let response = app
        .post(
            "/api/feedback",
            json!({ "community_id": community, "category": "x", "message": "ok", "rating": 9 }),
            &admin,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let listed = app
        .get(&format!("/api/communities/{community}/feedback"), &admin)
        .await;
    assert_eq!(listed.body["total"], 1);
}

#[tokio::test]
async fn gif_search_without_key_is_unavailable() {
    let app = TestApp::new();
    let user = app.sign_up("someone@example.com", "Some One").await;
    let response = app.get("/api/gifs/search?q=cats", &user).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn code_validation_is_rate_limited() {
    let app = TestApp::with_config(ServerConfig {
        rate_limit: RateLimitConfig {
            max_requests: 2,
            ..RateLimitConfig::default()
        },
        ..ServerConfig::default()
    });

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = app
            .request(
                Method::POST,
                "/api/communities/validate-code",
                Some(json!({ "code": "ABCD1234" })),
                None,
            )
            .await;
        statuses.push(response.status);
        if response.status == StatusCode::TOO_MANY_REQUESTS {
            assert!(response.headers.contains_key(header::RETRY_AFTER));
        }
    }
    assert_eq!(
        statuses,
        [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );

    // Health is never limited
    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn complaints_are_scoped_by_role() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let alice = app.sign_up("alice@example.com", "Alice").await;
    let bob = app.sign_up("bob@example.com", "Bob").await;
    let (community, code) = app.create_community(&admin, "Elm Street").await;
    app.join(&alice, &code).await;
    app.join(&bob, &code).await;

    let complaints = format!("/api/communities/{community}/complaints");
    let filed = app
        .post(
            &complaints,
            json!({ "title": "Loud music", "description": "Noise every night, very loud" }),
            &alice,
        )
        .await;
    assert_eq!(filed.status, StatusCode::CREATED);
    assert_eq!(filed.body["category"], "noise");

    assert_eq!(app.get(&complaints, &alice).await.body.as_array().unwrap().len(), 1);
    assert_eq!(app.get(&complaints, &bob).await.body.as_array().unwrap().len(), 0);
    assert_eq!(app.get(&complaints, &admin).await.body.as_array().unwrap().len(), 1);

    let id = filed.body["id"].as_str().unwrap();
    let response = app
        .request(
            Method::PATCH,
            &format!("/api/complaints/{id}"),
            Some(json!({ "status": "in_progress" })),
            Some(&alice),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/complaints/{id}"),
            Some(json!({ "status": "resolved" })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "resolved");

    let notifications = app.get("/api/notifications", &alice).await;
    assert_eq!(notifications.body[0]["kind"], "complaint_updated");
}

#[tokio::test]
async fn admins_cannot_review_their_own_verification() {
    let app = TestApp::new();
    let me = app.sign_up("me@example.com", "Mia Me").await;
    let (community, code) = app.create_community(&me, "My Own Street").await;

    let submitted = app
        .post(
            "/api/verification",
            json!({
                "document_type": "passport",
                "content_type": "image/png",
                "content_base64": "iVBORw0KGgo="
            }),
            &me,
        )
        .await;
    assert_eq!(submitted.status, StatusCode::CREATED, "{}", submitted.body);
    let verification_id = submitted.body["id"].as_str().unwrap();

    let response = app
        .post(
            &format!("/api/admin/verifications/{verification_id}/review"),
            json!({ "decision": "approve" }),
            &me,
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let response = app
        .get(
            &format!("/api/admin/verifications/{verification_id}/document"),
            &me,
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(app.get("/api/user/status", &me).await.body["status"], "pending");

    // A second admin of the same community can
    let other = app.sign_up("other@example.com", "Ola Other").await;
    app.join(&other, &code).await;
    let other_id = app.user_id(&other).await;
    let promoted = app
        .request(
            Method::PATCH,
            &format!("/api/communities/{community}/members/{other_id}"),
            Some(json!({ "role": "Admin" })),
            Some(&me),
        )
        .await;
    assert_eq!(promoted.status, StatusCode::OK, "{}", promoted.body);

    let reviewed = app
        .post(
            &format!("/api/admin/verifications/{verification_id}/review"),
            json!({ "decision": "approve" }),
            &other,
        )
        .await;
    assert_eq!(reviewed.status, StatusCode::OK, "{}", reviewed.body);
    assert_eq!(app.get("/api/user/status", &me).await.body["status"], "approved");
}

#[tokio::test]
async fn sole_admin_cannot_delete_their_account() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let resident = app.sign_up("res@example.com", "Rae Resident").await;
    let (community, code) = app.create_community(&admin, "Elm Street").await;
    app.join(&resident, &code).await;

    let response = app
        .request(Method::DELETE, "/api/user/account", None, Some(&admin))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("Elm Street"));
    assert_eq!(app.get("/api/user/status", &admin).await.body["status"], "unverified");

    let members = app
        .get(&format!("/api/communities/{community}/members"), &resident)
        .await;
    assert_eq!(members.body.as_array().unwrap().len(), 2);

    // Once someone else holds the role the account can go
    let resident_id = app.user_id(&resident).await;
    let promoted = app
        .request(
            Method::PATCH,
            &format!("/api/communities/{community}/members/{resident_id}"),
            Some(json!({ "role": "Admin" })),
            Some(&admin),
        )
        .await;
    assert_eq!(promoted.status, StatusCode::OK, "{}", promoted.body);

    let response = app
        .request(Method::DELETE, "/api/user/account", None, Some(&admin))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);

    let members = app
        .get(&format!("/api/communities/{community}/members"), &resident)
        .await;
    assert_eq!(members.body.as_array().unwrap().len(), 1);
    assert_eq!(members.body[0]["role"], "Admin");
}

#[tokio::test]
async fn admin_alone_in_a_community_can_delete_their_account() {
    let app = TestApp::new();
    let solo = app.sign_up("solo@example.com", "Sol Solo").await;
    app.create_community(&solo, "Quiet Lane").await;

    let response = app
        .request(Method::DELETE, "/api/user/account", None, Some(&solo))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(app.get("/api/user/status", &solo).await.body["status"], "deleted");
}

#[tokio::test]
async fn announcements_are_admin_posted_and_pinned_first() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let resident = app.sign_up("res@example.com", "Rae Resident").await;
    let stranger = app.sign_up("stranger@example.com", "Sam Stranger").await;
    let (community, code) = app.create_community(&admin, "Elm Street").await;
    app.join(&resident, &code).await;
    let announcements = format!("/api/communities/{community}/announcements");

    let response = app
        .post(&announcements, json!({ "title": "Party", "body": "Tonight" }), &resident)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .post(&announcements, json!({ "title": "", "body": "No title" }), &admin)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    for (title, pinned) in [("Water off", false), ("Board meeting", true), ("Pool open", false)] {
        let response = app
            .post(
                &announcements,
                json!({ "title": title, "body": "Details inside", "pinned": pinned }),
                &admin,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    }

    let listed = app.get(&announcements, &resident).await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body["total"], 3);
    let titles: Vec<&str> = listed.body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Board meeting", "Pool open", "Water off"]);

    assert_eq!(app.get(&announcements, &stranger).await.status, StatusCode::FORBIDDEN);

    // Members hear about it; the author does not
    let notifications = app.get("/api/notifications", &resident).await;
    let kinds: Vec<&str> = notifications
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.iter().filter(|k| **k == "announcement").count(), 3);
    let notifications = app.get("/api/notifications", &admin).await;
    assert!(notifications
        .body
        .as_array()
        .unwrap()
        .iter()
        .all(|n| n["kind"] != "announcement"));
}

#[tokio::test]
async fn event_stream_is_scoped_to_the_community() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let stranger = app.sign_up("stranger@example.com", "Sam Stranger").await;
    let (community, _) = app.create_community(&admin, "Elm Street").await;
    let events = format!("/api/communities/{community}/events");

    assert_eq!(app.get(&events, &stranger).await.status, StatusCode::FORBIDDEN);

    let response = app.open_stream(&events, &admin).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let mut body = response.into_body().into_data_stream();

    let elsewhere = Uuid::new_v4();
    let here = Uuid::parse_str(&community).unwrap();
    let foreign_poll = Uuid::new_v4();
    let our_poll = Uuid::new_v4();
    app.state
        .feed
        .publish(ChangeEvent::new(elsewhere, "polls", ChangeAction::Insert, foreign_poll));
    app.state
        .feed
        .publish(ChangeEvent::new(here, "polls", ChangeAction::Insert, our_poll));

    let frame = next_frame(&mut body).await.expect("stream ended early");
    assert!(frame.contains("event: change"), "{frame}");
    assert!(frame.contains(&our_poll.to_string()), "{frame}");
    assert!(!frame.contains(&foreign_poll.to_string()), "{frame}");
}

#[tokio::test]
async fn removed_members_stop_receiving_events() {
    let app = TestApp::new();
    let admin = app.sign_up("admin@example.com", "Ada Admin").await;
    let resident = app.sign_up("res@example.com", "Rae Resident").await;
    let (community, code) = app.create_community(&admin, "Elm Street").await;
    app.join(&resident, &code).await;
    let resident_id = app.user_id(&resident).await;

    let response = app
        .open_stream(&format!("/api/communities/{community}/events"), &resident)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body().into_data_stream();

    let removed = app
        .request(
            Method::DELETE,
            &format!("/api/communities/{community}/members/{resident_id}"),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(removed.status, StatusCode::OK, "{}", removed.body);

    let here = Uuid::parse_str(&community).unwrap();
    app.state
        .feed
        .publish(ChangeEvent::new(here, "polls", ChangeAction::Insert, Uuid::new_v4()));

    assert_eq!(next_frame(&mut body).await, None);
}

#[tokio::test]
async fn health_reports_the_store() {
    let app = TestApp::new();
    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["store"], "ok");
}
