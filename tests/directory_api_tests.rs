mod common;

use axum::http::{Method, StatusCode};
use common::{get, request, seeded_app, send};
use serde_json::{Value, json};

async fn create_area(app: &common::TestApp, cast: &common::Cast, name: &str) -> i64 {
    let req = request(
        Method::POST,
        "/areas",
        Some(cast.reviewer),
        Some(json!({"name": name, "description": null})),
    );
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

fn names(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

// --- Areas ---

#[tokio::test]
async fn test_only_reviewers_create_areas() {
    let (app, cast) = seeded_app().await;
    let id = create_area(&app, &cast, "Informática").await;

    let req = request(Method::POST, "/areas", Some(cast.company), Some(json!({"name": "Gestão"})));
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = request(Method::POST, "/areas", Some(cast.reviewer), Some(json!({"name": "   "})));
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app.router, get(&format!("/areas/{id}"), cast.student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Informática");

    let (_, body) = send(&app.router, get("/areas", cast.company)).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app.router, get("/areas/999", cast.company)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// --- Students ---

#[tokio::test]
async fn test_student_updates_own_profile_with_areas() {
    let (app, cast) = seeded_app().await;
    let area = create_area(&app, &cast, "Informática").await;

    let req = request(
        Method::PUT,
        "/students/me",
        Some(cast.student),
        Some(json!({
            "degree": "Licenciatura",
            "year": 3,
            "availability": "estagio",
            "area_ids": [area]
        })),
    );
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["degree"], "Licenciatura");
    assert_eq!(body["areas"][0]["id"], area);
    // Untouched fields survive a partial update.
    assert_eq!(body["share_consent"], true);
    assert_eq!(body["name"], "Ana Silva");

    let req = request(Method::PUT, "/students/me", Some(cast.student), Some(json!({"year": 0})));
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = request(
        Method::PUT,
        "/students/me",
        Some(cast.student),
        Some(json!({"area_ids": [area, 987654]})),
    );
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("987654"));

    let req = request(
        Method::PUT,
        "/companies/me",
        Some(cast.company),
        Some(json!({"area_ids": [987654]})),
    );
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = request(Method::PUT, "/students/me", Some(cast.company), Some(json!({"year": 2})));
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_student_directory_visibility() {
    let (app, cast) = seeded_app().await;

    let (status, body) = send(&app.router, get("/students", cast.reviewer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), vec!["Ana Silva", "Rui Costa"]);

    // Companies never see students without consent.
    let (_, body) = send(&app.router, get("/students", cast.company)).await;
    assert_eq!(names(&body), vec!["Ana Silva"]);

    let (status, _) = send(&app.router, get("/students", cast.student)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/students/{}", cast.other_student);
    let (status, _) = send(&app.router, get(&uri, cast.company)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app.router, get(&uri, cast.reviewer)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app.router, get(&uri, cast.student)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app.router, get("/students/me", cast.other_student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["share_consent"], false);
}

#[tokio::test]
async fn test_student_filters() {
    let (app, cast) = seeded_app().await;
    let area = create_area(&app, &cast, "Engenharia Informática").await;

    for (user, degree, year, availability, areas) in [
        (cast.student, "Licenciatura", 3, "Estagio", vec![area]),
        (cast.other_student, "Mestrado", 1, "emprego", vec![]),
    ] {
        let req = request(
            Method::PUT,
            "/students/me",
            Some(user),
            Some(json!({
                "degree": degree,
                "year": year,
                "availability": availability,
                "area_ids": areas
            })),
        );
        let (status, _) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    let cases = [
        ("/students?grau=licenciatura", vec!["Ana Silva"]),
        ("/students?grau_in=MESTRADO,doutoramento", vec!["Rui Costa"]),
        ("/students?ano_min=2&ano_max=4", vec!["Ana Silva"]),
        ("/students?disponibilidade=estagio", vec!["Ana Silva"]),
        ("/students?disponibilidade_in=emprego,projeto", vec!["Rui Costa"]),
        ("/students?area_nome=inform%C3%A1tica", vec!["Ana Silva"]),
    ];
    for (uri, expected) in cases {
        let (status, body) = send(&app.router, get(uri, cast.reviewer)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(names(&body), expected, "{uri}");
    }

    let uri = format!("/students?area={area}");
    let (_, body) = send(&app.router, get(&uri, cast.reviewer)).await;
    assert_eq!(names(&body), vec!["Ana Silva"]);
}

// --- Companies ---

#[tokio::test]
async fn test_company_profile() {
    let (app, cast) = seeded_app().await;

    let req = request(
        Method::PUT,
        "/companies/me",
        Some(cast.company),
        Some(json!({"location": "Lisboa", "website": "https://xpto.pt"})),
    );
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["location"], "Lisboa");
    assert_eq!(body["name"], "Empresa XPTO");

    let (_, body) = send(&app.router, get("/companies", cast.student)).await;
    assert_eq!(body["count"], 1);

    let uri = format!("/companies/{}", cast.company);
    let (status, body) = send(&app.router, get(&uri, cast.student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["website"], "https://xpto.pt");

    let (status, _) = send(&app.router, get("/companies/me", cast.student)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_far_away_page_is_empty() {
    let (app, cast) = seeded_app().await;

    for uri in [
        "/companies?page=50000000&page_size=100",
        "/students?page=4294967295&page_size=100",
        "/jobs?page=4294967295",
    ] {
        let (status, body) = send(&app.router, get(uri, cast.reviewer)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert!(body["results"].as_array().unwrap().is_empty(), "{uri}");
        assert!(body["next"].is_null(), "{uri}");
    }
}

// --- Job Postings ---

#[tokio::test]
async fn test_job_posting_lifecycle() {
    let (app, cast) = seeded_app().await;
    let area = create_area(&app, &cast, "Informática").await;

    let payload = json!({
        "name": "Estágio Backend",
        "description": "Rust e Postgres",
        "opportunity": "estagio",
        "area_ids": [area]
    });
    let req = request(Method::POST, "/jobs", Some(cast.company), Some(payload.clone()));
    let (status, job) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["company_id"], cast.company.to_string());
    assert_eq!(job["views"], 0);
    let id = job["id"].as_i64().unwrap();

    // Names are unique.
    let req = request(Method::POST, "/jobs", Some(cast.company), Some(payload));
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let req = request(
        Method::POST,
        "/jobs",
        Some(cast.student),
        Some(json!({"name": "X", "opportunity": "emprego"})),
    );
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Every read counts as a view.
    let uri = format!("/jobs/{id}");
    send(&app.router, get(&uri, cast.student)).await;
    let (_, body) = send(&app.router, get(&uri, cast.reviewer)).await;
    assert_eq!(body["views"], 2);

    let req = request(Method::PUT, &uri, Some(cast.company), Some(json!({"opportunity": "emprego"})));
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["opportunity"], "emprego");
    assert_eq!(body["name"], "Estágio Backend");

    let (status, _) = send(&app.router, request(Method::DELETE, &uri, Some(cast.student), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app.router, request(Method::DELETE, &uri, Some(cast.reviewer), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app.router, get(&uri, cast.student)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_only_owner_company_edits_posting() {
    let (app, cast) = seeded_app().await;
    let rival = uuid::Uuid::new_v4();
    app.repo.seed_company(rival, "Rival").await;

    let req = request(
        Method::POST,
        "/jobs",
        Some(cast.company),
        Some(json!({"name": "Consultor", "opportunity": "emprego"})),
    );
    let (_, job) = send(&app.router, req).await;
    let uri = format!("/jobs/{}", job["id"]);

    // The rival is unknown to the identity service, so it never gets past auth.
    let req = request(Method::PUT, &uri, Some(rival), Some(json!({"name": "Hijack"})));
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = request(Method::PUT, &uri, Some(cast.reviewer), Some(json!({"name": "Hijack"})));
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = request(Method::PUT, "/jobs/9999", Some(cast.company), Some(json!({"name": "Nope"})));
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_job_filters() {
    let (app, cast) = seeded_app().await;
    let area = create_area(&app, &cast, "Dados").await;

    for (name, opportunity, areas) in [
        ("Analista de Dados", "emprego", vec![area]),
        ("Estágio Frontend", "estagio", vec![]),
        ("Projeto Robótica", "projeto", vec![]),
    ] {
        let req = request(
            Method::POST,
            "/jobs",
            Some(cast.company),
            Some(json!({"name": name, "opportunity": opportunity, "area_ids": areas})),
        );
        let (status, _) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = send(&app.router, get("/jobs?oportunidade=estagio", cast.student)).await;
    assert_eq!(names(&body), vec!["Estágio Frontend"]);

    let (_, body) = send(&app.router, get(&format!("/jobs?area={area}"), cast.student)).await;
    assert_eq!(names(&body), vec!["Analista de Dados"]);

    let (_, body) = send(&app.router, get("/jobs?search=ROB%C3%93TICA", cast.student)).await;
    assert_eq!(names(&body), vec!["Projeto Robótica"]);
    let (_, body) = send(&app.router, get("/jobs?search=marketing", cast.student)).await;
    assert_eq!(body["count"], 0);

    let uri = format!("/jobs?empresa={}&page_size=2", cast.company);
    let (_, body) = send(&app.router, get(&uri, cast.student)).await;
    assert_eq!(body["count"], 3);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["next"], 2);
}
