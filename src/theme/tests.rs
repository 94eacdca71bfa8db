//! Tests for the template engine

use super::*;
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use tera::Context as TeraContext;

fn vars() -> StandardTemplateVars {
    StandardTemplateVars::new("Blogicum", "/")
}

fn empty_page() -> serde_json::Value {
    json!({ "items": [], "total": 0, "page": 1, "per_page": 10 })
}

fn paginator(total_pages: u32) -> serde_json::Value {
    json!({
        "page": 1,
        "total_pages": total_pages,
        "has_prev": false,
        "has_next": total_pages > 1,
        "prev_page": 0,
        "next_page": 2,
    })
}

#[test]
fn test_embedded_templates_load() {
    let engine = ThemeEngine::new(None).unwrap();

    for name in [
        "base.html",
        "blog/index.html",
        "blog/detail.html",
        "blog/create.html",
        "blog/comment.html",
        "registration/login.html",
        "pages/404.html",
        "pages/500.html",
        "pages/403csrf.html",
    ] {
        assert!(engine.has_template(name), "missing template {}", name);
    }
}

#[test]
fn test_standard_vars_are_injected() {
    let engine = ThemeEngine::new(None).unwrap();

    let html = engine
        .render_with_standard_vars("pages/about.html", &TeraContext::new(), &vars())
        .unwrap();

    assert!(html.contains("Blogicum"));
    assert!(html.contains(&chrono::Utc::now().year().to_string()));
    assert!(html.contains("/auth/login/"));
}

#[test]
fn test_current_user_switches_navigation() {
    let engine = ThemeEngine::new(None).unwrap();
    let user = User::new(
        "ada".to_string(),
        "ada@example.com".to_string(),
        "Ada".to_string(),
        "Lovelace".to_string(),
        "hash".to_string(),
        crate::models::UserRole::Author,
    );

    let html = engine
        .render_with_standard_vars(
            "pages/rules.html",
            &TeraContext::new(),
            &vars().with_user(Some(&user)),
        )
        .unwrap();

    assert!(html.contains("/profile/ada/"));
    assert!(html.contains("Ada Lovelace"));
    assert!(html.contains("/auth/logout/"));
    assert!(!html.contains("/auth/registration/\">Sign up"));
}

#[test]
fn test_index_renders_posts_escaped() {
    let engine = ThemeEngine::new(None).unwrap();
    let mut context = TeraContext::new();
    context.insert(
        "page",
        &json!({
            "items": [{
                "id": 7,
                "title": "<script>alert(1)</script>",
                "text": "line one\nline two",
                "image": null,
                "pub_date": "2024-05-01T10:00:00Z",
                "is_published": true,
                "created_at": "2024-05-01T10:00:00Z",
                "author_id": 1,
                "location_id": null,
                "category_id": null,
                "author": { "id": 1, "username": "ada", "first_name": "", "last_name": "" },
                "location": null,
                "category": null,
                "comment_count": 3
            }],
            "total": 1,
            "page": 1,
            "per_page": 10
        }),
    );
    context.insert("paginator", &paginator(1));

    let html = engine
        .render_with_standard_vars("blog/index.html", &context, &vars())
        .unwrap();

    assert!(html.contains("/posts/7/"));
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<script>"));
    assert!(html.contains("line one<br>line two"));
    assert!(html.contains("Comments (3)"));
    assert!(html.contains("01 May 2024"));
}

#[test]
fn test_paginator_only_with_several_pages() {
    let engine = ThemeEngine::new(None).unwrap();
    let mut context = TeraContext::new();
    context.insert("page", &empty_page());

    context.insert("paginator", &paginator(1));
    let single = engine
        .render_with_standard_vars("blog/index.html", &context, &vars())
        .unwrap();
    assert!(!single.contains("?page=2"));
    assert!(single.contains("No posts yet."));

    context.insert("paginator", &paginator(3));
    let several = engine
        .render_with_standard_vars("blog/index.html", &context, &vars())
        .unwrap();
    assert!(several.contains("?page=2"));
    assert!(several.contains("Page 1 of 3"));
}

#[test]
fn test_form_errors_are_rendered() {
    let engine = ThemeEngine::new(None).unwrap();
    let mut context = TeraContext::new();
    context.insert(
        "form",
        &json!({
            "values": { "username": "ada" },
            "errors": { "password": ["Wrong password"] },
            "non_field_errors": ["Please enter a correct username and password"]
        }),
    );
    context.insert("next", "/posts/create/");

    let html = engine
        .render_with_standard_vars("registration/login.html", &context, &vars())
        .unwrap();

    assert!(html.contains("Wrong password"));
    assert!(html.contains("Please enter a correct username and password"));
    assert!(html.contains("value=\"&#x2F;posts&#x2F;create&#x2F;\""));
    assert!(html.contains("value=\"ada\""));
}

#[test]
fn test_override_directory_replaces_template() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("pages")).unwrap();
    fs::write(
        dir.path().join("pages/about.html"),
        r#"{% extends "base.html" %}{% block content %}Custom about for {{ site_name }}{% endblock content %}"#,
    )
    .unwrap();

    let engine = ThemeEngine::new(Some(dir.path())).unwrap();
    let html = engine
        .render_with_standard_vars("pages/about.html", &TeraContext::new(), &vars())
        .unwrap();

    assert!(html.contains("Custom about for Blogicum"));
    assert!(engine.has_template("pages/rules.html"));
}

#[test]
fn test_broken_override_fails_to_load() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("base.html"), "{% block content %}").unwrap();

    assert!(ThemeEngine::new(Some(dir.path())).is_err());
}

#[test]
fn test_render_unknown_template_is_error() {
    let engine = ThemeEngine::new(None).unwrap();
    let err = engine.render("nope.html", &TeraContext::new()).unwrap_err();
    assert!(err.to_string().contains("nope.html"));
}

#[test]
fn test_simple_error_page_escapes() {
    let html = ThemeEngine::simple_error_page("Oops", "<b>broken</b>");
    assert!(html.contains("<h1>Oops</h1>"));
    assert!(html.contains("&lt;b&gt;broken&lt;/b&gt;"));
}
