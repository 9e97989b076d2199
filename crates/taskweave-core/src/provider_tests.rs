//! Provider and template tests

use std::collections::HashMap;

use tempfile::TempDir;

use crate::provider::{
    ExecuteOptions, PromptRequest, ReasoningProvider, ROUTE_METADATA_KEY, ROUTE_TO_CALLER,
};
use crate::templates::{self, FsTemplateLoader, TemplateLoader};

#[tokio::test]
async fn test_current_execution_returns_routing_marker() {
    let provider = ReasoningProvider::CurrentExecution;
    assert!(provider.is_current_execution());

    let response = provider
        .execute(
            PromptRequest::new("summarize the plan"),
            ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "summarize the plan");
    assert_eq!(
        response.metadata.get(ROUTE_METADATA_KEY).and_then(|v| v.as_str()),
        Some(ROUTE_TO_CALLER)
    );
    assert_eq!(response.tokens_used, 0);
}

#[test]
fn test_fs_loader_reads_template_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("greeting.tmpl"), "Hello {{name}}!").unwrap();

    let loader = FsTemplateLoader::new(dir.path());
    assert_eq!(loader.load("greeting").unwrap(), "Hello {{name}}!");
    assert!(loader.load("missing").is_err());
}

#[test]
fn test_load_or_default_falls_back() {
    let dir = TempDir::new().unwrap();
    let loader = FsTemplateLoader::new(dir.path());
    let text = templates::load_or_default(&loader, "missing", "default text");
    assert_eq!(text, "default text");
}

#[test]
fn test_render_substitutes_placeholders() {
    let mut values = HashMap::new();
    values.insert("name", "world".to_string());
    values.insert("count", "3".to_string());

    let rendered = templates::render("{{name}} has {{count}} items, {{unset}}", &values);
    assert_eq!(rendered, "world has 3 items, {{unset}}");
}
