/*!
 * Tests for the GitHub REST client against a mock server
 */

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mockito::{Matcher, Server};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use docglot::errors::PlatformError;
use docglot::github::client::{ContentApi, GitHubClient};
use docglot::github::credentials::{CredentialManager, MemoryTokenCache};
use docglot::github::models::{ChangeStatus, FileWrite, NewPullRequest};

use crate::common::{CountingIssuer, INSTALLATION_ID, manual_clock, repo_ref};

fn client(server: &Server) -> (GitHubClient, Arc<CountingIssuer>) {
    let issuer = Arc::new(CountingIssuer::default());
    let credentials = Arc::new(CredentialManager::new(
        issuer.clone(),
        Arc::new(MemoryTokenCache::default()),
        manual_clock(),
    ));
    (GitHubClient::new(server.url(), credentials, INSTALLATION_ID), issuer)
}

fn path(prefix: &str) -> Matcher {
    Matcher::Regex(format!("^{}", regex::escape(prefix)))
}

#[tokio::test]
async fn test_getFile_shouldDecodeContentAtRef() {
    let mut server = Server::new_async().await;
    let encoded = STANDARD.encode("# Guide\n\nHello");
    let mock = server
        .mock("GET", path("/repos/acme/docs/contents/docs/guide.md"))
        .match_query(Matcher::UrlEncoded("ref".into(), "abc123".into()))
        .match_header("authorization", "token token-42-1")
        .with_status(200)
        .with_body(format!(
            r#"{{"path":"docs/guide.md","sha":"blob1","content":"{}","encoding":"base64"}}"#,
            encoded
        ))
        .create_async()
        .await;

    let (client, _) = client(&server);
    let file = client
        .get_file(&repo_ref(), "docs/guide.md", Some("abc123"))
        .await
        .unwrap()
        .unwrap();

    mock.assert_async().await;
    assert_eq!(file.content, "# Guide\n\nHello");
    assert_eq!(file.sha, "blob1");
}

#[tokio::test]
async fn test_getFile_withMissingFile_shouldReturnNone() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", path("/repos/acme/docs/contents/missing.md"))
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .create_async()
        .await;

    let (client, _) = client(&server);
    assert!(client.get_file(&repo_ref(), "missing.md", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_putFile_shouldSendBase64ContentBranchAndSha() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/repos/acme/docs/contents/translations/fr/README.md")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "content": STANDARD.encode("# Bonjour"),
            "branch": "translation/fr-1",
            "sha": "oldblob",
        })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let (client, _) = client(&server);
    client
        .put_file(
            &repo_ref(),
            &FileWrite {
                path: "translations/fr/README.md".to_string(),
                content: "# Bonjour".to_string(),
                message: "Full translation to French".to_string(),
                sha: Some("oldblob".to_string()),
                branch: "translation/fr-1".to_string(),
            },
        )
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_apiError_shouldCarryStatusAndMessage() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/repos/acme/docs/pulls")
        .with_status(422)
        .with_body(r#"{"message":"Validation Failed"}"#)
        .create_async()
        .await;

    let (client, _) = client(&server);
    let error = client
        .create_pull_request(
            &repo_ref(),
            &NewPullRequest {
                title: "t".into(),
                body: "b".into(),
                head: "translation/fr-1".into(),
                base: "main".into(),
            },
        )
        .await
        .unwrap_err();

    match error {
        PlatformError::Api { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "Validation Failed");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthorized_shouldInvalidateCachedToken() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/docs")
        .with_status(401)
        .with_body(r#"{"message":"Bad credentials"}"#)
        .expect(2)
        .create_async()
        .await;

    let (client, issuer) = client(&server);
    assert!(client.get_repository(&repo_ref()).await.is_err());
    assert!(client.get_repository(&repo_ref()).await.is_err());

    assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_getBranchHead_withSlashInName_shouldReturnSha() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/docs/git/ref/heads/translation/fr-1")
        .with_status(200)
        .with_body(r#"{"ref":"refs/heads/translation/fr-1","object":{"sha":"head1","type":"commit"}}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/repos/acme/docs/git/ref/heads/absent")
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .create_async()
        .await;

    let (client, _) = client(&server);
    assert_eq!(
        client.get_branch_head(&repo_ref(), "translation/fr-1").await.unwrap(),
        Some("head1".to_string())
    );
    assert_eq!(client.get_branch_head(&repo_ref(), "absent").await.unwrap(), None);
}

#[tokio::test]
async fn test_compareCommits_shouldMapStatuses() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/docs/compare/base1...head1")
        .with_status(200)
        .with_body(
            r#"{"files":[
                {"filename":"a.md","status":"added"},
                {"filename":"b.md","status":"copied"},
                {"filename":"c.md","status":"removed"},
                {"filename":"d.md","status":"renamed","previous_filename":"old-d.md"},
                {"filename":"e.md","status":"changed"}
            ]}"#,
        )
        .create_async()
        .await;

    let (client, _) = client(&server);
    let files = client.compare_commits(&repo_ref(), "base1", "head1").await.unwrap();

    let statuses: Vec<ChangeStatus> = files.iter().map(|f| f.status).collect();
    assert_eq!(
        statuses,
        vec![
            ChangeStatus::Added,
            ChangeStatus::Added,
            ChangeStatus::Removed,
            ChangeStatus::Renamed,
            ChangeStatus::Modified,
        ]
    );
    assert_eq!(files[3].previous_path.as_deref(), Some("old-d.md"));
}

#[tokio::test]
async fn test_listTree_shouldRecurseAndSkipNamedDirectories() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Regex("^/repos/acme/docs/contents/?(\\?.*)?$".to_string()))
        .with_status(200)
        .with_body(
            r#"[
                {"name":"README.md","path":"README.md","type":"file","sha":"1"},
                {"name":"docs","path":"docs","type":"dir","sha":"2"},
                {"name":"node_modules","path":"node_modules","type":"dir","sha":"3"}
            ]"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", path("/repos/acme/docs/contents/docs"))
        .with_status(200)
        .with_body(r#"[{"name":"guide.md","path":"docs/guide.md","type":"file","sha":"4"}]"#)
        .create_async()
        .await;

    let (client, _) = client(&server);
    let files = client
        .list_tree(&repo_ref(), Some("head1"), 10, &["node_modules"])
        .await
        .unwrap();

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["README.md", "docs/guide.md"]);
}
