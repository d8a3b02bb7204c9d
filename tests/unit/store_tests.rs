/*!
 * Tests for task and result persistence
 */

use anyhow::Result;
use chrono::Duration;
use tempfile::TempDir;

use docglot::database::models::{NewResult, NewTask, ResultStatus, TaskKind, TaskStatus};
use docglot::database::{DatabaseConnection, Store};

use crate::common::{manual_clock, new_repository, start_time};

fn new_task(repository_id: i64, total_files: i64) -> NewTask {
    NewTask {
        repository_id,
        kind: TaskKind::Incremental,
        target_languages: vec!["fr".to_string(), "ja".to_string()],
        total_files,
        source_sha: Some("c2".to_string()),
    }
}

fn completed(path: &str, language: &str) -> NewResult {
    NewResult::completed(
        path,
        format!("translations/{}/{}", language, path),
        language,
        Some("blob".to_string()),
        "# Source".to_string(),
        format!("# Translated {}", language),
    )
}

#[tokio::test]
async fn test_fileStore_shouldPersistAcrossReopen() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("data").join("docglot.db");

    let task_id = {
        let store = Store::new(DatabaseConnection::new(&path)?, manual_clock());
        let repository = store.add_repository(new_repository(&["fr"])).await?;
        let task = store.create_task(new_task(repository.id, 1)).await?;
        store.record_result(task.id, completed("README.md", "fr")).await?;
        task.id
    };

    let store = Store::new(DatabaseConnection::new(&path)?, manual_clock());
    let task = store.get_task(task_id).await?.expect("task persisted");
    assert_eq!(task.processed_files, 1);
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(store.list_results(task_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_createTask_shouldStartRunningWithZeroCounters() -> Result<()> {
    let store = Store::new_in_memory(manual_clock())?;
    let repository = store.add_repository(new_repository(&["fr", "ja"])).await?;

    let task = store.create_task(new_task(repository.id, 4)).await?;

    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.kind, TaskKind::Incremental);
    assert_eq!((task.processed_files, task.failed_files, task.total_files), (0, 0, 4));
    assert_eq!(task.remaining(), 4);
    assert_eq!(task.target_languages, vec!["fr", "ja"]);
    assert_eq!(task.source_sha.as_deref(), Some("c2"));
    assert_eq!(task.created_at, start_time().to_rfc3339());
    assert!(task.completed_at.is_none());
    Ok(())
}

#[tokio::test]
async fn test_createFailedTask_shouldBeTerminalImmediately() -> Result<()> {
    let store = Store::new_in_memory(manual_clock())?;
    let repository = store.add_repository(new_repository(&["fr"])).await?;

    let task = store
        .create_failed_task(repository.id, TaskKind::Full, vec!["fr".into()], "Bad credentials")
        .await?;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.total_files, 0);
    assert_eq!(task.error_message.as_deref(), Some("Bad credentials"));
    assert!(task.completed_at.is_some());
    assert!(store.record_result(task.id, completed("a.md", "fr")).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_recordResult_afterFinish_shouldBeRejected() -> Result<()> {
    let store = Store::new_in_memory(manual_clock())?;
    let repository = store.add_repository(new_repository(&["fr"])).await?;
    let task = store.create_task(new_task(repository.id, 2)).await?;

    store.record_result(task.id, completed("a.md", "fr")).await?;
    assert!(store.finish_task(task.id, TaskStatus::Completed, None).await?);

    assert!(store.record_result(task.id, completed("b.md", "fr")).await.is_err());
    let task = store.get_task(task.id).await?.unwrap();
    assert_eq!(task.processed_files, 1);
    assert_eq!(store.list_results(task.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_finishTask_withRunningStatus_shouldBeRejected() -> Result<()> {
    let store = Store::new_in_memory(manual_clock())?;
    let repository = store.add_repository(new_repository(&["fr"])).await?;
    let task = store.create_task(new_task(repository.id, 1)).await?;

    assert!(store.finish_task(task.id, TaskStatus::Running, None).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_listResults_shouldKeepInsertionOrderAndStatuses() -> Result<()> {
    let store = Store::new_in_memory(manual_clock())?;
    let repository = store.add_repository(new_repository(&["fr", "ja"])).await?;
    let task = store.create_task(new_task(repository.id, 2)).await?;

    store.record_result(task.id, completed("README.md", "fr")).await?;
    store
        .record_result(
            task.id,
            NewResult::failed(
                "README.md",
                "translations/ja/README.md".to_string(),
                "ja",
                None,
                "# Source".to_string(),
                "Rate limit exceeded, please try again later".to_string(),
            ),
        )
        .await?;

    let results = store.list_results(task.id).await?;
    assert_eq!(results[0].status, ResultStatus::Completed);
    assert_eq!(results[0].translated_content.as_deref(), Some("# Translated fr"));
    assert_eq!(results[1].status, ResultStatus::Failed);
    assert!(results[1].translated_content.is_none());
    assert_eq!(results[1].original_content, "# Source");

    let task = store.get_task(task.id).await?.unwrap();
    assert_eq!((task.processed_files, task.failed_files), (1, 1));
    Ok(())
}

#[tokio::test]
async fn test_listTasks_shouldFilterByRepositoryNewestFirst() -> Result<()> {
    let store = Store::new_in_memory(manual_clock())?;
    let first = store.add_repository(new_repository(&["fr"])).await?;
    let mut other = new_repository(&["fr"]);
    other.name = "website".to_string();
    let second = store.add_repository(other).await?;

    let a = store.create_task(new_task(first.id, 1)).await?;
    let b = store.create_task(new_task(second.id, 1)).await?;
    let c = store.create_task(new_task(first.id, 1)).await?;

    let all: Vec<i64> = store.list_tasks(None, 10).await?.iter().map(|t| t.id).collect();
    assert_eq!(all, vec![c.id, b.id, a.id]);

    let filtered: Vec<i64> = store
        .list_tasks(Some(first.id), 10)
        .await?
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(filtered, vec![c.id, a.id]);
    assert_eq!(store.list_tasks(None, 1).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_advanceBaseline_shouldUpdateShaAndTimestamp() -> Result<()> {
    let clock = manual_clock();
    let store = Store::new_in_memory(clock.clone())?;
    let repository = store.add_repository(new_repository(&["fr"])).await?;
    assert!(repository.baseline_sha.is_none());

    clock.advance(Duration::minutes(3));
    store.advance_baseline(repository.id, "c9").await?;

    let repository = store.get_repository(repository.id).await?.unwrap();
    assert_eq!(repository.baseline_sha.as_deref(), Some("c9"));
    assert_eq!(repository.updated_at, (start_time() + Duration::minutes(3)).to_rfc3339());
    assert!(store.advance_baseline(9999, "c9").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_findRepository_shouldMatchOwnerAndName() -> Result<()> {
    let store = Store::new_in_memory(manual_clock())?;
    let repository = store.add_repository(new_repository(&["fr"])).await?;

    let found = store.find_repository("acme", "docs").await?.unwrap();
    assert_eq!(found.id, repository.id);
    assert_eq!(found.installation_id, 42);
    assert!(store.find_repository("acme", "other").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_recordCommit_shouldStoreBranchAndPullRequest() -> Result<()> {
    let store = Store::new_in_memory(manual_clock())?;
    let repository = store.add_repository(new_repository(&["fr"])).await?;
    let task = store.create_task(new_task(repository.id, 1)).await?;
    store.record_result(task.id, completed("README.md", "fr")).await?;
    store.finish_task(task.id, TaskStatus::Completed, None).await?;

    store
        .record_commit(
            task.id,
            "translation/fr-1",
            Some("https://github.com/acme/docs/pull/3".to_string()),
            Some(3),
        )
        .await?;

    let task = store.get_task(task.id).await?.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.branch_name.as_deref(), Some("translation/fr-1"));
    assert_eq!(task.pr_number, Some(3));
    assert!(store.record_commit(9999, "x", None, None).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_stats_shouldCountRows() -> Result<()> {
    let store = Store::new_in_memory(manual_clock())?;
    let repository = store.add_repository(new_repository(&["fr"])).await?;
    let task = store.create_task(new_task(repository.id, 1)).await?;
    store.record_result(task.id, completed("README.md", "fr")).await?;

    let stats = store.database().stats()?;
    assert_eq!(
        (stats.repository_count, stats.task_count, stats.result_count),
        (1, 1, 1)
    );
    Ok(())
}

#[tokio::test]
async fn test_recordResult_shouldRefreshHeartbeat() -> Result<()> {
    let clock = manual_clock();
    let store = Store::new_in_memory(clock.clone())?;
    let repository = store.add_repository(new_repository(&["fr", "ja"])).await?;
    let task = store.create_task(new_task(repository.id, 2)).await?;
    assert_eq!(task.heartbeat_at.as_deref(), Some(start_time().to_rfc3339().as_str()));

    clock.advance(Duration::minutes(4));
    store.record_result(task.id, completed("README.md", "fr")).await?;
    clock.advance(Duration::minutes(4));

    let failed = store
        .fail_interrupted_tasks("interrupted", Duration::minutes(5))
        .await?;
    assert_eq!(failed, 0);
    let task = store.get_task(task.id).await?.unwrap();
    assert_eq!(
        task.heartbeat_at,
        Some((start_time() + Duration::minutes(4)).to_rfc3339())
    );
    assert_eq!(task.status, TaskStatus::Running);
    Ok(())
}

#[tokio::test]
async fn test_touchTask_afterFinish_shouldReturnFalse() -> Result<()> {
    let store = Store::new_in_memory(manual_clock())?;
    let repository = store.add_repository(new_repository(&["fr"])).await?;
    let task = store.create_task(new_task(repository.id, 1)).await?;

    assert!(store.touch_task(task.id).await?);
    store.finish_task(task.id, TaskStatus::Failed, Some("boom".into())).await?;

    assert!(!store.touch_task(task.id).await?);
    Ok(())
}
