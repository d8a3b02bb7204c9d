/*!
 * Controller lifecycle: restart recovery, polling, registration and
 * provider configuration.
 */

use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;
use tempfile::TempDir;

use docglot::app_config::{CommitSettings, ProviderSettings, TranslationSettings};
use docglot::app_controller::{
    Controller, CreateOutcome, CreateTaskRequest, INTERRUPTED_MESSAGE, PipelineSettings,
    PollOutcome,
};
use docglot::clock::{Clock, ManualClock};
use docglot::database::models::{NewResult, NewTask, TaskKind, TaskStatus};
use docglot::database::{DatabaseConnection, Store};
use docglot::providers::ConfiguredProviders;
use docglot::providers::mock::MockProvider;

use crate::common::{
    FakeConnector, FakePlatform, Harness, INSTALLATION_ID, manual_clock, new_repository,
};

fn docs_platform() -> Arc<FakePlatform> {
    FakePlatform::with_files("c1", &[("README.md", "# Project\n\nHello")])
}

#[tokio::test]
async fn test_start_afterCrash_shouldFailTasksLeftRunning() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("docglot.db");
    let clock = manual_clock();

    let (interrupted, finished) = {
        let store = Store::new(DatabaseConnection::new(&path)?, clock.clone());
        let repository = store.add_repository(new_repository(&["fr"])).await?;
        let new_task = || NewTask {
            repository_id: repository.id,
            kind: TaskKind::Full,
            target_languages: vec!["fr".to_string()],
            total_files: 3,
            source_sha: Some("c1".to_string()),
        };
        let interrupted = store.create_task(new_task()).await?;
        let finished = store.create_task(new_task()).await?;
        store
            .finish_task(finished.id, TaskStatus::Completed, None)
            .await?;
        (interrupted.id, finished.id)
    };

    clock.advance(Duration::minutes(10));
    let store = Store::new(DatabaseConnection::new(&path)?, clock.clone());
    let platform = docs_platform();
    Controller::start(
        store.clone(),
        FakeConnector::new(platform),
        Arc::new(docglot::providers::StaticProvider(Arc::new(MockProvider::working()))),
        clock.clone() as Arc<dyn Clock>,
        PipelineSettings::default(),
    )
    .await?;

    let task = store.get_task(interrupted).await?.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert!(task.completed_at.is_some());

    let task = store.get_task(finished).await?.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.error_message.is_none());
    Ok(())
}

async fn controller_on(
    path: &std::path::Path,
    clock: Arc<ManualClock>,
    platform: Arc<FakePlatform>,
    provider: MockProvider,
) -> Result<(Controller, Store)> {
    let store = Store::new(DatabaseConnection::new(path)?, clock.clone());
    let controller = Controller::start(
        store.clone(),
        FakeConnector::new(platform),
        Arc::new(docglot::providers::StaticProvider(Arc::new(provider))),
        clock as Arc<dyn Clock>,
        PipelineSettings::default(),
    )
    .await?;
    Ok((controller, store))
}

#[tokio::test]
async fn test_start_whileAnotherProcessTranslates_shouldLeaveLiveTaskRunning() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("docglot.db");
    let clock = manual_clock();
    let platform = FakePlatform::with_files(
        "c1",
        &[("README.md", "# Project\n\nHello"), ("docs/guide.md", "# Guide")],
    );

    let (first, store) =
        controller_on(&path, clock.clone(), platform.clone(), MockProvider::slow(300)).await?;
    let repository = store.add_repository(new_repository(&["fr"])).await?;
    let created = match first
        .create_task(CreateTaskRequest {
            repository_id: repository.id,
            kind: TaskKind::Full,
            target_languages: None,
            selected_files: None,
        })
        .await?
    {
        CreateOutcome::Started(created) => created,
        other => panic!("expected a started task, got {:?}", other),
    };

    let (_second, second_store) =
        controller_on(&path, clock.clone(), platform, MockProvider::working()).await?;
    assert_eq!(
        second_store.get_task(created.task_id).await?.unwrap().status,
        TaskStatus::Running
    );

    let task = first.wait(created.task_id).await?;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.processed_files, 2);
    assert!(task.error_message.is_none());
    Ok(())
}

#[tokio::test]
async fn test_start_withStaleHeartbeat_shouldFailTask() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("docglot.db");
    let clock = manual_clock();

    let store = Store::new(DatabaseConnection::new(&path)?, clock.clone());
    let repository = store.add_repository(new_repository(&["fr"])).await?;
    let new_task = || NewTask {
        repository_id: repository.id,
        kind: TaskKind::Incremental,
        target_languages: vec!["fr".to_string()],
        total_files: 1,
        source_sha: Some("c1".to_string()),
    };
    let abandoned = store.create_task(new_task()).await?;
    clock.advance(Duration::minutes(4));
    let alive = store.create_task(new_task()).await?;
    clock.advance(Duration::minutes(2));
    assert!(store.touch_task(alive.id).await?);

    controller_on(&path, clock.clone(), docs_platform(), MockProvider::working()).await?;

    let abandoned = store.get_task(abandoned.id).await?.unwrap();
    assert_eq!(abandoned.status, TaskStatus::Failed);
    assert_eq!(abandoned.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    let alive = store.get_task(alive.id).await?.unwrap();
    assert_eq!(alive.status, TaskStatus::Running);
    let late_result = NewResult::completed(
        "README.md",
        "translations/fr/README.md".to_string(),
        "fr",
        None,
        "# Project".to_string(),
        "# Projet".to_string(),
    );
    assert!(store.record_result(alive.id, late_result).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_taskStatus_whileRunning_shouldOmitLanguageBreakdown() -> Result<()> {
    let harness = Harness::new(docs_platform(), MockProvider::working()).await?;
    let repository = harness.register(&["fr"]).await?;
    let task = harness
        .store
        .create_task(NewTask {
            repository_id: repository.id,
            kind: TaskKind::Incremental,
            target_languages: vec!["fr".to_string()],
            total_files: 1,
            source_sha: Some("c1".to_string()),
        })
        .await?;

    let view = harness.controller.task_status(task.id).await?;

    assert_eq!(view.task.status, TaskStatus::Running);
    assert!(view.languages.is_empty());
    assert!(view.failures.is_empty());
    assert!(harness.controller.task_status(9999).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_taskStatus_afterCompletion_shouldListTranslatedPaths() -> Result<()> {
    let harness = Harness::new(docs_platform(), MockProvider::working()).await?;
    let repository = harness.register(&["fr", "ja"]).await?;
    let created = match harness
        .controller
        .create_task(CreateTaskRequest {
            repository_id: repository.id,
            kind: TaskKind::Full,
            target_languages: None,
            selected_files: None,
        })
        .await?
    {
        CreateOutcome::Started(created) => created,
        other => panic!("expected a started task, got {:?}", other),
    };
    harness.controller.wait(created.task_id).await?;

    let view = harness.controller.task_status(created.task_id).await?;

    assert_eq!(view.task.status, TaskStatus::Completed);
    let paths: Vec<Vec<String>> = view
        .languages
        .iter()
        .map(|l| l.translated_paths.clone())
        .collect();
    assert_eq!(
        paths,
        vec![
            vec!["translations/fr/README.md".to_string()],
            vec!["translations/ja/README.md".to_string()],
        ]
    );
    assert!(view.failures.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_pollOnce_shouldCommitThenReportNoChanges() -> Result<()> {
    let harness = Harness::new(docs_platform(), MockProvider::working()).await?;
    let repository = harness.register(&["fr"]).await?;

    let first = harness.controller.poll_once().await?;
    assert_eq!(first.len(), 1);
    let (repository_id, outcome) = &first[0];
    assert_eq!(*repository_id, repository.id);
    let branch_name = match outcome {
        PollOutcome::Committed { branch_name, .. } => branch_name.clone(),
        other => panic!("expected a commit, got {:?}", other),
    };
    assert!(branch_name.starts_with("translation/fr-"));
    assert_eq!(harness.platform.pulls().len(), 1);

    let second = harness.controller.poll_once().await?;
    assert_eq!(second, vec![(repository.id, PollOutcome::NoChanges)]);
    Ok(())
}

#[tokio::test]
async fn test_pollOnce_withFailingProvider_shouldReportFailedTask() -> Result<()> {
    let harness = Harness::new(docs_platform(), MockProvider::failing(503)).await?;
    let repository = harness.register(&["fr"]).await?;

    let outcomes = harness.controller.poll_once().await?;

    match &outcomes[0] {
        (id, PollOutcome::TaskFailed { message, .. }) => {
            assert_eq!(*id, repository.id);
            assert_eq!(message, "1/1 files failed: API service temporarily unavailable");
        }
        other => panic!("expected a failed task, got {:?}", other),
    }
    assert!(harness.platform.pulls().is_empty());
    let repository = harness.store.get_repository(repository.id).await?.unwrap();
    assert!(repository.baseline_sha.is_none());
    Ok(())
}

#[tokio::test]
async fn test_registerRepository_withoutBranch_shouldAskThePlatform() -> Result<()> {
    let harness = Harness::new(docs_platform(), MockProvider::working()).await?;
    let mut repository = new_repository(&["fr", "zh-CN"]);
    repository.default_branch = String::new();

    let record = harness
        .controller
        .register_repository(repository, None)
        .await?;

    assert_eq!(record.default_branch, "main");
    assert_eq!(record.target_languages, vec!["fr", "zh-CN"]);
    Ok(())
}

#[tokio::test]
async fn test_registerRepository_withInvalidLanguage_shouldReject() -> Result<()> {
    let harness = Harness::new(docs_platform(), MockProvider::working()).await?;

    let result = harness
        .controller
        .register_repository(new_repository(&["fr", "klingon"]), Some("main".to_string()))
        .await;

    assert!(result.is_err());
    assert!(harness.store.list_repositories().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_invalidateCredentials_shouldReachConnector() -> Result<()> {
    let harness = Harness::new(docs_platform(), MockProvider::working()).await?;

    harness.controller.invalidate_credentials(INSTALLATION_ID);

    assert_eq!(*harness.connector.invalidated.lock(), vec![INSTALLATION_ID]);
    Ok(())
}

#[tokio::test]
async fn test_createTask_withUnconfiguredProvider_shouldFailBeforeDetection() -> Result<()> {
    let platform = docs_platform();
    let clock = manual_clock();
    let store = Store::new_in_memory(clock.clone())?;
    let controller = Controller::start(
        store.clone(),
        FakeConnector::new(platform),
        Arc::new(ConfiguredProviders::new(
            ProviderSettings::default(),
            TranslationSettings::default(),
        )),
        clock as Arc<dyn Clock>,
        PipelineSettings::default(),
    )
    .await?;
    let repository = store.add_repository(new_repository(&["fr"])).await?;

    let result = controller
        .create_task(CreateTaskRequest {
            repository_id: repository.id,
            kind: TaskKind::Incremental,
            target_languages: None,
            selected_files: None,
        })
        .await;

    assert!(result.is_err());
    assert!(store.list_tasks(None, 10).await?.is_empty());
    Ok(())
}

#[test]
fn test_defaultCommitOptions_withBlankIndexDocument_shouldSkipIndex() {
    let settings = PipelineSettings {
        commit: CommitSettings {
            create_pull_request: false,
            index_document: "  ".to_string(),
        },
        ..PipelineSettings::default()
    };

    let options = tokio_test::block_on(async {
        let harness = Harness::with_settings(docs_platform(), MockProvider::working(), settings)
            .await
            .unwrap();
        harness.controller.default_commit_options()
    });

    assert!(!options.create_pull_request);
    assert!(options.branch_name.is_none());
    assert!(options.index_document.is_none());
}

#[tokio::test]
async fn test_watch_withShutdownDuringPoll_shouldStopPromptly() -> Result<()> {
    let harness = Harness::new(docs_platform(), MockProvider::slow(5_000)).await?;
    harness.register(&["fr"]).await?;

    let shutdown = tokio::time::sleep(std::time::Duration::from_millis(200));
    let polls = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        harness
            .controller
            .watch(std::time::Duration::from_secs(60), shutdown),
    )
    .await
    .expect("watch should stop while the poll is still translating");

    assert_eq!(polls, 1);
    Ok(())
}

#[tokio::test]
async fn test_watch_afterFailedPoll_shouldKeepPolling() -> Result<()> {
    let harness = Harness::new(docs_platform(), MockProvider::working()).await?;
    harness.store.database().execute(|conn| {
        conn.execute_batch("DROP TABLE repositories;")?;
        Ok(())
    })?;
    assert!(harness.controller.poll_once().await.is_err());

    let shutdown = tokio::time::sleep(std::time::Duration::from_millis(150));
    let polls = harness
        .controller
        .watch(std::time::Duration::from_millis(20), shutdown)
        .await;

    assert!(polls >= 2, "only {} poll(s) ran", polls);
    Ok(())
}

#[tokio::test]
async fn test_runningTask_shouldRefreshHeartbeatWhileTranslating() -> Result<()> {
    let settings = PipelineSettings {
        heartbeat_interval: std::time::Duration::from_millis(40),
        ..PipelineSettings::default()
    };
    let harness = Harness::with_settings(docs_platform(), MockProvider::slow(600), settings).await?;
    let repository = harness.register(&["fr"]).await?;
    let created = match harness
        .controller
        .create_task(CreateTaskRequest {
            repository_id: repository.id,
            kind: TaskKind::Full,
            target_languages: None,
            selected_files: None,
        })
        .await?
    {
        CreateOutcome::Started(created) => created,
        other => panic!("expected a started task, got {:?}", other),
    };

    harness.clock.advance(Duration::minutes(10));
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let task = harness.store.get_task(created.task_id).await?.unwrap();
    assert_eq!(task.processed_files, 0);
    let expected = (crate::common::start_time() + Duration::minutes(10)).to_rfc3339();
    assert_eq!(task.heartbeat_at.as_deref(), Some(expected.as_str()));
    let recovered = harness
        .store
        .fail_interrupted_tasks(INTERRUPTED_MESSAGE, Duration::minutes(5))
        .await?;
    assert_eq!(recovered, 0);

    let task = harness.controller.wait(created.task_id).await?;
    assert_eq!(task.status, TaskStatus::Completed);
    Ok(())
}
