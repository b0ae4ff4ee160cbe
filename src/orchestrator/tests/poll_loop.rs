use super::*;

#[tokio::test(start_paused = true)]
async fn test_three_page_job_fetches_each_page_once() {
    let service = Arc::new(FakeService::with_statuses(vec![
        Ok(status_json(3, &[(1, "ready"), (2, "pending"), (3, "pending")])),
        Ok(status_json(3, &[(1, "ready"), (2, "ready"), (3, "pending")])),
        Ok(status_json(3, &[(1, "ready"), (2, "ready"), (3, "ready")])),
    ]));
    let orchestrator = create_test_orchestrator(service.clone());
    let job = JobId::from("scan.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    let outcome = wait_outcome(&handle).await;

    let JobOutcome::Complete(status) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(status.page_count, 3);
    assert_eq!(status.done_pages(), 3);
    assert_eq!(service.status_count(), 3);

    // Two artifacts per page, never repeated across ticks
    assert_eq!(service.fetched_pages(), vec![1, 1, 2, 2, 3, 3]);
    assert_eq!(*service.details_fetches.lock().unwrap(), vec![1, 2, 3]);

    let stored = orchestrator.get(&job).await.unwrap();
    assert_eq!(stored.status, JobStatus::Complete);
    assert_eq!(stored.total_pages, 3);
    for page in stored.pages.values() {
        let image = orchestrator.artifact(page.image_ref.unwrap()).await.unwrap();
        assert_eq!(image.name, format!("page_{}.png", page.page_number));
        assert!(page.file_ref.is_some());
        assert_eq!(
            page.details.as_ref().unwrap().document_type.as_deref(),
            Some("invoice")
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_pages_are_fetched_on_the_tick_they_become_ready() {
    let service = Arc::new(FakeService::with_statuses(vec![
        Ok(status_json(3, &[(1, "pending"), (2, "pending"), (3, "pending")])),
        Ok(status_json(3, &[(1, "ready"), (2, "ready"), (3, "pending")])),
        Ok(status_json(3, &[(1, "ready"), (2, "ready"), (3, "ready")])),
    ]));
    let orchestrator = create_test_orchestrator(service.clone());
    let job = JobId::from("staggered.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    let outcome = wait_outcome(&handle).await;

    assert!(matches!(outcome, JobOutcome::Complete(_)));
    assert_eq!(service.status_count(), 3);
    assert_eq!(
        service.fetch_ticks(),
        vec![(1, 2), (1, 2), (2, 2), (2, 2), (3, 3), (3, 3)]
    );
    assert_eq!(*service.details_fetches.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(
        orchestrator.get(&job).await.unwrap().status,
        JobStatus::Complete
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_on_second_tick_skips_ready_pages() {
    let service = Arc::new(FakeService::with_statuses(vec![
        Ok(status_json(3, &[(1, "pending"), (2, "pending"), (3, "pending")])),
        Ok(status_json(3, &[(1, "ready"), (2, "ready"), (3, "pending")])),
        Ok(status_json(3, &[(1, "ready"), (2, "ready"), (3, "ready")])),
    ]));
    let orchestrator = create_test_orchestrator(service.clone());
    let job = JobId::from("staggered-cancel.pdf");

    let token = orchestrator.registries.cancellation.token(&job).await;
    service.on_status(move |call| {
        if call == 2 {
            token.cancel();
        }
    });

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    assert_eq!(wait_outcome(&handle).await, JobOutcome::Cancelled);

    assert_eq!(service.status_count(), 2);
    assert!(service.fetch_ticks().is_empty());
    assert!(service.details_fetches.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(service.status_count(), 2);

    let stored = orchestrator.get(&job).await.unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.pages.values().all(|p| p.image_ref.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_completed_job_stops_polling() {
    let service = Arc::new(FakeService::with_statuses(vec![Ok(status_json(
        1,
        &[(1, "ready")],
    ))]));
    let orchestrator = create_test_orchestrator(service.clone());
    let job = JobId::from("one-page.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    assert!(!wait_outcome(&handle).await.is_cancelled());
    assert_eq!(service.status_count(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(service.status_count(), 1);

    // A late cancel does not undo completion
    orchestrator.request_cancel(&job).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    let stored = orchestrator.get(&job).await.unwrap();
    assert_eq!(stored.status, JobStatus::Complete);
    assert!(matches!(handle.outcome(), Some(JobOutcome::Complete(_))));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_between_status_and_page_fetch() {
    let service = Arc::new(FakeService::with_statuses(vec![Ok(status_json(
        2,
        &[(1, "ready"), (2, "ready")],
    ))]));
    let orchestrator = create_test_orchestrator(service.clone());
    let job = JobId::from("cancel-me.pdf");

    let token = orchestrator.registries.cancellation.token(&job).await;
    service.on_status(move |call| {
        if call == 1 {
            token.cancel();
        }
    });

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    assert_eq!(wait_outcome(&handle).await, JobOutcome::Cancelled);

    assert!(service.fetched_pages().is_empty());
    assert!(service.details_fetches.lock().unwrap().is_empty());
    assert!(orchestrator.registries.resources.is_empty().await);

    // The status itself was applied before the checkpoint
    let stored = orchestrator.get(&job).await.unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert_eq!(stored.pages.len(), 2);
    assert!(stored.pages.values().all(|p| p.image_ref.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_job_is_resubmitted_each_time() {
    let service = Arc::new(FakeService::with_statuses(vec![
        Err(Error::JobUnknown("lost.pdf".to_string())),
        Err(Error::JobUnknown("lost.pdf".to_string())),
        Ok(status_json(1, &[(1, "ready")])),
    ]));
    let orchestrator = create_test_orchestrator(service.clone());
    let mut events = orchestrator.subscribe();
    let job = JobId::from("lost.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    assert!(matches!(wait_outcome(&handle).await, JobOutcome::Complete(_)));

    // Initial start plus one resubmission per unknown-job response
    assert_eq!(service.start_count(), 3);

    let events = drain(&mut events);
    let resubmitted = events
        .iter()
        .filter(|e| matches!(e, JobEvent::Resubmitted { .. }))
        .count();
    let updates = events
        .iter()
        .filter(|e| matches!(e, JobEvent::StatusUpdated { .. }))
        .count();
    assert_eq!(resubmitted, 2);
    assert_eq!(updates, 1, "unknown-job ticks must not touch the store");
}

#[tokio::test(start_paused = true)]
async fn test_malformed_status_leaves_store_untouched() {
    let service = Arc::new(FakeService::with_statuses(vec![
        Ok(status_json(2, &[(1, "pending"), (2, "pending")])),
        Ok(json!({ "page_count": "two", "pages": {} })),
        Err(Error::Http {
            status: 502,
            url: "fake://status".to_string(),
        }),
        Ok(json!({ "page_count": 2, "pages": { "page_1": { "page": 1, "status": "done" } } })),
    ]));
    let orchestrator = create_test_orchestrator(service.clone());
    let job = JobId::from("flaky.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    let before = {
        tokio::time::sleep(Duration::from_millis(500)).await;
        orchestrator.get(&job).await.unwrap()
    };
    assert_eq!(before.pages.len(), 2);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(service.status_count() >= 4);
    assert!(handle.outcome().is_none(), "loop must survive bad payloads");

    let after = orchestrator.get(&job).await.unwrap();
    assert_eq!(after.pages, before.pages);
    assert_eq!(after.status, JobStatus::Running);

    orchestrator.request_cancel(&job).await;
    assert_eq!(wait_outcome(&handle).await, JobOutcome::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_ignored_page_blocks_completion() {
    let service = Arc::new(FakeService::with_statuses(vec![Ok(status_json(
        2,
        &[(1, "ready"), (2, "ignore")],
    ))]));
    let orchestrator = create_test_orchestrator(service.clone());
    let job = JobId::from("ignored.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(handle.outcome().is_none());
    // Ignored pages still offer artifacts
    assert_eq!(service.fetched_pages(), vec![1, 1, 2, 2]);

    service.push_status(Ok(status_json(2, &[(1, "ready"), (2, "processed")])));
    let JobOutcome::Complete(status) = wait_outcome(&handle).await else {
        panic!("expected completion");
    };
    assert_eq!(status.page(2).unwrap().status, RemotePageStatus::Processed);
    assert_eq!(service.fetched_pages(), vec![1, 1, 2, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_page_is_not_retried_by_default() {
    let service = Arc::new(FakeService::with_statuses(vec![Ok(status_json(
        2,
        &[(1, "ready"), (2, "ready")],
    ))]));
    service.fail_artifacts(2, 1);
    let orchestrator = create_test_orchestrator(service.clone());
    let mut events = orchestrator.subscribe();
    let job = JobId::from("partial.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    assert!(matches!(wait_outcome(&handle).await, JobOutcome::Complete(_)));

    let stored = orchestrator.get(&job).await.unwrap();
    assert!(stored.page(1).unwrap().image_ref.is_some());
    assert!(stored.page(2).unwrap().image_ref.is_none());
    assert_eq!(orchestrator.registries.resources.len().await, 2);
    assert_eq!(
        orchestrator.registries.tracker.claimed(&job).await,
        vec![1, 2]
    );

    let failed: Vec<u32> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            JobEvent::PageFetchFailed { page, .. } => Some(page),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_page_is_retried_when_reclaim_enabled() {
    let service = Arc::new(FakeService::with_statuses(vec![Ok(status_json(
        2,
        &[(1, "ready"), (2, "ready")],
    ))]));
    service.fail_artifacts(2, 1);

    let mut config = test_config();
    config.polling.reclaim_failed_pages = true;
    let orchestrator = SplitJobOrchestrator::new(config, service.clone()).unwrap();
    let job = JobId::from("retry.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    assert!(matches!(wait_outcome(&handle).await, JobOutcome::Complete(_)));

    // Completion was held for one extra tick while page 2 was refetched
    assert_eq!(service.status_count(), 2);
    assert_eq!(service.fetched_pages(), vec![1, 1, 2, 2, 2]);

    let stored = orchestrator.get(&job).await.unwrap();
    assert!(stored.page(2).unwrap().image_ref.is_some());
    assert!(stored.page(2).unwrap().file_ref.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_details_release_page_artifacts() {
    let service = Arc::new(FakeService::with_statuses(vec![Ok(status_json(
        1,
        &[(1, "ready")],
    ))]));
    service.set_details(1, json!({ "page": 1, "confidence": 4.2 }));
    let orchestrator = create_test_orchestrator(service.clone());
    let job = JobId::from("bad-details.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    assert!(matches!(wait_outcome(&handle).await, JobOutcome::Complete(_)));

    // Image and document were fetched, then dropped with the failed page
    assert_eq!(service.fetched_pages(), vec![1, 1]);
    assert!(orchestrator.registries.resources.is_empty().await);

    let page = orchestrator.get(&job).await.unwrap().page(1).cloned().unwrap();
    assert!(page.image_ref.is_none());
    assert!(page.details.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_inline_details_skip_details_request() {
    let mut status = status_json(1, &[(1, "ready")]);
    status["pages"]["page_1"]["details"] =
        json!({ "page": 1, "document_type": "receipt", "confidence": 0.91 });
    let service = Arc::new(FakeService::with_statuses(vec![Ok(status)]));
    let orchestrator = create_test_orchestrator(service.clone());
    let job = JobId::from("inline.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    assert!(matches!(wait_outcome(&handle).await, JobOutcome::Complete(_)));

    assert!(service.details_fetches.lock().unwrap().is_empty());
    let stored = orchestrator.get(&job).await.unwrap();
    let details = stored.page(1).unwrap().details.clone().unwrap();
    assert_eq!(details.document_type.as_deref(), Some("receipt"));
    assert_eq!(details.confidence, Some(0.91));
}

#[tokio::test(start_paused = true)]
async fn test_empty_page_list_never_completes() {
    let service = Arc::new(FakeService::with_statuses(vec![Ok(json!({
        "page_count": 0,
        "pages": {}
    }))]));
    let orchestrator = create_test_orchestrator(service.clone());
    let job = JobId::from("splitting.pdf");

    let handle = orchestrator.start_or_resume(&job).await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(handle.outcome().is_none());
    assert!(service.status_count() >= 4);

    orchestrator.request_cancel(&job).await;
    assert_eq!(wait_outcome(&handle).await, JobOutcome::Cancelled);
}
