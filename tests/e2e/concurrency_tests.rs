//! End-to-end tests of the bounded execution service with real interpreters

use futures::future::join_all;
use polyexec_sandbox::{
    CancellationToken, ErrorKind, ExecutionRequest, ExecutionService, Language, PoolConfig,
    CANCELLED_MESSAGE,
};
use polyexec_tests::common::{find_pid, wait_for_exit, TestEnv};
use polyexec_tests::require_toolchain;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_concurrent_executions_are_isolated() {
    let mut env = TestEnv::new();
    require_toolchain!(env, Language::Python);
    env.config.pool = PoolConfig {
        workers: 8,
        queue_depth: 64,
    };
    let service = ExecutionService::from_config(&env.config);

    let requests = (0..50).map(|i| {
        let service = service.clone();
        async move {
            let request = ExecutionRequest::new("python", "print(input())")
                .with_stdin(format!("request-{}\n", i));
            (i, service.execute(request).await)
        }
    });

    for (i, result) in join_all(requests).await {
        assert!(result.success, "request {} failed: {}", i, result.output);
        assert_eq!(result.output.trim(), format!("request-{}", i));
    }
    assert_eq!(service.in_flight(), 0);
    assert_eq!(env.workspaces_left(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_kills_running_program() {
    let mut env = TestEnv::new();
    require_toolchain!(env, Language::Python);
    env.config.limits.run.max_duration = Duration::from_secs(30);
    let service = ExecutionService::from_config(&env.config);

    // The program records its pid in the workspace so the test can find it.
    let pid_file = env.scratch.path().join("pid");
    let code = format!(
        "import os\nopen({:?}, 'w').write(str(os.getpid()))\nwhile True:\n    pass\n",
        pid_file.display().to_string()
    );

    let cancel = CancellationToken::new();
    let handle = {
        let service = service.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            service
                .execute_with_cancel(ExecutionRequest::new("python", code), cancel)
                .await
        })
    };

    let mut pid = None;
    for _ in 0..250 {
        if let Some(found) = std::fs::read_to_string(&pid_file)
            .ok()
            .and_then(|text| find_pid(&text))
        {
            pid = Some(found);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let pid = pid.expect("program never started");

    cancel.cancel();
    let result = handle.await.unwrap();

    assert_eq!(result.error_kind, ErrorKind::InternalError);
    assert_eq!(result.output, CANCELLED_MESSAGE);
    assert!(wait_for_exit(pid, Duration::from_secs(3)).await);
    assert_eq!(service.in_flight(), 0);
    assert_eq!(env.workspaces_left(), 0);
}

#[tokio::test]
async fn test_overload_is_reported_not_queued_forever() {
    let mut env = TestEnv::new();
    require_toolchain!(env, Language::Python);
    env.config.pool = PoolConfig {
        workers: 1,
        queue_depth: 1,
    };
    let service = ExecutionService::from_config(&env.config);

    let slow = "import time\ntime.sleep(0.5)\nprint('done')";
    let results = join_all((0..4).map(|_| service.execute(ExecutionRequest::new("python", slow)))).await;

    let completed = results.iter().filter(|r| r.success).count();
    let rejected = results
        .iter()
        .filter(|r| r.error_kind == ErrorKind::InternalError)
        .count();
    assert_eq!(completed, 2);
    assert_eq!(rejected, 2);
    assert_eq!(service.in_flight(), 0);
}
