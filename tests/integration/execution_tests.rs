//! Integration tests against the real toolchains installed on the host

use polyexec_sandbox::{ErrorKind, ExecutionRequest, Language, NO_OUTPUT, TRUNCATED_MARKER};
use polyexec_tests::common::{find_pid, wait_for_exit, TestEnv};
use polyexec_tests::require_toolchain;
use std::time::{Duration, Instant};

const CPP_ECHO: &str = r#"
#include <iostream>
int main() {
    int n;
    std::cin >> n;
    std::cout << n << std::endl;
    return 0;
}
"#;

#[tokio::test]
async fn test_cpp_echoes_input() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Cpp);

    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("cpp", CPP_ECHO).with_stdin("5"))
        .await;

    assert!(result.success, "unexpected failure: {}", result.output);
    assert_eq!(result.error_kind, ErrorKind::None);
    assert!(result.output.contains('5'));
    assert_eq!(result.language, Some(Language::Cpp));
    assert_eq!(env.workspaces_left(), 0);
}

#[tokio::test]
async fn test_cpp_compile_error() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Cpp);

    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("c++", "int main() { return undeclared; }"))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, ErrorKind::CompileError);
    assert!(!result.output.trim().is_empty());
    assert!(result.output.contains("undeclared"));
    assert_eq!(env.workspaces_left(), 0);
}

#[tokio::test]
async fn test_cpp_nonzero_exit_is_runtime_error() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Cpp);

    let code = "#include <cstdio>\nint main() { std::puts(\"before\"); return 3; }";
    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("cpp", code))
        .await;

    assert_eq!(result.error_kind, ErrorKind::RuntimeError);
    assert!(result.output.contains("before"));
}

#[tokio::test]
async fn test_python_exception_is_runtime_error() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Python);

    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new(
            "python",
            "print('start')\nraise ValueError('boom')\n",
        ))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, ErrorKind::RuntimeError);
    assert!(result.output.contains("start"));
    assert!(result.output.contains("ValueError: boom"));
    assert_eq!(env.workspaces_left(), 0);
}

#[tokio::test]
async fn test_python_reads_stdin() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Python);

    let result = env
        .dispatcher()
        .execute(
            ExecutionRequest::new("py", "import sys\nprint(sum(int(x) for x in sys.stdin.read().split()))\n")
                .with_stdin("1 2 3\n4\n"),
        )
        .await;

    assert!(result.success, "unexpected failure: {}", result.output);
    assert_eq!(result.output.trim(), "10");
}

#[tokio::test]
async fn test_python_silent_script_returns_sentinel() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Python);

    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("python", "x = 1\n"))
        .await;

    assert!(result.success);
    assert_eq!(result.output, NO_OUTPUT);
    assert!(result.is_no_output());
}

#[tokio::test]
async fn test_python_infinite_loop_times_out_and_is_killed() {
    let env = TestEnv::new().with_run_timeout(Duration::from_secs(1));
    require_toolchain!(env, Language::Python);

    let code = "import os, sys\nprint(os.getpid())\nsys.stdout.flush()\nwhile True:\n    pass\n";
    let started = Instant::now();
    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("python", code))
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!result.success);
    assert_eq!(result.error_kind, ErrorKind::Timeout);

    let pid = find_pid(&result.output).expect("pid in partial output");
    assert!(wait_for_exit(pid, Duration::from_secs(2)).await);
    assert_eq!(env.workspaces_left(), 0);
}

#[tokio::test]
async fn test_python_cannot_see_host_environment() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Python);

    std::env::set_var("POLYEXEC_TEST_SECRET", "hunter2");
    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new(
            "python",
            "import os\nprint(os.environ.get('POLYEXEC_TEST_SECRET', 'absent'))\n",
        ))
        .await;

    assert_eq!(result.output.trim(), "absent");
}

#[tokio::test]
async fn test_javascript_runs_under_node() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::JavaScript);

    let code = "const input = require('fs').readFileSync(0, 'utf8');\nconsole.log(input.trim().toUpperCase());\n";
    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("js", code).with_stdin("hello"))
        .await;

    assert!(result.success, "unexpected failure: {}", result.output);
    assert_eq!(result.output.trim(), "HELLO");
    assert_eq!(result.language, Some(Language::JavaScript));
}

#[tokio::test]
async fn test_unsupported_language() {
    let env = TestEnv::new();

    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("cobol", "DISPLAY 'HI'."))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, ErrorKind::InternalError);
    assert!(result.output.contains("Unsupported language"));
    assert_eq!(env.workspaces_left(), 0);
}

#[tokio::test]
async fn test_result_serializes_for_transport() {
    let env = TestEnv::new();

    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("cobol", ""))
        .await;
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value["success"], false);
    assert_eq!(value["error_kind"], "internal_error");
}

#[tokio::test]
async fn test_large_output_is_truncated_not_failed() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Python);

    let code = "import sys\nsys.stdout.write('x' * 2000000)\nprint()\nprint('done')\n";
    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("python", code))
        .await;

    assert!(result.success, "unexpected failure: {:?}", result.error_kind);
    assert_eq!(result.error_kind, ErrorKind::None);
    assert!(result.output.starts_with("xxxx"));
    assert!(result.output.ends_with(TRUNCATED_MARKER));
    assert!(result.output.len() < 2000000);
    assert_eq!(env.workspaces_left(), 0);
}
