//! Workspace lifecycle observed from outside the backend

use polyexec_sandbox::{ErrorKind, ExecutionRequest, Language, TempWorkspace};
use polyexec_tests::common::TestEnv;
use polyexec_tests::require_toolchain;
use std::time::Duration;

#[tokio::test]
async fn test_program_sees_only_its_own_workspace() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Python);

    let code = "import os\nprint(os.getcwd())\nprint(sorted(os.listdir('.')))\n";
    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("python", code))
        .await;

    assert!(result.success, "unexpected failure: {}", result.output);
    let mut lines = result.output.lines();
    let cwd = lines.next().unwrap();
    assert!(cwd.starts_with(&env.scratch.path().join("work").display().to_string()));
    assert!(cwd.contains("polyexec-"));
    assert_eq!(
        lines.next().unwrap(),
        "['input.txt', 'main.py']"
    );
    assert_eq!(env.workspaces_left(), 0);
}

#[tokio::test]
async fn test_every_outcome_cleans_up() {
    let env = TestEnv::new().with_run_timeout(Duration::from_millis(500));
    require_toolchain!(env, Language::Python);
    let dispatcher = env.dispatcher();

    let cases = [
        ("print('ok')", ErrorKind::None),
        ("raise SystemExit(2)", ErrorKind::RuntimeError),
        ("while True: pass", ErrorKind::Timeout),
    ];
    for (code, expected) in cases {
        let result = dispatcher
            .execute(ExecutionRequest::new("python", code))
            .await;
        assert_eq!(result.error_kind, expected, "{}", result.output);
        assert_eq!(env.workspaces_left(), 0, "leftover after {:?}", expected);
    }
}

#[tokio::test]
async fn test_read_only_tree_is_still_removed() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Python);

    let code = concat!(
        "import os\n",
        "os.makedirs('d/e')\n",
        "open('d/e/f', 'w').close()\n",
        "os.chmod('d/e', 0o500)\n",
        "os.chmod('d', 0o500)\n",
        "print('locked')\n",
    );
    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("python", code))
        .await;

    assert!(result.success, "unexpected failure: {}", result.output);
    assert_eq!(result.output, "locked\n");
    assert_eq!(env.workspaces_left(), 0);
}

#[tokio::test]
async fn test_compiled_workspace_leaves_nothing_behind() {
    let env = TestEnv::new();
    require_toolchain!(env, Language::Cpp);

    let result = env
        .dispatcher()
        .execute(ExecutionRequest::new("cpp", "int main() { this is not c++ }"))
        .await;

    assert_eq!(result.error_kind, ErrorKind::CompileError);
    assert_eq!(env.workspaces_left(), 0);
}

#[tokio::test]
async fn test_workspace_paths_are_disjoint() {
    let env = TestEnv::new();
    let scratch = env.config.scratch_dir();

    let first = TempWorkspace::acquire(&scratch, Language::Cpp).unwrap();
    let second = TempWorkspace::acquire(&scratch, Language::Cpp).unwrap();

    assert_ne!(first.root_dir(), second.root_dir());
    assert_ne!(first.source_file(), second.source_file());
    assert_eq!(env.workspaces_left(), 2);

    drop(first);
    drop(second);
    assert_eq!(env.workspaces_left(), 0);
}
