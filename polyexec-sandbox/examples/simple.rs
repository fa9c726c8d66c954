//! Simple example - run a program in each supported language

use polyexec_sandbox::{ExecutionRequest, ExecutionResult, ExecutionService, ExecutorConfig};

#[tokio::main]
async fn main() -> polyexec_sandbox::Result<()> {
    tracing_subscriber::fmt::init();

    let mut config = ExecutorConfig::load()?;
    config.apply_env_overrides()?;
    config.validate()?;
    let service = ExecutionService::from_config(&config);

    println!("=== polyexec example ===\n");
    for status in service.dispatcher().toolchain_report() {
        println!(
            "{}: {}",
            status.language.display_name(),
            status
                .resolved
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "not installed".to_string())
        );
    }

    println!("\nExample 1: C++ reading stdin");
    let request = ExecutionRequest::new(
        "cpp",
        "#include <iostream>\nint main() { int n; std::cin >> n; std::cout << n * n << '\\n'; }",
    )
    .with_stdin("12");
    print_result(&service.execute(request).await);

    println!("\nExample 2: Python runtime error");
    let request = ExecutionRequest::new("python", "print('about to fail')\n1 / 0\n");
    print_result(&service.execute(request).await);

    println!("\nExample 3: JavaScript");
    let request = ExecutionRequest::new("javascript", "console.log([1, 2, 3].map(x => x * 2))");
    print_result(&service.execute(request).await);

    println!("\nExample 4: Unsupported language");
    let request = ExecutionRequest::new("fortran", "print *, 'hi'");
    print_result(&service.execute(request).await);

    Ok(())
}

fn print_result(result: &ExecutionResult) {
    println!(
        "  Result: success={} error_kind={} duration={}ms",
        result.success, result.error_kind, result.duration_ms
    );
    for line in result.output.lines() {
        println!("  | {}", line);
    }
}
