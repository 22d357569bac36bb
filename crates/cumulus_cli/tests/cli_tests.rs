//! Runs the `cumulus` binary against shell and rendered stacks.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn cumulus(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cumulus"))
        .args(args)
        .env_remove("BUILD_ID")
        .env_remove("RUST_LOG")
        .output()
        .expect("cumulus runs")
}

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path.display().to_string()
}

#[test]
fn test_shell_stack_create() {
    let dir = tempdir().unwrap();
    let marker = dir.path().join("out.txt");
    let stack = write(
        dir.path(),
        "stack.mako",
        &format!(
            "type: Shell\nActions:\n  Create:\n    Commands: [sh, -c, 'echo ${{build_id}} > {}']\n",
            marker.display()
        ),
    );

    let output = cumulus(&["create", &stack, "-b", "b-12"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(&marker).unwrap(), "b-12\n");
}

#[test]
fn test_shell_failure_exit_code() {
    let dir = tempdir().unwrap();
    let stack = write(
        dir.path(),
        "stack.yaml",
        "type: Shell\nActions:\n  Delete:\n    Commands: exit 9\n",
    );

    let output = cumulus(&["delete", &stack, "-b", "1"]);

    assert_eq!(output.status.code(), Some(9));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: Command exit 9 exited with return code 9"));
}

#[test]
fn test_missing_build_id() {
    let dir = tempdir().unwrap();
    let stack = write(dir.path(), "stack.yaml", "type: Shell\nActions: {}\n");

    let output = cumulus(&["create", &stack]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("The build ID is required. Use -b option or set BUILD_ID"));
}

#[test]
fn test_render_jinja_stack() {
    let dir = tempdir().unwrap();
    let stack = write(
        dir.path(),
        "stack.jinja",
        "StackName: api-{{ build_id }}\nTemplateBody:\n  Resources:\n    queue:\n      Type: AWS::SQS::Queue\n",
    );

    let output = cumulus(&["render", &stack, "-b", "3"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("===> Stack Attributes:\n"));
    assert!(stdout.contains("===> Final Template:"));
    assert!(stdout.contains("StackName: api-3"));
    assert!(stdout.contains("AWS::SQS::Queue"));
}

#[test]
fn test_unknown_stack_type() {
    let dir = tempdir().unwrap();
    let stack = write(dir.path(), "stack.yaml", "type: Heroku\nname: app\n");

    let output = cumulus(&["list", &stack, "-b", "1"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Stack type not supported: Heroku"));
}
