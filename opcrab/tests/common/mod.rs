//! Common test utilities and macros

use opcrab::{EngineConfig, ExecError, Program};
use std::path::Path;

#[derive(Debug)]
pub enum TestResult {
    /// Run completed; holds everything the program printed.
    Output(String),
    /// Run aborted; holds the error kind, the message and any partial output.
    Error(String),
    ErrorRegex(String),
}

impl PartialEq for TestResult {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TestResult::Output(a), TestResult::Output(b)) => a == b,
            (TestResult::Error(a), TestResult::Error(b)) => a == b,
            (TestResult::ErrorRegex(pattern), TestResult::Error(msg)) => {
                regex::Regex::new(pattern).unwrap().is_match(msg)
            }
            (TestResult::Error(msg), TestResult::ErrorRegex(pattern)) => {
                regex::Regex::new(pattern).unwrap().is_match(msg)
            }
            _ => false,
        }
    }
}

/// Renders a failed run as `<kind>: <message> | output=<partial output>`.
fn describe_error(err: &anyhow::Error, output: &[u8]) -> String {
    let kind = err
        .downcast_ref::<ExecError>()
        .map(ExecError::kind)
        .unwrap_or("Load");
    format!(
        "{kind}: {err:#} | output={:?}",
        String::from_utf8_lossy(output)
    )
}

pub fn run_interpreter_test(input_file: &Path) -> TestResult {
    let mut output = Vec::<u8>::new();
    let result = Program::from_path(input_file)
        .and_then(|program| opcrab::run_program(&program, EngineConfig::default(), &mut output));

    match result {
        Ok(_) => TestResult::Output(String::from_utf8_lossy(&output).into_owned()),
        Err(e) => TestResult::Error(describe_error(&e, &output)),
    }
}

#[macro_export]
macro_rules! check_interpreter {
    ($test_name:ident, input=$input_file:expr, result=$expected:expr) => {
        #[test]
        fn $test_name() {
            let input_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("tests")
                .join("inputs")
                .join($input_file);

            let result = crate::common::run_interpreter_test(&input_path);
            assert_eq!(result, $expected);
        }
    };
}
