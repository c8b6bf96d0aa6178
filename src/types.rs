use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Snapshot of the executing frame's bindings after one statement boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub line_no: usize,
    pub locals: IndexMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    CompileError,
    RuntimeError,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::CompileError => "compile_error",
            ExecutionStatus::RuntimeError => "runtime_error",
        }
    }
}

/// Outcome of one execution, tagged by `status` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success {
        output: String,
        steps: Vec<Step>,
    },
    CompileError {
        error_type: String,
        message: String,
        line_no: usize,
        offset: usize,
        source_text_line: String,
        /// Always empty; nothing ran
        steps: Vec<Step>,
    },
    RuntimeError {
        error_type: String,
        message: String,
        formatted_traceback: String,
        output: String,
        steps: Vec<Step>,
    },
}

impl ExecutionResult {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            ExecutionResult::Success { .. } => ExecutionStatus::Success,
            ExecutionResult::CompileError { .. } => ExecutionStatus::CompileError,
            ExecutionResult::RuntimeError { .. } => ExecutionStatus::RuntimeError,
        }
    }

    pub fn steps(&self) -> &[Step] {
        match self {
            ExecutionResult::Success { steps, .. }
            | ExecutionResult::CompileError { steps, .. }
            | ExecutionResult::RuntimeError { steps, .. } => steps,
        }
    }

    pub fn output(&self) -> &str {
        match self {
            ExecutionResult::Success { output, .. } | ExecutionResult::RuntimeError { output, .. } => {
                output
            }
            ExecutionResult::CompileError { .. } => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    #[test]
    fn test_success_serializes_with_status_tag() {
        let result = ExecutionResult::Success {
            output: "2".to_string(),
            steps: vec![Step {
                line_no: 1,
                locals: IndexMap::from([("x".to_string(), "1".to_string())]),
            }],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "success",
                "output": "2",
                "steps": [{"line_no": 1, "locals": {"x": "1"}}]
            })
        );
    }

    #[test]
    fn test_compile_error_field_names() {
        let result = ExecutionResult::CompileError {
            error_type: "SyntaxError".to_string(),
            message: "invalid syntax".to_string(),
            line_no: 1,
            offset: 7,
            source_text_line: "def f(:".to_string(),
            steps: Vec::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        let object = json.as_object().unwrap();
        let expected = hashmap! {
            "status" => serde_json::json!("compile_error"),
            "error_type" => serde_json::json!("SyntaxError"),
            "line_no" => serde_json::json!(1),
            "offset" => serde_json::json!(7),
            "steps" => serde_json::json!([]),
        };
        for (key, value) in expected {
            assert_eq!(object.get(key), Some(&value), "field {}", key);
        }
        assert_eq!(result.status().as_str(), "compile_error");
    }

    #[test]
    fn test_round_trips_through_json() {
        let result = ExecutionResult::RuntimeError {
            error_type: "ValueError".to_string(),
            message: "boom".to_string(),
            formatted_traceback: "Traceback (most recent call last):\n".to_string(),
            output: String::new(),
            steps: Vec::new(),
        };
        let text = serde_json::to_string(&result).unwrap();
        let back: ExecutionResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back, result);
    }
}
