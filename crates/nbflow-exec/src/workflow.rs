//! Project and workflow definitions as received from the project service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Project descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectData {
    pub projectid: String,
    pub name: String,
    pub owner: String,
}

/// Declared notebook task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookTask {
    /// Notebook name, without extension.
    pub nb_name: String,

    #[serde(default)]
    pub params: HashMap<String, String>,

    #[serde(default = "default_machine")]
    pub machine: String,

    /// Runtime version of the project image.
    #[serde(default = "default_docker_version")]
    pub docker_version: String,

    /// Timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

fn default_machine() -> String {
    "cpu".to_string()
}

fn default_docker_version() -> String {
    "latest".to_string()
}

fn default_timeout() -> u64 {
    10800
}

impl NotebookTask {
    pub fn new(nb_name: impl Into<String>) -> Self {
        Self {
            nb_name: nb_name.into(),
            params: HashMap::new(),
            machine: default_machine(),
            docker_version: default_docker_version(),
            timeout: default_timeout(),
            cluster: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Workflow definition instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowData {
    pub wfid: String,

    #[serde(default)]
    pub alias: String,

    pub nbtask: NotebookTask,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_defaults() {
        let task: NotebookTask =
            serde_json::from_value(serde_json::json!({"nb_name": "train"})).unwrap();
        assert_eq!(task.machine, "cpu");
        assert_eq!(task.docker_version, "latest");
        assert!(task.params.is_empty());
        assert!(task.cluster.is_none());
    }
}
