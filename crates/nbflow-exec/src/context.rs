//! Execution context for notebook tasks.
//!
//! A context is built once per execution attempt and is read-only afterwards.
//! Output and error locations are derived from the task name, the execution
//! id and the day bucket only:
//! - `<outputs>/ok/<day>/<nb_name>.<execid>.ipynb`
//! - `<outputs>/errors/<day>/<nb_name>.<execid>.ipynb`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{iso_timestamp, Clock, SystemClock};
use crate::error::ExecError;
use crate::execid::{self, ExecId, Firm};
use crate::result::ExecutionResult;
use crate::workflow::{NotebookTask, ProjectData, WorkflowData};

/// Notebook file extension.
pub const NOTEBOOK_EXT: &str = "ipynb";

/// Fully resolved description of one task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub projectid: String,
    pub wfid: String,

    /// Pure execution id.
    pub execid: String,

    pub nb_name: String,
    pub machine: String,

    /// Image reference, `<owner>/<name>:<version>`.
    pub docker_name: String,

    /// Task parameters including `WFID`, `EXECID` and `NOW`.
    pub params: HashMap<String, String>,

    pub pm_input: String,
    pub pm_output: String,
    pub output_name: String,
    pub output_dir: String,
    pub error_dir: String,

    /// Day bucket.
    pub today: String,

    /// Timeout in seconds.
    pub timeout: u64,

    pub created_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

impl ExecutionContext {
    /// Where the artifact lands after a failed run.
    pub fn error_output(&self) -> String {
        format!("{}/{}", self.error_dir, self.output_name)
    }
}

/// Filesystem roots used to lay out inputs and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathLayout {
    pub notebooks_dir: String,
    pub outputs_dir: String,
}

impl Default for PathLayout {
    fn default() -> Self {
        Self {
            notebooks_dir: "workflows".to_string(),
            outputs_dir: "outputs".to_string(),
        }
    }
}

impl PathLayout {
    pub fn new(notebooks_dir: impl Into<String>, outputs_dir: impl Into<String>) -> Self {
        Self {
            notebooks_dir: trim_root(notebooks_dir.into()),
            outputs_dir: trim_root(outputs_dir.into()),
        }
    }

    fn input(&self, nb_name: &str) -> String {
        format!("{}/{}.{}", self.notebooks_dir, nb_name, NOTEBOOK_EXT)
    }

    fn ok_dir(&self, today: &str) -> String {
        format!("{}/ok/{}", self.outputs_dir, today)
    }

    fn error_dir(&self, today: &str) -> String {
        format!("{}/errors/{}", self.outputs_dir, today)
    }
}

fn trim_root(root: String) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        root
    } else {
        trimmed.to_string()
    }
}

/// Image reference for a project runtime.
pub fn docker_image_name(project: &ProjectData, version: &str) -> String {
    format!("{}/{}:{}", project.owner, project.name, version)
}

/// Builds execution contexts from project and workflow definitions.
#[derive(Clone)]
pub struct ContextBuilder {
    layout: PathLayout,
    clock: Arc<dyn Clock>,
}

impl ContextBuilder {
    pub fn new(layout: PathLayout, clock: Arc<dyn Clock>) -> Self {
        Self { layout, clock }
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    /// Resolve the context of a workflow run for the given identity.
    pub fn build(
        &self,
        project: &ProjectData,
        workflow: &WorkflowData,
        identity: &ExecId,
    ) -> Result<ExecutionContext, ExecError> {
        validate(project, &workflow.nbtask)?;

        let now = self.clock.now();
        let today = now.format(crate::clock::DAY_FORMAT).to_string();
        let created_at = iso_timestamp(now);
        let task = &workflow.nbtask;
        let execid = identity.pure().to_string();

        let mut params = task.params.clone();
        params.insert("WFID".to_string(), workflow.wfid.clone());
        params.insert("EXECID".to_string(), execid.clone());
        params.insert("NOW".to_string(), created_at.clone());

        let output_dir = self.layout.ok_dir(&today);
        let output_name = format!("{}.{}.{}", task.nb_name, execid, NOTEBOOK_EXT);

        Ok(ExecutionContext {
            projectid: project.projectid.clone(),
            wfid: workflow.wfid.clone(),
            execid,
            nb_name: task.nb_name.clone(),
            machine: task.machine.clone(),
            docker_name: docker_image_name(project, &task.docker_version),
            params,
            pm_input: self.layout.input(&task.nb_name),
            pm_output: format!("{}/{}", output_dir, output_name),
            output_name,
            output_dir,
            error_dir: self.layout.error_dir(&today),
            today,
            timeout: task.timeout,
            created_at,
            cluster: task.cluster.clone(),
        })
    }

    /// Context for a task launched without a stored workflow.
    pub fn build_ondemand(
        &self,
        project: &ProjectData,
        task: &NotebookTask,
    ) -> Result<ExecutionContext, ExecError> {
        let workflow = WorkflowData {
            wfid: execid::generate_wfid(),
            alias: execid::generate(10),
            nbtask: task.clone(),
        };
        self.build(project, &workflow, &ExecId::new().with_firm(Firm::Web))
    }

    /// Copy of `ctx` re-stamped for a new attempt: fresh identity, time and
    /// day bucket, with output paths recomputed accordingly.
    pub fn refresh(&self, ctx: &ExecutionContext, identity: &ExecId) -> ExecutionContext {
        let now = self.clock.now();
        let today = now.format(crate::clock::DAY_FORMAT).to_string();
        let created_at = iso_timestamp(now);
        let execid = identity.pure().to_string();

        let mut params = ctx.params.clone();
        params.insert("EXECID".to_string(), execid.clone());
        params.insert("NOW".to_string(), created_at.clone());

        let output_dir = self.layout.ok_dir(&today);
        let output_name = format!("{}.{}.{}", ctx.nb_name, execid, NOTEBOOK_EXT);

        ExecutionContext {
            execid,
            params,
            pm_output: format!("{}/{}", output_dir, output_name),
            output_name,
            output_dir,
            error_dir: self.layout.error_dir(&today),
            today,
            created_at,
            ..ctx.clone()
        }
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(PathLayout::default(), Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("layout", &self.layout)
            .finish()
    }
}

fn validate(project: &ProjectData, task: &NotebookTask) -> Result<(), ExecError> {
    let required = [
        ("nb_name", task.nb_name.as_str()),
        ("projectid", project.projectid.as_str()),
        ("project name", project.name.as_str()),
        ("project owner", project.owner.as_str()),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ExecError::InvalidTaskDefinition(format!("{} is required", field)));
        }
    }
    Ok(())
}

/// Error result for a context, used when a run fails before the engine reports.
pub fn make_error_result(ctx: &ExecutionContext, elapsed_secs: f64) -> ExecutionResult {
    ExecutionResult::from_context(ctx, elapsed_secs).with_error(None)
}
