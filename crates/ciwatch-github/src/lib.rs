use ciwatch_core::api::{ApiError, JobDetail, RunSummary, RunsApi};
use ciwatch_core::cursor::MonthCursor;
use serde::Deserialize;
use std::process::Command;
use std::time::Duration;

const API_ROOT: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "ciwatch";
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct WorkflowRunsPage {
    #[serde(default)]
    workflow_runs: Vec<RunSummary>,
}

#[derive(Debug, Deserialize)]
struct JobsPage {
    #[serde(default)]
    jobs: Vec<JobDetail>,
}

/// Blocking GitHub Actions client for one workflow of one repository.
///
/// The ingestion engine is sequential on purpose (the API is rate-limited),
/// so a plain blocking agent with a per-call timeout is all that is needed.
pub struct GithubClient {
    agent: ureq::Agent,
    token: String,
    owner: String,
    repo: String,
    workflow_id: u64,
}

impl GithubClient {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        workflow_id: u64,
        token: impl Into<String>,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CALL_TIMEOUT)
            .timeout(CALL_TIMEOUT)
            .build();
        Self {
            agent,
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            workflow_id,
        }
    }

    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<ureq::Response, ApiError> {
        let mut request = self
            .agent
            .get(url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", API_VERSION)
            .set("User-Agent", USER_AGENT);
        for (name, value) in query {
            request = request.query(name, value);
        }
        request.call().map_err(map_call_error)
    }
}

impl RunsApi for GithubClient {
    fn list_runs(
        &self,
        branch: &str,
        month: MonthCursor,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<RunSummary>, ApiError> {
        let url = format!(
            "{API_ROOT}/repos/{}/{}/actions/workflows/{}/runs",
            self.owner, self.repo, self.workflow_id
        );
        let response = self.get(
            &url,
            &[
                ("status", "success".to_string()),
                ("branch", branch.to_string()),
                ("created", month.date_range()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ],
        )?;
        let page: WorkflowRunsPage = response
            .into_json()
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        Ok(page.workflow_runs)
    }

    fn list_jobs(&self, run_id: u64) -> Result<Vec<JobDetail>, ApiError> {
        let url = format!(
            "{API_ROOT}/repos/{}/{}/actions/runs/{run_id}/jobs",
            self.owner, self.repo
        );
        let response = self.get(&url, &[("per_page", "100".to_string())])?;
        let page: JobsPage = response
            .into_json()
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        Ok(page.jobs)
    }
}

fn map_call_error(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Status(status, response) => {
            let mut body = response.into_string().unwrap_or_default();
            body.truncate(500);
            if status == 401 || status == 403 {
                ApiError::Auth(format!("status {status}: {body}"))
            } else {
                ApiError::Status { status, body }
            }
        }
        ureq::Error::Transport(transport) => ApiError::Transport(transport.to_string()),
    }
}

/// Token from the environment, falling back to the `gh` CLI session.
pub fn resolve_token() -> Result<String, ApiError> {
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        let token = token.trim();
        if !token.is_empty() {
            return Ok(token.to_string());
        }
    }

    let output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .map_err(|err| ApiError::Auth(format!("failed to run gh auth token: {err}")))?;
    if !output.status.success() {
        return Err(ApiError::Auth(
            "gh auth token failed; set GITHUB_TOKEN or run gh auth login".to_string(),
        ));
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(ApiError::Auth("gh auth token returned no token".to_string()));
    }
    Ok(token)
}
